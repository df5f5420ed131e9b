use axum::extract::State;
use tracing::warn;

use crate::error::AppError;
use crate::state::AppState;

/// GET|POST /reload: re-read the config file and swap it in.
///
/// A config that fails validation is reported and the previous one stays
/// active.
pub async fn reload_config(State(app): State<AppState>) -> Result<String, AppError> {
    let path = app.config_path.clone();
    let panel = app.panel.clone();
    let result = tokio::task::spawn_blocking(move || panel.reload_from(&path))
        .await
        .map_err(|e| AppError(anyhow::anyhow!("task join error: {e}")))?;

    match result {
        Ok(snapshot) => Ok(format!(
            "Reloaded {} actions\n",
            snapshot.registry.action_count()
        )),
        Err(e) => {
            warn!(path = %app.config_path.display(), error = %e, "reload rejected");
            Err(e.into())
        }
    }
}
