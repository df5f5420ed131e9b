use axum::extract::{Path, State};
use axum::http::header;
use axum::response::IntoResponse;
use tracing::info;

use crate::error::AppError;
use crate::state::AppState;

/// ANY /webhook/{secret}: start the bound action in the background.
///
/// Unauthenticated: the secret is the credential. Responds as soon as the
/// run is registered; the process output goes to the server's stdout.
pub async fn trigger_webhook(
    State(app): State<AppState>,
    Path(secret): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let handle = app.panel.trigger_webhook(&secret)?;
    info!(action = %handle.action(), run = %handle.id(), "webhook accepted");
    Ok(([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], "success\n"))
}
