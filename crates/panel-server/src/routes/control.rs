use axum::body::Body;
use axum::extract::{Form, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use panel_core::exec;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::info;

use crate::error::AppError;
use crate::state::AppState;

/// In-memory pipe between the running process and the response body.
const OUTPUT_BUFFER: usize = 64 * 1024;

#[derive(Debug, Deserialize)]
pub struct ControlForm {
    #[serde(default)]
    pub service: String,
    #[serde(default)]
    pub action: String,
}

/// GET|POST /control: run an action and stream its output.
///
/// Unknown services or actions are rejected before anything is spawned.
/// Once the process starts the response is `200` and carries everything it
/// prints, followed by a `[<status>]` trailer line, whatever the exit code.
pub async fn run_action(
    State(app): State<AppState>,
    Form(form): Form<ControlForm>,
) -> Result<Response, AppError> {
    if form.service.is_empty() || form.action.is_empty() {
        return Err(AppError::bad_request("both 'service' and 'action' are required"));
    }
    let action = app.panel.resolve(&form.service, &form.action)?;
    info!(action = %action.identity(), "manual run requested");

    let (mut writer, reader) = tokio::io::duplex(OUTPUT_BUFFER);
    tokio::spawn(async move {
        let trailer = match exec::execute(&action, &mut writer).await {
            Ok(status) => format!("\n[{status}]\n"),
            Err(_) => "\n[launch failed]\n".to_string(),
        };
        let _ = writer.write_all(trailer.as_bytes()).await;
        let _ = writer.shutdown().await;
    });

    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
            (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
        ],
        Body::from_stream(ReaderStream::new(reader)),
    )
        .into_response())
}
