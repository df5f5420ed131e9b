use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use panel_core::PanelError;

// ---------------------------------------------------------------------------
// Internal sentinel for explicit 400 Bad Request errors
// ---------------------------------------------------------------------------

/// Private sentinel error type used to carry an explicit HTTP 400 through
/// the `anyhow::Error` chain without touching the `PanelError` enum.
#[derive(Debug)]
struct BadRequestError(String);

impl std::fmt::Display for BadRequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for BadRequestError {}

// ---------------------------------------------------------------------------
// AppError: unified error type for HTTP responses
// ---------------------------------------------------------------------------

/// Unified error type for HTTP responses.
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    /// Construct a 400 Bad Request error with the given message.
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self(BadRequestError(msg.into()).into())
    }
}

fn status_for(err: &PanelError) -> StatusCode {
    match err {
        PanelError::WebhookNotFound => StatusCode::NOT_FOUND,
        PanelError::ServiceNotFound(_) | PanelError::ActionNotFound { .. } => {
            StatusCode::BAD_REQUEST
        }
        PanelError::InvalidConfig(_)
        | PanelError::InvalidService(_)
        | PanelError::InvalidAction { .. }
        | PanelError::DuplicateWebhook { .. }
        | PanelError::Json(_) => StatusCode::UNPROCESSABLE_ENTITY,
        PanelError::Io(_) | PanelError::Launch { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let Some(b) = self.0.downcast_ref::<BadRequestError>() {
            let body = serde_json::json!({ "error": b.0.clone() });
            return (StatusCode::BAD_REQUEST, axum::Json(body)).into_response();
        }

        let status = match self.0.downcast_ref::<PanelError>() {
            Some(e) => status_for(e),
            None => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = serde_json::json!({ "error": self.0.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
