use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use base64::Engine as _;

use crate::state::AppState;

pub const REALM: &str = "Restricted";

/// Axum middleware that gates operator routes behind HTTP basic auth.
///
/// Credentials come from the active configuration snapshot, so a reload
/// rotates them for every request that starts afterwards. Webhook routes are
/// not wrapped by this layer; the secret in the path is their credential.
pub async fn basic_auth(State(app): State<AppState>, req: Request, next: Next) -> Response {
    let snapshot = app.panel.snapshot();
    if let Some((user, password)) = basic_credentials(req.headers()) {
        if snapshot.credentials.verify(&user, &password) {
            drop(snapshot);
            return next.run(req).await;
        }
        tracing::warn!(user = %user, "rejected basic auth credentials");
    }

    Response::builder()
        .status(401)
        .header(header::WWW_AUTHENTICATE, format!("Basic realm=\"{REALM}\""))
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(Body::from("Unauthorized\n"))
        .expect("infallible: all header values are valid ASCII")
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Decode `Authorization: Basic <base64(user:password)>`.
fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, password) = decoded.split_once(':')?;
    Some((user.to_string(), password.to_string()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
