pub mod auth;
pub mod error;
pub mod routes;
pub mod state;

use axum::middleware;
use axum::routing::{any, get};
use axum::Router;
use std::path::PathBuf;
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// Build the axum Router with all routes and middleware.
/// Used by `serve()` and available for integration testing.
pub fn build_router(app_state: AppState) -> Router {
    // Operator routes sit behind basic auth; webhooks do not.
    let operator = Router::new()
        .route("/", get(routes::dashboard::index))
        .route("/api/actions", get(routes::dashboard::list_actions))
        .route(
            "/control",
            get(routes::control::run_action).post(routes::control::run_action),
        )
        .route(
            "/reload",
            get(routes::reload::reload_config).post(routes::reload::reload_config),
        )
        .route_layer(middleware::from_fn_with_state(
            app_state.clone(),
            auth::basic_auth,
        ));

    Router::new()
        .merge(operator)
        .route(
            "/webhook/{secret}",
            any(routes::webhook::trigger_webhook),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

/// Load `config_path` and serve the control panel on `addr`.
pub async fn serve(config_path: PathBuf, addr: &str) -> anyhow::Result<()> {
    let state = AppState::load(config_path)?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    serve_on(state, listener).await
}

/// Serve on a pre-bound listener.
///
/// Unlike `serve`, this accepts a `TcpListener` that was already bound so the
/// caller can read the actual port before starting (useful when `port = 0` and
/// the OS picks a free port).
pub async fn serve_on(state: AppState, listener: tokio::net::TcpListener) -> anyhow::Result<()> {
    let local = listener.local_addr()?;
    let panel = state.panel.clone();
    let actions = panel.snapshot().registry.action_count();
    let app = build_router(state);

    tracing::info!(actions, "control panel listening on http://{local}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("shutting down, cancelling webhook runs");
    panel.shutdown();
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
