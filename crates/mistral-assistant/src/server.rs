use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tower_http::timeout::TimeoutLayer;
use tracing::info;

use crate::exchange::TurnExchange;
use crate::handlers;
use crate::session::SessionStore;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub exchange: Arc<TurnExchange>,
    pub sessions: SessionStore,
}

impl AppState {
    pub fn new(exchange: TurnExchange, sessions: SessionStore) -> Self {
        Self {
            exchange: Arc::new(exchange),
            sessions,
        }
    }
}

pub fn build_app(state: AppState, request_timeout_secs: u64) -> Router {
    let api_v1 = Router::new()
        .route("/examples", get(handlers::v1::list_examples))
        .route("/sessions", post(handlers::v1::create_session))
        .route("/sessions/{session_id}", get(handlers::v1::get_session))
        .route(
            "/sessions/{session_id}/messages",
            post(handlers::v1::send_message),
        );

    Router::new()
        .route("/", get(handlers::index))
        .route("/livez", get(handlers::livez))
        .route("/readyz", get(handlers::readyz))
        .route("/version", get(handlers::version))
        .nest("/api/v1", api_v1)
        .with_state(state)
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(request_timeout_secs),
        ))
}

/// Serve `app` on `listener` until Ctrl-C.
pub async fn serve(listener: TcpListener, app: Router) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    info!("listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
