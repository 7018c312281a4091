//! Router configuration and server setup.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::api::handlers;
use crate::api::state::AppState;
use crate::guard::SessionBackend;
use crate::telegram::Directory;

/// Creates the API router with all routes configured.
pub fn create_router<B>(state: AppState<B>) -> Router
where
    B: SessionBackend,
    B::Handle: Directory,
{
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handlers::root::<B>))
        .route("/health", get(handlers::health::<B>))
        .route("/search_entities", post(handlers::search_entities::<B>))
        .route("/get_messages", post(handlers::get_messages::<B>))
        .route("/get_members", post(handlers::get_members::<B>))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("shutdown_signal: failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

/// Serves the API until ctrl-c.
pub async fn serve<B>(state: AppState<B>) -> Result<(), std::io::Error>
where
    B: SessionBackend,
    B::Handle: Directory,
{
    let addr = state.config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("API server listening on {}", addr);

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
}
