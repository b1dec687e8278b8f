use super::handlers;
use super::state::AppState;
use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Client streaming endpoint (any path upgrades; `/` is what browsers hit)
        .route("/", get(handlers::ws_upgrade))
        .route("/ws", get(handlers::ws_upgrade))
        // Liveness
        .route("/health", get(handlers::health_check))
        .route("/keep-alive", get(handlers::keep_alive))
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
