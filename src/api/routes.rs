//! HTTP API route definitions.

use axum::{routing::get, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::handlers::{depth, health, metrics, ready, simulate, status, AppState};

/// Create the API router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health endpoints
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/metrics", get(metrics))
        // Depth endpoints
        .route("/api/v1/status", get(status))
        .route("/api/v1/depth/:exchange/:pair/:asset", get(depth))
        .route("/api/v1/depth/:exchange/:pair/:asset/simulate", get(simulate))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
