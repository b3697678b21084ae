//! # logbeam-api
//!
//! HTTP surface of logbeam: the viewer WebSocket endpoint, the log ingestion
//! endpoint, and health/stats. Process wiring lives in the binary.

pub mod config;
pub mod error;
pub mod handlers;
pub mod state;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

pub use error::ApiError;
pub use state::AppState;

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::stats::health_check))
        .route("/api/v1/ws", get(handlers::ws::ws_handler))
        .route(
            "/api/v1/projects/:project_id/logs",
            post(handlers::ingest::ingest_log),
        )
        .route("/api/v1/realtime/stats", get(handlers::stats::realtime_stats))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
