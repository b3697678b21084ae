use std::sync::atomic::Ordering;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use crate::error::ApiError;
use crate::state::AppState;

pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "store": state.store_backend.to_string(),
    }))
}

/// Point-in-time view of this process's viewers and the shared queue.
pub async fn realtime_stats(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let connections = state.hub.count().await?;
    let subjects = state.hub.connected_subjects().await?;
    let queue_depth = match state.queue.len().await {
        Ok(depth) => Some(depth),
        Err(e) => {
            tracing::warn!(error = %e, "Queue depth unavailable");
            None
        }
    };

    Ok(Json(serde_json::json!({
        "connections": connections,
        "websocket_sessions": state.ws_connections.load(Ordering::Relaxed),
        "subjects": subjects,
        "queue_depth": queue_depth,
    })))
}
