//! Viewer WebSocket endpoint.
//!
//! Viewers connect to `/api/v1/ws?subject_id=<id>[&project_id=<id>]`.
//! Once registered with the hub they receive `{"type":"connected"}` followed
//! by every log event for their project (or every project when no
//! `project_id` is given). Text `ping` is answered with `{"type":"pong"}`;
//! other client text is ignored.

use std::sync::atomic::Ordering;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, info};

use logbeam_core::defaults::WS_PING_INTERVAL_SECS;
use logbeam_core::ViewerEnvelope;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ViewerParams {
    pub subject_id: Option<String>,
    pub project_id: Option<String>,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ViewerParams>,
    State(state): State<AppState>,
) -> Result<Response, ApiError> {
    let subject_id = params
        .subject_id
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("subject_id is required".to_string()))?;
    let project_id = params.project_id.filter(|p| !p.is_empty());

    Ok(ws
        .on_upgrade(move |socket| handle_viewer(socket, state, subject_id, project_id))
        .into_response())
}

/// Only the exact text `ping` is a liveness probe.
fn is_ping(text: &str) -> bool {
    text == "ping"
}

async fn handle_viewer(
    mut socket: WebSocket,
    state: AppState,
    subject_id: String,
    project_id: Option<String>,
) {
    let (conn, mut outbox) = state.hub.connection(subject_id.clone(), project_id.clone());
    // The hub queues the greeting in the same turn it registers the viewer,
    // so no broadcast can overtake it.
    let greeting = ViewerEnvelope::connected(&subject_id, project_id.as_deref());
    let conn_id = match state.hub.register_with_greeting(conn, greeting).await {
        Ok(id) => id,
        Err(e) => {
            debug!(subject_id = %subject_id, error = %e, "Viewer rejected");
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    };

    let count = state.ws_connections.fetch_add(1, Ordering::Relaxed) + 1;
    info!(
        active = count,
        connection_id = conn_id,
        subject_id = %subject_id,
        "Viewer connected"
    );

    let (mut sender, mut receiver) = socket.split();

    // Drain the hub-owned outbox to the socket.
    let mut send_task = tokio::spawn(async move {
        let mut ping_interval =
            tokio::time::interval(Duration::from_secs(WS_PING_INTERVAL_SECS));
        ping_interval.tick().await;
        loop {
            tokio::select! {
                frame = outbox.recv() => match frame {
                    Some(frame) => {
                        if sender.send(Message::Text(frame.to_string())).await.is_err() {
                            break;
                        }
                    }
                    None => {
                        // Unregistered or hub shut down.
                        let _ = sender.send(Message::Close(None)).await;
                        break;
                    }
                },
                _ = ping_interval.tick() => {
                    if sender.send(Message::Ping(Vec::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    let hub = state.hub.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) if is_ping(&text) => {
                    if hub.send_to(conn_id, ViewerEnvelope::pong()).await.is_err() {
                        break;
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.hub.unregister(conn_id).await;
    let count = state.ws_connections.fetch_sub(1, Ordering::Relaxed) - 1;
    info!(active = count, connection_id = conn_id, "Viewer disconnected");
}
