//! Cross-process distribution of log events.
//!
//! Ingestion publishes each persisted log on `logs:<project_id>`; every server
//! process runs a bridge that pattern-subscribes to `logs:*` and feeds the
//! local [`Hub`](crate::hub::Hub).

use std::sync::Arc;
use std::time::Duration;

use futures::stream::BoxStream;
use futures::StreamExt;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use logbeam_core::defaults::{RELAY_RESUBSCRIBE_BACKOFF_MS, RELAY_TOPIC_PATTERN};
use logbeam_core::{
    project_from_topic, relay_topic, DistributionEvent, Error, RelayMessage, RelayTransport,
    Result,
};

use crate::hub::HubHandle;

/// Live feed of decoded distribution events.
pub type EventStream = BoxStream<'static, Result<DistributionEvent>>;

/// Publish/subscribe fabric keyed by project.
#[derive(Clone)]
pub struct Relay {
    transport: Arc<dyn RelayTransport>,
}

impl Relay {
    pub fn new(transport: Arc<dyn RelayTransport>) -> Self {
        Self { transport }
    }

    /// Publish a log payload for `project_id`.
    pub async fn publish<T: Serialize + ?Sized>(&self, project_id: &str, payload: &T) -> Result<()> {
        let event = DistributionEvent::log(project_id, serde_json::to_value(payload)?);
        let body = serde_json::to_string(&event)?;
        self.transport.publish(&relay_topic(project_id), body).await
    }

    /// Live feed for exactly the listed projects.
    pub async fn subscribe(&self, project_ids: &[String]) -> Result<EventStream> {
        let topics: Vec<String> = project_ids.iter().map(|p| relay_topic(p)).collect();
        let feed = self.transport.subscribe(&topics).await?;
        Ok(decoded(feed))
    }

    /// Live feed for every project.
    pub async fn subscribe_all(&self) -> Result<EventStream> {
        let feed = self.transport.psubscribe(RELAY_TOPIC_PATTERN).await?;
        Ok(decoded(feed))
    }
}

fn decoded(feed: logbeam_core::RelayStream) -> EventStream {
    feed.map(|item| item.and_then(decode)).boxed()
}

fn decode(msg: RelayMessage) -> Result<DistributionEvent> {
    let mut event: DistributionEvent = serde_json::from_str(&msg.payload)
        .map_err(|e| Error::Relay(format!("undecodable message on {}: {e}", msg.topic)))?;
    if event.project_id.is_empty() {
        if let Some(project) = project_from_topic(&msg.topic) {
            event.project_id = project.to_string();
        }
    }
    Ok(event)
}

/// Subscribe to every project and forward events to `hub` until cancelled.
///
/// The initial subscription happens before this returns, so events published
/// afterwards are guaranteed to reach the hub. If the feed ends later the
/// bridge re-subscribes after a short pause.
pub async fn start_relay_bridge(
    relay: Relay,
    hub: HubHandle,
    cancel: CancellationToken,
) -> Result<JoinHandle<()>> {
    let feed = relay.subscribe_all().await?;
    info!(pattern = RELAY_TOPIC_PATTERN, "Relay bridge subscribed");

    Ok(tokio::spawn(async move {
        let mut feed = Some(feed);
        let backoff = Duration::from_millis(RELAY_RESUBSCRIBE_BACKOFF_MS);

        while !cancel.is_cancelled() {
            let current = match feed.take() {
                Some(f) => f,
                None => match relay.subscribe_all().await {
                    Ok(f) => {
                        info!(pattern = RELAY_TOPIC_PATTERN, "Relay bridge re-subscribed");
                        f
                    }
                    Err(e) => {
                        error!(error = %e, "Relay subscription failed");
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            _ = tokio::time::sleep(backoff) => continue,
                        }
                    }
                },
            };

            if !forward(current, &hub, &cancel).await {
                break;
            }
            if !cancel.is_cancelled() {
                warn!("Relay feed ended, re-subscribing");
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(backoff) => {}
                }
            }
        }
        info!("Relay bridge stopped");
    }))
}

/// Pump one feed into the hub. Returns false when the hub is gone.
async fn forward(mut feed: EventStream, hub: &HubHandle, cancel: &CancellationToken) -> bool {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return true,
            item = feed.next() => match item {
                Some(Ok(event)) => {
                    debug!(project_id = %event.project_id, "Relaying event to hub");
                    if hub.broadcast(event).await.is_err() {
                        return false;
                    }
                }
                Some(Err(e)) => warn!(error = %e, "Skipping relay message"),
                None => return true,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_fills_project_from_topic() {
        let msg = RelayMessage {
            topic: "logs:proj-7".to_string(),
            payload: r#"{"type":"log","project_id":"","payload":{"m":1}}"#.to_string(),
        };
        let event = decode(msg).unwrap();
        assert_eq!(event.project_id, "proj-7");
        assert_eq!(event.payload["m"], 1);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let msg = RelayMessage {
            topic: "logs:proj-7".to_string(),
            payload: "not json".to_string(),
        };
        assert!(matches!(decode(msg), Err(Error::Relay(_))));
    }
}
