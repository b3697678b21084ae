//! Ingestion-side fan-out.
//!
//! After ingestion has persisted a log row it hands the row here. The row is
//! published on the relay for live viewers, and one notification job is
//! enqueued per channel that wants it. Neither step can fail ingestion.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, instrument, warn};

use logbeam_core::{ChannelDirectory, LogRecord, NotificationJob};
use logbeam_realtime::Relay;

use crate::queue::WorkQueue;

/// What happened to one log during fan-out.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FanoutReport {
    /// The log reached the relay.
    pub published: bool,
    /// Jobs pushed onto the work queue.
    pub jobs_enqueued: usize,
    /// Human-readable description of every failed step.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[derive(Clone)]
pub struct Fanout {
    relay: Relay,
    queue: WorkQueue,
    directory: Arc<dyn ChannelDirectory>,
}

impl Fanout {
    pub fn new(relay: Relay, queue: WorkQueue, directory: Arc<dyn ChannelDirectory>) -> Self {
        Self {
            relay,
            queue,
            directory,
        }
    }

    /// Publish `log` and enqueue a job for every interested channel.
    #[instrument(skip(self, log), fields(project_id = %log.project_id, log_id = %log.id))]
    pub async fn dispatch(&self, log: &LogRecord) -> FanoutReport {
        let mut report = FanoutReport::default();

        match self.relay.publish(&log.project_id, log).await {
            Ok(()) => report.published = true,
            Err(e) => {
                warn!(error = %e, "Relay publish failed");
                report.warnings.push(format!("relay publish failed: {e}"));
            }
        }

        let channels = match self.directory.channels_for_project(&log.project_id).await {
            Ok(channels) => channels,
            Err(e) => {
                warn!(error = %e, "Channel lookup failed");
                report.warnings.push(format!("channel lookup failed: {e}"));
                return report;
            }
        };

        for channel in channels.iter().filter(|c| c.accepts(log.level)) {
            let job = NotificationJob::for_channel(log, channel);
            match self.queue.enqueue(&job).await {
                Ok(()) => report.jobs_enqueued += 1,
                Err(e) => {
                    warn!(channel_id = %channel.id, error = %e, "Enqueue failed");
                    report
                        .warnings
                        .push(format!("enqueue for channel {} failed: {e}", channel.id));
                }
            }
        }

        debug!(
            published = report.published,
            jobs = report.jobs_enqueued,
            "Fan-out complete"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::Utc;
    use futures::StreamExt;
    use logbeam_core::{
        Channel, Error, LogLevel, RelayStream, RelayTransport, Result,
    };
    use logbeam_store::{MemoryRelay, MemoryStore};
    use uuid::Uuid;

    use crate::directory::StaticChannelDirectory;

    struct DownRelay;

    #[async_trait]
    impl RelayTransport for DownRelay {
        async fn publish(&self, _topic: &str, _payload: String) -> Result<()> {
            Err(Error::Relay("not connected".to_string()))
        }
        async fn subscribe(&self, _topics: &[String]) -> Result<RelayStream> {
            Err(Error::Relay("not connected".to_string()))
        }
        async fn psubscribe(&self, _pattern: &str) -> Result<RelayStream> {
            Err(Error::Relay("not connected".to_string()))
        }
    }

    fn channel(id: &str, min_level: LogLevel, active: bool) -> Channel {
        Channel {
            id: id.to_string(),
            project_id: "proj-1".to_string(),
            kind: "log".to_string(),
            min_level,
            rate_limit_per_minute: 10,
            active,
            config: serde_json::Value::Null,
        }
    }

    fn log(level: LogLevel) -> LogRecord {
        LogRecord {
            id: Uuid::now_v7(),
            project_id: "proj-1".to_string(),
            level,
            message: "checkout failed".to_string(),
            source: "web".to_string(),
            timestamp: Utc::now(),
            metadata: None,
        }
    }

    fn directory() -> Arc<StaticChannelDirectory> {
        Arc::new(StaticChannelDirectory::new(vec![
            channel("errors", LogLevel::Error, true),
            channel("warnings", LogLevel::Warn, true),
            channel("muted", LogLevel::Debug, false),
        ]))
    }

    #[tokio::test]
    async fn test_enqueues_only_matching_active_channels() {
        let relay = Relay::new(Arc::new(MemoryRelay::new(16)));
        let queue = WorkQueue::new(Arc::new(MemoryStore::new()));
        let fanout = Fanout::new(relay.clone(), queue.clone(), directory());
        let mut feed = relay.subscribe(&["proj-1".to_string()]).await.unwrap();

        let report = fanout.dispatch(&log(LogLevel::Warn)).await;
        assert!(report.published);
        assert_eq!(report.jobs_enqueued, 1);
        assert!(report.warnings.is_empty());

        let job = queue.dequeue(Duration::from_secs(1)).await.unwrap().unwrap();
        assert_eq!(job.channel_id, "warnings");

        let event = feed.next().await.unwrap().unwrap();
        assert_eq!(event.payload["message"], "checkout failed");
    }

    #[tokio::test]
    async fn test_error_level_reaches_both_channels() {
        let queue = WorkQueue::new(Arc::new(MemoryStore::new()));
        let fanout = Fanout::new(
            Relay::new(Arc::new(MemoryRelay::new(16))),
            queue.clone(),
            directory(),
        );
        let report = fanout.dispatch(&log(LogLevel::Fatal)).await;
        assert_eq!(report.jobs_enqueued, 2);
        assert_eq!(queue.len().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_relay_failure_is_a_warning() {
        let queue = WorkQueue::new(Arc::new(MemoryStore::new()));
        let fanout = Fanout::new(Relay::new(Arc::new(DownRelay)), queue.clone(), directory());

        let report = fanout.dispatch(&log(LogLevel::Error)).await;
        assert!(!report.published);
        assert_eq!(report.warnings.len(), 1);
        // Notification jobs are still enqueued.
        assert_eq!(report.jobs_enqueued, 2);
    }
}
