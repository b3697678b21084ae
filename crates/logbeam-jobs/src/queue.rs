//! Notification work queue.
//!
//! A single named FIFO list of JSON-encoded [`NotificationJob`]s. Enqueue is
//! independent of whether any worker is running. Dequeue removes the job
//! before it is processed: delivery is at most once.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::trace;

use logbeam_core::defaults::NOTIFICATION_QUEUE_KEY;
use logbeam_core::{Error, NotificationJob, QueueStore, Result};

#[derive(Clone)]
pub struct WorkQueue {
    store: Arc<dyn QueueStore>,
    key: String,
}

impl WorkQueue {
    /// Queue on the default key (`notifications:queue`).
    pub fn new(store: Arc<dyn QueueStore>) -> Self {
        Self {
            store,
            key: NOTIFICATION_QUEUE_KEY.to_string(),
        }
    }

    /// Queue on the key named by `NOTIFICATION_QUEUE_KEY`, if set.
    pub fn from_env(store: Arc<dyn QueueStore>) -> Self {
        let key = std::env::var("NOTIFICATION_QUEUE_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .unwrap_or_else(|| NOTIFICATION_QUEUE_KEY.to_string());
        Self::new(store).with_key(key)
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Append a job to the tail of the queue.
    pub async fn enqueue(&self, job: &NotificationJob) -> Result<()> {
        let body = serde_json::to_string(job)?;
        self.store.push_back(&self.key, body).await?;
        trace!(log_id = %job.log_id, channel_id = %job.channel_id, "Enqueued notification job");
        Ok(())
    }

    /// Pop the head of the queue, waiting up to `timeout`.
    ///
    /// `Ok(None)` means nothing arrived in time. A popped item that does not
    /// decode is gone from the queue and reported as an error.
    pub async fn dequeue(&self, timeout: Duration) -> Result<Option<NotificationJob>> {
        let Some(body) = self.store.pop_front_blocking(&self.key, timeout).await? else {
            return Ok(None);
        };
        serde_json::from_str(&body)
            .map(Some)
            .map_err(|e| Error::Queue(format!("undecodable job: {e}")))
    }

    /// Like [`dequeue`](Self::dequeue), returning `Ok(None)` as soon as
    /// `cancel` fires.
    pub async fn dequeue_until(
        &self,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Option<NotificationJob>> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Ok(None),
            job = self.dequeue(timeout) => job,
        }
    }

    /// Approximate queue depth.
    pub async fn len(&self) -> Result<u64> {
        self.store.len(&self.key).await
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }
}
