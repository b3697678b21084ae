//! In-process shared store.
//!
//! Same contracts as the Redis backend, scoped to a single process. Used for
//! single-instance deployments (`STORE_BACKEND=memory`) and throughout the
//! test suites.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures::{future, StreamExt};
use tokio::sync::{broadcast, Notify};
use tokio::time::Instant;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::warn;

use logbeam_core::{
    CounterStore, Error, QueueStore, RelayMessage, RelayStream, RelayTransport, Result,
};

/// Expired counters are swept once the map grows past this many keys.
const COUNTER_SWEEP_THRESHOLD: usize = 4096;

struct Counter {
    value: i64,
    expires_at: Instant,
}

/// Counter and queue store held in process memory.
#[derive(Default)]
pub struct MemoryStore {
    counters: Mutex<HashMap<String, Counter>>,
    lists: Mutex<HashMap<String, VecDeque<String>>>,
    pushed: Notify,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn try_pop(&self, queue: &str) -> Result<Option<String>> {
        let mut lists = self
            .lists
            .lock()
            .map_err(|_| Error::Internal("queue lock poisoned".to_string()))?;
        Ok(lists.get_mut(queue).and_then(VecDeque::pop_front))
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn incr_with_expiry(&self, key: &str, ttl: Duration) -> Result<i64> {
        let now = Instant::now();
        let mut counters = self
            .counters
            .lock()
            .map_err(|_| Error::Internal("counter lock poisoned".to_string()))?;

        if counters.len() > COUNTER_SWEEP_THRESHOLD {
            counters.retain(|_, c| c.expires_at > now);
        }

        let counter = counters.entry(key.to_string()).or_insert(Counter {
            value: 0,
            expires_at: now,
        });
        if counter.expires_at <= now {
            counter.value = 0;
        }
        counter.value += 1;
        counter.expires_at = now + ttl;
        Ok(counter.value)
    }
}

#[async_trait]
impl QueueStore for MemoryStore {
    async fn push_back(&self, queue: &str, item: String) -> Result<()> {
        {
            let mut lists = self
                .lists
                .lock()
                .map_err(|_| Error::Internal("queue lock poisoned".to_string()))?;
            lists.entry(queue.to_string()).or_default().push_back(item);
        }
        self.pushed.notify_waiters();
        Ok(())
    }

    async fn pop_front_blocking(&self, queue: &str, timeout: Duration) -> Result<Option<String>> {
        let deadline = Instant::now() + timeout;
        loop {
            // Arm the notification before checking so a push in between is not missed.
            let notified = self.pushed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(item) = self.try_pop(queue)? {
                return Ok(Some(item));
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn len(&self, queue: &str) -> Result<u64> {
        let lists = self
            .lists
            .lock()
            .map_err(|_| Error::Internal("queue lock poisoned".to_string()))?;
        Ok(lists.get(queue).map_or(0, |l| l.len() as u64))
    }
}

/// Publish/subscribe transport over a tokio broadcast channel.
///
/// Subscribers that fall behind by more than the channel capacity skip the
/// missed messages, mirroring Redis pub/sub's fire-and-forget delivery.
pub struct MemoryRelay {
    tx: broadcast::Sender<RelayMessage>,
}

impl MemoryRelay {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    fn filtered<F>(&self, keep: F) -> RelayStream
    where
        F: Fn(&str) -> bool + Send + 'static,
    {
        BroadcastStream::new(self.tx.subscribe())
            .filter_map(move |item| {
                future::ready(match item {
                    Ok(msg) if keep(&msg.topic) => Some(Ok(msg)),
                    Ok(_) => None,
                    Err(BroadcastStreamRecvError::Lagged(missed)) => {
                        warn!(missed, "Memory relay subscriber lagged");
                        None
                    }
                })
            })
            .boxed()
    }
}

#[async_trait]
impl RelayTransport for MemoryRelay {
    async fn publish(&self, topic: &str, payload: String) -> Result<()> {
        // No subscribers is not an error, same as PUBLISH returning 0.
        let _ = self.tx.send(RelayMessage {
            topic: topic.to_string(),
            payload,
        });
        Ok(())
    }

    async fn subscribe(&self, topics: &[String]) -> Result<RelayStream> {
        if topics.is_empty() {
            return Err(Error::InvalidInput(
                "subscribe requires at least one topic".to_string(),
            ));
        }
        let topics: HashSet<String> = topics.iter().cloned().collect();
        Ok(self.filtered(move |topic| topics.contains(topic)))
    }

    async fn psubscribe(&self, pattern: &str) -> Result<RelayStream> {
        let pattern = pattern.to_string();
        Ok(self.filtered(move |topic| glob_matches(&pattern, topic)))
    }
}

/// Match `topic` against a pattern whose only wildcard is a trailing `*`.
fn glob_matches(pattern: &str, topic: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => topic.starts_with(prefix),
        None => pattern == topic,
    }
}
