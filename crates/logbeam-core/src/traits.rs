//! Core traits for logbeam abstractions.
//!
//! These traits define the shared-store and directory interfaces that
//! concrete backends must satisfy. Every operation is independently atomic;
//! no caller composes several of them into a transaction.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::Result;
use crate::models::Channel;

// =============================================================================
// SHARED STORE TRAITS
// =============================================================================

/// Window-scoped counters backing the rate limiter.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Atomically increment `key` and (re)set its expiry to `ttl`.
    ///
    /// Returns the counter value after the increment. Increment and expiry
    /// must be applied as one unit.
    async fn incr_with_expiry(&self, key: &str, ttl: Duration) -> Result<i64>;
}

/// Named FIFO lists backing the work queue.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Append `item` to the tail of `queue`.
    async fn push_back(&self, queue: &str, item: String) -> Result<()>;

    /// Remove and return the head of `queue`, waiting up to `timeout`.
    ///
    /// Returns `Ok(None)` when nothing arrived in time.
    async fn pop_front_blocking(&self, queue: &str, timeout: Duration) -> Result<Option<String>>;

    /// Approximate number of items in `queue`.
    async fn len(&self, queue: &str) -> Result<u64>;
}

/// A message received from a relay subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayMessage {
    pub topic: String,
    pub payload: String,
}

/// Live feed of relay messages. Dropping it ends the subscription.
pub type RelayStream = BoxStream<'static, Result<RelayMessage>>;

/// Topic-based publish/subscribe transport.
#[async_trait]
pub trait RelayTransport: Send + Sync {
    /// Publish `payload` on `topic`.
    async fn publish(&self, topic: &str, payload: String) -> Result<()>;

    /// Subscribe to exactly the listed topics.
    async fn subscribe(&self, topics: &[String]) -> Result<RelayStream>;

    /// Subscribe to every topic matching a glob `pattern` (e.g. `logs:*`).
    async fn psubscribe(&self, pattern: &str) -> Result<RelayStream>;
}

// =============================================================================
// CHANNEL DIRECTORY
// =============================================================================

/// Read access to configured notification channels.
///
/// Channel storage belongs to the host application; the engine only reads.
#[async_trait]
pub trait ChannelDirectory: Send + Sync {
    /// All channels configured for a project (active or not).
    async fn channels_for_project(&self, project_id: &str) -> Result<Vec<Channel>>;

    /// A single channel by id.
    async fn channel(&self, channel_id: &str) -> Result<Option<Channel>>;
}
