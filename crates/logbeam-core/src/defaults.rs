//! Centralized default constants for logbeam.
//!
//! **This module is the single source of truth** for shared default values.
//! Crates reference these constants instead of defining their own magic
//! numbers; every `from_env()` constructor falls back to them.

// =============================================================================
// SERVER
// =============================================================================

/// Default HTTP server port.
pub const SERVER_PORT: u16 = 3000;

/// Default bind address.
pub const SERVER_HOST: &str = "0.0.0.0";

// =============================================================================
// SHARED STORE
// =============================================================================

/// Default Redis connection URL.
pub const REDIS_URL: &str = "redis://localhost:6379";

/// Buffer of the in-process relay used when no shared store is configured.
pub const MEMORY_RELAY_CAPACITY: usize = 1024;

// =============================================================================
// REALTIME HUB
// =============================================================================

/// Outbound messages buffered per viewer before it is dropped as a slow consumer.
pub const HUB_OUTBOUND_BUFFER: usize = 64;

/// Pending hub commands (register/unregister/broadcast) before callers wait.
pub const HUB_COMMAND_BUFFER: usize = 1024;

/// Interval between transport-level pings to each viewer.
pub const WS_PING_INTERVAL_SECS: u64 = 30;

// =============================================================================
// DISTRIBUTION RELAY
// =============================================================================

/// Per-project relay topic prefix (`logs:<project_id>`).
pub const RELAY_TOPIC_PREFIX: &str = "logs:";

/// Pattern covering every project topic.
pub const RELAY_TOPIC_PATTERN: &str = "logs:*";

/// Pause before the relay bridge re-subscribes after its feed ends.
pub const RELAY_RESUBSCRIBE_BACKOFF_MS: u64 = 1_000;

// =============================================================================
// RATE LIMITING
// =============================================================================

/// Fixed window length for both named policies.
pub const RATE_LIMIT_WINDOW_SECS: u64 = 60;

/// Key prefix for per-channel dispatch limiting.
pub const RATE_LIMIT_CHANNEL_PREFIX: &str = "ratelimit:channel";

/// Key prefix for per-project API limiting.
pub const RATE_LIMIT_API_PREFIX: &str = "ratelimit:api";

/// Ingestion requests allowed per project per window.
pub const RATE_LIMIT_API_PER_MINUTE: u32 = 600;

/// Channel sends allowed per window when a channel does not configure one.
pub const RATE_LIMIT_CHANNEL_PER_MINUTE: u32 = 30;

// =============================================================================
// WORK QUEUE / DISPATCH
// =============================================================================

/// Name of the list holding serialized notification jobs.
pub const NOTIFICATION_QUEUE_KEY: &str = "notifications:queue";

/// Number of concurrent dispatcher workers.
pub const DISPATCH_WORKERS: usize = 2;

/// Maximum time a worker blocks in a single dequeue.
pub const DISPATCH_DEQUEUE_TIMEOUT_MS: u64 = 5_000;

/// Maximum time a single channel send may take.
pub const DISPATCH_SEND_TIMEOUT_SECS: u64 = 10;

/// Pause after a failed dequeue before the worker tries again.
pub const DISPATCH_ERROR_BACKOFF_MS: u64 = 1_000;

/// Capacity of the dispatcher event broadcast channel.
pub const EVENT_BUS_CAPACITY: usize = 256;
