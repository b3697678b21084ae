//! # logbeam-store
//!
//! Shared-store backends for the rate limiter, work queue, and distribution
//! relay. [`SharedStore`] bundles one implementation of each core trait so the
//! rest of the engine never names a concrete backend.
//!
//! ## Configuration
//!
//! Environment variables:
//! - `STORE_BACKEND`: `redis` (default) or `memory`
//! - `REDIS_URL`: Redis connection URL (default: redis://localhost:6379)

pub mod memory;
pub mod redis_backend;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use tracing::info;

use logbeam_core::{defaults, CounterStore, Error, QueueStore, RelayTransport, Result};

pub use memory::{MemoryRelay, MemoryStore};
pub use redis_backend::{RedisRelay, RedisStore};

/// Which shared store backs the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// Redis; required when more than one server process runs.
    Redis,
    /// Process-local; every component must live in the same process.
    Memory,
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreBackend::Redis => f.write_str("redis"),
            StoreBackend::Memory => f.write_str("memory"),
        }
    }
}

impl FromStr for StoreBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "redis" => Ok(StoreBackend::Redis),
            "memory" | "mem" => Ok(StoreBackend::Memory),
            other => Err(Error::Config(format!("unknown STORE_BACKEND: {other}"))),
        }
    }
}

/// Shared store connection settings.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub redis_url: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Redis,
            redis_url: defaults::REDIS_URL.to_string(),
        }
    }
}

impl StoreConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `STORE_BACKEND` | `redis` | `redis` or `memory` |
    /// | `REDIS_URL` | `redis://localhost:6379` | Redis connection URL |
    pub fn from_env() -> Result<Self> {
        let backend = match std::env::var("STORE_BACKEND") {
            Ok(v) => v.parse()?,
            Err(_) => StoreBackend::Redis,
        };
        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| defaults::REDIS_URL.to_string());
        Ok(Self { backend, redis_url })
    }

    /// Select the backend.
    pub fn with_backend(mut self, backend: StoreBackend) -> Self {
        self.backend = backend;
        self
    }
}

/// One handle per shared-store concern.
#[derive(Clone)]
pub struct SharedStore {
    /// Window counters for the rate limiter.
    pub counters: Arc<dyn CounterStore>,
    /// FIFO lists for the work queue.
    pub queue: Arc<dyn QueueStore>,
    /// Publish/subscribe for the distribution relay.
    pub relay: Arc<dyn RelayTransport>,
    backend: StoreBackend,
}

impl SharedStore {
    /// Connect the configured backend.
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        match config.backend {
            StoreBackend::Redis => {
                let store = Arc::new(RedisStore::connect(&config.redis_url).await?);
                let relay = Arc::new(RedisRelay::connect(&config.redis_url).await?);
                Ok(Self {
                    counters: store.clone(),
                    queue: store,
                    relay,
                    backend: StoreBackend::Redis,
                })
            }
            StoreBackend::Memory => {
                info!("Using in-process store; real-time fan-out is limited to this process");
                Ok(Self::in_memory())
            }
        }
    }

    /// A fresh process-local store.
    pub fn in_memory() -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            counters: store.clone(),
            queue: store,
            relay: Arc::new(MemoryRelay::new(defaults::MEMORY_RELAY_CAPACITY)),
            backend: StoreBackend::Memory,
        }
    }

    pub fn backend(&self) -> StoreBackend {
        self.backend
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_parse() {
        assert_eq!("redis".parse::<StoreBackend>().unwrap(), StoreBackend::Redis);
        assert_eq!("Memory".parse::<StoreBackend>().unwrap(), StoreBackend::Memory);
        assert!("etcd".parse::<StoreBackend>().is_err());
    }

    #[test]
    fn test_config_default() {
        let config = StoreConfig::default();
        assert_eq!(config.backend, StoreBackend::Redis);
        assert_eq!(config.redis_url, "redis://localhost:6379");
    }

    #[tokio::test]
    async fn test_connect_memory_backend() {
        let config = StoreConfig::default().with_backend(StoreBackend::Memory);
        let store = SharedStore::connect(&config).await.unwrap();
        assert_eq!(store.backend(), StoreBackend::Memory);
        assert_eq!(store.queue.len("anything").await.unwrap(), 0);
    }
}
