use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

use logbeam_core::ChannelDirectory;
use logbeam_jobs::{Fanout, RateLimitConfig, RateLimiter, WorkQueue};
use logbeam_realtime::{HubHandle, Relay};
use logbeam_store::{SharedStore, StoreBackend};

/// Shared state handed to every request handler.
#[derive(Clone)]
pub struct AppState {
    /// This process's viewer hub.
    pub hub: HubHandle,
    /// Relay publish plus notification enqueue for ingested logs.
    pub fanout: Fanout,
    /// Ingestion and channel rate limiter.
    pub limiter: RateLimiter,
    /// Notification work queue (for depth reporting and the dispatcher).
    pub queue: WorkQueue,
    pub store_backend: StoreBackend,
    /// WebSocket sessions currently registered with the hub.
    pub ws_connections: Arc<AtomicUsize>,
}

impl AppState {
    pub fn new(
        store: &SharedStore,
        hub: HubHandle,
        directory: Arc<dyn ChannelDirectory>,
        rate_limits: RateLimitConfig,
    ) -> Self {
        let queue = WorkQueue::from_env(store.queue.clone());
        let relay = Relay::new(store.relay.clone());
        Self {
            hub,
            fanout: Fanout::new(relay, queue.clone(), directory),
            limiter: RateLimiter::new(store.counters.clone(), rate_limits),
            queue,
            store_backend: store.backend(),
            ws_connections: Arc::new(AtomicUsize::new(0)),
        }
    }
}
