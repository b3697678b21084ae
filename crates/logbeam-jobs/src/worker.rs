//! Notification dispatcher.
//!
//! Workers drain the [`WorkQueue`]. For each job the worker resolves the
//! channel, checks the channel's rate limit, and calls the sender registered
//! for the channel kind. A failing job never stops a worker.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use logbeam_core::defaults::{
    DISPATCH_DEQUEUE_TIMEOUT_MS, DISPATCH_ERROR_BACKOFF_MS, DISPATCH_SEND_TIMEOUT_SECS,
    DISPATCH_WORKERS, EVENT_BUS_CAPACITY,
};
use logbeam_core::{ChannelDirectory, NotificationJob};

use crate::queue::WorkQueue;
use crate::ratelimit::RateLimiter;
use crate::sender::ChannelSender;

/// Configuration for the dispatcher.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Whether to run any workers at all.
    pub enabled: bool,
    /// Number of concurrent worker loops.
    pub workers: usize,
    /// Longest a worker blocks in one dequeue before re-checking shutdown.
    pub dequeue_timeout: Duration,
    /// Longest a single channel send may take.
    pub send_timeout: Duration,
    /// Pause after a failed dequeue.
    pub error_backoff: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            workers: DISPATCH_WORKERS,
            dequeue_timeout: Duration::from_millis(DISPATCH_DEQUEUE_TIMEOUT_MS),
            send_timeout: Duration::from_secs(DISPATCH_SEND_TIMEOUT_SECS),
            error_backoff: Duration::from_millis(DISPATCH_ERROR_BACKOFF_MS),
        }
    }
}

impl DispatcherConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `DISPATCH_ENABLED` | `true` | Enable/disable notification dispatch |
    /// | `DISPATCH_WORKERS` | `2` | Concurrent worker loops |
    /// | `DISPATCH_DEQUEUE_TIMEOUT_MS` | `5000` | Max block per dequeue |
    /// | `DISPATCH_SEND_TIMEOUT_SECS` | `10` | Max time per channel send |
    pub fn from_env() -> Self {
        let enabled = std::env::var("DISPATCH_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        let workers = std::env::var("DISPATCH_WORKERS")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(DISPATCH_WORKERS)
            .max(1);

        let dequeue_timeout_ms = std::env::var("DISPATCH_DEQUEUE_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DISPATCH_DEQUEUE_TIMEOUT_MS);

        let send_timeout_secs = std::env::var("DISPATCH_SEND_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DISPATCH_SEND_TIMEOUT_SECS);

        Self {
            enabled,
            workers,
            dequeue_timeout: Duration::from_millis(dequeue_timeout_ms),
            send_timeout: Duration::from_secs(send_timeout_secs),
            ..Self::default()
        }
    }

    /// Set the number of worker loops.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Set the per-dequeue block time.
    pub fn with_dequeue_timeout(mut self, timeout: Duration) -> Self {
        self.dequeue_timeout = timeout;
        self
    }

    /// Set the per-send time limit.
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Set the pause after a failed dequeue.
    pub fn with_error_backoff(mut self, backoff: Duration) -> Self {
        self.error_backoff = backoff;
        self
    }

    /// Enable or disable dispatch.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Why a job was dropped without a send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    ChannelNotFound,
    ChannelInactive,
    RateLimited,
    NoSender(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::ChannelNotFound => f.write_str("channel not found"),
            SkipReason::ChannelInactive => f.write_str("channel inactive"),
            SkipReason::RateLimited => f.write_str("rate limited"),
            SkipReason::NoSender(kind) => write!(f, "no sender for kind {kind}"),
        }
    }
}

/// Result of processing one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Delivered,
    Skipped(SkipReason),
    Failed(String),
}

/// Event emitted by the dispatcher.
#[derive(Debug, Clone)]
pub enum DispatcherEvent {
    /// A worker loop started.
    WorkerStarted { worker: usize },
    /// A job was sent to its channel.
    JobDelivered { log_id: Uuid, channel_id: String },
    /// A job was dropped without a send.
    JobSkipped {
        log_id: Uuid,
        channel_id: String,
        reason: SkipReason,
    },
    /// The channel send failed or timed out.
    JobFailed {
        log_id: Uuid,
        channel_id: String,
        error: String,
    },
    /// A worker loop stopped.
    WorkerStopped { worker: usize },
}

/// Handle for controlling running dispatcher workers.
pub struct DispatcherHandle {
    cancel: CancellationToken,
    workers: Vec<JoinHandle<()>>,
    event_rx: broadcast::Receiver<DispatcherEvent>,
}

impl DispatcherHandle {
    /// Stop every worker and wait for in-flight jobs to finish.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for worker in self.workers {
            if let Err(e) = worker.await {
                error!(error = %e, "Dispatcher worker panicked");
            }
        }
    }

    /// Get a receiver for dispatcher events.
    pub fn events(&self) -> broadcast::Receiver<DispatcherEvent> {
        self.event_rx.resubscribe()
    }

    /// Number of worker loops started.
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }
}

/// Drains the notification queue into channel senders.
pub struct Dispatcher {
    queue: WorkQueue,
    limiter: RateLimiter,
    directory: Arc<dyn ChannelDirectory>,
    config: DispatcherConfig,
    senders: Arc<RwLock<HashMap<String, Arc<dyn ChannelSender>>>>,
    event_tx: broadcast::Sender<DispatcherEvent>,
}

impl Dispatcher {
    /// Create a new dispatcher with no senders registered.
    pub fn new(
        queue: WorkQueue,
        limiter: RateLimiter,
        directory: Arc<dyn ChannelDirectory>,
        config: DispatcherConfig,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        Self {
            queue,
            limiter,
            directory,
            config,
            senders: Arc::new(RwLock::new(HashMap::new())),
            event_tx,
        }
    }

    /// Register a sender for its channel kind, replacing any previous one.
    pub async fn register_sender<S: ChannelSender + 'static>(&self, sender: S) {
        let kind = sender.kind().to_string();
        let mut senders = self.senders.write().await;
        senders.insert(kind.clone(), Arc::new(sender));
        debug!(kind = %kind, "Registered channel sender");
    }

    /// Get a receiver for dispatcher events.
    pub fn events(&self) -> broadcast::Receiver<DispatcherEvent> {
        self.event_tx.subscribe()
    }

    /// Spawn the worker loops. They stop when `cancel` fires or the handle
    /// is shut down.
    pub fn start(self, cancel: CancellationToken) -> DispatcherHandle {
        let event_rx = self.event_tx.subscribe();

        if !self.config.enabled {
            info!("Notification dispatch disabled");
            return DispatcherHandle {
                cancel,
                workers: Vec::new(),
                event_rx,
            };
        }

        info!(
            workers = self.config.workers,
            queue = self.queue.key(),
            "Starting notification dispatcher"
        );

        let dispatcher = Arc::new(self);
        let workers = (0..dispatcher.config.workers)
            .map(|worker| {
                let dispatcher = dispatcher.clone();
                let cancel = cancel.child_token();
                tokio::spawn(async move { dispatcher.run(worker, cancel).await })
            })
            .collect();

        DispatcherHandle {
            cancel,
            workers,
            event_rx,
        }
    }

    #[instrument(skip(self, cancel))]
    async fn run(&self, worker: usize, cancel: CancellationToken) {
        let _ = self.event_tx.send(DispatcherEvent::WorkerStarted { worker });
        debug!("Dispatcher worker started");

        while !cancel.is_cancelled() {
            match self
                .queue
                .dequeue_until(self.config.dequeue_timeout, &cancel)
                .await
            {
                Ok(Some(job)) => {
                    self.process(job).await;
                }
                Ok(None) => {}
                Err(e) => {
                    error!(error = %e, "Dequeue failed");
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(self.config.error_backoff) => {}
                    }
                }
            }
        }

        let _ = self.event_tx.send(DispatcherEvent::WorkerStopped { worker });
        debug!("Dispatcher worker stopped");
    }

    /// Deliver one job, emitting the matching [`DispatcherEvent`].
    #[instrument(skip(self, job), fields(log_id = %job.log_id, channel_id = %job.channel_id))]
    pub async fn process(&self, job: NotificationJob) -> DispatchOutcome {
        let outcome = self.deliver(&job).await;

        let event = match &outcome {
            DispatchOutcome::Delivered => {
                debug!("Notification delivered");
                DispatcherEvent::JobDelivered {
                    log_id: job.log_id,
                    channel_id: job.channel_id,
                }
            }
            DispatchOutcome::Skipped(reason) => {
                debug!(%reason, "Notification skipped");
                DispatcherEvent::JobSkipped {
                    log_id: job.log_id,
                    channel_id: job.channel_id,
                    reason: reason.clone(),
                }
            }
            DispatchOutcome::Failed(error) => {
                warn!(error = %error, "Notification send failed");
                DispatcherEvent::JobFailed {
                    log_id: job.log_id,
                    channel_id: job.channel_id,
                    error: error.clone(),
                }
            }
        };
        let _ = self.event_tx.send(event);
        outcome
    }

    async fn deliver(&self, job: &NotificationJob) -> DispatchOutcome {
        let channel = match self.directory.channel(&job.channel_id).await {
            Ok(Some(channel)) => channel,
            Ok(None) => return DispatchOutcome::Skipped(SkipReason::ChannelNotFound),
            Err(e) => return DispatchOutcome::Failed(format!("channel lookup failed: {e}")),
        };
        if !channel.active {
            return DispatchOutcome::Skipped(SkipReason::ChannelInactive);
        }

        let decision = self
            .limiter
            .allow_channel(&channel.id, channel.rate_limit_per_minute)
            .await;
        if !decision.allowed {
            return DispatchOutcome::Skipped(SkipReason::RateLimited);
        }

        let sender = self.senders.read().await.get(&channel.kind).cloned();
        let Some(sender) = sender else {
            return DispatchOutcome::Skipped(SkipReason::NoSender(channel.kind.clone()));
        };

        match tokio::time::timeout(self.config.send_timeout, sender.send(&channel, job)).await {
            Ok(Ok(())) => DispatchOutcome::Delivered,
            Ok(Err(e)) => DispatchOutcome::Failed(e.to_string()),
            Err(_) => DispatchOutcome::Failed(format!(
                "send timed out after {}s",
                self.config.send_timeout.as_secs_f64()
            )),
        }
    }
}

/// Builder for creating a dispatcher with senders pre-registered.
pub struct DispatcherBuilder {
    queue: WorkQueue,
    limiter: RateLimiter,
    directory: Arc<dyn ChannelDirectory>,
    config: DispatcherConfig,
    senders: Vec<Arc<dyn ChannelSender>>,
}

impl DispatcherBuilder {
    pub fn new(
        queue: WorkQueue,
        limiter: RateLimiter,
        directory: Arc<dyn ChannelDirectory>,
    ) -> Self {
        Self {
            queue,
            limiter,
            directory,
            config: DispatcherConfig::default(),
            senders: Vec::new(),
        }
    }

    /// Set the dispatcher configuration.
    pub fn with_config(mut self, config: DispatcherConfig) -> Self {
        self.config = config;
        self
    }

    /// Add a channel sender.
    pub fn with_sender<S: ChannelSender + 'static>(mut self, sender: S) -> Self {
        self.senders.push(Arc::new(sender));
        self
    }

    /// Build the dispatcher.
    pub fn build(self) -> Dispatcher {
        let senders: HashMap<String, Arc<dyn ChannelSender>> = self
            .senders
            .into_iter()
            .map(|s| (s.kind().to_string(), s))
            .collect();

        let mut dispatcher = Dispatcher::new(self.queue, self.limiter, self.directory, self.config);
        dispatcher.senders = Arc::new(RwLock::new(senders));
        dispatcher
    }
}
