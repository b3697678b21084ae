//! Per-process registry of live viewer connections.
//!
//! The hub is a single coordinator task that owns every registered
//! [`Connection`]. Callers talk to it through a cloneable [`HubHandle`]; all
//! register, unregister and broadcast commands are applied one at a time in
//! the order the coordinator receives them.
//!
//! Writes to viewers never block the coordinator. Each connection has a
//! bounded outbox drained by its own writer task; a closed or full outbox is
//! a failed write and the connection is removed once the current pass ends.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use logbeam_core::defaults::{HUB_COMMAND_BUFFER, HUB_OUTBOUND_BUFFER};
use logbeam_core::{DistributionEvent, Error, Result, ViewerEnvelope};

/// Identifier assigned to each viewer connection.
pub type ConnectionId = u64;

/// One serialized message queued for a viewer.
pub type Frame = Arc<str>;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Hub settings.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Frames buffered per viewer before it counts as a slow consumer.
    pub outbound_buffer: usize,
    /// Commands buffered before callers wait on the coordinator.
    pub command_buffer: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            outbound_buffer: HUB_OUTBOUND_BUFFER,
            command_buffer: HUB_COMMAND_BUFFER,
        }
    }
}

impl HubConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `HUB_OUTBOUND_BUFFER` | `64` | Frames queued per viewer |
    pub fn from_env() -> Self {
        let outbound_buffer = std::env::var("HUB_OUTBOUND_BUFFER")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(HUB_OUTBOUND_BUFFER)
            .max(1);

        Self {
            outbound_buffer,
            ..Self::default()
        }
    }

    /// Set the per-viewer outbox size.
    pub fn with_outbound_buffer(mut self, size: usize) -> Self {
        self.outbound_buffer = size.max(1);
        self
    }
}

/// A live viewer as seen by the hub.
///
/// Holds the sending half of the viewer's outbox. Once the hub drops it the
/// writer task sees the outbox close and shuts the socket.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    subject_id: String,
    project_id: Option<String>,
    outbox: mpsc::Sender<Frame>,
}

impl Connection {
    /// Create a connection and the receiving half of its outbox.
    ///
    /// An empty `project_id` is treated as "all projects".
    pub fn new(
        subject_id: impl Into<String>,
        project_id: Option<String>,
        outbound_buffer: usize,
    ) -> (Self, mpsc::Receiver<Frame>) {
        let (outbox, rx) = mpsc::channel(outbound_buffer.max(1));
        let conn = Self {
            id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            subject_id: subject_id.into(),
            project_id: project_id.filter(|p| !p.is_empty()),
            outbox,
        };
        (conn, rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }

    pub fn project_id(&self) -> Option<&str> {
        self.project_id.as_deref()
    }

    fn wants(&self, project_id: &str) -> bool {
        self.project_id.as_deref().map_or(true, |p| p == project_id)
    }

    /// Queue a frame without waiting. False means the write failed.
    fn deliver(&self, frame: Frame) -> bool {
        self.outbox.try_send(frame).is_ok()
    }
}

enum HubCommand {
    Register {
        conn: Connection,
        greeting: Option<ViewerEnvelope>,
        reply: oneshot::Sender<ConnectionId>,
    },
    Unregister(ConnectionId),
    Broadcast(DistributionEvent),
    SendTo {
        id: ConnectionId,
        envelope: ViewerEnvelope,
    },
    Count(oneshot::Sender<usize>),
    Subjects(oneshot::Sender<Vec<String>>),
}

/// Cloneable handle to a running hub.
#[derive(Clone)]
pub struct HubHandle {
    tx: mpsc::Sender<HubCommand>,
    cancel: CancellationToken,
    outbound_buffer: usize,
}

impl HubHandle {
    /// Create a connection sized for this hub.
    pub fn connection(
        &self,
        subject_id: impl Into<String>,
        project_id: Option<String>,
    ) -> (Connection, mpsc::Receiver<Frame>) {
        Connection::new(subject_id, project_id, self.outbound_buffer)
    }

    /// Add a connection to the registry.
    ///
    /// Fails once the hub is shutting down; the caller must then close the
    /// viewer's transport itself.
    pub async fn register(&self, conn: Connection) -> Result<ConnectionId> {
        self.register_inner(conn, None).await
    }

    /// Add a connection and queue `greeting` as its first frame.
    ///
    /// Both happen in one coordinator turn, so any broadcast the viewer
    /// receives is ordered after the greeting.
    pub async fn register_with_greeting(
        &self,
        conn: Connection,
        greeting: ViewerEnvelope,
    ) -> Result<ConnectionId> {
        self.register_inner(conn, Some(greeting)).await
    }

    async fn register_inner(
        &self,
        conn: Connection,
        greeting: Option<ViewerEnvelope>,
    ) -> Result<ConnectionId> {
        if self.cancel.is_cancelled() {
            return Err(Error::Hub("hub is shutting down".to_string()));
        }
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::Register {
            conn,
            greeting,
            reply,
        })
        .await?;
        rx.await
            .map_err(|_| Error::Hub("hub is shutting down".to_string()))
    }

    /// Remove a connection and close its outbox. Unknown ids are ignored.
    pub async fn unregister(&self, id: ConnectionId) {
        // A stopped hub has already dropped every connection.
        let _ = self.tx.send(HubCommand::Unregister(id)).await;
    }

    /// Deliver an event to every connection whose filter admits it.
    pub async fn broadcast(&self, event: DistributionEvent) -> Result<()> {
        self.send(HubCommand::Broadcast(event)).await
    }

    /// Deliver an envelope to one connection.
    pub async fn send_to(&self, id: ConnectionId, envelope: ViewerEnvelope) -> Result<()> {
        self.send(HubCommand::SendTo { id, envelope }).await
    }

    /// Number of registered connections.
    pub async fn count(&self) -> Result<usize> {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::Count(reply)).await?;
        rx.await.map_err(|_| Error::Hub("hub stopped".to_string()))
    }

    /// Distinct subject ids with at least one registered connection, sorted.
    pub async fn connected_subjects(&self) -> Result<Vec<String>> {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::Subjects(reply)).await?;
        rx.await.map_err(|_| Error::Hub("hub stopped".to_string()))
    }

    /// Stop accepting registrations and close every connection.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.cancel.is_cancelled()
    }

    async fn send(&self, cmd: HubCommand) -> Result<()> {
        self.tx
            .send(cmd)
            .await
            .map_err(|_| Error::Hub("hub stopped".to_string()))
    }
}

/// The coordinator. Owns the connection registry.
pub struct Hub {
    connections: HashMap<ConnectionId, Connection>,
    rx: mpsc::Receiver<HubCommand>,
    cancel: CancellationToken,
}

impl Hub {
    /// Spawn the coordinator and return a handle to it.
    ///
    /// The hub stops when `cancel` (or [`HubHandle::shutdown`]) fires.
    pub fn start(config: HubConfig, cancel: CancellationToken) -> HubHandle {
        let (tx, rx) = mpsc::channel(config.command_buffer.max(1));
        let hub = Hub {
            connections: HashMap::new(),
            rx,
            cancel: cancel.clone(),
        };
        tokio::spawn(hub.run());

        HubHandle {
            tx,
            cancel,
            outbound_buffer: config.outbound_buffer,
        }
    }

    async fn run(mut self) {
        info!("Realtime hub started");
        loop {
            // Cancellation is only observed between commands, never mid-pass.
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                cmd = self.rx.recv() => match cmd {
                    Some(cmd) => self.handle(cmd),
                    None => break,
                },
            }
        }

        self.rx.close();
        let closed = self.connections.len();
        self.connections.clear();
        info!(connections = closed, "Realtime hub stopped");
    }

    fn handle(&mut self, cmd: HubCommand) {
        match cmd {
            HubCommand::Register {
                conn,
                greeting,
                reply,
            } => {
                let id = conn.id;
                debug!(
                    connection_id = id,
                    subject_id = %conn.subject_id,
                    project_id = conn.project_id.as_deref().unwrap_or("*"),
                    "Viewer registered"
                );
                self.connections.insert(id, conn);
                if let Some(greeting) = greeting {
                    self.send_to(id, &greeting);
                }
                if reply.send(id).is_err() {
                    // Registrant went away before hearing back.
                    self.connections.remove(&id);
                }
            }
            HubCommand::Unregister(id) => {
                if self.connections.remove(&id).is_some() {
                    debug!(connection_id = id, "Viewer unregistered");
                }
            }
            HubCommand::Broadcast(event) => self.broadcast(&event),
            HubCommand::SendTo { id, envelope } => self.send_to(id, &envelope),
            HubCommand::Count(reply) => {
                let _ = reply.send(self.connections.len());
            }
            HubCommand::Subjects(reply) => {
                let subjects: BTreeSet<&str> = self
                    .connections
                    .values()
                    .map(|c| c.subject_id.as_str())
                    .collect();
                let _ = reply.send(subjects.into_iter().map(String::from).collect());
            }
        }
    }

    fn broadcast(&mut self, event: &DistributionEvent) {
        let frame: Frame = match serde_json::to_string(&ViewerEnvelope::from(event)) {
            Ok(json) => json.into(),
            Err(e) => {
                warn!(project_id = %event.project_id, error = %e, "Dropping unserializable event");
                return;
            }
        };

        let mut failed = Vec::new();
        for conn in self.connections.values() {
            if conn.wants(&event.project_id) && !conn.deliver(frame.clone()) {
                failed.push(conn.id);
            }
        }

        for id in failed {
            if let Some(conn) = self.connections.remove(&id) {
                debug!(
                    connection_id = id,
                    subject_id = %conn.subject_id,
                    "Dropping viewer after failed write"
                );
            }
        }
    }

    fn send_to(&mut self, id: ConnectionId, envelope: &ViewerEnvelope) {
        let Some(conn) = self.connections.get(&id) else {
            return;
        };
        let frame: Frame = match serde_json::to_string(envelope) {
            Ok(json) => json.into(),
            Err(e) => {
                warn!(connection_id = id, error = %e, "Dropping unserializable envelope");
                return;
            }
        };
        if !conn.deliver(frame) {
            self.connections.remove(&id);
            debug!(connection_id = id, "Dropping viewer after failed write");
        }
    }
}
