//! Connection Registry and Broadcast Bridge
//!
//! The registry of open streaming connections is owned by exactly one task,
//! the relay hub. Request handlers and streaming sessions never touch it
//! directly; they hand commands to the hub over a channel. That single-owner
//! scheme is what makes cross-transport fan-out safe: a broadcast scheduled
//! from an HTTP handler is executed on the hub task, in order, against a
//! registry no one else can be mutating.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::network::protocol::ServerMessage;

/// Identity of one streaming connection.
pub type ConnectionId = Uuid;

/// Commands executed by the hub task.
#[derive(Debug)]
pub enum HubCommand {
    /// A new streaming connection opened.
    Register {
        /// Connection identity.
        id: ConnectionId,
        /// Outbound queue feeding the connection's writer task.
        outbound: mpsc::Sender<Message>,
    },
    /// A streaming connection closed.
    Deregister {
        /// Connection identity.
        id: ConnectionId,
    },
    /// Deliver a message to every registered connection.
    Broadcast(ServerMessage),
}

/// The set of live streaming connections. Only the hub task holds one.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: BTreeMap<ConnectionId, mpsc::Sender<Message>>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a newly opened connection.
    pub fn add(&mut self, id: ConnectionId, outbound: mpsc::Sender<Message>) {
        self.connections.insert(id, outbound);
    }

    /// Stop tracking a connection. Returns whether it was present.
    pub fn remove(&mut self, id: &ConnectionId) -> bool {
        self.connections.remove(id).is_some()
    }

    /// Number of tracked connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether no connections are tracked.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Deliver a message to every connection, pruning any whose queue turns
    /// out to be dead. Returns the number of successful deliveries.
    ///
    /// The send outcome is the authoritative liveness signal; there is no
    /// separate heartbeat. A full queue counts as dead: the peer's writer has
    /// stopped draining it.
    pub fn broadcast(&mut self, message: &ServerMessage) -> usize {
        if self.connections.is_empty() {
            return 0;
        }

        let text = match message.to_json() {
            Ok(text) => text,
            Err(e) => {
                error!(error = %e, "failed to serialize broadcast message");
                return 0;
            }
        };

        // Iterate over a snapshot of ids so pruning cannot invalidate the walk.
        let ids: Vec<ConnectionId> = self.connections.keys().copied().collect();
        let mut delivered = 0;
        let mut stale = Vec::new();

        for id in ids {
            let Some(outbound) = self.connections.get(&id) else {
                continue;
            };
            match outbound.try_send(Message::Text(text.clone())) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(connection = %id, "send queue full, pruning connection");
                    stale.push(id);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    stale.push(id);
                }
            }
        }

        for id in stale {
            self.connections.remove(&id);
            debug!(connection = %id, remaining = self.connections.len(), "pruned dead connection");
        }

        delivered
    }
}

/// Handoff point from producer contexts into the hub task.
///
/// `schedule` is synchronous fire-and-forget: it enqueues the broadcast and
/// returns without waiting for delivery. Until the hub task has started the
/// sender is unset and scheduled messages are dropped.
#[derive(Debug, Default)]
pub struct BroadcastBridge {
    tx: OnceLock<mpsc::UnboundedSender<HubCommand>>,
}

impl BroadcastBridge {
    /// Create a bridge with no hub attached yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind the hub's command channel. Called once when the hub starts;
    /// later calls are ignored.
    pub(crate) fn attach(&self, tx: mpsc::UnboundedSender<HubCommand>) {
        let _ = self.tx.set(tx);
    }

    /// Whether a hub is attached.
    pub fn is_attached(&self) -> bool {
        self.tx.get().is_some()
    }

    /// Schedule a broadcast for execution on the hub task.
    pub fn schedule(&self, message: ServerMessage) {
        self.command(HubCommand::Broadcast(message));
    }

    /// Enqueue any hub command. Dropped with a debug log when the hub is not
    /// running.
    pub(crate) fn command(&self, command: HubCommand) {
        match self.tx.get() {
            Some(tx) => {
                if tx.send(command).is_err() {
                    debug!("relay hub stopped; dropping command");
                }
            }
            None => debug!("relay hub not running; dropping command"),
        }
    }
}

/// Spawn the hub task and attach its command channel to the bridge.
///
/// The returned handle keeps the task alive; the task exits when the bridge
/// (and every session holding a sender clone) is gone.
pub fn spawn_hub(bridge: &BroadcastBridge) -> JoinHandle<()> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    bridge.attach(tx);

    tokio::spawn(async move {
        let mut registry = ConnectionRegistry::new();
        while let Some(command) = rx.recv().await {
            match command {
                HubCommand::Register { id, outbound } => {
                    registry.add(id, outbound);
                    debug!(connection = %id, total = registry.len(), "connection registered");
                }
                HubCommand::Deregister { id } => {
                    if registry.remove(&id) {
                        debug!(connection = %id, total = registry.len(), "connection deregistered");
                    }
                }
                HubCommand::Broadcast(message) => {
                    let delivered = registry.broadcast(&message);
                    debug!(delivered, "broadcast fanned out");
                }
            }
        }
        debug!("relay hub stopped");
    })
}
