//! WebSocket Relay Server
//!
//! Streaming transport: accepts long-lived bidirectional connections,
//! registers each with the relay hub, persists inbound checkpoints, and acks
//! every decoded message. A session that closes or errors deregisters itself
//! on the way out, whatever the exit path.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::context::RelayContext;
use crate::network::hub::HubCommand;
use crate::network::protocol::{self, ServerMessage};
use crate::state::snapshot::{normalize, now_ms};

/// Streaming transport errors.
#[derive(Debug, thiserror::Error)]
pub enum RelayServerError {
    /// Failed to bind the streaming listener.
    #[error("failed to bind streaming listener: {0}")]
    BindFailed(#[from] std::io::Error),
}

/// The streaming-transport server.
pub struct RelayServer {
    ctx: Arc<RelayContext>,
    active: Arc<AtomicUsize>,
    bound: OnceLock<SocketAddr>,
    shutdown_tx: broadcast::Sender<()>,
}

impl RelayServer {
    /// Create a server over the shared context.
    pub fn new(ctx: Arc<RelayContext>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            ctx,
            active: Arc::new(AtomicUsize::new(0)),
            bound: OnceLock::new(),
            shutdown_tx,
        }
    }

    /// Accept connections until shutdown.
    pub async fn run(&self) -> Result<(), RelayServerError> {
        let listener = TcpListener::bind(self.ctx.config.ws_addr).await?;
        let addr = listener.local_addr()?;
        let _ = self.bound.set(addr);
        info!("streaming listener on {addr}");

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            if self.active.load(Ordering::Relaxed) >= self.ctx.config.max_connections {
                                warn!(%addr, "connection limit reached, rejecting");
                                continue;
                            }
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => error!(error = %e, "accept failed"),
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("streaming listener shutting down");
                    break;
                }
            }
        }
        Ok(())
    }

    /// Signal the accept loop to stop.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Current number of open streaming connections.
    pub fn connection_count(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    /// Address the listener actually bound, once [`run`](Self::run) has
    /// started. Useful when binding port 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.bound.get().copied()
    }

    /// Spawn the session task for a newly accepted connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let ctx = self.ctx.clone();
        let active = self.active.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        active.fetch_add(1, Ordering::Relaxed);
        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    error!(%addr, error = %e, "websocket handshake failed");
                    active.fetch_sub(1, Ordering::Relaxed);
                    return;
                }
            };

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (out_tx, mut out_rx) = mpsc::channel::<Message>(ctx.config.send_queue_depth);
            let id = Uuid::new_v4();

            // The registry add/remove pair runs on the hub task; this session
            // never touches the registry directly.
            ctx.bridge.command(HubCommand::Register {
                id,
                outbound: out_tx.clone(),
            });
            info!(connection = %id, %addr, "streaming client connected");

            let writer = tokio::spawn(async move {
                while let Some(msg) = out_rx.recv().await {
                    if ws_sender.send(msg).await.is_err() {
                        break;
                    }
                }
            });

            let mut checkpoints_stored = 0usize;
            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                if handle_text(&ctx, &text, &out_tx).is_some() {
                                    checkpoints_stored += 1;
                                }
                            }
                            Some(Ok(Message::Ping(data))) => {
                                let _ = out_tx.try_send(Message::Pong(data));
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                debug!(connection = %id, "client closed connection");
                                break;
                            }
                            Some(Err(e)) => {
                                debug!(connection = %id, error = %e, "read error, closing session");
                                break;
                            }
                            _ => {}
                        }
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }

            // Scoped cleanup: every exit path above lands here.
            writer.abort();
            ctx.bridge.command(HubCommand::Deregister { id });
            active.fetch_sub(1, Ordering::Relaxed);
            info!(
                connection = %id,
                %addr,
                checkpoints = checkpoints_stored,
                "streaming client disconnected"
            );
        });
    }
}

/// Process one inbound text frame: decode, persist when it is a checkpoint,
/// and ack best-effort. Returns the new history total when a checkpoint was
/// stored.
///
/// Decode failures drop the message and keep the session open; no error
/// frame is sent back.
fn handle_text(
    ctx: &RelayContext,
    text: &str,
    ack_tx: &mpsc::Sender<Message>,
) -> Option<usize> {
    let payload: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => {
            debug!(error = %e, "dropping undecodable message");
            return None;
        }
    };

    let stored = if protocol::is_checkpoint(&payload) {
        let snapshot = normalize(&payload);
        let (total, _) = ctx.store.record_checkpoint(snapshot, None);
        debug!(total, "checkpoint stored from stream");
        Some(total)
    } else {
        None
    };

    let ack = ServerMessage::ServerAck {
        received_type: protocol::message_type(&payload),
        ts: now_ms(),
    };
    if let Ok(text) = ack.to_json() {
        // Ack only lands if the connection is still open; failure is not an
        // error, the send outcome is the liveness check.
        let _ = ack_tx.try_send(Message::Text(text));
    }

    stored
}
