//! # Pong Relay Hub
//!
//! Real-time relay hub for a two-paddle ball game. Clients push game-state
//! snapshots over two independent transports and the hub fans the latest
//! state out to every streaming subscriber while also serving it on demand.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     PONG RELAY SERVER                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  state/          - Shared game state                         │
//! │  ├── snapshot.rs - Canonical ball record + normalizer        │
//! │  └── store.rs    - Coarse-locked state store                 │
//! │                                                              │
//! │  network/        - Transports and fan-out                    │
//! │  ├── protocol.rs - Streaming wire messages                   │
//! │  ├── hub.rs      - Connection registry + broadcast bridge    │
//! │  ├── server.rs   - WebSocket listener + sessions             │
//! │  └── api.rs      - HTTP request/response endpoints           │
//! │                                                              │
//! │  config.rs       - Bind addresses and game geometry          │
//! │  context.rs      - The one process-wide context object       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Concurrency model
//!
//! Two producer contexts mutate state: per-request HTTP handlers and the
//! per-connection streaming sessions. They share exactly one lock, the
//! [`state::store::GameStore`]'s, held only for bounded in-memory work.
//! The connection registry has a single owner, the hub task; producers reach
//! it only through the [`network::hub::BroadcastBridge`] command channel.
//! Dead peers are pruned by the outcome of delivery attempts, not by a
//! separate heartbeat.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod config;
pub mod context;
pub mod network;
pub mod state;

pub use config::RelayConfig;
pub use context::RelayContext;
pub use network::{BroadcastBridge, RelayServer, ServerMessage};
pub use state::snapshot::{normalize, BallSnapshot};
pub use state::store::{GameStore, PaddleAction, PaddleId, ScorePatch, Scores, StoreError};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
