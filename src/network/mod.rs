//! Network Layer
//!
//! Both transports live here: the streaming WebSocket server and the
//! request/response API, plus the hub that performs all fan-out.

pub mod api;
pub mod hub;
pub mod protocol;
pub mod server;

pub use hub::{BroadcastBridge, ConnectionId, ConnectionRegistry, HubCommand};
pub use protocol::ServerMessage;
pub use server::{RelayServer, RelayServerError};
