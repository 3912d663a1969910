//! Relay Context
//!
//! The one process-wide context object. Built once at startup and shared by
//! reference with every component, rather than living as ambient globals.

use crate::config::RelayConfig;
use crate::network::hub::BroadcastBridge;
use crate::state::store::GameStore;

/// Process-wide shared state: configuration, the guarded game store, and the
/// handoff bridge into the streaming hub.
#[derive(Debug)]
pub struct RelayContext {
    /// Runtime configuration.
    pub config: RelayConfig,
    /// Shared game state.
    pub store: GameStore,
    /// Handoff into the streaming hub's scheduler.
    pub bridge: BroadcastBridge,
}

impl RelayContext {
    /// Build the context from configuration. The bridge starts detached;
    /// spawning the hub attaches it.
    pub fn new(config: RelayConfig) -> Self {
        let store = GameStore::new(config.paddle_home_y);
        Self {
            config,
            store,
            bridge: BroadcastBridge::new(),
        }
    }
}
