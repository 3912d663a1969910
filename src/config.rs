//! Relay Configuration
//!
//! Compiled defaults with environment-variable overrides for the two bind
//! addresses. Everything else is fixed game geometry.

use std::net::SocketAddr;

use tracing::warn;

/// Runtime configuration for the relay hub.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Bind address for the request/response transport.
    pub http_addr: SocketAddr,
    /// Bind address for the streaming transport.
    pub ws_addr: SocketAddr,
    /// Maximum concurrent streaming connections.
    pub max_connections: usize,
    /// Paddle home (center) y position.
    pub paddle_home_y: f64,
    /// How many checkpoints history reads expose.
    pub checkpoint_view_limit: usize,
    /// Per-connection outbound queue depth.
    pub send_queue_depth: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            http_addr: "0.0.0.0:8080".parse().expect("valid default addr"),
            ws_addr: "0.0.0.0:8765".parse().expect("valid default addr"),
            max_connections: 1000,
            paddle_home_y: 350.0,
            checkpoint_view_limit: 50,
            send_queue_depth: 64,
        }
    }
}

impl RelayConfig {
    /// Defaults overridden by `RELAY_HTTP_ADDR` and `RELAY_WS_ADDR` when set.
    /// Malformed values are logged and ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(addr) = parse_addr_var("RELAY_HTTP_ADDR") {
            config.http_addr = addr;
        }
        if let Some(addr) = parse_addr_var("RELAY_WS_ADDR") {
            config.ws_addr = addr;
        }
        config
    }
}

fn parse_addr_var(name: &str) -> Option<SocketAddr> {
    let raw = std::env::var(name).ok()?;
    match raw.parse() {
        Ok(addr) => Some(addr),
        Err(e) => {
            warn!(var = name, value = %raw, error = %e, "ignoring malformed bind address");
            None
        }
    }
}
