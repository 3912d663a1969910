//! Protocol Messages
//!
//! Wire format for the streaming transport. All messages are JSON text
//! frames. Inbound traffic is best-effort structured: anything that decodes
//! as a JSON object is inspected, everything else is dropped.

use serde::Serialize;
use serde_json::Value;

use crate::state::snapshot::BallSnapshot;
use crate::state::store::{PaddleId, Scores};

/// Messages pushed from the hub to streaming peers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Per-inbound-message acknowledgment, best-effort.
    ServerAck {
        /// `type` tag of the message being acknowledged, when it had one.
        #[serde(skip_serializing_if = "Option::is_none")]
        received_type: Option<String>,
        /// Epoch milliseconds at acknowledgment time.
        ts: i64,
    },

    /// Fan-out of an accepted checkpoint write.
    BallCheckpoint {
        /// The stored snapshot.
        payload: BallSnapshot,
    },

    /// Fan-out of a score change.
    ScoreUpdate {
        /// Scores after the change.
        scores: Scores,
        /// Epoch milliseconds at scheduling time.
        ts: i64,
    },

    /// Fan-out of an accepted paddle write.
    PaddleUpdate {
        /// Which paddle moved.
        paddle: PaddleId,
        /// Its new y position.
        y: f64,
        /// Epoch milliseconds at scheduling time.
        ts: i64,
    },
}

impl ServerMessage {
    /// Serialize to a JSON text frame.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Whether an inbound message carries a checkpoint update: either the
/// explicit type tag or any payload with a `gameState` object.
pub fn is_checkpoint(payload: &Value) -> bool {
    payload.get("type").and_then(Value::as_str) == Some("ball_checkpoint")
        || payload.get("gameState").is_some()
}

/// The inbound message's `type` tag, when present.
pub fn message_type(payload: &Value) -> Option<String> {
    payload
        .get("type")
        .and_then(Value::as_str)
        .map(str::to_owned)
}
