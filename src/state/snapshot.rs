//! Ball Snapshot Normalization
//!
//! Clients send game state in several historical payload shapes (flat fields,
//! nested `pos`/`velocity` objects, `ball`/`ballData`/`gameState.ball`
//! wrappers). `normalize` maps all of them into one canonical record,
//! preserving field absence instead of coercing to zero.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Current time as epoch milliseconds.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// A 2D coordinate pair where either axis may be absent from the source
/// payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Coords {
    /// Horizontal component.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    /// Vertical component.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
}

/// Canonical point-in-time record of the ball and surrounding game state.
///
/// Immutable once constructed; an update always builds a new snapshot.
/// Optional fields stay absent when the source payload did not carry them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BallSnapshot {
    /// Epoch milliseconds; taken from the payload when present, otherwise
    /// stamped at normalization time.
    pub timestamp: i64,
    /// Ball position.
    pub position: Coords,
    /// Ball velocity.
    pub velocity: Coords,
    /// Ball radius.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub radius: Option<f64>,
    /// Scalar speed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    /// Identifier of the paddle that last touched the ball.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_hit: Option<String>,
    /// Opaque paddle-1 state, only present when the payload carried a
    /// `gameState` object.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paddle1: Option<Value>,
    /// Opaque paddle-2 state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paddle2: Option<Value>,
    /// The original payload, untouched. Re-normalizing it yields an
    /// equivalent snapshot.
    pub raw: Value,
}

/// Normalize a heterogeneous inbound payload into a [`BallSnapshot`].
///
/// Total: never fails. Missing or malformed fields come out as absent.
pub fn normalize(payload: &Value) -> BallSnapshot {
    let ball = ball_object(payload);

    let position = Coords {
        x: num(ball, "x").or_else(|| nested_num(ball, &["pos", "position"], "x")),
        y: num(ball, "y").or_else(|| nested_num(ball, &["pos", "position"], "y")),
    };
    let velocity = Coords {
        x: num(ball, "velocityX").or_else(|| nested_num(ball, &["velocity", "vel"], "x")),
        y: num(ball, "velocityY").or_else(|| nested_num(ball, &["velocity", "vel"], "y")),
    };

    // Paddle states are only trusted when a full gameState object is present.
    let game_state = payload.get("gameState");
    let paddle1 = game_state
        .and_then(|gs| first_present(gs, &["paddle1", "ai1Paddle", "leftPaddle"]))
        .cloned();
    let paddle2 = game_state
        .and_then(|gs| first_present(gs, &["paddle2", "ai2Paddle", "rightPaddle"]))
        .cloned();

    BallSnapshot {
        timestamp: int(payload, "timestamp")
            .or_else(|| int(payload, "ts"))
            .unwrap_or_else(now_ms),
        position,
        velocity,
        radius: num(ball, "radius"),
        speed: num(ball, "speed"),
        last_hit: ball
            .get("lastHit")
            .and_then(Value::as_str)
            .map(str::to_owned),
        paddle1,
        paddle2,
        raw: payload.clone(),
    }
}

/// Locate the object holding ball fields, trying known wrappers in priority
/// order and falling back to the payload root.
fn ball_object(payload: &Value) -> &Value {
    payload
        .get("ball")
        .or_else(|| payload.get("ballData"))
        .or_else(|| payload.get("gameState").and_then(|gs| gs.get("ball")))
        .or_else(|| payload.get("checkpoint"))
        .unwrap_or(payload)
}

fn num(obj: &Value, key: &str) -> Option<f64> {
    obj.get(key)?.as_f64()
}

fn nested_num(obj: &Value, containers: &[&str], key: &str) -> Option<f64> {
    containers
        .iter()
        .find_map(|container| obj.get(*container)?.get(key)?.as_f64())
}

fn int(obj: &Value, key: &str) -> Option<i64> {
    let value = obj.get(key)?;
    value.as_i64().or_else(|| value.as_f64().map(|f| f as i64))
}

fn first_present<'a>(obj: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| obj.get(*key))
}
