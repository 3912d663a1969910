//! Request/Response API
//!
//! HTTP endpoints layered over the shared store. Writes mutate the store
//! first, then schedule the matching broadcast through the bridge, so the
//! state change is visible before any streaming peer hears about it.
//! Responses carry permissive CORS headers; preflight always succeeds.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tracing::debug;

use crate::context::RelayContext;
use crate::network::protocol::ServerMessage;
use crate::state::snapshot::{normalize, now_ms, BallSnapshot};
use crate::state::store::{PaddleAction, PaddleId, ScorePatch, StoreError};

/// Build the router for the request/response transport.
pub fn build_router(ctx: Arc<RelayContext>) -> Router {
    Router::new()
        .route("/health", get(health).fallback(not_found))
        .route("/api/ball", get(read_ball).fallback(not_found))
        .route("/api/checkpoints", get(read_checkpoints).fallback(not_found))
        .route("/api/paddles", get(read_paddles).fallback(not_found))
        .route(
            "/api/score",
            get(read_score).post(write_score).fallback(not_found),
        )
        .route("/api/checkpoint-data", post(write_checkpoint).fallback(not_found))
        .route("/api/ball-hit", post(write_checkpoint).fallback(not_found))
        .route("/api/paddle-control", post(paddle_control).fallback(not_found))
        .fallback(not_found)
        .layer(CorsLayer::permissive())
        .with_state(ctx)
}

/// Structured error response: `{"error": ...}` with the matching status.
#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        Self::bad_request(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({"error": self.message}))).into_response()
    }
}

async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

async fn not_found() -> ApiError {
    ApiError::not_found("not found")
}

async fn read_ball(
    State(ctx): State<Arc<RelayContext>>,
) -> Result<Json<BallSnapshot>, ApiError> {
    ctx.store
        .ball_snapshot()
        .map(Json)
        .ok_or_else(|| ApiError::not_found("no ball state available yet"))
}

async fn read_checkpoints(State(ctx): State<Arc<RelayContext>>) -> Json<Value> {
    let (count, items) = ctx.store.checkpoints(ctx.config.checkpoint_view_limit);
    Json(json!({"count": count, "items": items}))
}

async fn read_paddles(State(ctx): State<Arc<RelayContext>>) -> Json<Value> {
    let paddles = ctx.store.paddles();
    Json(json!({
        "paddles": {
            "ai1": {"y": paddles.ai1},
            "ai2": {"y": paddles.ai2},
        }
    }))
}

async fn read_score(State(ctx): State<Arc<RelayContext>>) -> Json<Value> {
    let scores = ctx.store.scores();
    Json(json!({"ai1": scores.ai1, "ai2": scores.ai2}))
}

/// Accept a heterogeneous checkpoint payload, store it, and fan it out.
/// Scores riding along in the payload are applied in the same store update
/// and announced with their own broadcast.
async fn write_checkpoint(
    State(ctx): State<Arc<RelayContext>>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let payload = decode_body(&body)?;
    let snapshot = normalize(&payload);
    let stored_at = snapshot.timestamp;
    let patch = extract_score_patch(&payload);

    let (total, scores) = ctx.store.record_checkpoint(snapshot.clone(), patch);
    debug!(total, "checkpoint stored from request transport");

    ctx.bridge
        .schedule(ServerMessage::BallCheckpoint { payload: snapshot });
    if let Some(scores) = scores {
        ctx.bridge
            .schedule(ServerMessage::ScoreUpdate { scores, ts: now_ms() });
    }

    Ok(Json(json!({"ok": true, "stored_at": stored_at})))
}

async fn paddle_control(
    State(ctx): State<Arc<RelayContext>>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let payload = decode_body(&body)?;

    let paddle: PaddleId = payload
        .get("paddle")
        .and_then(Value::as_str)
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| ApiError::bad_request("invalid paddle; use 'ai1' or 'ai2'"))?;

    let action = match payload.get("action").and_then(Value::as_str) {
        Some("set") => PaddleAction::Set,
        Some("move") => PaddleAction::Move,
        Some("home") => PaddleAction::Home,
        _ => {
            return Err(ApiError::bad_request(
                "invalid action; use 'set', 'move' or 'home'",
            ))
        }
    };

    let value = match action {
        PaddleAction::Set => payload.get("y").and_then(Value::as_f64),
        PaddleAction::Move => payload.get("dy").and_then(Value::as_f64),
        PaddleAction::Home => None,
    };

    let y = ctx.store.set_paddle(paddle, action, value)?;
    ctx.bridge
        .schedule(ServerMessage::PaddleUpdate { paddle, y, ts: now_ms() });

    Ok(Json(json!({"ok": true, "paddle": paddle, "y": y})))
}

async fn write_score(
    State(ctx): State<Arc<RelayContext>>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let payload = decode_body(&body)?;
    let patch = strict_score_patch(&payload)?;

    let (scores, changed) = ctx.store.apply_scores(patch);
    if changed {
        ctx.bridge
            .schedule(ServerMessage::ScoreUpdate { scores, ts: now_ms() });
    }

    Ok(Json(json!({"ok": true, "scores": scores})))
}

fn decode_body(body: &[u8]) -> Result<Value, ApiError> {
    serde_json::from_slice(body)
        .map_err(|e| ApiError::bad_request(format!("invalid JSON body: {e}")))
}

/// Strict score parse for POST /api/score: any supplied field must be a
/// non-negative integer.
fn strict_score_patch(payload: &Value) -> Result<ScorePatch, ApiError> {
    let mut patch = ScorePatch::default();
    for (key, slot) in [("ai1", &mut patch.ai1), ("ai2", &mut patch.ai2)] {
        if let Some(value) = payload.get(key) {
            let parsed = value
                .as_u64()
                .and_then(|v| u32::try_from(v).ok())
                .ok_or_else(|| {
                    ApiError::bad_request("scores must be non-negative integers")
                })?;
            *slot = Some(parsed);
        }
    }
    Ok(patch)
}

/// Lenient score extraction for checkpoint payloads, in precedence order:
/// a `scores` object, a `score` object, then the legacy top-level
/// `ai1Score`/`ai2Score` fields. Unparseable shapes are ignored.
fn extract_score_patch(payload: &Value) -> Option<ScorePatch> {
    let patch = match payload.get("scores").or_else(|| payload.get("score")) {
        Some(obj) => ScorePatch {
            ai1: score_field(obj, "ai1"),
            ai2: score_field(obj, "ai2"),
        },
        None => ScorePatch {
            ai1: score_field(payload, "ai1Score"),
            ai2: score_field(payload, "ai2Score"),
        },
    };
    (!patch.is_empty()).then_some(patch)
}

fn score_field(obj: &Value, key: &str) -> Option<u32> {
    obj.get(key)?.as_u64()?.try_into().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RelayConfig;
    use crate::network::hub::HubCommand;
    use axum::body::Body;
    use axum::http::Request;
    use tokio::sync::mpsc;
    use tower::ServiceExt;

    fn test_ctx() -> (Arc<RelayContext>, mpsc::UnboundedReceiver<HubCommand>) {
        let ctx = Arc::new(RelayContext::new(RelayConfig::default()));
        let (tx, rx) = mpsc::unbounded_channel();
        ctx.bridge.attach(tx);
        (ctx, rx)
    }

    async fn send(
        router: Router,
        method: &str,
        path: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(path);
        let body = match body {
            Some(value) => {
                builder = builder.header("content-type", "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };
        let response = router.oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    fn next_broadcast(rx: &mut mpsc::UnboundedReceiver<HubCommand>) -> Option<ServerMessage> {
        match rx.try_recv().ok()? {
            HubCommand::Broadcast(message) => Some(message),
            other => panic!("expected broadcast, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn ball_is_404_until_first_checkpoint() {
        let (ctx, _rx) = test_ctx();
        let router = build_router(ctx);
        let (status, body) = send(router, "GET", "/api/ball", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"error": "no ball state available yet"}));
    }

    #[tokio::test]
    async fn checkpoint_write_then_ball_read() {
        let (ctx, mut rx) = test_ctx();
        let router = build_router(ctx);

        let payload = json!({"timestamp": 99, "ball": {"x": 5.0, "velocityX": -2.0}});
        let (status, body) = send(
            router.clone(),
            "POST",
            "/api/checkpoint-data",
            Some(payload),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"ok": true, "stored_at": 99}));

        let msg = next_broadcast(&mut rx).unwrap();
        assert!(matches!(msg, ServerMessage::BallCheckpoint { .. }));
        assert!(next_broadcast(&mut rx).is_none());

        let (status, body) = send(router, "GET", "/api/ball", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["position"]["x"], json!(5.0));
        assert_eq!(body["velocity"]["x"], json!(-2.0));
    }

    #[tokio::test]
    async fn ball_hit_alias_accepts_checkpoints() {
        let (ctx, _rx) = test_ctx();
        let router = build_router(ctx.clone());
        let (status, _) = send(
            router,
            "POST",
            "/api/ball-hit",
            Some(json!({"ball": {"x": 1.0}})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(ctx.store.ball_snapshot().is_some());
    }

    #[tokio::test]
    async fn checkpoint_with_legacy_scores_broadcasts_score_update() {
        let (ctx, mut rx) = test_ctx();
        let router = build_router(ctx);

        let payload = json!({"timestamp": 1, "ball": {"x": 0.0}, "ai1Score": 2, "ai2Score": 1});
        let (status, _) = send(router, "POST", "/api/checkpoint-data", Some(payload)).await;
        assert_eq!(status, StatusCode::OK);

        assert!(matches!(
            next_broadcast(&mut rx).unwrap(),
            ServerMessage::BallCheckpoint { .. }
        ));
        match next_broadcast(&mut rx).unwrap() {
            ServerMessage::ScoreUpdate { scores, .. } => {
                assert_eq!(scores.ai1, 2);
                assert_eq!(scores.ai2, 1);
            }
            other => panic!("expected score update, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn scores_object_takes_precedence_over_legacy_fields() {
        let (ctx, _rx) = test_ctx();
        let router = build_router(ctx.clone());

        let payload = json!({
            "ball": {"x": 0.0},
            "scores": {"ai1": 9},
            "ai1Score": 1,
            "ai2Score": 1
        });
        send(router, "POST", "/api/checkpoint-data", Some(payload)).await;
        let scores = ctx.store.scores();
        assert_eq!(scores.ai1, 9);
        assert_eq!(scores.ai2, 0);
    }

    #[tokio::test]
    async fn checkpoints_view_reports_count_and_items() {
        let (ctx, _rx) = test_ctx();
        let router = build_router(ctx);
        for i in 0..3 {
            send(
                router.clone(),
                "POST",
                "/api/checkpoint-data",
                Some(json!({"timestamp": i, "ball": {"x": i as f64}})),
            )
            .await;
        }
        let (status, body) = send(router, "GET", "/api/checkpoints", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], json!(3));
        assert_eq!(body["items"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn paddle_move_applies_delta_and_broadcasts() {
        let (ctx, mut rx) = test_ctx();
        let router = build_router(ctx);

        let (status, body) = send(
            router,
            "POST",
            "/api/paddle-control",
            Some(json!({"paddle": "ai1", "action": "move", "dy": 10})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"ok": true, "paddle": "ai1", "y": 360.0}));

        match next_broadcast(&mut rx).unwrap() {
            ServerMessage::PaddleUpdate { paddle, y, .. } => {
                assert_eq!(paddle, PaddleId::Ai1);
                assert_eq!(y, 360.0);
            }
            other => panic!("expected paddle update, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn invalid_paddle_is_rejected_without_mutation() {
        let (ctx, mut rx) = test_ctx();
        let router = build_router(ctx.clone());

        let (status, body) = send(
            router,
            "POST",
            "/api/paddle-control",
            Some(json!({"paddle": "ai3", "action": "set", "y": 100})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"error": "invalid paddle; use 'ai1' or 'ai2'"}));
        assert_eq!(ctx.store.paddles().ai1, 350.0);
        assert_eq!(ctx.store.paddles().ai2, 350.0);
        assert!(next_broadcast(&mut rx).is_none());
    }

    #[tokio::test]
    async fn paddle_set_requires_numeric_value() {
        let (ctx, _rx) = test_ctx();
        let router = build_router(ctx);
        let (status, body) = send(
            router,
            "POST",
            "/api/paddle-control",
            Some(json!({"paddle": "ai2", "action": "set", "y": "high"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], json!("'set' requires a numeric 'y'"));
    }

    #[tokio::test]
    async fn paddle_home_ignores_value() {
        let (ctx, _rx) = test_ctx();
        let router = build_router(ctx.clone());
        ctx.store
            .set_paddle(PaddleId::Ai1, PaddleAction::Set, Some(10.0))
            .unwrap();

        let (status, body) = send(
            router,
            "POST",
            "/api/paddle-control",
            Some(json!({"paddle": "ai1", "action": "home"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["y"], json!(350.0));
    }

    #[tokio::test]
    async fn score_write_then_read_round_trip() {
        let (ctx, mut rx) = test_ctx();
        let router = build_router(ctx);

        let (status, body) = send(
            router.clone(),
            "POST",
            "/api/score",
            Some(json!({"ai1": 3, "ai2": 7})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["scores"], json!({"ai1": 3, "ai2": 7}));
        assert!(matches!(
            next_broadcast(&mut rx).unwrap(),
            ServerMessage::ScoreUpdate { .. }
        ));

        let (status, body) = send(router, "GET", "/api/score", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"ai1": 3, "ai2": 7}));
    }

    #[tokio::test]
    async fn partial_score_update_leaves_other_side() {
        let (ctx, _rx) = test_ctx();
        let router = build_router(ctx.clone());
        ctx.store.apply_scores(ScorePatch {
            ai1: Some(1),
            ai2: Some(2),
        });

        send(router, "POST", "/api/score", Some(json!({"ai1": 5}))).await;
        let scores = ctx.store.scores();
        assert_eq!(scores.ai1, 5);
        assert_eq!(scores.ai2, 2);
    }

    #[tokio::test]
    async fn unchanged_score_write_does_not_broadcast() {
        let (ctx, mut rx) = test_ctx();
        let router = build_router(ctx);
        send(router, "POST", "/api/score", Some(json!({}))).await;
        assert!(next_broadcast(&mut rx).is_none());
    }

    #[tokio::test]
    async fn non_integer_score_is_rejected() {
        let (ctx, _rx) = test_ctx();
        let router = build_router(ctx.clone());
        let (status, body) = send(
            router,
            "POST",
            "/api/score",
            Some(json!({"ai1": "three"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], json!("scores must be non-negative integers"));
        assert_eq!(ctx.store.scores().ai1, 0);
    }

    #[tokio::test]
    async fn malformed_body_is_bad_request() {
        let (ctx, _rx) = test_ctx();
        let router = build_router(ctx);
        let request = Request::builder()
            .method("POST")
            .uri("/api/score")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_routes_are_404() {
        let (ctx, _rx) = test_ctx();
        let router = build_router(ctx);
        let (status, body) = send(router.clone(), "GET", "/api/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"error": "not found"}));

        // Wrong method on a known path falls through to 404 as well.
        let (status, _) = send(router, "POST", "/api/ball", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn paddles_read_shape() {
        let (ctx, _rx) = test_ctx();
        let router = build_router(ctx);
        let (status, body) = send(router, "GET", "/api/paddles", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({"paddles": {"ai1": {"y": 350.0}, "ai2": {"y": 350.0}}})
        );
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let (ctx, _rx) = test_ctx();
        let router = build_router(ctx);
        let (status, body) = send(router, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "ok"}));
    }
}
