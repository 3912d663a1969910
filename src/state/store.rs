//! Game State Store
//!
//! Single guarded container for the latest ball snapshot, the checkpoint
//! history, paddle positions and scores. All fields share one coarse lock so
//! an update coming from one inbound message (snapshot + history + scores) is
//! observed atomically by concurrent readers on either transport. Reads copy
//! values out; no live references escape the lock. Critical sections are
//! bounded and never perform I/O.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::state::snapshot::BallSnapshot;

/// The closed set of paddle identifiers. Paddles are never created or
/// removed at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaddleId {
    /// Left paddle.
    Ai1,
    /// Right paddle.
    Ai2,
}

impl PaddleId {
    /// Wire name of this paddle.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaddleId::Ai1 => "ai1",
            PaddleId::Ai2 => "ai2",
        }
    }
}

impl std::fmt::Display for PaddleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PaddleId {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ai1" => Ok(PaddleId::Ai1),
            "ai2" => Ok(PaddleId::Ai2),
            _ => Err(StoreError::InvalidPaddle),
        }
    }
}

/// How a paddle write interprets its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaddleAction {
    /// Assign the y position directly.
    Set,
    /// Add a delta to the current y position.
    Move,
    /// Reset to the configured home position; the value is ignored.
    Home,
}

/// Vertical positions of both paddles.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Paddles {
    /// Left paddle y.
    pub ai1: f64,
    /// Right paddle y.
    pub ai2: f64,
}

impl Paddles {
    /// Read one paddle's y position.
    pub fn get(&self, id: PaddleId) -> f64 {
        match id {
            PaddleId::Ai1 => self.ai1,
            PaddleId::Ai2 => self.ai2,
        }
    }

    fn get_mut(&mut self, id: PaddleId) -> &mut f64 {
        match id {
            PaddleId::Ai1 => &mut self.ai1,
            PaddleId::Ai2 => &mut self.ai2,
        }
    }
}

/// Current scores for both paddles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scores {
    /// Left paddle score.
    pub ai1: u32,
    /// Right paddle score.
    pub ai2: u32,
}

/// Partial score assignment; only supplied fields change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScorePatch {
    /// New left paddle score, if supplied.
    pub ai1: Option<u32>,
    /// New right paddle score, if supplied.
    pub ai2: Option<u32>,
}

impl ScorePatch {
    /// True when the patch assigns nothing.
    pub fn is_empty(&self) -> bool {
        self.ai1.is_none() && self.ai2.is_none()
    }
}

/// Store operation errors. Failed operations never mutate state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Unknown paddle identifier.
    #[error("invalid paddle; use 'ai1' or 'ai2'")]
    InvalidPaddle,

    /// Missing or non-numeric value for the requested operation.
    #[error("{0}")]
    InvalidValue(&'static str),
}

#[derive(Debug)]
struct StoreInner {
    ball: Option<BallSnapshot>,
    checkpoints: Vec<BallSnapshot>,
    paddles: Paddles,
    scores: Scores,
}

/// Process-wide game state, created once at startup.
///
/// One mutual-exclusion domain covers every field; per-field locks would let
/// a reader pair a fresh ball position with a stale score from the same
/// logical update.
#[derive(Debug)]
pub struct GameStore {
    inner: Mutex<StoreInner>,
    home_y: f64,
}

impl GameStore {
    /// Create a store with both paddles at the given home position and
    /// scores at zero.
    pub fn new(home_y: f64) -> Self {
        Self {
            inner: Mutex::new(StoreInner {
                ball: None,
                checkpoints: Vec::new(),
                paddles: Paddles {
                    ai1: home_y,
                    ai2: home_y,
                },
                scores: Scores::default(),
            }),
            home_y,
        }
    }

    /// Replace the latest ball snapshot.
    pub fn update_ball(&self, snapshot: BallSnapshot) {
        self.inner.lock().ball = Some(snapshot);
    }

    /// Append a snapshot to the checkpoint history. Returns the new total.
    pub fn append_checkpoint(&self, snapshot: BallSnapshot) -> usize {
        let mut inner = self.inner.lock();
        inner.checkpoints.push(snapshot);
        inner.checkpoints.len()
    }

    /// Record one inbound checkpoint atomically: replace the latest snapshot,
    /// append to history, and apply any scores carried by the same message.
    ///
    /// Returns the new history total and, when a patch was supplied, the
    /// resulting scores.
    pub fn record_checkpoint(
        &self,
        snapshot: BallSnapshot,
        scores: Option<ScorePatch>,
    ) -> (usize, Option<Scores>) {
        let mut inner = self.inner.lock();
        inner.ball = Some(snapshot.clone());
        inner.checkpoints.push(snapshot);
        let total = inner.checkpoints.len();
        let scores = scores.map(|patch| {
            if let Some(ai1) = patch.ai1 {
                inner.scores.ai1 = ai1;
            }
            if let Some(ai2) = patch.ai2 {
                inner.scores.ai2 = ai2;
            }
            inner.scores
        });
        (total, scores)
    }

    /// Latest ball snapshot, if any update has ever been recorded.
    pub fn ball_snapshot(&self) -> Option<BallSnapshot> {
        self.inner.lock().ball.clone()
    }

    /// History total and the most recent `limit` checkpoints in append order.
    pub fn checkpoints(&self, limit: usize) -> (usize, Vec<BallSnapshot>) {
        let inner = self.inner.lock();
        let total = inner.checkpoints.len();
        let start = total.saturating_sub(limit);
        (total, inner.checkpoints[start..].to_vec())
    }

    /// Apply a paddle write and return the resulting y position.
    ///
    /// `Set` assigns the value, `Move` adds it as a delta, `Home` resets to
    /// the configured home position. `Set` and `Move` require a finite
    /// numeric value.
    pub fn set_paddle(
        &self,
        id: PaddleId,
        action: PaddleAction,
        value: Option<f64>,
    ) -> Result<f64, StoreError> {
        let mut inner = self.inner.lock();
        let y = inner.paddles.get_mut(id);
        match action {
            PaddleAction::Set => {
                let value = numeric(value, "'set' requires a numeric 'y'")?;
                *y = value;
            }
            PaddleAction::Move => {
                let delta = numeric(value, "'move' requires a numeric 'dy'")?;
                *y += delta;
            }
            PaddleAction::Home => *y = self.home_y,
        }
        Ok(*y)
    }

    /// Assign one paddle's score.
    pub fn set_score(&self, id: PaddleId, value: u32) {
        let mut inner = self.inner.lock();
        match id {
            PaddleId::Ai1 => inner.scores.ai1 = value,
            PaddleId::Ai2 => inner.scores.ai2 = value,
        }
    }

    /// Apply a partial score update. Returns the resulting scores and
    /// whether any field actually changed.
    pub fn apply_scores(&self, patch: ScorePatch) -> (Scores, bool) {
        let mut inner = self.inner.lock();
        let before = inner.scores;
        if let Some(ai1) = patch.ai1 {
            inner.scores.ai1 = ai1;
        }
        if let Some(ai2) = patch.ai2 {
            inner.scores.ai2 = ai2;
        }
        (inner.scores, inner.scores != before)
    }

    /// Current paddle positions.
    pub fn paddles(&self) -> Paddles {
        self.inner.lock().paddles
    }

    /// Current scores.
    pub fn scores(&self) -> Scores {
        self.inner.lock().scores
    }
}

fn numeric(value: Option<f64>, message: &'static str) -> Result<f64, StoreError> {
    match value {
        Some(v) if v.is_finite() => Ok(v),
        _ => Err(StoreError::InvalidValue(message)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::snapshot::normalize;
    use serde_json::json;

    const HOME_Y: f64 = 350.0;

    fn store() -> GameStore {
        GameStore::new(HOME_Y)
    }

    fn snapshot(x: f64) -> BallSnapshot {
        normalize(&json!({"timestamp": 1, "ball": {"x": x}}))
    }

    #[test]
    fn set_assigns_exactly_and_leaves_other_paddle() {
        let store = store();
        let y = store
            .set_paddle(PaddleId::Ai1, PaddleAction::Set, Some(120.0))
            .unwrap();
        assert_eq!(y, 120.0);
        assert_eq!(store.paddles().ai1, 120.0);
        assert_eq!(store.paddles().ai2, HOME_Y);
    }

    #[test]
    fn move_adds_delta_and_composes() {
        let store = store();
        store
            .set_paddle(PaddleId::Ai1, PaddleAction::Move, Some(10.0))
            .unwrap();
        store
            .set_paddle(PaddleId::Ai1, PaddleAction::Move, Some(-4.0))
            .unwrap();
        // Two moves are equivalent to one move by the summed delta.
        assert_eq!(store.paddles().ai1, HOME_Y + 6.0);

        let other = GameStore::new(HOME_Y);
        other
            .set_paddle(PaddleId::Ai1, PaddleAction::Move, Some(6.0))
            .unwrap();
        assert_eq!(other.paddles().ai1, store.paddles().ai1);
    }

    #[test]
    fn home_resets_regardless_of_prior_value() {
        let store = store();
        store
            .set_paddle(PaddleId::Ai2, PaddleAction::Set, Some(-999.0))
            .unwrap();
        let y = store
            .set_paddle(PaddleId::Ai2, PaddleAction::Home, Some(1234.5))
            .unwrap();
        assert_eq!(y, HOME_Y);
    }

    #[test]
    fn invalid_value_does_not_mutate() {
        let store = store();
        let err = store
            .set_paddle(PaddleId::Ai1, PaddleAction::Set, None)
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidValue(_)));
        let err = store
            .set_paddle(PaddleId::Ai1, PaddleAction::Move, Some(f64::NAN))
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidValue(_)));
        assert_eq!(store.paddles().ai1, HOME_Y);
    }

    #[test]
    fn paddle_id_parsing() {
        assert_eq!("ai1".parse::<PaddleId>().unwrap(), PaddleId::Ai1);
        assert_eq!("ai2".parse::<PaddleId>().unwrap(), PaddleId::Ai2);
        assert_eq!(
            "ai3".parse::<PaddleId>().unwrap_err(),
            StoreError::InvalidPaddle
        );
    }

    #[test]
    fn score_updates_are_partial() {
        let store = store();
        let (scores, changed) = store.apply_scores(ScorePatch {
            ai1: Some(5),
            ai2: None,
        });
        assert!(changed);
        assert_eq!(scores, Scores { ai1: 5, ai2: 0 });

        let (scores, changed) = store.apply_scores(ScorePatch {
            ai1: Some(5),
            ai2: None,
        });
        assert!(!changed);
        assert_eq!(scores.ai1, 5);
    }

    #[test]
    fn set_score_assigns_one_side() {
        let store = store();
        store.set_score(PaddleId::Ai2, 7);
        assert_eq!(store.scores(), Scores { ai1: 0, ai2: 7 });
    }

    #[test]
    fn checkpoint_view_is_bounded_and_ordered() {
        let store = store();
        for i in 0..60 {
            store.append_checkpoint(snapshot(i as f64));
        }
        let (total, items) = store.checkpoints(50);
        assert_eq!(total, 60);
        assert_eq!(items.len(), 50);
        assert_eq!(items.first().unwrap().position.x, Some(10.0));
        assert_eq!(items.last().unwrap().position.x, Some(59.0));
    }

    #[test]
    fn ball_absent_until_first_update() {
        let store = store();
        assert!(store.ball_snapshot().is_none());
        store.update_ball(snapshot(1.0));
        assert_eq!(store.ball_snapshot().unwrap().position.x, Some(1.0));
    }

    #[test]
    fn record_checkpoint_updates_everything_at_once() {
        let store = store();
        let (total, scores) = store.record_checkpoint(
            snapshot(3.0),
            Some(ScorePatch {
                ai1: Some(2),
                ai2: Some(4),
            }),
        );
        assert_eq!(total, 1);
        assert_eq!(scores, Some(Scores { ai1: 2, ai2: 4 }));
        assert_eq!(store.ball_snapshot().unwrap().position.x, Some(3.0));
        assert_eq!(store.scores(), Scores { ai1: 2, ai2: 4 });
    }
}
