use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ShardisError, ShardisResult};
use crate::model::{ShardId, ShardKey};

/// A single key's relocation from a source shard to a target shard.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyMove<K> {
    /// The key being relocated.
    pub key: ShardKey<K>,
    /// The shard the key currently lives on.
    pub source: ShardId,
    /// The shard the key is moving to.
    pub target: ShardId,
}

impl<K> KeyMove<K> {
    /// Builds a move, rejecting a no-op relocation.
    ///
    /// # Errors
    ///
    /// Returns [`ShardisError::PlanInvalid`] when `source == target`.
    pub fn new(key: ShardKey<K>, source: ShardId, target: ShardId) -> ShardisResult<Self>
    where
        K: Clone,
    {
        if source == target {
            return Err(ShardisError::plan_invalid(
                "a key move requires source and target shards to differ",
            ));
        }
        Ok(Self { key, source, target })
    }
}

/// Where a single [`KeyMove`] currently sits in its relocation lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyMoveState {
    /// Queued, not yet started.
    Planned,
    /// Copy from source to target is in flight.
    Copying,
    /// Copy completed; not yet verified.
    Copied,
    /// Verification of the copied data is in flight.
    Verifying,
    /// Verification succeeded.
    Verified,
    /// Assignment swap is in flight.
    Swapping,
    /// The move has completed; this state is terminal.
    Done,
    /// The move failed permanently after exhausting retries.
    Failed,
}

impl KeyMoveState {
    /// The durable anchor a crashed executor should resume this move from,
    /// given that `self` was the last state observed in a checkpoint.
    ///
    /// Transient states (`Copying`, `Verifying`, `Swapping`) are not durable
    /// commit points, so a restart re-drives the move from the nearest
    /// preceding anchor.
    #[must_use]
    pub fn resume_anchor(self) -> Self {
        match self {
            Self::Copying => Self::Planned,
            Self::Verifying => Self::Copied,
            Self::Swapping => Self::Verified,
            other => other,
        }
    }
}

/// An immutable, ordered plan produced by a migration planner.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MigrationPlan<K> {
    /// Unique identifier for this plan, used to key checkpoints.
    pub plan_id: Uuid,
    /// Creation timestamp, informational only.
    pub created_at: chrono::DateTime<chrono::Utc>,
    moves: Vec<KeyMove<K>>,
}

impl<K> MigrationPlan<K>
where
    K: Clone + Ord,
{
    /// Builds a plan from `moves`, ordering them by `(source, target, key)`
    /// for deterministic, locality-friendly replay.
    ///
    /// # Errors
    ///
    /// Returns [`ShardisError::PlanInvalid`] if the same key appears more
    /// than once.
    pub fn new(mut moves: Vec<KeyMove<K>>) -> ShardisResult<Self> {
        moves.sort_by(|a, b| {
            a.source
                .cmp(&b.source)
                .then_with(|| a.target.cmp(&b.target))
                .then_with(|| a.key.cmp(&b.key))
        });

        let mut seen = std::collections::BTreeSet::new();
        for mv in &moves {
            if !seen.insert(mv.key.clone()) {
                return Err(ShardisError::plan_invalid(format!(
                    "key appears in more than one move in the same plan"
                )));
            }
        }

        Ok(Self {
            plan_id: Uuid::new_v4(),
            created_at: chrono::Utc::now(),
            moves,
        })
    }

    /// Returns the ordered moves in this plan.
    #[must_use]
    pub fn moves(&self) -> &[KeyMove<K>] {
        &self.moves
    }

    /// Number of moves in the plan.
    #[must_use]
    pub fn len(&self) -> usize {
        self.moves.len()
    }

    /// True when the plan contains no moves.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }
}

/// Current schema version written by [`MigrationCheckpoint`]. Bump when the
/// persisted shape changes in a way that is not backward compatible.
pub const CHECKPOINT_SCHEMA_VERSION: u32 = 1;

/// Durable, resumable progress for a single [`MigrationPlan`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MigrationCheckpoint<K>
where
    K: Ord,
{
    /// The plan this checkpoint tracks.
    pub plan_id: Uuid,
    /// Schema version of this checkpoint's shape.
    pub schema_version: u32,
    /// Wall-clock time this checkpoint was written.
    pub updated_at: chrono::DateTime<chrono::Utc>,
    /// Per-key state as of `updated_at`.
    pub states: BTreeMap<ShardKey<K>, KeyMoveState>,
    /// Index (into the plan's ordered moves) of the last move fully
    /// processed through to a durable anchor.
    pub last_processed_index: usize,
}

impl<K> MigrationCheckpoint<K>
where
    K: Ord + Clone,
{
    /// Builds a fresh checkpoint with no progress recorded.
    #[must_use]
    pub fn new(plan_id: Uuid) -> Self {
        Self {
            plan_id,
            schema_version: CHECKPOINT_SCHEMA_VERSION,
            updated_at: chrono::Utc::now(),
            states: BTreeMap::new(),
            last_processed_index: 0,
        }
    }

    /// Records the current state for `key`.
    pub fn set_state(&mut self, key: ShardKey<K>, state: KeyMoveState) {
        self.states.insert(key, state);
    }

    /// Returns the recorded state for `key`, defaulting to `Planned`.
    #[must_use]
    pub fn state_of(&self, key: &ShardKey<K>) -> KeyMoveState {
        self.states.get(key).copied().unwrap_or(KeyMoveState::Planned)
    }
}

/// Terminal report for a completed (or partially completed) migration run.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MigrationSummary {
    /// Total moves in the plan.
    pub planned: usize,
    /// Moves that reached `Done`.
    pub done: usize,
    /// Moves that reached `Failed`.
    pub failed: usize,
    /// Total retry attempts across all moves.
    pub retries: usize,
    /// Wall-clock duration of the run.
    pub elapsed_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(v: &str) -> ShardKey<String> {
        ShardKey::new(v.to_string())
    }

    fn shard(v: &str) -> ShardId {
        ShardId::new(v).unwrap()
    }

    #[test]
    fn key_move_rejects_same_source_and_target() {
        let err = KeyMove::new(key("k1"), shard("s1"), shard("s1")).unwrap_err();
        assert!(matches!(err, ShardisError::PlanInvalid { .. }));
    }

    #[test]
    fn plan_orders_moves_deterministically() {
        let moves = vec![
            KeyMove::new(key("b"), shard("s2"), shard("s1")).unwrap(),
            KeyMove::new(key("a"), shard("s1"), shard("s2")).unwrap(),
            KeyMove::new(key("c"), shard("s1"), shard("s2")).unwrap(),
        ];
        let plan = MigrationPlan::new(moves).unwrap();
        let ordered: Vec<_> = plan.moves().iter().map(|m| m.key.value().clone()).collect();
        assert_eq!(ordered, vec!["a".to_string(), "c".to_string(), "b".to_string()]);
    }

    #[test]
    fn plan_rejects_duplicate_key() {
        let moves = vec![
            KeyMove::new(key("a"), shard("s1"), shard("s2")).unwrap(),
            KeyMove::new(key("a"), shard("s2"), shard("s3")).unwrap(),
        ];
        let err = MigrationPlan::new(moves).unwrap_err();
        assert!(matches!(err, ShardisError::PlanInvalid { .. }));
    }

    #[test]
    fn resume_anchor_rewinds_transient_states() {
        assert_eq!(KeyMoveState::Copying.resume_anchor(), KeyMoveState::Planned);
        assert_eq!(KeyMoveState::Verifying.resume_anchor(), KeyMoveState::Copied);
        assert_eq!(KeyMoveState::Swapping.resume_anchor(), KeyMoveState::Verified);
        assert_eq!(KeyMoveState::Done.resume_anchor(), KeyMoveState::Done);
    }
}
