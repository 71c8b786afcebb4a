use std::marker::PhantomData;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use shardis_core::traits::{CheckpointStore, DataMover, Swapper, VerificationStrategy};
use shardis_core::{
    metrics, KeyMove, KeyMoveState, MigrationCheckpoint, MigrationConfig, MigrationPlan,
    MigrationSummary, ShardisResult,
};
use tokio_util::sync::CancellationToken;

use crate::governor::BudgetGovernor;

/// Tuning for a single [`MigrationExecutor::execute`] run.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Maximum retry attempts per move before it is marked `Failed`.
    pub max_retries: u32,
    /// Persist a checkpoint after this many moves complete.
    pub checkpoint_interval: usize,
    /// Persist a checkpoint after this much wall-clock time, whichever
    /// comes first.
    pub checkpoint_time: Duration,
    /// Maximum verified moves applied per `Swapper::swap` call.
    pub swap_batch_size: usize,
}

impl From<&MigrationConfig> for ExecutorConfig {
    fn from(cfg: &MigrationConfig) -> Self {
        Self {
            max_retries: cfg.max_retries,
            checkpoint_interval: cfg.checkpoint_interval,
            checkpoint_time: cfg.checkpoint_time(),
            swap_batch_size: cfg.swap_batch_size.max(1),
        }
    }
}

fn backoff_delay(attempt: u32) -> Duration {
    let base_ms = 50u64.saturating_mul(1u64 << attempt.min(6));
    let jitter_ms = rand::thread_rng().gen_range(0..=(base_ms / 4 + 1));
    Duration::from_millis((base_ms + jitter_ms).min(5_000))
}

/// Drives a [`MigrationPlan`] through copy, verify and swap with retries,
/// a concurrency governor, and resumable checkpoints.
pub struct MigrationExecutor<K, M, V, S, C> {
    mover: Arc<M>,
    verifier: Arc<V>,
    swapper: Arc<S>,
    checkpoints: Arc<C>,
    governor: Arc<BudgetGovernor>,
    config: ExecutorConfig,
    _marker: PhantomData<K>,
}

impl<K, M, V, S, C> MigrationExecutor<K, M, V, S, C>
where
    K: Clone + Send + Sync + Ord + serde::Serialize + serde::de::DeserializeOwned + 'static,
    M: DataMover<K>,
    V: VerificationStrategy<K>,
    S: Swapper<K>,
    C: CheckpointStore<K>,
{
    /// Builds an executor from its collaborators and tuning.
    #[must_use]
    pub fn new(
        mover: Arc<M>,
        verifier: Arc<V>,
        swapper: Arc<S>,
        checkpoints: Arc<C>,
        governor: Arc<BudgetGovernor>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            mover,
            verifier,
            swapper,
            checkpoints,
            governor,
            config,
            _marker: PhantomData,
        }
    }

    /// Executes `plan` to completion or cancellation, resuming from any
    /// checkpoint already persisted for `plan.plan_id`.
    ///
    /// Moves are processed in chunks of `swap_batch_size`: each chunk is
    /// driven to `Verified` concurrently, swapped in a single batch call,
    /// and only then does `last_processed_index` advance and a checkpoint
    /// persist, so a crash mid-chunk resumes at the chunk's start with each
    /// move's finer-grained state still intact.
    pub async fn execute(
        &self,
        plan: &MigrationPlan<K>,
        token: CancellationToken,
    ) -> ShardisResult<MigrationSummary> {
        let start = Instant::now();
        let plan_id_str = plan.plan_id.to_string();

        let mut checkpoint = self
            .checkpoints
            .load(&plan_id_str)
            .await?
            .unwrap_or_else(|| MigrationCheckpoint::new(plan.plan_id));

        for state in checkpoint.states.values_mut() {
            *state = state.resume_anchor();
        }

        let moves = plan.moves();
        metrics::MIGRATION_MOVES
            .with_label_values(&["planned"])
            .inc_by(moves.len() as u64);

        let mut done = 0usize;
        let mut failed = 0usize;
        let mut retries = 0usize;
        let mut since_checkpoint = 0usize;
        let mut last_checkpoint_at = Instant::now();
        let mut index = checkpoint.last_processed_index.min(moves.len());

        while index < moves.len() {
            if token.is_cancelled() {
                break;
            }

            let chunk_end = (index + self.config.swap_batch_size).min(moves.len());
            let chunk = &moves[index..chunk_end];

            let outcomes = futures::future::join_all(chunk.iter().map(|mv| {
                let starting = checkpoint.state_of(&mv.key);
                self.drive_move(mv, starting, &token, &plan_id_str)
            }))
            .await;

            let mut verified_batch = Vec::new();
            for (mv, (state, move_retries)) in chunk.iter().zip(outcomes) {
                retries += move_retries;
                checkpoint.set_state(mv.key.clone(), state);
                match state {
                    KeyMoveState::Verified => verified_batch.push(mv.clone()),
                    KeyMoveState::Failed => {
                        failed += 1;
                        metrics::MIGRATION_MOVES.with_label_values(&["failed"]).inc();
                    }
                    KeyMoveState::Done => done += 1,
                    _ => {}
                }
            }

            if !verified_batch.is_empty() {
                let (swap_result, swap_retries) =
                    self.swap_with_retry(&verified_batch, &token, &plan_id_str).await;
                retries += swap_retries;

                match swap_result {
                    Ok(()) => {
                        for mv in &verified_batch {
                            checkpoint.set_state(mv.key.clone(), KeyMoveState::Done);
                        }
                        done += verified_batch.len();
                        metrics::MIGRATION_MOVES
                            .with_label_values(&["swapped"])
                            .inc_by(verified_batch.len() as u64);
                    }
                    Err(e) => {
                        tracing::warn!(
                            error = %e,
                            batch_size = verified_batch.len(),
                            "swap batch exhausted retries, marking batch failed"
                        );
                        for mv in &verified_batch {
                            checkpoint.set_state(mv.key.clone(), KeyMoveState::Failed);
                        }
                        failed += verified_batch.len();
                        metrics::MIGRATION_MOVES
                            .with_label_values(&["failed"])
                            .inc_by(verified_batch.len() as u64);
                    }
                }
            }

            index = chunk_end;
            checkpoint.last_processed_index = index;
            since_checkpoint += chunk.len();

            let due = since_checkpoint >= self.config.checkpoint_interval
                || last_checkpoint_at.elapsed() >= self.config.checkpoint_time;
            if due || index == moves.len() {
                checkpoint.updated_at = chrono::Utc::now();
                self.checkpoints.persist(&checkpoint).await?;
                since_checkpoint = 0;
                last_checkpoint_at = Instant::now();
            }
        }

        let elapsed = start.elapsed();
        metrics::MIGRATION_TOTAL_ELAPSED.observe(elapsed.as_secs_f64());

        Ok(MigrationSummary {
            planned: moves.len(),
            done,
            failed,
            retries,
            elapsed_ms: elapsed.as_millis() as u64,
        })
    }

    /// Applies `batch` via `Swapper::swap`, retrying on a retryable error
    /// the same way `drive_move` retries copy/verify: only `Transient`
    /// storage errors and verification mismatches are retried, up to
    /// `max_retries`, with the same exponential backoff. Any other error,
    /// or a retryable one that exhausts its budget, is returned so the
    /// caller marks the whole batch `Failed`.
    async fn swap_with_retry(
        &self,
        batch: &[KeyMove<K>],
        token: &CancellationToken,
        plan_id_str: &str,
    ) -> (ShardisResult<()>, usize) {
        let mut attempt = 0u32;
        let mut retries = 0usize;

        loop {
            let swap_started = Instant::now();
            let result = self.swapper.swap(batch, token).await;
            metrics::MIGRATION_PHASE_DURATION
                .with_label_values(&["swap_batch"])
                .observe(swap_started.elapsed().as_secs_f64());

            match result {
                Ok(()) => return (Ok(()), retries),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    attempt += 1;
                    retries += 1;
                    metrics::MIGRATION_RETRIES.with_label_values(&[plan_id_str]).inc();
                    tracing::warn!(
                        error = %e,
                        batch_size = batch.len(),
                        attempt,
                        "retrying swap batch"
                    );
                    tokio::time::sleep(backoff_delay(attempt)).await;
                }
                Err(e) => return (Err(e), retries),
            }
        }
    }

    async fn drive_move(
        &self,
        mv: &KeyMove<K>,
        starting_state: KeyMoveState,
        token: &CancellationToken,
        plan_id_str: &str,
    ) -> (KeyMoveState, usize) {
        let mut state = starting_state.resume_anchor();
        let mut attempt = 0u32;
        let mut move_retries = 0usize;

        loop {
            if token.is_cancelled() {
                return (state, move_retries);
            }

            match state {
                KeyMoveState::Done | KeyMoveState::Failed => return (state, move_retries),
                KeyMoveState::Verified => return (KeyMoveState::Verified, move_retries),
                KeyMoveState::Swapping => state = KeyMoveState::Verified,
                KeyMoveState::Planned | KeyMoveState::Copying => {
                    let _permit = self.governor.acquire_copy(&mv.source).await;
                    metrics::MIGRATION_ACTIVE.with_label_values(&["copy"]).inc();
                    let started = Instant::now();
                    let result = self.mover.copy(mv, token).await;
                    metrics::MIGRATION_ACTIVE.with_label_values(&["copy"]).dec();
                    metrics::MIGRATION_PHASE_DURATION
                        .with_label_values(&["copy"])
                        .observe(started.elapsed().as_secs_f64());

                    match result {
                        Ok(()) => {
                            metrics::MIGRATION_MOVES.with_label_values(&["copied"]).inc();
                            state = KeyMoveState::Copied;
                        }
                        Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                            attempt += 1;
                            move_retries += 1;
                            metrics::MIGRATION_RETRIES.with_label_values(&[plan_id_str]).inc();
                            tokio::time::sleep(backoff_delay(attempt)).await;
                            state = KeyMoveState::Planned;
                        }
                        Err(_) => return (KeyMoveState::Failed, move_retries),
                    }
                }
                KeyMoveState::Copied | KeyMoveState::Verifying => {
                    let _permit = self.governor.acquire_verify(&mv.target).await;
                    metrics::MIGRATION_ACTIVE.with_label_values(&["verify"]).inc();
                    let started = Instant::now();
                    let result = self.verifier.verify(mv, token).await;
                    metrics::MIGRATION_ACTIVE.with_label_values(&["verify"]).dec();
                    metrics::MIGRATION_PHASE_DURATION
                        .with_label_values(&["verify"])
                        .observe(started.elapsed().as_secs_f64());

                    match result {
                        Ok(true) => {
                            metrics::MIGRATION_MOVES.with_label_values(&["verified"]).inc();
                            state = KeyMoveState::Verified;
                        }
                        Ok(false) if attempt < self.config.max_retries => {
                            attempt += 1;
                            move_retries += 1;
                            metrics::MIGRATION_RETRIES.with_label_values(&[plan_id_str]).inc();
                            tokio::time::sleep(backoff_delay(attempt)).await;
                            state = KeyMoveState::Copying;
                        }
                        Ok(false) => return (KeyMoveState::Failed, move_retries),
                        Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                            attempt += 1;
                            move_retries += 1;
                            metrics::MIGRATION_RETRIES.with_label_values(&[plan_id_str]).inc();
                            tokio::time::sleep(backoff_delay(attempt)).await;
                            state = KeyMoveState::Copied;
                        }
                        Err(_) => return (KeyMoveState::Failed, move_retries),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use shardis_core::{ShardId, ShardKey};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex;

    fn shard(v: &str) -> ShardId {
        ShardId::new(v).unwrap()
    }

    fn key(v: &str) -> ShardKey<String> {
        ShardKey::new(v.to_string())
    }

    struct AlwaysOkMover;
    #[async_trait]
    impl DataMover<String> for AlwaysOkMover {
        async fn copy(&self, _mv: &KeyMove<String>, _token: &CancellationToken) -> ShardisResult<()> {
            Ok(())
        }
    }

    struct AlwaysOkVerifier;
    #[async_trait]
    impl VerificationStrategy<String> for AlwaysOkVerifier {
        async fn verify(&self, _mv: &KeyMove<String>, _token: &CancellationToken) -> ShardisResult<bool> {
            Ok(true)
        }
    }

    struct MismatchOnceVerifier {
        seen: Mutex<HashMap<String, u32>>,
    }
    impl MismatchOnceVerifier {
        fn new() -> Self {
            Self { seen: Mutex::new(HashMap::new()) }
        }
    }
    #[async_trait]
    impl VerificationStrategy<String> for MismatchOnceVerifier {
        async fn verify(&self, mv: &KeyMove<String>, _token: &CancellationToken) -> ShardisResult<bool> {
            let mut seen = self.seen.lock().await;
            let count = seen.entry(mv.key.value().clone()).or_insert(0);
            *count += 1;
            Ok(*count > 1)
        }
    }

    struct AlwaysMismatchVerifier;
    #[async_trait]
    impl VerificationStrategy<String> for AlwaysMismatchVerifier {
        async fn verify(&self, _mv: &KeyMove<String>, _token: &CancellationToken) -> ShardisResult<bool> {
            Ok(false)
        }
    }

    struct RecordingSwapper {
        applied: Mutex<Vec<KeyMove<String>>>,
    }
    impl RecordingSwapper {
        fn new() -> Self {
            Self { applied: Mutex::new(Vec::new()) }
        }
    }
    #[async_trait]
    impl Swapper<String> for RecordingSwapper {
        async fn swap(&self, batch: &[KeyMove<String>], _token: &CancellationToken) -> ShardisResult<()> {
            self.applied.lock().await.extend_from_slice(batch);
            Ok(())
        }
    }

    struct InMemoryCheckpoints {
        slot: Mutex<Option<MigrationCheckpoint<String>>>,
        persist_count: AtomicUsize,
    }
    impl InMemoryCheckpoints {
        fn new() -> Self {
            Self { slot: Mutex::new(None), persist_count: AtomicUsize::new(0) }
        }
    }
    #[async_trait]
    impl CheckpointStore<String> for InMemoryCheckpoints {
        async fn load(&self, _plan_id: &str) -> ShardisResult<Option<MigrationCheckpoint<String>>> {
            Ok(self.slot.lock().await.clone())
        }
        async fn persist(&self, checkpoint: &MigrationCheckpoint<String>) -> ShardisResult<()> {
            self.persist_count.fetch_add(1, Ordering::SeqCst);
            *self.slot.lock().await = Some(checkpoint.clone());
            Ok(())
        }
    }

    fn sample_plan() -> MigrationPlan<String> {
        let moves = vec![
            KeyMove::new(key("a"), shard("s1"), shard("s2")).unwrap(),
            KeyMove::new(key("b"), shard("s1"), shard("s2")).unwrap(),
            KeyMove::new(key("c"), shard("s1"), shard("s2")).unwrap(),
        ];
        MigrationPlan::new(moves).unwrap()
    }

    #[tokio::test]
    async fn full_migration_with_no_failures_reaches_done_for_every_move() {
        let checkpoints = Arc::new(InMemoryCheckpoints::new());
        let swapper = Arc::new(RecordingSwapper::new());
        let executor = MigrationExecutor::new(
            Arc::new(AlwaysOkMover),
            Arc::new(AlwaysOkVerifier),
            swapper.clone(),
            checkpoints,
            Arc::new(BudgetGovernor::new(256, 256, 16)),
            ExecutorConfig {
                max_retries: 3,
                checkpoint_interval: 100,
                checkpoint_time: Duration::from_secs(30),
                swap_batch_size: 100,
            },
        );

        let plan = sample_plan();
        let summary = executor.execute(&plan, CancellationToken::new()).await.unwrap();

        assert_eq!(summary.planned, 3);
        assert_eq!(summary.done, 3);
        assert_eq!(summary.failed, 0);
        assert_eq!(swapper.applied.lock().await.len(), 3);
    }

    #[tokio::test]
    async fn verification_mismatch_retries_then_succeeds() {
        let checkpoints = Arc::new(InMemoryCheckpoints::new());
        let executor = MigrationExecutor::new(
            Arc::new(AlwaysOkMover),
            Arc::new(MismatchOnceVerifier::new()),
            Arc::new(RecordingSwapper::new()),
            checkpoints,
            Arc::new(BudgetGovernor::new(256, 256, 16)),
            ExecutorConfig {
                max_retries: 3,
                checkpoint_interval: 100,
                checkpoint_time: Duration::from_secs(30),
                swap_batch_size: 100,
            },
        );

        let plan = sample_plan();
        let summary = executor.execute(&plan, CancellationToken::new()).await.unwrap();

        assert_eq!(summary.done, 3);
        assert_eq!(summary.failed, 0);
        assert!(summary.retries >= 3);
    }

    #[tokio::test]
    async fn resume_skips_moves_already_verified_in_checkpoint() {
        let checkpoints = Arc::new(InMemoryCheckpoints::new());
        let plan = sample_plan();

        let mut seeded = MigrationCheckpoint::new(plan.plan_id);
        seeded.set_state(key("a"), KeyMoveState::Done);
        seeded.set_state(key("b"), KeyMoveState::Verified);
        seeded.last_processed_index = 0;
        *checkpoints.slot.lock().await = Some(seeded);

        let swapper = Arc::new(RecordingSwapper::new());
        let executor = MigrationExecutor::new(
            Arc::new(AlwaysOkMover),
            Arc::new(AlwaysOkVerifier),
            swapper.clone(),
            checkpoints,
            Arc::new(BudgetGovernor::new(256, 256, 16)),
            ExecutorConfig {
                max_retries: 3,
                checkpoint_interval: 100,
                checkpoint_time: Duration::from_secs(30),
                swap_batch_size: 100,
            },
        );

        let summary = executor.execute(&plan, CancellationToken::new()).await.unwrap();
        assert_eq!(summary.done, 3);

        let applied = swapper.applied.lock().await;
        let applied_keys: Vec<_> = applied.iter().map(|m| m.key.value().clone()).collect();
        assert!(applied_keys.contains(&"b".to_string()));
        assert!(applied_keys.contains(&"c".to_string()));
    }

    #[tokio::test]
    async fn verification_exhausting_retries_marks_move_failed() {
        let checkpoints = Arc::new(InMemoryCheckpoints::new());
        let swapper = Arc::new(RecordingSwapper::new());
        let executor = MigrationExecutor::new(
            Arc::new(AlwaysOkMover),
            Arc::new(AlwaysMismatchVerifier),
            swapper.clone(),
            checkpoints,
            Arc::new(BudgetGovernor::new(256, 256, 16)),
            ExecutorConfig {
                max_retries: 1,
                checkpoint_interval: 100,
                checkpoint_time: Duration::from_secs(30),
                swap_batch_size: 100,
            },
        );

        let plan = sample_plan();
        let summary = executor.execute(&plan, CancellationToken::new()).await.unwrap();

        assert_eq!(summary.planned, 3);
        assert_eq!(summary.done, 0);
        assert_eq!(summary.failed, 3);
        assert!(swapper.applied.lock().await.is_empty());
    }
}
