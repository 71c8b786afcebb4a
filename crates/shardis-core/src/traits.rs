use async_trait::async_trait;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::error::{ShardisError, ShardisResult};
use crate::migration::{KeyMove, MigrationCheckpoint};
use crate::model::{ShardId, ShardKey, ShardMap};

/// Persists the authoritative key-to-shard assignment used by [`crate::model::HashRing`]
/// lookups to resolve an existing key.
///
/// Implementations must make [`AssignmentStore::try_assign`] and
/// [`AssignmentStore::try_get_or_add`] linearizable with respect to one
/// another for a given key: exactly one of any number of concurrent
/// first-assignment attempts may win.
#[async_trait]
pub trait AssignmentStore<K>: Send + Sync
where
    K: Send + Sync + Clone,
{
    /// Reads the current assignment for `key`, if one exists.
    async fn try_get(&self, key: &ShardKey<K>) -> ShardisResult<Option<ShardId>>;

    /// Unconditionally creates or replaces the assignment for `key`.
    async fn assign(&self, key: ShardKey<K>, shard_id: ShardId) -> ShardisResult<ShardMap<K>>;

    /// Compare-and-set: creates the assignment only if `key` is absent.
    ///
    /// Returns `(true, map)` when this call won the race and created the
    /// assignment, or `(false, map)` with the already-existing winner when
    /// it lost.
    async fn try_assign(
        &self,
        key: ShardKey<K>,
        shard_id: ShardId,
    ) -> ShardisResult<(bool, ShardMap<K>)>;

    /// Reads the assignment for `key`, or atomically creates one using
    /// `factory` if absent.
    ///
    /// The default implementation composes [`AssignmentStore::try_get`] and
    /// [`AssignmentStore::try_assign`]; it is not itself atomic unless the
    /// store overrides it, so implementations backed by a store without a
    /// native CAS primitive must override this method directly.
    async fn try_get_or_add(
        &self,
        key: ShardKey<K>,
        factory: &(dyn Fn() -> ShardId + Send + Sync),
    ) -> ShardisResult<(bool, ShardMap<K>)> {
        if let Some(shard_id) = self.try_get(&key).await? {
            return Ok((false, ShardMap::new(key, shard_id)));
        }
        let candidate = factory();
        self.try_assign(key, candidate).await
    }

    /// Lazily enumerates every assignment currently held by the store.
    ///
    /// Used to materialize [`crate::model::TopologySnapshot`] instances for
    /// migration planning. The default implementation returns an empty
    /// stream; stores that can enumerate should override it.
    async fn enumerate(&self) -> ShardisResult<Vec<ShardMap<K>>> {
        Ok(Vec::new())
    }
}

/// Acquires a single-use, shard-scoped resource (database context, document
/// session, cache handle) for the duration of one operation.
#[async_trait]
pub trait ShardResourceFactory<T>: Send + Sync {
    /// Creates a resource scoped to `shard_id`.
    ///
    /// The returned handle is owned by the caller for the lifetime of one
    /// operation; callers must release it on every exit path, including
    /// error and cancellation paths.
    async fn create(&self, shard_id: &ShardId, token: &CancellationToken) -> ShardisResult<T>;
}

/// Result of a single health probe against a shard.
#[derive(Debug, Clone)]
pub struct HealthReport {
    /// Whether the probe considered the shard reachable and responsive.
    pub reachable: bool,
    /// Human-readable description, surfaced in strict-mode gate errors.
    pub description: String,
    /// Probe round-trip latency.
    pub latency_ms: u64,
}

/// Probes a single shard for liveness, feeding [`crate::traits::AssignmentStore`]-independent
/// health classification.
#[async_trait]
pub trait ShardHealthProbe: Send + Sync {
    /// Probes `shard_id` and returns its current health report.
    async fn probe(&self, shard_id: &ShardId, token: &CancellationToken) -> ShardisResult<HealthReport>;
}

/// Moves a single key's data from its source shard to its target shard
/// during migration.
#[async_trait]
pub trait DataMover<K>: Send + Sync
where
    K: Send + Sync + Clone,
{
    /// Copies the entity identified by `mv.key` from the source shard to
    /// the target shard. A missing source entity is a no-op success.
    async fn copy(&self, mv: &KeyMove<K>, token: &CancellationToken) -> ShardisResult<()>;
}

/// Projects a verification entity to a canonical, hash-stable byte form
/// before it reaches a [`crate::model::StableHasher`].
///
/// Distinct from [`crate::model::Canonicalize`] (which canonicalizes keys
/// for ring placement): this trait canonicalizes the *value* a
/// [`VerificationStrategy`] compares across shards, so ordered map keys,
/// consistent number formatting, and UTC-normalized timestamps are fixed
/// before hashing rather than left to the projection's own `Serialize`
/// impl.
pub trait Canonicalizer<V>: Send + Sync {
    /// Returns `value`'s canonical UTF-8 byte representation.
    ///
    /// # Errors
    ///
    /// Returns [`ShardisError::Internal`] if `value` cannot be projected.
    fn to_canonical_utf8(&self, value: &V) -> ShardisResult<Vec<u8>>;
}

/// Default [`Canonicalizer`]: serializes through [`serde_json::Value`],
/// whose `Map` orders entries by key, so two structurally equal values
/// always canonicalize to the same bytes regardless of field declaration
/// order.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCanonicalizer;

impl<V> Canonicalizer<V> for JsonCanonicalizer
where
    V: Serialize,
{
    fn to_canonical_utf8(&self, value: &V) -> ShardisResult<Vec<u8>> {
        let canonical = serde_json::to_value(value)
            .map_err(|e| ShardisError::internal(format!("projection is not serializable: {e}")))?;
        serde_json::to_vec(&canonical)
            .map_err(|e| ShardisError::internal(format!("canonical encoding failed: {e}")))
    }
}

/// Verifies that a copied entity matches between source and target shard.
#[async_trait]
pub trait VerificationStrategy<K>: Send + Sync
where
    K: Send + Sync + Clone,
{
    /// Returns `true` when the source and target copies of `mv.key` are
    /// considered equivalent.
    async fn verify(&self, mv: &KeyMove<K>, token: &CancellationToken) -> ShardisResult<bool>;
}

/// Applies a batch of verified moves to the authoritative assignment store.
///
/// The swap is the linearization point of a migration: before it commits,
/// readers resolve a key to its source shard; after, to its target shard.
#[async_trait]
pub trait Swapper<K>: Send + Sync
where
    K: Send + Sync + Clone,
{
    /// Commits `batch` to the assignment store. Implementations may apply
    /// the batch key by key but must make each individual key update
    /// atomic.
    async fn swap(&self, batch: &[KeyMove<K>], token: &CancellationToken) -> ShardisResult<()>;
}

/// Durably stores per-plan migration progress so an interrupted migration
/// can resume without re-processing completed moves.
#[async_trait]
pub trait CheckpointStore<K>: Send + Sync
where
    K: Send + Sync + Clone,
{
    /// Loads the latest checkpoint for `plan_id`, if one has been persisted.
    async fn load(&self, plan_id: &str) -> ShardisResult<Option<MigrationCheckpoint<K>>>;

    /// Persists `checkpoint`, replacing any prior checkpoint for the same
    /// plan.
    async fn persist(&self, checkpoint: &MigrationCheckpoint<K>) -> ShardisResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct RacyStore {
        winner: Arc<tokio::sync::Mutex<Option<ShardMap<String>>>>,
        attempts: Arc<AtomicU32>,
    }

    #[async_trait]
    impl AssignmentStore<String> for RacyStore {
        async fn try_get(&self, _key: &ShardKey<String>) -> ShardisResult<Option<ShardId>> {
            Ok(self.winner.lock().await.as_ref().map(|m| m.shard_id.clone()))
        }

        async fn assign(
            &self,
            key: ShardKey<String>,
            shard_id: ShardId,
        ) -> ShardisResult<ShardMap<String>> {
            let map = ShardMap::new(key, shard_id);
            *self.winner.lock().await = Some(map.clone());
            Ok(map)
        }

        async fn try_assign(
            &self,
            key: ShardKey<String>,
            shard_id: ShardId,
        ) -> ShardisResult<(bool, ShardMap<String>)> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let mut guard = self.winner.lock().await;
            if let Some(existing) = guard.as_ref() {
                return Ok((false, existing.clone()));
            }
            let map = ShardMap::new(key, shard_id);
            *guard = Some(map.clone());
            Ok((true, map))
        }
    }

    #[tokio::test]
    async fn default_try_get_or_add_creates_once_under_contention() {
        let store = Arc::new(RacyStore {
            winner: Arc::new(tokio::sync::Mutex::new(None)),
            attempts: Arc::new(AtomicU32::new(0)),
        });

        let mut handles = Vec::new();
        for i in 0..50 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let key = ShardKey::new("contended".to_string());
                let candidate = ShardId::new(format!("s{i}")).unwrap();
                store
                    .try_get_or_add(key, &move || candidate.clone())
                    .await
                    .unwrap()
            }));
        }

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap());
        }

        let created_count = results.iter().filter(|(created, _)| *created).count();
        assert_eq!(created_count, 1);

        let winning_shard = &results[0].1.shard_id;
        for (_, map) in &results {
            assert_eq!(&map.shard_id, winning_shard);
        }
    }
}
