use std::sync::Arc;
use std::time::Instant;

use shardis_core::{
    AssignmentStore, Canonicalize, HashRing, RingHasher, ShardId, ShardKey, ShardMap,
    ShardisResult,
};

/// Whether a [`Router::route`] call resolved an existing assignment or
/// created a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// The assignment store already held this key.
    Existing,
    /// This call created the assignment (either outright, or it lost a
    /// race and observed the winner).
    Created,
}

/// Resolves a [`ShardKey`] to the [`ShardId`] that owns it, creating the
/// assignment on first use.
///
/// The ring is immutable for the lifetime of a `Router`; rebalancing a
/// deployed ring means constructing a new `Router` over the new shard set
/// and letting the migration core repoint assignments underneath it.
pub struct Router<K, S> {
    ring: HashRing,
    key_hasher: Arc<dyn RingHasher>,
    store: Arc<S>,
    _marker: std::marker::PhantomData<K>,
}

impl<K, S> Router<K, S>
where
    K: Send + Sync + Clone + Canonicalize,
    S: AssignmentStore<K>,
{
    /// Builds a router over `shard_ids` using `replication` virtual nodes
    /// per shard.
    ///
    /// `ring_hasher` and `key_hasher` are two independent plug points:
    /// `ring_hasher` places shards' virtual nodes when the ring is built,
    /// `key_hasher` hashes an incoming key to a ring position on lookup.
    /// Passing the same hasher for both is fine and is the common case, but
    /// the two are never required to match.
    ///
    /// # Errors
    ///
    /// Propagates [`shardis_core::ShardisError::PlanInvalid`] from
    /// [`HashRing::build`] when `shard_ids` is empty or `replication` is
    /// zero.
    pub fn new(
        shard_ids: &[ShardId],
        replication: u32,
        ring_hasher: Arc<dyn RingHasher>,
        key_hasher: Arc<dyn RingHasher>,
        store: Arc<S>,
    ) -> ShardisResult<Self> {
        let ring = HashRing::build(shard_ids, replication, ring_hasher.as_ref())?;
        Ok(Self {
            ring,
            key_hasher,
            store,
            _marker: std::marker::PhantomData,
        })
    }

    /// Resolves `key`, consulting the assignment store first and falling
    /// back to the ring only for keys that have never been routed.
    pub async fn route(&self, key: ShardKey<K>) -> ShardisResult<(RouteOutcome, ShardMap<K>)> {
        let start = Instant::now();

        if let Some(shard_id) = self.store.try_get(&key).await? {
            Self::observe(RouteOutcome::Existing, start);
            return Ok((RouteOutcome::Existing, ShardMap::new(key, shard_id)));
        }

        let key_hash = self.key_hasher.hash32(&key.value().to_canonical_bytes());
        let candidate = self.ring.successor(key_hash).clone();

        let (created, map) = self
            .store
            .try_get_or_add(key, &move || candidate.clone())
            .await?;

        let outcome = if created {
            RouteOutcome::Created
        } else {
            RouteOutcome::Existing
        };
        Self::observe(outcome, start);
        tracing::debug!(shard_id = %map.shard_id, created, "resolved shard route");
        Ok((outcome, map))
    }

    /// Number of virtual nodes on the underlying ring.
    #[must_use]
    pub fn ring_len(&self) -> usize {
        self.ring.len()
    }

    fn observe(outcome: RouteOutcome, start: Instant) {
        let label = match outcome {
            RouteOutcome::Existing => "existing",
            RouteOutcome::Created => "created",
        };
        shardis_core::metrics::ROUTE_RESOLUTIONS
            .with_label_values(&[label])
            .inc();
        shardis_core::metrics::ROUTE_LATENCY
            .with_label_values(&[label])
            .observe(start.elapsed().as_secs_f64());
    }
}
