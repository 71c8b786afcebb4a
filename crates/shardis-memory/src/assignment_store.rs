use std::hash::Hash;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use shardis_core::{AssignmentStore, ShardId, ShardKey, ShardMap, ShardisResult};
use tokio_util::sync::CancellationToken;

/// `DashMap`-backed [`AssignmentStore`] for tests and the demo CLI.
///
/// `try_get_or_add` is overridden to use `DashMap`'s per-shard-locked
/// `entry` API, making first-assignment genuinely atomic rather than the
/// default trait method's read-then-write composition.
pub struct InMemoryAssignmentStore<K> {
    assignments: DashMap<ShardKey<K>, ShardId>,
}

impl<K> Default for InMemoryAssignmentStore<K>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self { assignments: DashMap::new() }
    }
}

impl<K> InMemoryAssignmentStore<K>
where
    K: Eq + Hash,
{
    /// Builds an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl<K> AssignmentStore<K> for InMemoryAssignmentStore<K>
where
    K: Eq + Hash + Send + Sync + Clone,
{
    async fn try_get(&self, key: &ShardKey<K>) -> ShardisResult<Option<ShardId>> {
        Ok(self.assignments.get(key).map(|entry| entry.value().clone()))
    }

    async fn assign(&self, key: ShardKey<K>, shard_id: ShardId) -> ShardisResult<ShardMap<K>> {
        self.assignments.insert(key.clone(), shard_id.clone());
        Ok(ShardMap::new(key, shard_id))
    }

    async fn try_assign(
        &self,
        key: ShardKey<K>,
        shard_id: ShardId,
    ) -> ShardisResult<(bool, ShardMap<K>)> {
        match self.assignments.entry(key.clone()) {
            Entry::Occupied(existing) => Ok((false, ShardMap::new(key, existing.get().clone()))),
            Entry::Vacant(slot) => {
                slot.insert(shard_id.clone());
                Ok((true, ShardMap::new(key, shard_id)))
            }
        }
    }

    async fn try_get_or_add(
        &self,
        key: ShardKey<K>,
        factory: &(dyn Fn() -> ShardId + Send + Sync),
    ) -> ShardisResult<(bool, ShardMap<K>)> {
        match self.assignments.entry(key.clone()) {
            Entry::Occupied(existing) => Ok((false, ShardMap::new(key, existing.get().clone()))),
            Entry::Vacant(slot) => {
                let shard_id = factory();
                slot.insert(shard_id.clone());
                Ok((true, ShardMap::new(key, shard_id)))
            }
        }
    }

    async fn enumerate(&self) -> ShardisResult<Vec<ShardMap<K>>> {
        Ok(self
            .assignments
            .iter()
            .map(|entry| ShardMap::new(entry.key().clone(), entry.value().clone()))
            .collect())
    }
}

#[async_trait]
impl<K> shardis_core::Swapper<K> for InMemoryAssignmentStore<K>
where
    K: Eq + Hash + Send + Sync + Clone,
{
    async fn swap(
        &self,
        batch: &[shardis_core::KeyMove<K>],
        _token: &CancellationToken,
    ) -> ShardisResult<()> {
        for mv in batch {
            self.assignments.insert(mv.key.clone(), mv.target.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn key(v: &str) -> ShardKey<String> {
        ShardKey::new(v.to_string())
    }

    fn shard(v: &str) -> ShardId {
        ShardId::new(v).unwrap()
    }

    #[tokio::test]
    async fn try_assign_is_first_writer_wins_under_contention() {
        let store = Arc::new(InMemoryAssignmentStore::<String>::new());
        let mut handles = Vec::new();
        for i in 0..50 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .try_assign(key("contended"), shard(&format!("s{i}")))
                    .await
                    .unwrap()
            }));
        }
        let mut wins = 0;
        for handle in handles {
            let (created, _) = handle.await.unwrap();
            if created {
                wins += 1;
            }
        }
        assert_eq!(wins, 1);
    }

    #[tokio::test]
    async fn enumerate_reflects_swap_updates() {
        let store = InMemoryAssignmentStore::<String>::new();
        store.assign(key("a"), shard("s1")).await.unwrap();
        shardis_core::Swapper::swap(
            &store,
            &[shardis_core::KeyMove::new(key("a"), shard("s1"), shard("s2")).unwrap()],
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        let snapshot = store.enumerate().await.unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].shard_id, shard("s2"));
    }
}
