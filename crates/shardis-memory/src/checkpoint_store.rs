use async_trait::async_trait;
use dashmap::DashMap;
use shardis_core::{CheckpointStore, MigrationCheckpoint, ShardisResult};

/// `DashMap`-backed [`CheckpointStore`] keyed by plan id, for tests and the
/// demo CLI. Not durable across process restarts.
#[derive(Default)]
pub struct InMemoryCheckpointStore<K>
where
    K: Ord,
{
    checkpoints: DashMap<String, MigrationCheckpoint<K>>,
}

impl<K> InMemoryCheckpointStore<K>
where
    K: Ord,
{
    /// Builds an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl<K> CheckpointStore<K> for InMemoryCheckpointStore<K>
where
    K: Ord + Clone + Send + Sync,
{
    async fn load(&self, plan_id: &str) -> ShardisResult<Option<MigrationCheckpoint<K>>> {
        Ok(self.checkpoints.get(plan_id).map(|entry| entry.value().clone()))
    }

    async fn persist(&self, checkpoint: &MigrationCheckpoint<K>) -> ShardisResult<()> {
        self.checkpoints
            .insert(checkpoint.plan_id.to_string(), checkpoint.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn persist_then_load_roundtrips() {
        let store: InMemoryCheckpointStore<String> = InMemoryCheckpointStore::new();
        let plan_id = Uuid::new_v4();
        let checkpoint = MigrationCheckpoint::new(plan_id);

        store.persist(&checkpoint).await.unwrap();
        let loaded = store.load(&plan_id.to_string()).await.unwrap().unwrap();
        assert_eq!(loaded.plan_id, plan_id);
    }

    #[tokio::test]
    async fn load_returns_none_for_unknown_plan() {
        let store: InMemoryCheckpointStore<String> = InMemoryCheckpointStore::new();
        assert!(store.load("unknown").await.unwrap().is_none());
    }
}
