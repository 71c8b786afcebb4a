use async_trait::async_trait;
use dashmap::DashMap;
use shardis_core::{ShardId, ShardResourceFactory, ShardisError, ShardisResult};
use tokio_util::sync::CancellationToken;

/// [`ShardResourceFactory`] handing out clones of a pre-registered resource
/// per shard, standing in for a pooled database connection or client
/// handle in tests and the demo CLI.
#[derive(Default)]
pub struct InMemoryResourceFactory<T> {
    resources: DashMap<ShardId, T>,
}

impl<T> InMemoryResourceFactory<T>
where
    T: Clone,
{
    /// Builds a factory with no shards registered.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `resource` as the handle returned for `shard_id`.
    pub fn register(&self, shard_id: ShardId, resource: T) {
        self.resources.insert(shard_id, resource);
    }
}

#[async_trait]
impl<T> ShardResourceFactory<T> for InMemoryResourceFactory<T>
where
    T: Clone + Send + Sync,
{
    async fn create(&self, shard_id: &ShardId, _token: &CancellationToken) -> ShardisResult<T> {
        self.resources
            .get(shard_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ShardisError::storage(format!("no resource registered for shard {shard_id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_returns_registered_resource() {
        let factory: InMemoryResourceFactory<String> = InMemoryResourceFactory::new();
        let shard = ShardId::new("s1").unwrap();
        factory.register(shard.clone(), "handle-1".to_string());

        let resource = factory.create(&shard, &CancellationToken::new()).await.unwrap();
        assert_eq!(resource, "handle-1");
    }

    #[tokio::test]
    async fn create_fails_for_unregistered_shard() {
        let factory: InMemoryResourceFactory<String> = InMemoryResourceFactory::new();
        let err = factory
            .create(&ShardId::new("ghost").unwrap(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ShardisError::Storage { .. }));
    }
}
