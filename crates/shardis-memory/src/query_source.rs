use async_trait::async_trait;
use dashmap::DashMap;
use shardis_core::{Capabilities, ShardId, ShardisResult};
use shardis_query::{ItemStream, QueryModel, ShardQuerySource};
use tokio_util::sync::CancellationToken;

/// [`ShardQuerySource`] backed by a pre-seeded `Vec<T>` per shard, for
/// exercising [`shardis_query::QueryExecutor`] in tests and the demo CLI
/// without a real per-shard backend.
pub struct InMemoryQuerySource<T> {
    items: DashMap<ShardId, Vec<T>>,
    capabilities: Capabilities,
}

impl<T> InMemoryQuerySource<T>
where
    T: Clone,
{
    /// Builds a source advertising `capabilities`, with no shards seeded.
    #[must_use]
    pub fn new(capabilities: Capabilities) -> Self {
        Self { items: DashMap::new(), capabilities }
    }

    /// Replaces `shard_id`'s item set.
    pub fn seed(&self, shard_id: ShardId, items: Vec<T>) {
        self.items.insert(shard_id, items);
    }
}

#[async_trait]
impl<T> ShardQuerySource<T> for InMemoryQuerySource<T>
where
    T: Clone + Send + Sync + 'static,
{
    async fn open(
        &self,
        shard_id: &ShardId,
        model: &QueryModel<T>,
        _token: CancellationToken,
    ) -> ShardisResult<ItemStream<T>> {
        let items = self.items.get(shard_id).map(|entry| entry.value().clone()).unwrap_or_default();
        let matched: Vec<ShardisResult<T>> =
            items.into_iter().filter(|item| model.matches(item)).map(Ok).collect();
        Ok(Box::pin(futures::stream::iter(matched)))
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn open_filters_by_model_predicate() {
        let source: InMemoryQuerySource<i32> = InMemoryQuerySource::new(Capabilities::default());
        let shard = ShardId::new("s1").unwrap();
        source.seed(shard.clone(), vec![1, 2, 3, 4, 5]);

        let model = QueryModel::<i32>::new().with_predicate(|v| v % 2 == 0);
        let mut stream = source.open(&shard, &model, CancellationToken::new()).await.unwrap();

        let mut items = Vec::new();
        while let Some(item) = stream.next().await {
            items.push(item.unwrap());
        }
        assert_eq!(items, vec![2, 4]);
    }

    #[tokio::test]
    async fn open_returns_empty_for_unseeded_shard() {
        let source: InMemoryQuerySource<i32> = InMemoryQuerySource::new(Capabilities::default());
        let mut stream = source
            .open(&ShardId::new("ghost").unwrap(), &QueryModel::new(), CancellationToken::new())
            .await
            .unwrap();
        assert!(stream.next().await.is_none());
    }
}
