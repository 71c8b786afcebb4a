use std::sync::Arc;

use futures::future::join_all;
use shardis_core::{FailureStrategy, GatingMode, ShardId, ShardisError, ShardisResult};
use shardis_health::HealthPolicy;
use tokio_util::sync::CancellationToken;

use crate::merge::{merge_ordered, merge_unordered};
use crate::model::QueryModel;
use crate::source::{ItemStream, ShardQuerySource};

/// Runs a [`QueryModel`] across shards concurrently and merges the
/// per-shard results into a single stream.
///
/// Constructed with the full set of known shards; a model's explicit
/// `target_shards` narrows the fan-out for a single call without
/// reconstructing the executor.
pub struct QueryExecutor<T> {
    all_shards: Vec<ShardId>,
    source: Arc<dyn ShardQuerySource<T>>,
    health: Option<Arc<HealthPolicy>>,
    channel_capacity: Option<usize>,
    failure_strategy: FailureStrategy,
}

impl<T> QueryExecutor<T>
where
    T: Send + 'static,
{
    /// Builds an executor over `all_shards` backed by `source`.
    #[must_use]
    pub fn new(
        all_shards: Vec<ShardId>,
        source: Arc<dyn ShardQuerySource<T>>,
        health: Option<Arc<HealthPolicy>>,
        channel_capacity: Option<usize>,
        failure_strategy: FailureStrategy,
    ) -> Self {
        Self {
            all_shards,
            source,
            health,
            channel_capacity,
            failure_strategy,
        }
    }

    fn resolve_targets(&self, model: &QueryModel<T>) -> Vec<ShardId> {
        if model.target_shards().is_empty() {
            self.all_shards.clone()
        } else {
            model
                .target_shards()
                .iter()
                .filter(|id| {
                    let known = self.all_shards.contains(id);
                    if !known {
                        tracing::warn!(shard_id = %id, "ignoring unknown target shard");
                    }
                    known
                })
                .cloned()
                .collect()
        }
    }

    async fn gate(&self, targets: Vec<ShardId>, gating: GatingMode) -> ShardisResult<Vec<ShardId>> {
        match &self.health {
            Some(policy) => policy.gate(&targets, gating),
            None => Ok(targets),
        }
    }

    async fn open_streams(
        &self,
        targets: &[ShardId],
        model: &QueryModel<T>,
        token: &CancellationToken,
    ) -> ShardisResult<Vec<ItemStream<T>>> {
        let opens = targets.iter().map(|shard_id| {
            let source = self.source.clone();
            let model = model.clone();
            let token = token.clone();
            let shard_id = shard_id.clone();
            async move { source.open(&shard_id, &model, token).await }
        });

        join_all(opens).await.into_iter().collect()
    }

    /// Executes `model` against arrival-order (unordered) merge semantics.
    pub async fn execute_unordered(
        &self,
        model: &QueryModel<T>,
        gating: GatingMode,
        token: CancellationToken,
    ) -> ShardisResult<ItemStream<T>>
    where
        T: Clone,
    {
        let targets = self.resolve_targets(model);
        let targets = self.gate(targets, gating).await?;
        let streams = self.open_streams(&targets, model, &token).await?;
        Ok(merge_unordered(
            streams,
            self.channel_capacity,
            self.failure_strategy,
            token,
        ))
    }

    /// Executes `model` with a streaming k-way ordered merge on `key_fn`.
    ///
    /// # Errors
    ///
    /// Returns [`ShardisError::UnsupportedCapability`] if the backing
    /// source does not advertise ordering support.
    pub async fn execute_ordered<K, F>(
        &self,
        model: &QueryModel<T>,
        gating: GatingMode,
        key_fn: F,
        descending: bool,
        token: CancellationToken,
    ) -> ShardisResult<ItemStream<T>>
    where
        T: Clone,
        K: Ord + Send + 'static,
        F: Fn(&T) -> K + Send + Sync + 'static,
    {
        if !self.source.capabilities().ordering {
            return Err(ShardisError::UnsupportedCapability("ordering"));
        }

        let targets = self.resolve_targets(model);
        let targets = self.gate(targets, gating).await?;
        let streams = self.open_streams(&targets, model, &token).await?;
        Ok(merge_ordered(
            streams,
            key_fn,
            descending,
            self.channel_capacity,
            self.failure_strategy,
            token,
        ))
    }
}
