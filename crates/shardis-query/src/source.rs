use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use shardis_core::{ShardId, ShardisResult};
use tokio_util::sync::CancellationToken;

use crate::model::QueryModel;

/// A single shard's contribution to a fan-out query: a lazily produced,
/// cancellable sequence of items already filtered by the caller's
/// [`QueryModel`].
pub type ItemStream<T> = Pin<Box<dyn Stream<Item = ShardisResult<T>> + Send>>;

/// Opens a per-shard item stream for a [`QueryModel`].
///
/// Implementations own the shard-local resource (a query against a
/// database, an in-memory collection scan) for the lifetime of the
/// returned stream and must honor `token`.
#[async_trait]
pub trait ShardQuerySource<T>: Send + Sync {
    /// Opens a stream of items on `shard_id` matching `model`.
    async fn open(
        &self,
        shard_id: &ShardId,
        model: &QueryModel<T>,
        token: CancellationToken,
    ) -> ShardisResult<ItemStream<T>>;

    /// Capabilities this source advertises; ordering-dependent merge modes
    /// require `ordering = true`.
    fn capabilities(&self) -> shardis_core::Capabilities {
        shardis_core::Capabilities::default()
    }
}
