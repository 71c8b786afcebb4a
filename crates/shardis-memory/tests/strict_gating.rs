use std::sync::Arc;

use shardis_core::{Capabilities, FailureStrategy, GatingMode, ShardId, ShardisError};
use shardis_health::{HealthPolicy, HealthPolicyConfig};
use shardis_memory::InMemoryQuerySource;
use shardis_query::{QueryExecutor, QueryModel};
use tokio_util::sync::CancellationToken;

fn shard(v: &str) -> ShardId {
    ShardId::new(v).unwrap()
}

/// A shard probed unhealthy must exclude the whole query under
/// `GatingMode::Strict`, even though `BestEffort` would happily merge
/// the remaining healthy shards.
#[tokio::test]
async fn strict_gating_rejects_query_with_any_unhealthy_target() {
    let healthy = shard("s1");
    let unhealthy = shard("s2");

    let source: Arc<InMemoryQuerySource<i32>> =
        Arc::new(InMemoryQuerySource::new(Capabilities { ordering: false, pagination: false }));
    source.seed(healthy.clone(), vec![1, 2, 3]);
    source.seed(unhealthy.clone(), vec![4, 5, 6]);

    let policy = Arc::new(HealthPolicy::new(HealthPolicyConfig {
        unhealthy_threshold: 1,
        healthy_threshold: 1,
        cooldown: std::time::Duration::from_secs(60),
    }));
    policy.record_result(&unhealthy, false, "probe timeout");

    let executor = QueryExecutor::new(
        vec![healthy.clone(), unhealthy.clone()],
        source,
        Some(policy),
        None,
        FailureStrategy::BestEffort,
    );

    let model = QueryModel::<i32>::new();

    let err = executor
        .execute_unordered(&model, GatingMode::Strict, CancellationToken::new())
        .await
        .expect_err("strict gating must reject a target set containing an unhealthy shard");
    assert!(matches!(err, ShardisError::InsufficientHealthyShards(_)));
}

/// The same topology under `BestEffort` gating drops the unhealthy shard
/// silently and merges results from the rest.
#[tokio::test]
async fn best_effort_gating_merges_remaining_healthy_shards() {
    use futures::StreamExt;

    let healthy = shard("s1");
    let unhealthy = shard("s2");

    let source: Arc<InMemoryQuerySource<i32>> =
        Arc::new(InMemoryQuerySource::new(Capabilities { ordering: false, pagination: false }));
    source.seed(healthy.clone(), vec![1, 2, 3]);
    source.seed(unhealthy.clone(), vec![4, 5, 6]);

    let policy = Arc::new(HealthPolicy::new(HealthPolicyConfig {
        unhealthy_threshold: 1,
        healthy_threshold: 1,
        cooldown: std::time::Duration::from_secs(60),
    }));
    policy.record_result(&unhealthy, false, "probe timeout");

    let executor = QueryExecutor::new(
        vec![healthy.clone(), unhealthy.clone()],
        source,
        Some(policy),
        None,
        FailureStrategy::BestEffort,
    );

    let model = QueryModel::<i32>::new();
    let mut stream = executor
        .execute_unordered(&model, GatingMode::BestEffort, CancellationToken::new())
        .await
        .unwrap();

    let mut items = Vec::new();
    while let Some(item) = stream.next().await {
        items.push(item.unwrap());
    }
    items.sort_unstable();
    assert_eq!(items, vec![1, 2, 3]);
}
