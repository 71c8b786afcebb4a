use async_trait::async_trait;
use dashmap::DashMap;
use shardis_core::{HealthReport, ShardHealthProbe, ShardId, ShardisResult};
use tokio_util::sync::CancellationToken;

/// Configurable canned-response [`ShardHealthProbe`] for tests and demos.
///
/// Shards with no configured report are reachable by default, so a test
/// only needs to configure the shards it wants to fail.
#[derive(Default)]
pub struct InMemoryHealthProbe {
    reports: DashMap<ShardId, HealthReport>,
}

impl InMemoryHealthProbe {
    /// Builds a probe where every shard is reachable until configured
    /// otherwise.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the report returned for `shard_id` on every subsequent probe.
    pub fn set_report(&self, shard_id: ShardId, report: HealthReport) {
        self.reports.insert(shard_id, report);
    }
}

#[async_trait]
impl ShardHealthProbe for InMemoryHealthProbe {
    async fn probe(&self, shard_id: &ShardId, _token: &CancellationToken) -> ShardisResult<HealthReport> {
        Ok(self
            .reports
            .get(shard_id)
            .map(|entry| entry.value().clone())
            .unwrap_or(HealthReport {
                reachable: true,
                description: "no probe configured, defaulting to reachable".to_string(),
                latency_ms: 0,
            }))
    }
}
