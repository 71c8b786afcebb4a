use serde::{Deserialize, Serialize};

/// Health classification of a single shard, as observed by a [`crate::traits::ShardHealthProbe`]
/// through the hysteresis thresholds configured on a health policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    /// The shard is accepting traffic.
    Healthy,
    /// The shard has failed enough consecutive probes to be excluded.
    Unhealthy,
}

impl Default for HealthStatus {
    fn default() -> Self {
        Self::Healthy
    }
}

/// How a query executor reacts to unhealthy shards.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GatingMode {
    /// Silently skip unhealthy shards and query the rest.
    BestEffort,
    /// Fail the whole query if any targeted shard is unhealthy.
    Strict,
    /// Proceed only if at least this many targeted shards are healthy.
    RequireMinimum(usize),
}

impl Default for GatingMode {
    fn default() -> Self {
        Self::BestEffort
    }
}

/// How a query executor reacts to a per-shard error during fan-out.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureStrategy {
    /// Rethrow the first shard error encountered.
    FailFast,
    /// Collect shard errors; complete using the shards that succeeded.
    /// If every shard fails, the aggregate error is still raised.
    BestEffort,
}

impl Default for FailureStrategy {
    fn default() -> Self {
        Self::FailFast
    }
}

/// What a query executor backend supports.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// Whether the backend can produce a locally ordered per-shard stream,
    /// a prerequisite for the ordered k-way merge.
    pub ordering: bool,
    /// Whether the backend exposes paged reads the adaptive materializer
    /// can drive.
    pub pagination: bool,
}
