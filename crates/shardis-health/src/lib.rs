//! Hysteresis-based health classification for shard gating.

mod policy;

pub use policy::{HealthPolicy, HealthPolicyConfig, ShardHealth};
