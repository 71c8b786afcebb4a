//! Configuration management for shardis.
//!
//! Supports:
//! - TOML/YAML configuration files
//! - Environment variable overrides
//! - Reasonable defaults
//! - Configuration validation

use std::path::Path;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

/// Root configuration structure for a shardis deployment.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ShardisConfig {
    #[serde(default)]
    pub routing: RoutingConfig,

    #[serde(default)]
    pub query: QueryConfig,

    #[serde(default)]
    pub health: HealthConfig,

    #[serde(default)]
    pub migration: MigrationConfig,
}

impl ShardisConfig {
    /// Loads configuration from multiple sources with precedence:
    /// 1. Environment variables (highest priority)
    /// 2. Config file named by `SHARDIS_CONFIG`
    /// 3. `./config/shardis.toml`
    /// 4. `/etc/shardis/shardis.toml`
    /// 5. Hardcoded defaults (lowest priority)
    pub fn load() -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        builder = Self::set_defaults(builder)?;

        if let Ok(config_path) = std::env::var("SHARDIS_CONFIG") {
            builder = builder.add_source(File::with_name(&config_path).required(false));
        }

        builder = builder
            .add_source(File::with_name("./config/shardis").required(false))
            .add_source(File::with_name("/etc/shardis/shardis").required(false));

        // Example: SHARDIS_ROUTING__REPLICATION_FACTOR=200
        builder = builder.add_source(
            Environment::with_prefix("SHARDIS")
                .separator("__")
                .try_parsing(true),
        );

        let config: ShardisConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a specific file path, skipping environment
    /// overrides. Primarily used by tests and the CLI demo's `--config` flag.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    fn set_defaults(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        builder
            .set_default("routing.replication_factor", 100)?
            .set_default("routing.ring_hasher", "sha256")?
            .set_default("routing.key_hasher", "sha256")?
            .set_default("query.channel_capacity", Option::<i64>::None)?
            .set_default("query.command_timeout_secs", Option::<i64>::None)?
            .set_default("query.failure_strategy", "fail_fast")?
            .set_default("query.min_page_size", 64)?
            .set_default("query.max_page_size", 4096)?
            .set_default("query.target_batch_ms", 50)?
            .set_default("query.grow_factor", 2.0)?
            .set_default("query.shrink_factor", 0.5)?
            .set_default("health.probe_interval_secs", 5)?
            .set_default("health.unhealthy_threshold", 3)?
            .set_default("health.healthy_threshold", 2)?
            .set_default("health.cooldown_secs", 10)?
            .set_default("migration.copy_concurrency", 256)?
            .set_default("migration.verify_concurrency", 256)?
            .set_default("migration.max_moves_per_shard", 16)?
            .set_default("migration.swap_batch_size", 100)?
            .set_default("migration.max_retries", 5)?
            .set_default("migration.checkpoint_interval", 100)?
            .set_default("migration.checkpoint_time_secs", 30)
    }

    /// Validates configuration values beyond what `serde` can express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.routing.replication_factor == 0 {
            return Err(ConfigError::Message(
                "routing.replication_factor must be > 0".to_string(),
            ));
        }

        if let (Some(min), max) = (
            Some(self.query.min_page_size),
            self.query.max_page_size,
        ) {
            if min == 0 || max < min {
                return Err(ConfigError::Message(
                    "query.max_page_size must be >= min_page_size, both > 0".to_string(),
                ));
            }
        }

        if self.query.grow_factor <= 1.0 {
            return Err(ConfigError::Message(
                "query.grow_factor must be > 1.0".to_string(),
            ));
        }

        if !(0.0..1.0).contains(&self.query.shrink_factor) {
            return Err(ConfigError::Message(
                "query.shrink_factor must be in (0.0, 1.0)".to_string(),
            ));
        }

        if self.health.unhealthy_threshold == 0 || self.health.healthy_threshold == 0 {
            return Err(ConfigError::Message(
                "health thresholds must be > 0".to_string(),
            ));
        }

        if self.migration.max_retries == 0 {
            return Err(ConfigError::Message(
                "migration.max_retries must be > 0".to_string(),
            ));
        }

        if self.migration.swap_batch_size == 0 {
            return Err(ConfigError::Message(
                "migration.swap_batch_size must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Routing core configuration.
///
/// `ring_hasher` and `key_hasher` are separate plug points: `ring_hasher`
/// places shards' virtual nodes on the ring when it is built, `key_hasher`
/// hashes an incoming key to a ring position on lookup. A deployment that
/// changes one without the other (e.g. swapping the lookup hasher while
/// keeping ring placement stable) must be able to say so independently.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RoutingConfig {
    /// Number of virtual nodes placed per shard on the hash ring.
    pub replication_factor: u32,
    /// Which hasher builds the ring's virtual node placement: `"sha256"` or
    /// `"fnv1a"`.
    pub ring_hasher: String,
    /// Which hasher maps an incoming key to a ring position: `"sha256"` or
    /// `"fnv1a"`.
    pub key_hasher: String,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            replication_factor: 100,
            ring_hasher: "sha256".to_string(),
            key_hasher: "sha256".to_string(),
        }
    }
}

/// Fan-out query core configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueryConfig {
    /// Bounded channel capacity for unordered merge; `None` is unbounded.
    pub channel_capacity: Option<usize>,
    /// Per-shard command timeout, in seconds.
    pub command_timeout_secs: Option<u64>,
    /// `"fail_fast"` or `"best_effort"`.
    pub failure_strategy: String,
    /// Adaptive paging floor.
    pub min_page_size: usize,
    /// Adaptive paging ceiling.
    pub max_page_size: usize,
    /// Target batch wall-clock time in milliseconds.
    pub target_batch_ms: u64,
    /// Multiplicative growth applied when a batch finishes under target.
    pub grow_factor: f64,
    /// Multiplicative shrink applied when a batch finishes over target.
    pub shrink_factor: f64,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            channel_capacity: None,
            command_timeout_secs: None,
            failure_strategy: "fail_fast".to_string(),
            min_page_size: 64,
            max_page_size: 4096,
            target_batch_ms: 50,
            grow_factor: 2.0,
            shrink_factor: 0.5,
        }
    }
}

/// Health policy configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HealthConfig {
    /// Interval between probes, in seconds.
    pub probe_interval_secs: u64,
    /// Consecutive failures before a shard is marked unhealthy.
    pub unhealthy_threshold: u32,
    /// Consecutive successes before an unhealthy shard recovers.
    pub healthy_threshold: u32,
    /// Minimum time an unhealthy shard is held before it may recover.
    pub cooldown_secs: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            probe_interval_secs: 5,
            unhealthy_threshold: 3,
            healthy_threshold: 2,
            cooldown_secs: 10,
        }
    }
}

impl HealthConfig {
    /// Probe interval as a `Duration`.
    #[must_use]
    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }

    /// Cooldown as a `Duration`.
    #[must_use]
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

/// Migration core configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MigrationConfig {
    /// Global concurrent copy budget.
    pub copy_concurrency: usize,
    /// Global concurrent verify budget.
    pub verify_concurrency: usize,
    /// Per-shard concurrent move budget.
    pub max_moves_per_shard: usize,
    /// Maximum number of moves committed per swap batch.
    pub swap_batch_size: usize,
    /// Maximum retries per move before it is marked `Failed`.
    pub max_retries: u32,
    /// Checkpoint after this many moves.
    pub checkpoint_interval: usize,
    /// Checkpoint after this many seconds, whichever comes first.
    pub checkpoint_time_secs: u64,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            copy_concurrency: 256,
            verify_concurrency: 256,
            max_moves_per_shard: 16,
            swap_batch_size: 100,
            max_retries: 5,
            checkpoint_interval: 100,
            checkpoint_time_secs: 30,
        }
    }
}

impl MigrationConfig {
    /// Checkpoint time window as a `Duration`.
    #[must_use]
    pub fn checkpoint_time(&self) -> Duration {
        Duration::from_secs(self.checkpoint_time_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_configuration_matches_spec_defaults() {
        let config = ShardisConfig::default();
        assert_eq!(config.routing.replication_factor, 100);
        assert_eq!(config.migration.swap_batch_size, 100);
        assert_eq!(config.health.unhealthy_threshold, 3);
    }

    #[test]
    fn validate_rejects_bad_page_bounds() {
        let mut config = ShardisConfig::default();
        config.query.max_page_size = 10;
        config.query.min_page_size = 100;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_replication_factor() {
        let mut config = ShardisConfig::default();
        config.routing.replication_factor = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_accepts_defaults() {
        assert!(ShardisConfig::default().validate().is_ok());
    }
}
