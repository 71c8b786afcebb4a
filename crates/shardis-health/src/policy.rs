use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use shardis_core::{GatingMode, HealthStatus, ShardId, ShardisError, ShardisResult, UnhealthyShard};

/// Thresholds governing the Healthy/Unhealthy hysteresis for every shard
/// tracked by a [`HealthPolicy`].
#[derive(Debug, Clone)]
pub struct HealthPolicyConfig {
    /// Consecutive probe failures before `Healthy -> Unhealthy`.
    pub unhealthy_threshold: u32,
    /// Consecutive probe successes before `Unhealthy -> Healthy`.
    pub healthy_threshold: u32,
    /// Minimum time a shard must remain `Unhealthy` before recovery is
    /// considered, even if successes accumulate faster.
    pub cooldown: Duration,
}

impl Default for HealthPolicyConfig {
    fn default() -> Self {
        Self {
            unhealthy_threshold: 3,
            healthy_threshold: 2,
            cooldown: Duration::from_secs(10),
        }
    }
}

impl From<&shardis_core::HealthConfig> for HealthPolicyConfig {
    fn from(cfg: &shardis_core::HealthConfig) -> Self {
        Self {
            unhealthy_threshold: cfg.unhealthy_threshold,
            healthy_threshold: cfg.healthy_threshold,
            cooldown: cfg.cooldown(),
        }
    }
}

/// Tracked state for a single shard.
#[derive(Debug, Clone)]
struct ShardHealthState {
    status: HealthStatus,
    consecutive_failures: u32,
    consecutive_successes: u32,
    last_transition: Instant,
    last_probe: String,
}

impl Default for ShardHealthState {
    fn default() -> Self {
        Self {
            status: HealthStatus::Healthy,
            consecutive_failures: 0,
            consecutive_successes: 0,
            last_transition: Instant::now(),
            last_probe: "no probe recorded yet".to_string(),
        }
    }
}

/// Snapshot of a shard's health, returned by [`HealthPolicy::status_of`].
#[derive(Debug, Clone)]
pub struct ShardHealth {
    /// Current classification.
    pub status: HealthStatus,
    /// Description of the most recent probe result.
    pub last_probe: String,
}

/// Classifies shards Healthy/Unhealthy from probe results using consecutive
/// failure/success thresholds with a recovery cooldown, and gates query
/// target lists against that classification.
pub struct HealthPolicy {
    config: HealthPolicyConfig,
    shards: RwLock<HashMap<ShardId, ShardHealthState>>,
}

impl HealthPolicy {
    /// Builds a policy; every shard starts `Healthy` until its first probe.
    #[must_use]
    pub fn new(config: HealthPolicyConfig) -> Self {
        Self {
            config,
            shards: RwLock::new(HashMap::new()),
        }
    }

    /// Records a probe result for `shard_id`, advancing its hysteresis
    /// state machine.
    pub fn record_result(&self, shard_id: &ShardId, reachable: bool, description: impl Into<String>) {
        let description = description.into();
        let mut guard = self.shards.write();
        let state = guard.entry(shard_id.clone()).or_default();
        state.last_probe = description;

        if reachable {
            state.consecutive_successes += 1;
            state.consecutive_failures = 0;
        } else {
            state.consecutive_failures += 1;
            state.consecutive_successes = 0;
        }

        match state.status {
            HealthStatus::Healthy => {
                if state.consecutive_failures >= self.config.unhealthy_threshold {
                    tracing::warn!(%shard_id, "shard marked unhealthy");
                    state.status = HealthStatus::Unhealthy;
                    state.last_transition = Instant::now();
                    state.consecutive_successes = 0;
                }
            }
            HealthStatus::Unhealthy => {
                let cooldown_elapsed = state.last_transition.elapsed() >= self.config.cooldown;
                if cooldown_elapsed && state.consecutive_successes >= self.config.healthy_threshold {
                    tracing::info!(%shard_id, "shard recovered to healthy");
                    state.status = HealthStatus::Healthy;
                    state.last_transition = Instant::now();
                    state.consecutive_failures = 0;
                }
            }
        }

        let metric_value = match state.status {
            HealthStatus::Healthy => 0,
            HealthStatus::Unhealthy => 1,
        };
        shardis_core::metrics::SHARD_HEALTH_STATE
            .with_label_values(&[shard_id.as_str()])
            .set(metric_value);
    }

    /// Returns the current classification for `shard_id`, defaulting to
    /// `Healthy` for shards never probed.
    #[must_use]
    pub fn status_of(&self, shard_id: &ShardId) -> ShardHealth {
        let guard = self.shards.read();
        match guard.get(shard_id) {
            Some(state) => ShardHealth {
                status: state.status,
                last_probe: state.last_probe.clone(),
            },
            None => ShardHealth {
                status: HealthStatus::Healthy,
                last_probe: "no probe recorded yet".to_string(),
            },
        }
    }

    /// Applies `mode` to `targets`, returning the shards a query may be
    /// sent to.
    ///
    /// # Errors
    ///
    /// Returns [`ShardisError::InsufficientHealthyShards`] when `Strict`
    /// mode finds any unhealthy target, or `RequireMinimum(n)` finds fewer
    /// than `n` healthy targets.
    pub fn gate(&self, targets: &[ShardId], mode: GatingMode) -> ShardisResult<Vec<ShardId>> {
        let mut healthy = Vec::with_capacity(targets.len());
        let mut unhealthy = Vec::new();

        for shard_id in targets {
            let health = self.status_of(shard_id);
            match health.status {
                HealthStatus::Healthy => healthy.push(shard_id.clone()),
                HealthStatus::Unhealthy => unhealthy.push(UnhealthyShard {
                    shard_id: shard_id.clone(),
                    last_probe: health.last_probe,
                }),
            }
        }

        match mode {
            GatingMode::BestEffort => Ok(healthy),
            GatingMode::Strict => {
                if unhealthy.is_empty() {
                    Ok(healthy)
                } else {
                    Err(ShardisError::InsufficientHealthyShards(unhealthy))
                }
            }
            GatingMode::RequireMinimum(n) => {
                if healthy.len() >= n {
                    Ok(healthy)
                } else {
                    Err(ShardisError::InsufficientHealthyShards(unhealthy))
                }
            }
        }
    }
}
