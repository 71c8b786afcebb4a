//! Central Prometheus metrics registry for the routing and migration cores.
//!
//! Metrics are registered lazily on first access using `once_cell::Lazy`,
//! matching the rest of the workspace.

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram, register_histogram_vec, register_int_counter_vec, register_int_gauge_vec,
    Histogram, HistogramVec, IntCounterVec, IntGaugeVec,
};

// ===== Routing Metrics =====

/// Router resolutions by outcome (`existing` or `created`).
pub static ROUTE_RESOLUTIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "shardis_route_resolutions_total",
        "Total number of router key resolutions",
        &["outcome"]
    )
    .expect("failed to register route resolutions counter")
});

/// Router resolution latency.
pub static ROUTE_LATENCY: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "shardis_route_latency_seconds",
        "Router resolution latency in seconds",
        &["outcome"],
        vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25]
    )
    .expect("failed to register route latency histogram")
});

// ===== Migration Metrics =====

/// Key moves by terminal or in-flight phase.
pub static MIGRATION_MOVES: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "shardis_migration_moves_total",
        "Total migration key moves by phase",
        &["phase"]
    )
    .expect("failed to register migration moves counter")
});

/// Retry attempts across all in-flight moves.
pub static MIGRATION_RETRIES: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "shardis_migration_retries_total",
        "Total migration retry attempts",
        &["plan_id"]
    )
    .expect("failed to register migration retries counter")
});

/// Currently active copy/verify operations.
pub static MIGRATION_ACTIVE: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "shardis_migration_active",
        "Currently in-flight migration operations",
        &["stage"]
    )
    .expect("failed to register migration active gauge")
});

/// Duration of individual migration phases.
pub static MIGRATION_PHASE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "shardis_migration_phase_duration_seconds",
        "Migration phase duration in seconds",
        &["phase"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .expect("failed to register migration phase duration histogram")
});

/// Wall-clock duration of a single `MigrationExecutor::execute` run, start
/// to final checkpoint.
pub static MIGRATION_TOTAL_ELAPSED: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "shardis_migration_total_elapsed_seconds",
        "Wall-clock duration of a full migration run, in seconds",
        vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0]
    )
    .expect("failed to register migration total elapsed histogram")
});

// ===== Health Metrics =====

/// Shard health state (0 = healthy, 1 = unhealthy).
pub static SHARD_HEALTH_STATE: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "shardis_shard_health_state",
        "Shard health state (0=healthy, 1=unhealthy)",
        &["shard_id"]
    )
    .expect("failed to register shard health state gauge")
});
