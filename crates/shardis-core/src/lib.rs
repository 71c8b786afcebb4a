//! Core domain types and traits shared by the routing, query, health and
//! migration crates of shardis.

pub mod config;
pub mod error;
pub mod health;
pub mod metrics;
pub mod migration;
pub mod model;
pub mod traits;

pub use config::{HealthConfig, MigrationConfig, QueryConfig, RoutingConfig, ShardisConfig};
pub use error::{ShardisError, ShardisResult, UnhealthyShard};
pub use health::{Capabilities, FailureStrategy, GatingMode, HealthStatus};
pub use migration::{
    KeyMove, KeyMoveState, MigrationCheckpoint, MigrationPlan, MigrationSummary,
    CHECKPOINT_SCHEMA_VERSION,
};
pub use model::{
    Canonicalize, Fnv1a64Hasher, Fnv1aRingHasher, HashRing, RingHasher, Sha256RingHasher,
    ShardId, ShardKey, ShardMap, StableHasher, TopologySnapshot,
};
pub use traits::{
    AssignmentStore, Canonicalizer, CheckpointStore, DataMover, HealthReport, JsonCanonicalizer,
    ShardHealthProbe, ShardResourceFactory, Swapper, VerificationStrategy,
};
