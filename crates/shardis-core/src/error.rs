use thiserror::Error;

/// Canonical error type shared by the routing, query, health and migration cores.
#[derive(Debug, Error)]
pub enum ShardisError {
    /// A backing store (assignment store, shard resource, checkpoint store) failed.
    #[error("storage error: {message}")]
    Storage {
        /// Human-readable detail.
        message: String,
        /// Whether the caller should retry the operation.
        transient: bool,
    },

    /// The executor does not support a capability the caller requested.
    #[error("unsupported capability: {0}")]
    UnsupportedCapability(&'static str),

    /// A strict or minimum-quorum health gate was not satisfied.
    #[error("insufficient healthy shards: {0:?}")]
    InsufficientHealthyShards(Vec<UnhealthyShard>),

    /// Content verification between source and target shard failed.
    #[error("verification mismatch for key `{key}`")]
    VerificationMismatch {
        /// String form of the key that failed verification.
        key: String,
    },

    /// A migration plan violated a structural precondition.
    #[error("invalid plan: {message}")]
    PlanInvalid {
        /// Human-readable explanation.
        message: String,
    },

    /// Two writers raced to persist a checkpoint for the same plan.
    #[error("checkpoint conflict for plan `{plan_id}`")]
    CheckpointConflict {
        /// Identifier of the plan in conflict.
        plan_id: String,
    },

    /// The operation observed cooperative cancellation.
    #[error("operation cancelled")]
    Cancelled,

    /// Unexpected internal error.
    #[error("internal error: {message}")]
    Internal {
        /// Human-readable details for debugging purposes.
        message: String,
    },
}

impl ShardisError {
    /// Creates a transient `Storage` variant, eligible for retry.
    #[must_use]
    pub fn transient_storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            transient: true,
        }
    }

    /// Creates a non-retryable `Storage` variant.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            transient: false,
        }
    }

    /// Creates an `Internal` variant.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Creates a `PlanInvalid` variant.
    #[must_use]
    pub fn plan_invalid(message: impl Into<String>) -> Self {
        Self::PlanInvalid {
            message: message.into(),
        }
    }

    /// True if this error kind should be retried by the migration executor.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage { transient: true, .. } | Self::VerificationMismatch { .. })
    }
}

/// A shard excluded from a query by a health gate, with its last known probe.
#[derive(Debug, Clone)]
pub struct UnhealthyShard {
    /// The excluded shard.
    pub shard_id: crate::model::ShardId,
    /// Description of the last probe result that caused exclusion.
    pub last_probe: String,
}

/// Convenient result alias shared by every crate in the workspace.
pub type ShardisResult<T> = Result<T, ShardisError>;
