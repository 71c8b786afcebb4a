use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use shardis_core::ShardId;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Both permits held for the duration of one copy or verify operation;
/// dropping releases the global and per-shard budget together.
pub struct MovePermit {
    _global: OwnedSemaphorePermit,
    _shard: OwnedSemaphorePermit,
}

/// Caps concurrent copy and verify operations globally and per shard.
///
/// The executor acquires a global permit plus a per-shard permit before
/// starting a copy or verify and releases both on completion. Per-shard
/// semaphores are created lazily on first use of a given shard.
pub struct BudgetGovernor {
    global_copy: Arc<Semaphore>,
    global_verify: Arc<Semaphore>,
    per_shard_limit: usize,
    per_shard_copy: RwLock<HashMap<ShardId, Arc<Semaphore>>>,
    per_shard_verify: RwLock<HashMap<ShardId, Arc<Semaphore>>>,
}

impl BudgetGovernor {
    /// Builds a governor with the given global and per-shard budgets.
    #[must_use]
    pub fn new(copy_concurrency: usize, verify_concurrency: usize, per_shard_limit: usize) -> Self {
        Self {
            global_copy: Arc::new(Semaphore::new(copy_concurrency.max(1))),
            global_verify: Arc::new(Semaphore::new(verify_concurrency.max(1))),
            per_shard_limit: per_shard_limit.max(1),
            per_shard_copy: RwLock::new(HashMap::new()),
            per_shard_verify: RwLock::new(HashMap::new()),
        }
    }

    fn shard_semaphore(
        &self,
        map: &RwLock<HashMap<ShardId, Arc<Semaphore>>>,
        shard_id: &ShardId,
    ) -> Arc<Semaphore> {
        if let Some(sem) = map.read().get(shard_id) {
            return sem.clone();
        }
        map.write()
            .entry(shard_id.clone())
            .or_insert_with(|| Arc::new(Semaphore::new(self.per_shard_limit)))
            .clone()
    }

    /// Acquires a global and per-`shard_id` copy permit, suspending until
    /// both budgets have room.
    pub async fn acquire_copy(&self, shard_id: &ShardId) -> MovePermit {
        let shard_sem = self.shard_semaphore(&self.per_shard_copy, shard_id);
        let global = self
            .global_copy
            .clone()
            .acquire_owned()
            .await
            .expect("global copy semaphore is never closed");
        let shard = shard_sem
            .acquire_owned()
            .await
            .expect("per-shard copy semaphore is never closed");
        MovePermit { _global: global, _shard: shard }
    }

    /// Acquires a global and per-`shard_id` verify permit, suspending until
    /// both budgets have room.
    pub async fn acquire_verify(&self, shard_id: &ShardId) -> MovePermit {
        let shard_sem = self.shard_semaphore(&self.per_shard_verify, shard_id);
        let global = self
            .global_verify
            .clone()
            .acquire_owned()
            .await
            .expect("global verify semaphore is never closed");
        let shard = shard_sem
            .acquire_owned()
            .await
            .expect("per-shard verify semaphore is never closed");
        MovePermit { _global: global, _shard: shard }
    }
}
