//! Per-task serialization of status transitions inside one process.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::domain::SyncTaskId;

/// Keyed async lock shared by every stage consumer of a process.
///
/// Read-check-write of a task's status happens under its lock, so two
/// consumers cannot interleave a stale write between another's check and
/// write.
#[derive(Debug, Clone, Default)]
pub struct TaskGate {
    locks: Arc<DashMap<SyncTaskId, Arc<Mutex<()>>>>,
}

impl TaskGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, task_id: SyncTaskId) -> OwnedMutexGuard<()> {
        let lock = self.locks.entry(task_id).or_default().value().clone();
        lock.lock_owned().await
    }

    /// Forget the task's lock unless someone holds or awaits it.
    pub fn release(&self, task_id: SyncTaskId) {
        self.locks
            .remove_if(&task_id, |_, lock| Arc::strong_count(lock) == 1);
    }

    pub fn tracked(&self) -> usize {
        self.locks.len()
    }
}
