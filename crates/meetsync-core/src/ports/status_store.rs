//! StatusStore port - the durable record of every task, source of truth.
//!
//! Writes are unconditional overwrites (last writer wins). Callers that need
//! ordering guarantees provide them above this layer.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{SyncTask, SyncTaskId, TaskStatus};

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Store unreachable; the caller may retry.
    #[error("status store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait StatusStore: Send + Sync {
    /// Create a task with status `started` and a fresh, monotonic id.
    async fn create(&self, meeting_id: &str, user_id: &str) -> Result<SyncTask, StoreError>;

    /// Overwrite the status and bump `updated_at`.
    ///
    /// Returns the updated task, or `None` if no task has this id.
    async fn set_status(
        &self,
        task_id: SyncTaskId,
        status: TaskStatus,
    ) -> Result<Option<SyncTask>, StoreError>;

    async fn get(&self, task_id: SyncTaskId) -> Result<Option<SyncTask>, StoreError>;

    /// The unfinished task for this meeting, if any.
    async fn find_in_flight(&self, meeting_id: &str) -> Result<Option<SyncTask>, StoreError>;

    /// All tasks owned by `user_id`, ordered by id.
    async fn list_for_user(&self, user_id: &str) -> Result<Vec<SyncTask>, StoreError>;
}
