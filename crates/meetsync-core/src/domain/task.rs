//! Sync task record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{SyncTaskId, TaskStatus};

/// One meeting-synchronization job as held by the status store.
///
/// - `id` is assigned by the store.
/// - `meeting_id` is an external reference; several tasks may share it over
///   time, but at most one of them is unfinished (checked at admission).
/// - `user_id` is the owner, used for status queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncTask {
    pub id: SyncTaskId,
    pub meeting_id: String,
    pub user_id: String,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SyncTask {
    pub fn new(
        id: SyncTaskId,
        meeting_id: impl Into<String>,
        user_id: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            meeting_id: meeting_id.into(),
            user_id: user_id.into(),
            status: TaskStatus::Started,
            created_at: now,
            updated_at: now,
        }
    }

    /// Overwrite the status and bump `updated_at`.
    pub fn set_status(&mut self, status: TaskStatus, now: DateTime<Utc>) {
        self.status = status;
        self.updated_at = now;
    }

    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.user_id == user_id
    }

    pub fn is_in_flight(&self) -> bool {
        !self.status.is_finished()
    }
}

/// Row shape of a user's task list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSummary {
    pub id: SyncTaskId,
    pub meeting_id: String,
    pub status: TaskStatus,
}

impl From<&SyncTask> for TaskSummary {
    fn from(task: &SyncTask) -> Self {
        Self {
            id: task.id,
            meeting_id: task.meeting_id.clone(),
            status: task.status,
        }
    }
}
