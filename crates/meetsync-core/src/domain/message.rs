//! Payloads carried on the bus and pushed to subscribers.

use serde::{Deserialize, Serialize};

use super::{SyncTask, SyncTaskId, TaskStatus};

/// Message flowing between stages: `{task_id, meeting_id?, user_id?, status}`.
///
/// Immutable once published. Stages treat it as "drive this task", never as
/// an increment, so a redelivered copy is harmless.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageMessage {
    pub task_id: SyncTaskId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meeting_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    pub status: TaskStatus,
}

impl StageMessage {
    pub fn admitted(task: &SyncTask) -> Self {
        Self {
            task_id: task.id,
            meeting_id: Some(task.meeting_id.clone()),
            user_id: Some(task.user_id.clone()),
            status: task.status,
        }
    }

    /// Copy of this message to forward downstream after a stage succeeded.
    pub fn forwarded(&self, status: TaskStatus) -> Self {
        Self {
            status,
            ..self.clone()
        }
    }
}

/// Status-change event: `{task_id, status}`.
///
/// Same shape on the broadcast topic and in subscriber pushes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChanged {
    pub task_id: SyncTaskId,
    pub status: TaskStatus,
}

impl StatusChanged {
    pub fn new(task_id: SyncTaskId, status: TaskStatus) -> Self {
        Self { task_id, status }
    }
}
