//! Task status state machine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Status of a sync task.
///
/// State transitions:
/// - Started -> StageA -> StageB -> StageC -> Completed
/// - any non-finished status -> Failed
///
/// Serialized names match what the store and the wire carry
/// (`"started"`, `"stage_A"`, ..., `"failed"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    #[serde(rename = "started")]
    Started,

    #[serde(rename = "stage_A")]
    StageA,

    #[serde(rename = "stage_B")]
    StageB,

    #[serde(rename = "stage_C")]
    StageC,

    #[serde(rename = "completed")]
    Completed,

    #[serde(rename = "failed")]
    Failed,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 6] = [
        TaskStatus::Started,
        TaskStatus::StageA,
        TaskStatus::StageB,
        TaskStatus::StageC,
        TaskStatus::Completed,
        TaskStatus::Failed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Started => "started",
            TaskStatus::StageA => "stage_A",
            TaskStatus::StageB => "stage_B",
            TaskStatus::StageC => "stage_C",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }

    /// Is this a finished status (no further transitions)?
    pub fn is_finished(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// Position along the happy path. `Failed` has no position.
    pub fn progress(self) -> Option<u8> {
        match self {
            TaskStatus::Started => Some(0),
            TaskStatus::StageA => Some(1),
            TaskStatus::StageB => Some(2),
            TaskStatus::StageC => Some(3),
            TaskStatus::Completed => Some(4),
            TaskStatus::Failed => None,
        }
    }

    /// Whether moving from `self` to `next` keeps the task moving forward.
    ///
    /// Rewriting the same status is allowed so redelivered messages can be
    /// reprocessed; finished statuses accept nothing.
    pub fn can_move_to(self, next: TaskStatus) -> bool {
        if self.is_finished() {
            return false;
        }
        match (self.progress(), next.progress()) {
            (_, None) => true,
            (Some(current), Some(next)) => next >= current,
            (None, Some(_)) => false,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown task status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for TaskStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}
