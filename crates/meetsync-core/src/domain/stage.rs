//! Pipeline stages and the topics linking them.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::TaskStatus;

/// Topic carrying freshly admitted tasks (consumed by stage A).
pub const START_TOPIC: &str = "start";

/// Topic carrying tasks that passed stage A.
pub const STAGE_B_TOPIC: &str = "stage_B";

/// Topic carrying tasks that passed stage B.
pub const STAGE_C_TOPIC: &str = "stage_C";

/// Broadcast topic of status changes, one consumer group per listener.
pub const STATUS_TOPIC: &str = "status_updates";

/// One step of the fixed three-step pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Stage {
    A,
    B,
    C,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::A, Stage::B, Stage::C];

    /// Topic this stage consumes.
    pub fn topic(self) -> &'static str {
        match self {
            Stage::A => START_TOPIC,
            Stage::B => STAGE_B_TOPIC,
            Stage::C => STAGE_C_TOPIC,
        }
    }

    /// Topic a successful run forwards to; `None` means the task is done.
    pub fn next_topic(self) -> Option<&'static str> {
        match self {
            Stage::A => Some(STAGE_B_TOPIC),
            Stage::B => Some(STAGE_C_TOPIC),
            Stage::C => None,
        }
    }

    /// Status written while the stage is running.
    pub fn running_status(self) -> TaskStatus {
        match self {
            Stage::A => TaskStatus::StageA,
            Stage::B => TaskStatus::StageB,
            Stage::C => TaskStatus::StageC,
        }
    }

    /// Consumer group shared by every instance of this stage.
    pub fn consumer_group(self) -> &'static str {
        match self {
            Stage::A => "sync-stage-a",
            Stage::B => "sync-stage-b",
            Stage::C => "sync-stage-c",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.running_status().as_str())
    }
}
