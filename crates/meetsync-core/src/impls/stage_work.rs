//! StageWork implementations.
//!
//! - `SimulatedWork`: sleeps, then fails with probability 1/N.
//! - `ScriptedWork`: deterministic outcomes chosen up front (tests, demos).

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

use crate::domain::{Stage, StageMessage, SyncTaskId};
use crate::ports::{StageFault, StageWork};

/// Bounded delay plus random fault injection.
#[derive(Debug, Clone)]
pub struct SimulatedWork {
    delay: Duration,
    fault_one_in: u32,
}

impl SimulatedWork {
    /// `fault_one_in = 0` disables fault injection.
    pub fn new(delay: Duration, fault_one_in: u32) -> Self {
        Self {
            delay,
            fault_one_in,
        }
    }
}

impl Default for SimulatedWork {
    fn default() -> Self {
        Self::new(Duration::from_secs(2), 11)
    }
}

#[async_trait]
impl StageWork for SimulatedWork {
    async fn perform(&self, stage: Stage, message: &StageMessage) -> Result<(), StageFault> {
        tokio::time::sleep(self.delay).await;
        let boom = self.fault_one_in > 0 && rand::thread_rng().gen_ratio(1, self.fault_one_in);
        if boom {
            return Err(StageFault::new(format!(
                "injected fault in {stage} for task {}",
                message.task_id
            )));
        }
        Ok(())
    }
}

/// Outcomes fixed in advance.
///
/// A stage fails if it is listed for every task (`fail_at`) or for the
/// specific task (`fail_task_at`); everything else succeeds after `delay`.
#[derive(Debug, Clone, Default)]
pub struct ScriptedWork {
    delay: Duration,
    failing_stages: HashSet<Stage>,
    failing_tasks: HashMap<SyncTaskId, Stage>,
}

impl ScriptedWork {
    pub fn always_succeed() -> Self {
        Self::default()
    }

    pub fn fail_at(stage: Stage) -> Self {
        Self::default().and_fail_at(stage)
    }

    pub fn and_fail_at(mut self, stage: Stage) -> Self {
        self.failing_stages.insert(stage);
        self
    }

    pub fn fail_task_at(mut self, task_id: SyncTaskId, stage: Stage) -> Self {
        self.failing_tasks.insert(task_id, stage);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn fails(&self, stage: Stage, task_id: SyncTaskId) -> bool {
        self.failing_stages.contains(&stage) || self.failing_tasks.get(&task_id) == Some(&stage)
    }
}

#[async_trait]
impl StageWork for ScriptedWork {
    async fn perform(&self, stage: Stage, message: &StageMessage) -> Result<(), StageFault> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fails(stage, message.task_id) {
            return Err(StageFault::new(format!("scripted failure in {stage}")));
        }
        Ok(())
    }
}
