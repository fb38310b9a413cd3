//! StageWork port - what a stage actually does for a task.
//!
//! The pipeline only cares whether the work returned `Ok` or `Err`; the
//! strategy is injected so tests can force outcomes.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{Stage, StageMessage};

/// Error raised by stage work. Always resolves the task to `failed`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct StageFault(pub String);

impl StageFault {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

#[async_trait]
pub trait StageWork: Send + Sync {
    async fn perform(&self, stage: Stage, message: &StageMessage) -> Result<(), StageFault>;
}
