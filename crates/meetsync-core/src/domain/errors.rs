//! Errors and their operational classification.

use thiserror::Error;

use super::{Stage, SyncTaskId};
use crate::ports::{BusError, CacheError, StoreError};

/// How an error should be handled by whoever receives it.
///
/// - Client: surfaced to the API caller (conflict, not found).
/// - Transient: infrastructure hiccup; the caller may retry.
/// - Stage: stage work failed; terminal for that task only.
/// - Fatal: the owning process must stop and be restarted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Client,
    Transient,
    Stage,
    Fatal,
}

/// Domain error for admission, queries and the pipeline loops.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("sync for meeting {meeting_id} already in progress (task {task_id})")]
    AdmissionConflict {
        meeting_id: String,
        task_id: SyncTaskId,
    },

    #[error("no sync task found with id {0}")]
    NotFound(SyncTaskId),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("stage {stage} failed for task {task_id}: {reason}")]
    StageFailure {
        stage: Stage,
        task_id: SyncTaskId,
        reason: String,
    },

    #[error("transport fault: {0}")]
    Transport(#[from] BusError),

    #[error("payload encoding failed: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("pipeline loop {name} stopped: {reason}")]
    LoopStopped { name: String, reason: String },
}

impl SyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::AdmissionConflict { .. } | SyncError::NotFound(_) => ErrorKind::Client,
            SyncError::Store(_) | SyncError::Cache(_) => ErrorKind::Transient,
            SyncError::StageFailure { .. } => ErrorKind::Stage,
            SyncError::Transport(_) | SyncError::Encode(_) | SyncError::LoopStopped { .. } => {
                ErrorKind::Fatal
            }
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}
