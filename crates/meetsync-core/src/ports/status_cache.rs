//! StatusCache port - fast-path key-value cache in front of the store.
//!
//! Never authoritative. Entries expire after their TTL and are overwritten
//! on every notifier write.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::domain::{SyncTaskId, TaskStatus};

/// Reserved cache value meaning "queried and confirmed absent".
pub const NOT_FOUND_SENTINEL: &str = "not_found";

/// Cache key for a task's status.
pub fn task_status_key(task_id: SyncTaskId) -> String {
    format!("task-status_{task_id}")
}

/// Value stored under [`task_status_key`].
///
/// `Found` carries the owner so a hit can still be checked against the
/// requesting user without a store round-trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CachedStatus {
    Found { status: TaskStatus, owner: String },
    NotFound(NotFoundSentinel),
}

/// Serializes as the bare string `"not_found"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotFoundSentinel {
    #[serde(rename = "not_found")]
    NotFound,
}

impl CachedStatus {
    pub fn found(status: TaskStatus, owner: impl Into<String>) -> Self {
        CachedStatus::Found {
            status,
            owner: owner.into(),
        }
    }

    pub fn not_found() -> Self {
        CachedStatus::NotFound(NotFoundSentinel::NotFound)
    }

    pub fn status(&self) -> Option<TaskStatus> {
        match self {
            CachedStatus::Found { status, .. } => Some(*status),
            CachedStatus::NotFound(_) => None,
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("status cache unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait StatusCache: Send + Sync {
    /// `None` means "never queried or expired", unlike the not-found sentinel.
    async fn get(&self, task_id: SyncTaskId) -> Result<Option<CachedStatus>, CacheError>;

    async fn set(
        &self,
        task_id: SyncTaskId,
        value: CachedStatus,
        ttl: Duration,
    ) -> Result<(), CacheError>;
}
