//! StatusQuery - read side: cache first, store on miss.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument, warn};

use crate::domain::{SyncError, SyncTaskId, TaskStatus, TaskSummary};
use crate::ports::{CachedStatus, StatusCache, StatusStore};

pub struct StatusQuery {
    store: Arc<dyn StatusStore>,
    cache: Arc<dyn StatusCache>,
    cache_ttl: Duration,
}

impl StatusQuery {
    pub fn new(store: Arc<dyn StatusStore>, cache: Arc<dyn StatusCache>, cache_ttl: Duration) -> Self {
        Self {
            store,
            cache,
            cache_ttl,
        }
    }

    /// Current status of `task_id` as seen by `user_id`.
    ///
    /// A task owned by someone else is reported exactly like a missing one.
    /// Misses are filled from the store, including confirmed absence.
    #[instrument(skip(self))]
    pub async fn status(&self, task_id: SyncTaskId, user_id: &str) -> Result<TaskStatus, SyncError> {
        match self.cache.get(task_id).await {
            Ok(Some(entry)) => {
                debug!("cache hit");
                return visible_to(task_id, user_id, &entry);
            }
            Ok(None) => debug!("cache miss"),
            Err(err) => warn!(error = %err, "cache read failed; asking the store"),
        }

        let entry = match self.store.get(task_id).await? {
            Some(task) => CachedStatus::found(task.status, task.user_id),
            None => CachedStatus::not_found(),
        };
        if let Err(err) = self.cache.set(task_id, entry.clone(), self.cache_ttl).await {
            warn!(error = %err, "cache fill failed");
        }
        visible_to(task_id, user_id, &entry)
    }

    /// Every task `user_id` has started, oldest first.
    #[instrument(skip(self))]
    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<TaskSummary>, SyncError> {
        let tasks = self.store.list_for_user(user_id).await?;
        Ok(tasks.iter().map(TaskSummary::from).collect())
    }
}

fn visible_to(task_id: SyncTaskId, user_id: &str, entry: &CachedStatus) -> Result<TaskStatus, SyncError> {
    match entry {
        CachedStatus::Found { status, owner } if owner == user_id => Ok(*status),
        _ => Err(SyncError::NotFound(task_id)),
    }
}
