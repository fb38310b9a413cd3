//! InMemoryStatusStore - development/test status store.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{SyncTask, SyncTaskId, TaskStatus};
use crate::ports::{Clock, StatusStore, StoreError, SystemClock};

struct StoreState {
    tasks: BTreeMap<SyncTaskId, SyncTask>,
    next_id: i64,
}

/// Status store backed by a map behind a mutex.
///
/// Ids start at 1 and only grow. `set_unavailable(true)` makes every call
/// fail with [`StoreError::Unavailable`], to exercise transient-error paths.
pub struct InMemoryStatusStore {
    state: Mutex<StoreState>,
    clock: Arc<dyn Clock>,
    unavailable: AtomicBool,
}

impl InMemoryStatusStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(StoreState {
                tasks: BTreeMap::new(),
                next_id: 1,
            }),
            clock,
            unavailable: AtomicBool::new(false),
        }
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("in-memory store switched off".into()));
        }
        Ok(())
    }
}

impl Default for InMemoryStatusStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StatusStore for InMemoryStatusStore {
    async fn create(&self, meeting_id: &str, user_id: &str) -> Result<SyncTask, StoreError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        let id = SyncTaskId::new(state.next_id);
        state.next_id += 1;
        let task = SyncTask::new(id, meeting_id, user_id, self.clock.now());
        state.tasks.insert(id, task.clone());
        Ok(task)
    }

    async fn set_status(
        &self,
        task_id: SyncTaskId,
        status: TaskStatus,
    ) -> Result<Option<SyncTask>, StoreError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        let now = self.clock.now();
        Ok(state.tasks.get_mut(&task_id).map(|task| {
            task.set_status(status, now);
            task.clone()
        }))
    }

    async fn get(&self, task_id: SyncTaskId) -> Result<Option<SyncTask>, StoreError> {
        self.check_available()?;
        let state = self.state.lock().await;
        Ok(state.tasks.get(&task_id).cloned())
    }

    async fn find_in_flight(&self, meeting_id: &str) -> Result<Option<SyncTask>, StoreError> {
        self.check_available()?;
        let state = self.state.lock().await;
        Ok(state
            .tasks
            .values()
            .find(|task| task.meeting_id == meeting_id && task.is_in_flight())
            .cloned())
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<SyncTask>, StoreError> {
        self.check_available()?;
        let state = self.state.lock().await;
        Ok(state
            .tasks
            .values()
            .filter(|task| task.is_owned_by(user_id))
            .cloned()
            .collect())
    }
}
