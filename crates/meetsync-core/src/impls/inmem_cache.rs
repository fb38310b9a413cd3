//! InMemoryStatusCache - development/test key-value cache with TTL.
//!
//! Entries are keyed by [`task_status_key`] so the layout matches what a
//! real key-value store would hold. Expiry uses tokio's clock, which lets
//! tests advance time with a paused runtime.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::domain::SyncTaskId;
use crate::ports::{CacheError, CachedStatus, StatusCache, task_status_key};

struct Entry {
    value: CachedStatus,
    expires_at: Instant,
}

pub struct InMemoryStatusCache {
    entries: Mutex<HashMap<String, Entry>>,
    unavailable: AtomicBool,
}

impl InMemoryStatusCache {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            unavailable: AtomicBool::new(false),
        }
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Drop one entry, as an eviction or restart would.
    pub async fn evict(&self, task_id: SyncTaskId) {
        self.entries.lock().await.remove(&task_status_key(task_id));
    }

    fn check_available(&self) -> Result<(), CacheError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable("in-memory cache switched off".into()));
        }
        Ok(())
    }
}

impl Default for InMemoryStatusCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StatusCache for InMemoryStatusCache {
    async fn get(&self, task_id: SyncTaskId) -> Result<Option<CachedStatus>, CacheError> {
        self.check_available()?;
        let key = task_status_key(task_id);
        let mut entries = self.entries.lock().await;
        match entries.get(&key) {
            Some(entry) if entry.expires_at > Instant::now() => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(&key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(
        &self,
        task_id: SyncTaskId,
        value: CachedStatus,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        self.check_available()?;
        let entry = Entry {
            value,
            expires_at: Instant::now() + ttl,
        };
        self.entries
            .lock()
            .await
            .insert(task_status_key(task_id), entry);
        Ok(())
    }
}
