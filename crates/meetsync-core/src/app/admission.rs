//! Admission - starts a sync task for a meeting.
//!
//! At most one unfinished task per meeting. The check and the create happen
//! under one lock so two concurrent requests for the same meeting cannot
//! both pass the check.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use super::notifier::StatusNotifier;
use crate::domain::{START_TOPIC, StageMessage, SyncError, SyncTask, SyncTaskId, TaskStatus};
use crate::ports::{MessageBus, OutboundRecord, StatusStore};

/// Returned to the caller on successful admission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionReceipt {
    pub task_id: SyncTaskId,
    pub meeting_id: String,
    pub status: TaskStatus,
}

pub struct Admission {
    store: Arc<dyn StatusStore>,
    bus: Arc<dyn MessageBus>,
    notifier: Arc<StatusNotifier>,
    admit_lock: Mutex<()>,
}

impl Admission {
    pub fn new(
        store: Arc<dyn StatusStore>,
        bus: Arc<dyn MessageBus>,
        notifier: Arc<StatusNotifier>,
    ) -> Self {
        Self {
            store,
            bus,
            notifier,
            admit_lock: Mutex::new(()),
        }
    }

    /// Create a task for `meeting_id` and hand it to stage A.
    ///
    /// Fails with [`SyncError::AdmissionConflict`] while another task for the
    /// same meeting is unfinished.
    #[instrument(skip(self))]
    pub async fn admit(
        &self,
        meeting_id: &str,
        user_id: &str,
    ) -> Result<AdmissionReceipt, SyncError> {
        let task = {
            let _admitting = self.admit_lock.lock().await;
            if let Some(existing) = self.store.find_in_flight(meeting_id).await? {
                warn!(task_id = %existing.id, status = %existing.status, "sync already in progress");
                return Err(SyncError::AdmissionConflict {
                    meeting_id: meeting_id.to_string(),
                    task_id: existing.id,
                });
            }
            self.store.create(meeting_id, user_id).await?
        };

        if let Err(err) = self.hand_off(&task).await {
            // A task nobody will ever process would block the meeting forever.
            if let Err(mark_err) = self.notifier.notify(task.id, TaskStatus::Failed).await {
                warn!(task_id = %task.id, error = %mark_err, "could not fully abandon unstarted task");
            }
            return Err(err);
        }

        info!(task_id = %task.id, "meeting synchronization task started");
        Ok(AdmissionReceipt {
            task_id: task.id,
            meeting_id: task.meeting_id,
            status: TaskStatus::Started,
        })
    }

    /// `create` already stored `started`, so a store outage after it cannot
    /// keep the task from reaching stage A.
    async fn hand_off(&self, task: &SyncTask) -> Result<(), SyncError> {
        self.notifier.announce(task).await?;
        let record = OutboundRecord::json(&StageMessage::admitted(task))?;
        self.bus.publish(START_TOPIC, record).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::super::registry::SubscriberRegistry;
    use crate::domain::{NodeId, STATUS_TOPIC, StatusChanged};
    use crate::impls::{InMemoryBus, InMemoryStatusCache, InMemoryStatusStore};
    use crate::ports::StoreError;

    /// Goes down right after its first successful `create`.
    struct OutageAfterCreate {
        inner: InMemoryStatusStore,
    }

    #[async_trait]
    impl StatusStore for OutageAfterCreate {
        async fn create(&self, meeting_id: &str, user_id: &str) -> Result<SyncTask, StoreError> {
            let task = self.inner.create(meeting_id, user_id).await?;
            self.inner.set_unavailable(true);
            Ok(task)
        }

        async fn set_status(
            &self,
            task_id: SyncTaskId,
            status: TaskStatus,
        ) -> Result<Option<SyncTask>, StoreError> {
            self.inner.set_status(task_id, status).await
        }

        async fn get(&self, task_id: SyncTaskId) -> Result<Option<SyncTask>, StoreError> {
            self.inner.get(task_id).await
        }

        async fn find_in_flight(&self, meeting_id: &str) -> Result<Option<SyncTask>, StoreError> {
            self.inner.find_in_flight(meeting_id).await
        }

        async fn list_for_user(&self, user_id: &str) -> Result<Vec<SyncTask>, StoreError> {
            self.inner.list_for_user(user_id).await
        }
    }

    struct Fixture {
        store: Arc<InMemoryStatusStore>,
        bus: InMemoryBus,
        admission: Arc<Admission>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryStatusStore::new());
        let bus = InMemoryBus::new();
        let notifier = Arc::new(StatusNotifier::new(
            store.clone(),
            Arc::new(InMemoryStatusCache::new()),
            SubscriberRegistry::new(),
            Arc::new(bus.clone()),
            Duration::from_secs(60),
            NodeId::generate(),
        ));
        let admission = Arc::new(Admission::new(
            store.clone(),
            Arc::new(bus.clone()),
            notifier,
        ));
        Fixture {
            store,
            bus,
            admission,
        }
    }

    #[tokio::test]
    async fn admits_and_publishes_to_start() {
        let fx = fixture();
        let receipt = fx.admission.admit("42", "hector").await.unwrap();

        assert_eq!(receipt.meeting_id, "42");
        assert_eq!(receipt.status, TaskStatus::Started);

        let started = fx.bus.published(START_TOPIC);
        assert_eq!(started.len(), 1);
        let message: StageMessage = started[0].decode().unwrap();
        assert_eq!(message.task_id, receipt.task_id);
        assert_eq!(message.user_id.as_deref(), Some("hector"));

        let broadcast: StatusChanged = fx.bus.published(STATUS_TOPIC)[0].decode().unwrap();
        assert_eq!(broadcast, StatusChanged::new(receipt.task_id, TaskStatus::Started));
    }

    #[tokio::test]
    async fn second_admission_conflicts_until_the_first_finishes() {
        let fx = fixture();
        let first = fx.admission.admit("42", "hector").await.unwrap();

        let err = fx.admission.admit("42", "maria").await.unwrap_err();
        assert!(matches!(
            err,
            SyncError::AdmissionConflict { ref meeting_id, task_id }
                if meeting_id == "42" && task_id == first.task_id
        ));
        assert_eq!(fx.bus.published(START_TOPIC).len(), 1);

        // Other meetings are unaffected.
        fx.admission.admit("43", "maria").await.unwrap();

        fx.store
            .set_status(first.task_id, TaskStatus::Completed)
            .await
            .unwrap();
        let again = fx.admission.admit("42", "maria").await.unwrap();
        assert!(again.task_id > first.task_id);
    }

    #[tokio::test]
    async fn concurrent_admissions_admit_exactly_one() {
        let fx = fixture();
        let attempts: Vec<_> = (0..8)
            .map(|i| {
                let admission = fx.admission.clone();
                tokio::spawn(async move { admission.admit("42", &format!("user-{i}")).await })
            })
            .collect();

        let mut admitted = 0;
        for attempt in attempts {
            if attempt.await.unwrap().is_ok() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 1);
        assert_eq!(fx.bus.published(START_TOPIC).len(), 1);
    }

    #[tokio::test]
    async fn store_outage_is_transient() {
        let fx = fixture();
        fx.store.set_unavailable(true);
        let err = fx.admission.admit("42", "hector").await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn unpublished_task_does_not_block_the_meeting() {
        let fx = fixture();
        fx.bus.set_reject_publishes(true);
        let err = fx.admission.admit("42", "hector").await.unwrap_err();
        assert!(matches!(err, SyncError::Transport(_)));

        fx.bus.set_reject_publishes(false);
        fx.admission.admit("42", "hector").await.unwrap();
    }

    #[tokio::test]
    async fn store_outage_after_create_still_reaches_stage_a() {
        let store = Arc::new(OutageAfterCreate {
            inner: InMemoryStatusStore::new(),
        });
        let bus = InMemoryBus::new();
        let notifier = Arc::new(StatusNotifier::new(
            store.clone(),
            Arc::new(InMemoryStatusCache::new()),
            SubscriberRegistry::new(),
            Arc::new(bus.clone()),
            Duration::from_secs(60),
            NodeId::generate(),
        ));
        let admission = Admission::new(store.clone(), Arc::new(bus.clone()), notifier);

        let receipt = admission.admit("42", "hector").await.unwrap();

        let started = bus.published(START_TOPIC);
        assert_eq!(started.len(), 1);
        let message: StageMessage = started[0].decode().unwrap();
        assert_eq!(message.task_id, receipt.task_id);

        store.inner.set_unavailable(false);
        let in_flight = store.inner.find_in_flight("42").await.unwrap().unwrap();
        assert_eq!(in_flight.id, receipt.task_id);
        assert_eq!(in_flight.status, TaskStatus::Started);
    }
}
