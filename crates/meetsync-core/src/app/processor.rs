//! StageProcessor - one consumer of one stage.
//!
//! Per delivery:
//! 1. under the task's gate, skip unless the task can move to this stage's
//!    running status, else write it
//! 2. run the stage work (outside the gate)
//! 3. under the gate again, drop the result if the task moved on meanwhile,
//!    else forward / complete / fail
//! 4. commit the delivery
//!
//! Transient store/cache errors are retried per [`RetryPolicy`]; when
//! attempts run out, or on any transport fault, the loop stops with the
//! delivery uncommitted so the group hands it out again.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use super::gate::TaskGate;
use super::notifier::StatusNotifier;
use super::retry::RetryPolicy;
use crate::domain::{Outcome, Stage, StageMessage, SyncError, TaskStatus};
use crate::observability::PipelineCounters;
use crate::ports::{
    MessageBus, OffsetReset, OutboundRecord, Record, StageFault, StageWork, StatusStore,
};

/// What the processor did with one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Stage succeeded and the task went to the next topic.
    Forwarded,
    /// Last stage succeeded; the task is `completed`.
    Completed,
    /// Stage work failed; the task is `failed`.
    Failed,
    /// Unknown task, or the task is already at or past a later status.
    Skipped,
    /// The task moved on while the work ran; the result was dropped.
    Superseded,
    /// Payload could not be decoded.
    Malformed,
}

/// Dependencies shared by every processor of a process.
#[derive(Clone)]
pub struct StageContext {
    pub bus: Arc<dyn MessageBus>,
    pub store: Arc<dyn StatusStore>,
    pub notifier: Arc<StatusNotifier>,
    pub work: Arc<dyn StageWork>,
    pub gate: TaskGate,
    pub retry: RetryPolicy,
    pub stage_timeout: Option<Duration>,
    pub counters: Arc<PipelineCounters>,
}

pub struct StageProcessor {
    stage: Stage,
    member: usize,
    ctx: StageContext,
}

impl StageProcessor {
    pub fn new(stage: Stage, member: usize, ctx: StageContext) -> Self {
        Self { stage, member, ctx }
    }

    pub fn name(&self) -> String {
        format!("{}-{}", self.stage.consumer_group(), self.member)
    }

    /// Consume the stage topic until shutdown or a fault.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<(), SyncError> {
        let topic = self.stage.topic();
        let mut consumer = self
            .ctx
            .bus
            .subscribe(topic, self.stage.consumer_group(), OffsetReset::Earliest)
            .await?;
        info!(stage = %self.stage, member = self.member, topic, "stage consumer started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            // next() may wait indefinitely; race it against shutdown
            let delivery = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                delivery = consumer.next() => delivery?,
            };

            // Dyn deliveries are Send but not Sync; keep no borrow across awaits.
            let record = delivery.record().clone();
            self.handle(&record).await?;
            delivery.commit().await?;
        }

        info!(stage = %self.stage, member = self.member, "stage consumer stopped");
        Ok(())
    }

    /// Process one record, retrying transient errors.
    pub async fn handle(&self, record: &Record) -> Result<Disposition, SyncError> {
        let counters = self.ctx.counters.stage(self.stage);
        let message: StageMessage = match record.decode() {
            Ok(message) => message,
            Err(err) => {
                error!(stage = %self.stage, record = %record.id, error = %err, "undecodable stage message; skipping");
                counters.record_skipped();
                return Ok(Disposition::Malformed);
            }
        };

        let mut attempts = 1;
        loop {
            let processed = self.process(&message).await;
            self.ctx.gate.release(message.task_id);
            match processed {
                Ok(disposition) => {
                    match disposition {
                        Disposition::Forwarded | Disposition::Completed => {
                            counters.record_succeeded()
                        }
                        Disposition::Failed => counters.record_failed(),
                        Disposition::Skipped
                        | Disposition::Superseded
                        | Disposition::Malformed => counters.record_skipped(),
                    }
                    return Ok(disposition);
                }
                // The task vanished between read and write.
                Err(SyncError::NotFound(task_id)) => {
                    warn!(stage = %self.stage, %task_id, "task disappeared mid-transition; skipping");
                    counters.record_skipped();
                    return Ok(Disposition::Skipped);
                }
                Err(err) if err.is_retryable() && self.ctx.retry.allows_another(attempts) => {
                    let delay = self.ctx.retry.next_delay(attempts);
                    warn!(
                        stage = %self.stage,
                        task_id = %message.task_id,
                        attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient error; retrying"
                    );
                    counters.record_retry();
                    tokio::time::sleep(delay).await;
                    attempts += 1;
                }
                Err(err) => {
                    error!(stage = %self.stage, task_id = %message.task_id, attempts, error = %err, "giving up on delivery");
                    return Err(err);
                }
            }
        }
    }

    #[instrument(skip(self, message), fields(stage = %self.stage, member = self.member, task_id = %message.task_id))]
    async fn process(&self, message: &StageMessage) -> Result<Disposition, SyncError> {
        let task_id = message.task_id;
        let running = self.stage.running_status();

        {
            let _gate = self.ctx.gate.lock(task_id).await;
            let Some(task) = self.ctx.store.get(task_id).await? else {
                warn!("unknown task; skipping");
                return Ok(Disposition::Skipped);
            };
            if !task.status.can_move_to(running) {
                debug!(current = %task.status, "task already past this stage; skipping");
                return Ok(Disposition::Skipped);
            }
            self.ctx.notifier.notify(task_id, running).await?;
        }

        let outcome = self.run_work(message).await;

        let _gate = self.ctx.gate.lock(task_id).await;
        let current = self.ctx.store.get(task_id).await?.map(|task| task.status);
        if current != Some(running) {
            info!(current = ?current, "task moved on while the stage ran; dropping result");
            return Ok(Disposition::Superseded);
        }

        let disposition = if outcome.is_success() {
            match self.stage.next_topic() {
                Some(topic) => {
                    let record = OutboundRecord::json(&message.forwarded(running))?;
                    self.ctx.bus.publish(topic, record).await?;
                    debug!(topic, "forwarded");
                    Disposition::Forwarded
                }
                None => {
                    self.ctx.notifier.notify(task_id, TaskStatus::Completed).await?;
                    Disposition::Completed
                }
            }
        } else {
            let failure = SyncError::StageFailure {
                stage: self.stage,
                task_id,
                reason: outcome.reason.unwrap_or_default(),
            };
            warn!(error = %failure, "task failed");
            self.ctx.notifier.notify(task_id, TaskStatus::Failed).await?;
            Disposition::Failed
        };

        Ok(disposition)
    }

    async fn run_work(&self, message: &StageMessage) -> Outcome {
        let work = self.ctx.work.perform(self.stage, message);
        let result = match self.ctx.stage_timeout {
            Some(limit) => match tokio::time::timeout(limit, work).await {
                Ok(result) => result,
                Err(_) => Err(StageFault::new(format!(
                    "{} did not finish within {limit:?}",
                    self.stage
                ))),
            },
            None => work.await,
        };
        match result {
            Ok(()) => Outcome::success(),
            Err(fault) => Outcome::failure(fault.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;

    use super::super::registry::SubscriberRegistry;
    use crate::domain::{NodeId, START_TOPIC, STAGE_B_TOPIC, STAGE_C_TOPIC, SyncTask, SyncTaskId};
    use crate::impls::{InMemoryBus, InMemoryStatusCache, InMemoryStatusStore, ScriptedWork};
    use crate::ports::{StoreError, StatusCache};

    /// Fails the first `failures` reads, then delegates.
    struct FlakyStore {
        inner: InMemoryStatusStore,
        failures: AtomicU32,
    }

    #[async_trait]
    impl StatusStore for FlakyStore {
        async fn create(&self, meeting_id: &str, user_id: &str) -> Result<SyncTask, StoreError> {
            self.inner.create(meeting_id, user_id).await
        }

        async fn set_status(
            &self,
            task_id: SyncTaskId,
            status: TaskStatus,
        ) -> Result<Option<SyncTask>, StoreError> {
            self.inner.set_status(task_id, status).await
        }

        async fn get(&self, task_id: SyncTaskId) -> Result<Option<SyncTask>, StoreError> {
            let left = self.failures.load(Ordering::SeqCst);
            if left > 0 {
                self.failures.store(left - 1, Ordering::SeqCst);
                return Err(StoreError::Unavailable("flaky".into()));
            }
            self.inner.get(task_id).await
        }

        async fn find_in_flight(&self, meeting_id: &str) -> Result<Option<SyncTask>, StoreError> {
            self.inner.find_in_flight(meeting_id).await
        }

        async fn list_for_user(&self, user_id: &str) -> Result<Vec<SyncTask>, StoreError> {
            self.inner.list_for_user(user_id).await
        }
    }

    /// Moves the task to `jump_to` while the stage "runs".
    struct OvertakenWork {
        store: Arc<dyn StatusStore>,
        jump_to: TaskStatus,
    }

    #[async_trait]
    impl StageWork for OvertakenWork {
        async fn perform(&self, _stage: Stage, message: &StageMessage) -> Result<(), StageFault> {
            self.store
                .set_status(message.task_id, self.jump_to)
                .await
                .map_err(|e| StageFault::new(e.to_string()))?;
            Ok(())
        }
    }

    struct Fixture {
        store: Arc<dyn StatusStore>,
        bus: InMemoryBus,
        ctx: StageContext,
    }

    impl Fixture {
        fn new(work: impl StageWork + 'static) -> Self {
            Self::with_store(Arc::new(InMemoryStatusStore::new()), work)
        }

        fn with_store(store: Arc<dyn StatusStore>, work: impl StageWork + 'static) -> Self {
            let bus = InMemoryBus::new();
            let cache: Arc<dyn StatusCache> = Arc::new(InMemoryStatusCache::new());
            let notifier = Arc::new(StatusNotifier::new(
                store.clone(),
                cache,
                SubscriberRegistry::new(),
                Arc::new(bus.clone()),
                Duration::from_secs(60),
                NodeId::generate(),
            ));
            let ctx = StageContext {
                bus: Arc::new(bus.clone()),
                store: store.clone(),
                notifier,
                work: Arc::new(work),
                gate: TaskGate::new(),
                retry: RetryPolicy::new(3, Duration::ZERO, 1.0),
                stage_timeout: None,
                counters: Arc::new(PipelineCounters::default()),
            };
            Self { store, bus, ctx }
        }

        fn processor(&self, stage: Stage) -> StageProcessor {
            StageProcessor::new(stage, 0, self.ctx.clone())
        }

        async fn admitted_record(&self) -> (SyncTaskId, Record) {
            let task = self.store.create("42", "hector").await.unwrap();
            let record = OutboundRecord::json(&StageMessage::admitted(&task)).unwrap();
            self.bus.publish(START_TOPIC, record).await.unwrap();
            let published = self.bus.published(START_TOPIC);
            (task.id, published[published.len() - 1].clone())
        }

        async fn status(&self, task_id: SyncTaskId) -> TaskStatus {
            self.store.get(task_id).await.unwrap().unwrap().status
        }
    }

    #[tokio::test]
    async fn stage_a_success_forwards_to_stage_b() {
        let fx = Fixture::new(ScriptedWork::always_succeed());
        let (task_id, record) = fx.admitted_record().await;

        let disposition = fx.processor(Stage::A).handle(&record).await.unwrap();

        assert_eq!(disposition, Disposition::Forwarded);
        assert_eq!(fx.status(task_id).await, TaskStatus::StageA);
        let forwarded = fx.bus.published(STAGE_B_TOPIC);
        assert_eq!(forwarded.len(), 1);
        let message: StageMessage = forwarded[0].decode().unwrap();
        assert_eq!(message.task_id, task_id);
        assert_eq!(message.status, TaskStatus::StageA);
        assert_eq!(message.meeting_id.as_deref(), Some("42"));
    }

    #[tokio::test]
    async fn stage_c_success_completes_and_releases_the_gate() {
        let fx = Fixture::new(ScriptedWork::always_succeed());
        let (task_id, record) = fx.admitted_record().await;
        fx.store.set_status(task_id, TaskStatus::StageB).await.unwrap();

        let disposition = fx.processor(Stage::C).handle(&record).await.unwrap();

        assert_eq!(disposition, Disposition::Completed);
        assert_eq!(fx.status(task_id).await, TaskStatus::Completed);
        assert_eq!(fx.ctx.gate.tracked(), 0);
        let snap = fx.ctx.counters.snapshot();
        assert_eq!(snap[&Stage::C].succeeded, 1);
    }

    #[tokio::test]
    async fn failing_work_marks_the_task_failed_without_forwarding() {
        let fx = Fixture::new(ScriptedWork::fail_at(Stage::B));
        let (task_id, record) = fx.admitted_record().await;
        fx.store.set_status(task_id, TaskStatus::StageA).await.unwrap();

        let disposition = fx.processor(Stage::B).handle(&record).await.unwrap();

        assert_eq!(disposition, Disposition::Failed);
        assert_eq!(fx.status(task_id).await, TaskStatus::Failed);
        assert!(fx.bus.published(STAGE_C_TOPIC).is_empty());
        assert_eq!(fx.ctx.counters.snapshot()[&Stage::B].failed, 1);
    }

    #[tokio::test]
    async fn late_duplicate_never_moves_the_task_back() {
        let fx = Fixture::new(ScriptedWork::always_succeed());
        let (task_id, record) = fx.admitted_record().await;
        fx.store.set_status(task_id, TaskStatus::StageB).await.unwrap();

        let disposition = fx.processor(Stage::A).handle(&record).await.unwrap();

        assert_eq!(disposition, Disposition::Skipped);
        assert_eq!(fx.status(task_id).await, TaskStatus::StageB);
        assert!(fx.bus.published(STAGE_B_TOPIC).is_empty());
    }

    #[tokio::test]
    async fn redelivery_after_finish_is_a_no_op() {
        let fx = Fixture::new(ScriptedWork::fail_at(Stage::A));
        let (task_id, record) = fx.admitted_record().await;
        let processor = fx.processor(Stage::A);

        assert_eq!(processor.handle(&record).await.unwrap(), Disposition::Failed);
        assert_eq!(processor.handle(&record).await.unwrap(), Disposition::Skipped);
        assert_eq!(fx.status(task_id).await, TaskStatus::Failed);
    }

    #[tokio::test]
    async fn unknown_task_is_skipped() {
        let fx = Fixture::new(ScriptedWork::always_succeed());
        let payload = OutboundRecord::json(&serde_json::json!({"task_id": 77, "status": "started"}))
            .unwrap();
        fx.bus.publish(START_TOPIC, payload).await.unwrap();
        let record = fx.bus.published(START_TOPIC)[0].clone();

        let disposition = fx.processor(Stage::A).handle(&record).await.unwrap();
        assert_eq!(disposition, Disposition::Skipped);
        assert!(fx.bus.published(STAGE_B_TOPIC).is_empty());
    }

    #[tokio::test]
    async fn malformed_payload_is_skipped() {
        let fx = Fixture::new(ScriptedWork::always_succeed());
        fx.bus
            .publish(START_TOPIC, OutboundRecord::new(b"{not json".to_vec()))
            .await
            .unwrap();
        let record = fx.bus.published(START_TOPIC)[0].clone();

        let disposition = fx.processor(Stage::A).handle(&record).await.unwrap();
        assert_eq!(disposition, Disposition::Malformed);
    }

    #[tokio::test]
    async fn result_is_dropped_when_the_task_moved_on() {
        let store: Arc<dyn StatusStore> = Arc::new(InMemoryStatusStore::new());
        let work = OvertakenWork {
            store: store.clone(),
            jump_to: TaskStatus::StageB,
        };
        let fx = Fixture::with_store(store, work);
        let (task_id, record) = fx.admitted_record().await;

        let disposition = fx.processor(Stage::A).handle(&record).await.unwrap();

        assert_eq!(disposition, Disposition::Superseded);
        assert_eq!(fx.status(task_id).await, TaskStatus::StageB);
        assert!(fx.bus.published(STAGE_B_TOPIC).is_empty());
    }

    #[tokio::test]
    async fn transient_store_errors_are_retried() {
        let store = Arc::new(FlakyStore {
            inner: InMemoryStatusStore::new(),
            failures: AtomicU32::new(0),
        });
        let fx = Fixture::with_store(store.clone(), ScriptedWork::always_succeed());
        let (task_id, record) = fx.admitted_record().await;
        store.failures.store(2, Ordering::SeqCst);

        let disposition = fx.processor(Stage::A).handle(&record).await.unwrap();

        assert_eq!(disposition, Disposition::Forwarded);
        assert_eq!(fx.status(task_id).await, TaskStatus::StageA);
        assert_eq!(fx.ctx.counters.snapshot()[&Stage::A].retried, 2);
    }

    #[tokio::test]
    async fn exhausted_retries_surface_the_error() {
        let store = Arc::new(FlakyStore {
            inner: InMemoryStatusStore::new(),
            failures: AtomicU32::new(0),
        });
        let fx = Fixture::with_store(store.clone(), ScriptedWork::always_succeed());
        let (task_id, record) = fx.admitted_record().await;
        store.failures.store(10, Ordering::SeqCst);

        let err = fx.processor(Stage::A).handle(&record).await.unwrap_err();

        assert!(err.is_retryable());
        store.failures.store(0, Ordering::SeqCst);
        assert_eq!(fx.status(task_id).await, TaskStatus::Started);
    }

    #[tokio::test(start_paused = true)]
    async fn work_past_the_deadline_fails_the_task() {
        let mut fx = Fixture::new(ScriptedWork::always_succeed().with_delay(Duration::from_secs(30)));
        fx.ctx.stage_timeout = Some(Duration::from_secs(1));
        let (task_id, record) = fx.admitted_record().await;

        let disposition = fx.processor(Stage::A).handle(&record).await.unwrap();

        assert_eq!(disposition, Disposition::Failed);
        assert_eq!(fx.status(task_id).await, TaskStatus::Failed);
    }

    #[tokio::test]
    async fn publish_failure_is_fatal_and_not_retried() {
        let fx = Fixture::new(ScriptedWork::always_succeed());
        let (_task_id, record) = fx.admitted_record().await;
        fx.bus.set_reject_publishes(true);

        let err = fx.processor(Stage::A).handle(&record).await.unwrap_err();

        assert!(matches!(err, SyncError::Transport(_)));
        assert_eq!(fx.ctx.counters.snapshot()[&Stage::A].retried, 0);
    }
}
