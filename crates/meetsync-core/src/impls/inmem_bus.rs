//! InMemoryBus - development/test message bus.
//!
//! Each topic is one append-only log (a single partition). Each consumer
//! group keeps a cursor into the log plus a list of offsets to hand out
//! again. Members of one group share that cursor, so a record reaches exactly
//! one member per group, but members run concurrently and may finish records
//! in any order.
//!
//! Locking: a std `Mutex` guards the logs and is only held inside the small
//! synchronous helpers below, never across an `.await`. Waiting consumers
//! park on a `Notify` that is woken on every publish and every redelivery.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::domain::RecordId;
use crate::ports::{
    BusConsumer, BusError, Delivery, MessageBus, OffsetReset, OutboundRecord, Record,
};

struct GroupCursor {
    /// Next never-delivered offset.
    next: usize,
    /// Offsets delivered but dropped without commit.
    redeliver: VecDeque<usize>,
}

#[derive(Default)]
struct TopicLog {
    records: Vec<Record>,
    groups: HashMap<String, GroupCursor>,
}

#[derive(Default)]
struct BusState {
    topics: HashMap<String, TopicLog>,
    closed: bool,
    reject_publishes: bool,
}

impl BusState {
    fn claim(&mut self, topic: &str, group: &str) -> Option<Record> {
        let TopicLog { records, groups } = self.topics.get_mut(topic)?;
        let cursor = groups.get_mut(group)?;
        let offset = match cursor.redeliver.pop_front() {
            Some(offset) => offset,
            None if cursor.next < records.len() => {
                cursor.next += 1;
                cursor.next - 1
            }
            None => return None,
        };
        records.get(offset).cloned()
    }
}

struct Shared {
    state: Mutex<BusState>,
    notify: Notify,
}

impl Shared {
    fn lock(&self) -> Result<MutexGuard<'_, BusState>, BusError> {
        self.state
            .lock()
            .map_err(|_| BusError::Transport("bus state poisoned".into()))
    }
}

/// In-memory [`MessageBus`].
///
/// Cloning is cheap; clones share the same topics.
#[derive(Clone)]
pub struct InMemoryBus {
    shared: Arc<Shared>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(BusState::default()),
                notify: Notify::new(),
            }),
        }
    }

    /// Every record ever appended to `topic`, in offset order.
    pub fn published(&self, topic: &str) -> Vec<Record> {
        self.shared
            .lock()
            .map(|state| {
                state
                    .topics
                    .get(topic)
                    .map(|log| log.records.clone())
                    .unwrap_or_default()
            })
            .unwrap_or_default()
    }

    /// Records of `topic` not yet handed to (or handed back by) `group`.
    pub fn backlog(&self, topic: &str, group: &str) -> usize {
        let Ok(state) = self.shared.lock() else {
            return 0;
        };
        let Some(log) = state.topics.get(topic) else {
            return 0;
        };
        log.groups.get(group).map_or(log.records.len(), |cursor| {
            log.records.len().saturating_sub(cursor.next) + cursor.redeliver.len()
        })
    }

    /// Simulate losing the broker: consumers and publishers start failing.
    pub fn close(&self) {
        if let Ok(mut state) = self.shared.lock() {
            state.closed = true;
        }
        self.shared.notify.notify_waiters();
    }

    /// Make publishes fail without disconnecting consumers.
    pub fn set_reject_publishes(&self, reject: bool) {
        if let Ok(mut state) = self.shared.lock() {
            state.reject_publishes = reject;
        }
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageBus for InMemoryBus {
    async fn publish(&self, topic: &str, record: OutboundRecord) -> Result<RecordId, BusError> {
        let id = {
            let mut state = self.shared.lock()?;
            if state.closed || state.reject_publishes {
                return Err(BusError::Publish {
                    topic: topic.to_string(),
                    reason: "broker unreachable".into(),
                });
            }
            let log = state.topics.entry(topic.to_string()).or_default();
            let id = RecordId::generate();
            let offset = log.records.len() as u64;
            log.records.push(Record {
                id,
                topic: topic.to_string(),
                offset,
                headers: record.headers,
                payload: record.payload,
            });
            id
        };
        // Appended before returning: that is the durability acknowledgement.
        self.shared.notify.notify_waiters();
        Ok(id)
    }

    async fn subscribe(
        &self,
        topic: &str,
        group: &str,
        reset: OffsetReset,
    ) -> Result<Box<dyn BusConsumer>, BusError> {
        {
            let mut state = self.shared.lock()?;
            if state.closed {
                return Err(BusError::Disconnected {
                    topic: topic.to_string(),
                });
            }
            let log = state.topics.entry(topic.to_string()).or_default();
            let start = match reset {
                OffsetReset::Earliest => 0,
                OffsetReset::Latest => log.records.len(),
            };
            log.groups
                .entry(group.to_string())
                .or_insert_with(|| GroupCursor {
                    next: start,
                    redeliver: VecDeque::new(),
                });
        }
        Ok(Box::new(InMemoryConsumer {
            shared: Arc::clone(&self.shared),
            topic: topic.to_string(),
            group: group.to_string(),
        }))
    }
}

struct InMemoryConsumer {
    shared: Arc<Shared>,
    topic: String,
    group: String,
}

impl InMemoryConsumer {
    fn try_claim(&self) -> Result<Option<InMemoryDelivery>, BusError> {
        let mut state = self.shared.lock()?;
        if state.closed {
            return Err(BusError::Disconnected {
                topic: self.topic.clone(),
            });
        }
        Ok(state
            .claim(&self.topic, &self.group)
            .map(|record| InMemoryDelivery {
                shared: Arc::clone(&self.shared),
                record,
                group: self.group.clone(),
                settled: false,
            }))
    }
}

#[async_trait]
impl BusConsumer for InMemoryConsumer {
    async fn next(&mut self) -> Result<Box<dyn Delivery>, BusError> {
        loop {
            // Register interest before looking, so a publish that lands
            // between the check and the await still wakes us.
            let notified = self.shared.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(delivery) = self.try_claim()? {
                return Ok(Box::new(delivery));
            }
            notified.await;
        }
    }
}

struct InMemoryDelivery {
    shared: Arc<Shared>,
    record: Record,
    group: String,
    settled: bool,
}

#[async_trait]
impl Delivery for InMemoryDelivery {
    fn record(&self) -> &Record {
        &self.record
    }

    async fn commit(self: Box<Self>) -> Result<(), BusError> {
        let mut this = self;
        if this.shared.lock()?.closed {
            // Not settled: Drop hands the record back to the group.
            return Err(BusError::Disconnected {
                topic: this.record.topic.clone(),
            });
        }
        this.settled = true;
        Ok(())
    }
}

impl Drop for InMemoryDelivery {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        if let Ok(mut state) = self.shared.lock()
            && let Some(cursor) = state
                .topics
                .get_mut(&self.record.topic)
                .and_then(|log| log.groups.get_mut(&self.group))
        {
            cursor.redeliver.push_front(self.record.offset as usize);
        }
        self.shared.notify.notify_waiters();
    }
}
