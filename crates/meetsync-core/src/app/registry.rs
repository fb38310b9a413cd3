//! Live subscribers, at most one per task.
//!
//! The map is keyed by task id and shared by the notifier (local pushes)
//! and the status listener (pushes from other processes). A subscription
//! removes itself on drop, and a finished status evicts it. A subscriber
//! never sees the task move backwards along the happy path, whichever of
//! the two sources a push arrives from.

use std::sync::{Arc, Weak};

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::domain::{StatusChanged, SubscriptionId, SyncTaskId};

type Subscribers = DashMap<SyncTaskId, Subscriber>;

#[derive(Debug)]
struct Subscriber {
    id: SubscriptionId,
    tx: mpsc::UnboundedSender<StatusChanged>,
    last_progress: Option<u8>,
}

/// What happened to one pushed event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushResult {
    /// Nobody is subscribed to the task.
    NoSubscriber,

    /// Delivered; the subscription stays registered.
    Pushed,

    /// Behind what the subscriber already saw; dropped.
    Outdated,

    /// The subscription was removed. `delivered` is false when the
    /// subscriber had already gone away.
    Evicted { delivered: bool },
}

#[derive(Debug, Clone, Default)]
pub struct SubscriberRegistry {
    entries: Arc<Subscribers>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber for `task_id`.
    ///
    /// A newer subscription replaces an older one; the older receiver then
    /// sees its stream end.
    pub fn subscribe(&self, task_id: SyncTaskId) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = SubscriptionId::generate();
        let subscriber = Subscriber {
            id,
            tx,
            last_progress: None,
        };
        if let Some(previous) = self.entries.insert(task_id, subscriber) {
            debug!(%task_id, replaced = %previous.id, subscription = %id, "subscriber replaced");
        }
        Subscription {
            id,
            task_id,
            rx,
            entries: Arc::downgrade(&self.entries),
        }
    }

    pub fn is_subscribed(&self, task_id: SyncTaskId) -> bool {
        self.entries.contains_key(&task_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Push `event` to the task's subscriber, if any.
    ///
    /// An event behind the last one pushed is dropped. The subscriber is
    /// evicted when the push fails or the status is finished. Never blocks.
    pub fn deliver(&self, event: StatusChanged) -> PushResult {
        let task_id = event.task_id;
        let Some(mut entry) = self.entries.get_mut(&task_id) else {
            return PushResult::NoSubscriber;
        };
        let id = entry.id;

        let next = event.status.progress();
        if let (Some(last), Some(next)) = (entry.last_progress, next)
            && next < last
        {
            debug!(%task_id, subscription = %id, status = %event.status, "outdated push dropped");
            return PushResult::Outdated;
        }

        let delivered = entry.tx.send(event).is_ok();
        if delivered && next.is_some() {
            entry.last_progress = next;
        }
        // The map guard must be gone before remove_if touches the same shard.
        drop(entry);

        if !delivered {
            warn!(%task_id, subscription = %id, "subscriber disconnected; dropping it");
        }

        if !delivered || event.status.is_finished() {
            self.entries.remove_if(&task_id, |_, current| current.id == id);
            return PushResult::Evicted { delivered };
        }
        PushResult::Pushed
    }
}

/// Receiving end of a subscription.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    task_id: SyncTaskId,
    rx: mpsc::UnboundedReceiver<StatusChanged>,
    entries: Weak<Subscribers>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn task_id(&self) -> SyncTaskId {
        self.task_id
    }

    /// Next event; `None` once the subscription was evicted or replaced and
    /// everything pushed before that has been read.
    pub async fn recv(&mut self) -> Option<StatusChanged> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<StatusChanged> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(entries) = self.entries.upgrade() {
            entries.remove_if(&self.task_id, |_, current| current.id == self.id);
        }
    }
}
