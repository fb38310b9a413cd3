//! StatusListener - relays status changes published by other processes to
//! this process's subscribers.
//!
//! Each process joins the status topic under its own group, so every
//! process sees every change. Records this process published itself were
//! already pushed locally and are skipped.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};

use super::registry::{PushResult, SubscriberRegistry};
use crate::domain::{NodeId, STATUS_TOPIC, StatusChanged, SyncError};
use crate::ports::{MessageBus, ORIGIN_HEADER, OffsetReset, Record};

pub struct StatusListener {
    bus: Arc<dyn MessageBus>,
    registry: SubscriberRegistry,
    node_id: NodeId,
}

impl StatusListener {
    pub fn new(bus: Arc<dyn MessageBus>, registry: SubscriberRegistry, node_id: NodeId) -> Self {
        Self {
            bus,
            registry,
            node_id,
        }
    }

    pub fn group(&self) -> String {
        format!("status-listener-{}", self.node_id)
    }

    /// Join the status topic. Only changes published after this point are
    /// relayed.
    pub async fn subscribe(self) -> Result<ListeningStatus, SyncError> {
        let consumer = self
            .bus
            .subscribe(STATUS_TOPIC, &self.group(), OffsetReset::Latest)
            .await?;
        info!(group = %self.group(), "status listener subscribed");
        Ok(ListeningStatus {
            listener: self,
            consumer,
        })
    }

    /// Push one broadcast record to the local subscriber, if any.
    ///
    /// Returns `None` for own records and undecodable payloads.
    pub fn relay(&self, record: &Record) -> Option<PushResult> {
        let own = self.node_id.to_string();
        if record.header(ORIGIN_HEADER) == Some(own.as_str()) {
            return None;
        }
        match record.decode::<StatusChanged>() {
            Ok(event) => Some(self.registry.deliver(event)),
            Err(err) => {
                warn!(record = %record.id, error = %err, "undecodable status change; skipping");
                None
            }
        }
    }
}

/// A listener that has joined its group and can run.
pub struct ListeningStatus {
    listener: StatusListener,
    consumer: Box<dyn crate::ports::BusConsumer>,
}

impl ListeningStatus {
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), SyncError> {
        loop {
            if *shutdown.borrow() {
                break;
            }

            let delivery = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                delivery = self.consumer.next() => delivery?,
            };

            self.listener.relay(delivery.record());
            delivery.commit().await?;
        }

        info!(group = %self.listener.group(), "status listener stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::domain::{SyncTaskId, TaskStatus};
    use crate::impls::InMemoryBus;
    use crate::ports::OutboundRecord;

    async fn broadcast(bus: &InMemoryBus, origin: NodeId, event: StatusChanged) {
        let record = OutboundRecord::json(&event)
            .unwrap()
            .with_header(ORIGIN_HEADER, origin.to_string());
        bus.publish(STATUS_TOPIC, record).await.unwrap();
    }

    #[tokio::test]
    async fn relays_changes_from_other_nodes() {
        let bus = InMemoryBus::new();
        let registry = SubscriberRegistry::new();
        let node = NodeId::generate();
        let listener = StatusListener::new(Arc::new(bus.clone()), registry.clone(), node);
        let mut sub = registry.subscribe(SyncTaskId::new(5));

        let event = StatusChanged::new(SyncTaskId::new(5), TaskStatus::StageC);
        broadcast(&bus, NodeId::generate(), event).await;
        let record = bus.published(STATUS_TOPIC)[0].clone();

        assert_eq!(listener.relay(&record), Some(PushResult::Pushed));
        assert_eq!(sub.recv().await, Some(event));
    }

    #[tokio::test]
    async fn skips_own_records() {
        let bus = InMemoryBus::new();
        let registry = SubscriberRegistry::new();
        let node = NodeId::generate();
        let listener = StatusListener::new(Arc::new(bus.clone()), registry.clone(), node);
        let mut sub = registry.subscribe(SyncTaskId::new(5));

        broadcast(&bus, node, StatusChanged::new(SyncTaskId::new(5), TaskStatus::StageA)).await;
        let record = bus.published(STATUS_TOPIC)[0].clone();

        assert_eq!(listener.relay(&record), None);
        assert_eq!(sub.try_recv(), None);
    }

    #[tokio::test]
    async fn running_listener_evicts_on_finished_status() {
        let bus = InMemoryBus::new();
        let registry = SubscriberRegistry::new();
        let listener = StatusListener::new(Arc::new(bus.clone()), registry.clone(), NodeId::generate())
            .subscribe()
            .await
            .unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(listener.run(shutdown_rx));

        let mut sub = registry.subscribe(SyncTaskId::new(9));
        let other = NodeId::generate();
        broadcast(&bus, other, StatusChanged::new(SyncTaskId::new(9), TaskStatus::StageB)).await;
        broadcast(&bus, other, StatusChanged::new(SyncTaskId::new(9), TaskStatus::Completed)).await;

        let first = tokio::time::timeout(Duration::from_secs(1), sub.recv()).await.unwrap();
        let second = tokio::time::timeout(Duration::from_secs(1), sub.recv()).await.unwrap();
        assert_eq!(first.map(|e| e.status), Some(TaskStatus::StageB));
        assert_eq!(second.map(|e| e.status), Some(TaskStatus::Completed));
        assert!(!registry.is_subscribed(SyncTaskId::new(9)));

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn closed_bus_stops_the_listener() {
        let bus = InMemoryBus::new();
        let listener = StatusListener::new(Arc::new(bus.clone()), SubscriberRegistry::new(), NodeId::generate())
            .subscribe()
            .await
            .unwrap();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(listener.run(shutdown_rx));

        bus.close();
        let result = handle.await.unwrap();
        assert!(matches!(result, Err(SyncError::Transport(_))));
    }
}
