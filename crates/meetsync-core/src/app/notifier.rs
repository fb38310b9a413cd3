//! StatusNotifier - the single write path for status transitions.
//!
//! Order per transition:
//! 1. store (authoritative; a failure aborts the rest)
//! 2. cache (best effort)
//! 3. local subscriber push
//! 4. broadcast on the status topic, tagged with this node's id
//!
//! `announce` runs steps 2-4 for a task whose status the store already holds.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, instrument, warn};

use super::registry::SubscriberRegistry;
use crate::domain::{NodeId, STATUS_TOPIC, StatusChanged, SyncError, SyncTask, SyncTaskId, TaskStatus};
use crate::ports::{CachedStatus, MessageBus, ORIGIN_HEADER, OutboundRecord, StatusCache, StatusStore};

pub struct StatusNotifier {
    store: Arc<dyn StatusStore>,
    cache: Arc<dyn StatusCache>,
    registry: SubscriberRegistry,
    bus: Arc<dyn MessageBus>,
    cache_ttl: Duration,
    node_id: NodeId,
}

impl StatusNotifier {
    pub fn new(
        store: Arc<dyn StatusStore>,
        cache: Arc<dyn StatusCache>,
        registry: SubscriberRegistry,
        bus: Arc<dyn MessageBus>,
        cache_ttl: Duration,
        node_id: NodeId,
    ) -> Self {
        Self {
            store,
            cache,
            registry,
            bus,
            cache_ttl,
            node_id,
        }
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// Record `status` for `task_id` and fan it out.
    ///
    /// Returns the task as stored. Store errors surface before anything else
    /// is touched; a broadcast failure surfaces as a transport fault after
    /// store, cache and local push already happened.
    #[instrument(skip(self), fields(node = %self.node_id))]
    pub async fn notify(
        &self,
        task_id: SyncTaskId,
        status: TaskStatus,
    ) -> Result<SyncTask, SyncError> {
        let task = self
            .store
            .set_status(task_id, status)
            .await?
            .ok_or(SyncError::NotFound(task_id))?;

        self.fan_out(&task).await?;
        info!(meeting_id = %task.meeting_id, "status changed");
        Ok(task)
    }

    /// Fan out the status `task` already has in the store, without writing it.
    #[instrument(skip(self, task), fields(node = %self.node_id, task_id = %task.id))]
    pub async fn announce(&self, task: &SyncTask) -> Result<(), SyncError> {
        self.fan_out(task).await?;
        info!(meeting_id = %task.meeting_id, status = %task.status, "status announced");
        Ok(())
    }

    async fn fan_out(&self, task: &SyncTask) -> Result<(), SyncError> {
        let entry = CachedStatus::found(task.status, task.user_id.as_str());
        if let Err(err) = self.cache.set(task.id, entry, self.cache_ttl).await {
            warn!(error = %err, "cache refresh failed; readers fall back to the store");
        }

        let event = StatusChanged::new(task.id, task.status);
        self.registry.deliver(event);

        let record =
            OutboundRecord::json(&event)?.with_header(ORIGIN_HEADER, self.node_id.to_string());
        self.bus.publish(STATUS_TOPIC, record).await?;
        Ok(())
    }
}
