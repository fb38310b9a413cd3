//! SyncAppBuilder - wires ports, config and the app services together.
//!
//! `build()` fails fast when a port is missing, naming every missing one.
//! `in_memory()` fills the gaps with the in-process implementations.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::admission::Admission;
use super::gate::TaskGate;
use super::listener::StatusListener;
use super::notifier::StatusNotifier;
use super::orchestrator::PipelineHandle;
use super::processor::{StageContext, StageProcessor};
use super::query::StatusQuery;
use super::registry::SubscriberRegistry;
use crate::config::PipelineConfig;
use crate::domain::{NodeId, Stage, SyncError};
use crate::impls::{InMemoryBus, InMemoryStatusCache, InMemoryStatusStore, SimulatedWork};
use crate::observability::{PipelineCounters, StageCounts};
use crate::ports::{MessageBus, StageWork, StatusCache, StatusStore};

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Missing components: {0:?}. Provide them or call in_memory().")]
    MissingComponents(Vec<&'static str>),
}

#[derive(Default)]
pub struct SyncAppBuilder {
    store: Option<Arc<dyn StatusStore>>,
    cache: Option<Arc<dyn StatusCache>>,
    bus: Option<Arc<dyn MessageBus>>,
    work: Option<Arc<dyn StageWork>>,
    config: PipelineConfig,
}

impl SyncAppBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn store(mut self, store: Arc<dyn StatusStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn cache(mut self, cache: Arc<dyn StatusCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn bus(mut self, bus: Arc<dyn MessageBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn stage_work(mut self, work: Arc<dyn StageWork>) -> Self {
        self.work = Some(work);
        self
    }

    /// Fill every port not provided so far with its in-process version.
    /// Stage work becomes [`SimulatedWork`] with the configured delay and
    /// fault rate.
    pub fn in_memory(mut self) -> Self {
        if self.store.is_none() {
            self.store = Some(Arc::new(InMemoryStatusStore::new()));
        }
        if self.cache.is_none() {
            self.cache = Some(Arc::new(InMemoryStatusCache::new()));
        }
        if self.bus.is_none() {
            self.bus = Some(Arc::new(InMemoryBus::new()));
        }
        if self.work.is_none() {
            self.work = Some(Arc::new(SimulatedWork::new(
                self.config.stage_delay,
                self.config.fault_one_in,
            )));
        }
        self
    }

    pub fn build(self) -> Result<SyncApp, BuildError> {
        let mut missing = Vec::new();
        if self.store.is_none() {
            missing.push("status store");
        }
        if self.cache.is_none() {
            missing.push("status cache");
        }
        if self.bus.is_none() {
            missing.push("message bus");
        }
        if self.work.is_none() {
            missing.push("stage work");
        }
        let (Some(store), Some(cache), Some(bus), Some(work)) =
            (self.store, self.cache, self.bus, self.work)
        else {
            return Err(BuildError::MissingComponents(missing));
        };

        let config = self.config;
        let registry = SubscriberRegistry::new();
        let notifier = Arc::new(StatusNotifier::new(
            store.clone(),
            cache.clone(),
            registry.clone(),
            bus.clone(),
            config.cache_ttl,
            config.node_id,
        ));

        Ok(SyncApp {
            admission: Admission::new(store.clone(), bus.clone(), notifier.clone()),
            query: StatusQuery::new(store.clone(), cache, config.cache_ttl),
            stage: StageContext {
                bus,
                store,
                notifier,
                work,
                gate: TaskGate::new(),
                retry: config.retry.clone(),
                stage_timeout: config.stage_timeout,
                counters: Arc::new(PipelineCounters::default()),
            },
            registry,
            config,
        })
    }
}

/// The assembled service: admission, queries, subscriptions and the
/// pipeline that drives tasks through the stages.
pub struct SyncApp {
    admission: Admission,
    query: StatusQuery,
    stage: StageContext,
    registry: SubscriberRegistry,
    config: PipelineConfig,
}

impl SyncApp {
    pub fn admission(&self) -> &Admission {
        &self.admission
    }

    pub fn query(&self) -> &StatusQuery {
        &self.query
    }

    pub fn registry(&self) -> &SubscriberRegistry {
        &self.registry
    }

    pub fn node_id(&self) -> NodeId {
        self.config.node_id
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn counts(&self) -> BTreeMap<Stage, StageCounts> {
        self.stage.counters.snapshot()
    }

    /// Start `consumers_per_stage` consumers for each stage plus the status
    /// listener.
    ///
    /// The listener has joined its group when this returns, so no change
    /// published afterwards is missed.
    pub async fn spawn_pipeline(&self) -> Result<PipelineHandle, SyncError> {
        let listener = StatusListener::new(
            self.stage.bus.clone(),
            self.registry.clone(),
            self.config.node_id,
        )
        .subscribe()
        .await?;

        let processors = Stage::ALL
            .into_iter()
            .flat_map(|stage| {
                (0..self.config.consumers_per_stage)
                    .map(move |member| (stage, member))
            })
            .map(|(stage, member)| StageProcessor::new(stage, member, self.stage.clone()))
            .collect();

        Ok(PipelineHandle::spawn(processors, listener))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::ScriptedWork;

    #[test]
    fn test_build_success_in_memory() {
        let app = SyncAppBuilder::new().in_memory().build();
        assert!(app.is_ok());
    }

    #[test]
    fn test_build_missing_components() {
        let app = SyncAppBuilder::new()
            .stage_work(Arc::new(ScriptedWork::always_succeed()))
            .build();
        assert!(matches!(
            app,
            Err(BuildError::MissingComponents(missing))
                if missing == vec!["status store", "status cache", "message bus"]
        ));
    }

    #[test]
    fn test_in_memory_keeps_provided_ports() {
        let bus = InMemoryBus::new();
        let app = SyncAppBuilder::new()
            .bus(Arc::new(bus.clone()))
            .in_memory()
            .build();
        assert!(app.is_ok());
    }

    #[tokio::test]
    async fn spawns_one_loop_per_consumer_and_shuts_down_cleanly() {
        let config = PipelineConfig {
            consumers_per_stage: 2,
            ..PipelineConfig::default()
        };
        let app = SyncAppBuilder::new()
            .config(config)
            .stage_work(Arc::new(ScriptedWork::always_succeed()))
            .in_memory()
            .build()
            .unwrap();

        let handle = app.spawn_pipeline().await.unwrap();
        handle.shutdown_and_join().await.unwrap();
    }
}
