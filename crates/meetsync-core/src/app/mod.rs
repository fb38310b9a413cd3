//! App - services built on the ports.
//!
//! - **admission**: start a task for a meeting (one in flight per meeting)
//! - **query**: status lookups (cache first) and per-user listings
//! - **notifier**: the single write path for status transitions
//! - **registry**: live subscribers, one per task
//! - **processor**: stage consumers
//! - **listener**: relays status changes from other processes
//! - **orchestrator**: runs and stops the loops
//! - **builder**: wiring and fail-fast validation

pub mod admission;
pub mod builder;
pub mod gate;
pub mod listener;
pub mod notifier;
pub mod orchestrator;
pub mod processor;
pub mod query;
pub mod registry;
pub mod retry;

pub use admission::{Admission, AdmissionReceipt};
pub use builder::{BuildError, SyncApp, SyncAppBuilder};
pub use gate::TaskGate;
pub use listener::{ListeningStatus, StatusListener};
pub use notifier::StatusNotifier;
pub use orchestrator::{PipelineHandle, PipelineStopper};
pub use processor::{Disposition, StageContext, StageProcessor};
pub use query::StatusQuery;
pub use registry::{PushResult, SubscriberRegistry, Subscription};
pub use retry::RetryPolicy;
