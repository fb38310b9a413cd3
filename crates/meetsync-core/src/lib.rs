//! meetsync-core
//!
//! Meeting synchronization pipeline: a request admits a task, three stages
//! drive it forward over a message bus, and every status change lands in
//! the store, the cache, the task's live subscriber and a broadcast topic.
//!
//! - **domain**: ids, statuses, tasks, stages, wire messages, errors
//! - **ports**: StatusStore, StatusCache, MessageBus, StageWork, Clock
//! - **impls**: in-process implementations of the ports
//! - **app**: admission, queries, notifier, stage processors, wiring
//! - **config**: environment-driven settings
//! - **observability**: per-stage counters

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod observability;
pub mod ports;
