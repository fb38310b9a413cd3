//! Ports - the seams between the pipeline and the outside world.
//!
//! - StatusStore is the source of truth.
//! - StatusCache is a best-effort fast path in front of it.
//! - MessageBus links the stages and carries broadcast status changes.
//! - StageWork is the injected stage behaviour.

pub mod clock;
pub mod message_bus;
pub mod stage_work;
pub mod status_cache;
pub mod status_store;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::message_bus::{
    BusConsumer, BusError, Delivery, MessageBus, OffsetReset, OutboundRecord, Record,
    ORIGIN_HEADER,
};
pub use self::stage_work::{StageFault, StageWork};
pub use self::status_cache::{
    CacheError, CachedStatus, NOT_FOUND_SENTINEL, StatusCache, task_status_key,
};
pub use self::status_store::{StatusStore, StoreError};
