//! Impls - in-process implementations of the ports.
//!
//! - **InMemoryStatusStore / InMemoryStatusCache / InMemoryBus**: development
//!   and test stand-ins for the database, the key-value cache and the broker.
//! - **SimulatedWork / ScriptedWork**: stage behaviours.

pub mod inmem_bus;
pub mod inmem_cache;
pub mod inmem_store;
pub mod stage_work;

pub use self::inmem_bus::InMemoryBus;
pub use self::inmem_cache::InMemoryStatusCache;
pub use self::inmem_store::InMemoryStatusStore;
pub use self::stage_work::{ScriptedWork, SimulatedWork};
