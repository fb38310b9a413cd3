//! MessageBus port - ordered, durable, at-least-once topic transport.
//!
//! Consumers join a named group; every record of a topic is handed to exactly
//! one member of each group. A delivery stays pending until the consumer
//! commits it; a delivery dropped without commit goes back to the group.
//!
//! Every error here is a transport fault: the owning loop stops and the
//! process is expected to be restarted from outside.

use async_trait::async_trait;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::domain::RecordId;

/// Header naming the node that published a record.
pub const ORIGIN_HEADER: &str = "origin";

#[derive(Debug, Clone, Error)]
pub enum BusError {
    #[error("consumer for topic {topic} lost its connection")]
    Disconnected { topic: String },

    #[error("publish to topic {topic} was not acknowledged: {reason}")]
    Publish { topic: String, reason: String },

    #[error("bus transport failure: {0}")]
    Transport(String),
}

/// Where a consumer group that has never committed starts reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetReset {
    /// From the first record still held by the topic.
    Earliest,
    /// Only records published after the group was created.
    Latest,
}

/// Record to append to a topic.
#[derive(Debug, Clone, Default)]
pub struct OutboundRecord {
    pub headers: BTreeMap<String, String>,
    pub payload: Vec<u8>,
}

impl OutboundRecord {
    pub fn new(payload: Vec<u8>) -> Self {
        Self {
            headers: BTreeMap::new(),
            payload,
        }
    }

    /// Serialize `value` as the JSON payload.
    pub fn json<T: serde::Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        serde_json::to_vec(value).map(Self::new)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// Record as stored in (and delivered from) a topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub id: RecordId,
    pub topic: String,
    pub offset: u64,
    pub headers: BTreeMap<String, String>,
    pub payload: Vec<u8>,
}

impl Record {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.payload)
    }
}

/// A record handed to one consumer.
///
/// The consumer owns it and must either `commit` it or drop it (which makes
/// the group deliver it again).
#[async_trait]
pub trait Delivery: Send {
    fn record(&self) -> &Record;

    /// Mark the record as processed for this group.
    async fn commit(self: Box<Self>) -> Result<(), BusError>;
}

/// One member of a consumer group.
#[async_trait]
pub trait BusConsumer: Send {
    /// Wait for the next record assigned to this member.
    async fn next(&mut self) -> Result<Box<dyn Delivery>, BusError>;
}

#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Append a record and wait for the broker to acknowledge it.
    async fn publish(&self, topic: &str, record: OutboundRecord) -> Result<RecordId, BusError>;

    /// Join `group` on `topic`.
    async fn subscribe(
        &self,
        topic: &str,
        group: &str,
        reset: OffsetReset,
    ) -> Result<Box<dyn BusConsumer>, BusError>;
}
