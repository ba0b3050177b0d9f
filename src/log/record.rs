//! Record types exchanged with the log.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// A record to be appended to the log.
///
/// A `value` of `None` is a tombstone: under a compacting cleanup policy
/// it deletes the key from the materialized view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProducerRecord {
    /// Target topic name.
    pub topic: String,
    /// Optional target partition (the broker assigns one by key hash when
    /// `None`).
    pub partition: Option<u32>,
    /// Encoded row key. Drives partition assignment and compaction.
    pub key: Bytes,
    /// Encoded row container, `None` for a tombstone.
    pub value: Option<Bytes>,
    /// Optional producer-supplied timestamp (epoch millis).
    pub timestamp: Option<i64>,
}

impl ProducerRecord {
    /// A record carrying a row container.
    pub fn new(topic: impl Into<String>, key: Bytes, value: Bytes) -> Self {
        Self {
            topic: topic.into(),
            partition: None,
            key,
            value: Some(value),
            timestamp: None,
        }
    }

    /// A tombstone for the given key.
    pub fn tombstone(topic: impl Into<String>, key: Bytes) -> Self {
        Self {
            topic: topic.into(),
            partition: None,
            key,
            value: None,
            timestamp: None,
        }
    }

    /// Whether this record is a tombstone.
    pub fn is_tombstone(&self) -> bool {
        self.value.is_none()
    }
}

/// A record read back from the log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumerRecord {
    /// Source topic name.
    pub topic: String,
    /// Partition the record belongs to.
    pub partition: u32,
    /// Offset within the partition.
    pub offset: i64,
    /// Encoded row key.
    pub key: Bytes,
    /// Encoded row container, `None` for a tombstone.
    pub value: Option<Bytes>,
    /// Broker-assigned timestamp (epoch millis).
    pub timestamp: i64,
}

/// Per-record delivery acknowledgment returned by an append.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryAck {
    /// Topic the record landed in.
    pub topic: String,
    /// Assigned partition.
    pub partition: u32,
    /// Assigned offset.
    pub offset: i64,
    /// Broker-assigned timestamp (epoch millis).
    pub timestamp: i64,
}
