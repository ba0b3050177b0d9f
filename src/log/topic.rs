//! Topic descriptions and per-topic configuration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Cleanup policy for a topic's log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CleanupPolicy {
    /// Drop records past the retention window.
    Delete,
    /// Keep only the latest record per key; tombstones remove the key.
    Compact,
}

impl Default for CleanupPolicy {
    fn default() -> Self {
        Self::Delete
    }
}

/// Per-topic configuration knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicConfig {
    /// Maximum size of a single record value in bytes (default 1 MB).
    pub max_message_bytes: usize,
    /// Retention time in milliseconds (-1 for infinite).
    pub retention_ms: i64,
    /// Log cleanup policy.
    pub cleanup_policy: CleanupPolicy,
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            max_message_bytes: 1_048_576,
            retention_ms: 7 * 24 * 60 * 60 * 1000, // 7 days
            cleanup_policy: CleanupPolicy::default(),
        }
    }
}

impl TopicConfig {
    /// Configuration for a table topic: the log is the system of record,
    /// so retention is infinite and the log compacts by key.
    pub fn table() -> Self {
        Self {
            max_message_bytes: 1_048_576,
            retention_ms: -1,
            cleanup_policy: CleanupPolicy::Compact,
        }
    }
}

/// A partitioned topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topic {
    /// Topic name.
    pub name: String,
    /// Number of partitions.
    pub num_partitions: u32,
    /// Replication factor (meaningful for distributed brokers; the
    /// in-memory broker records it without acting on it).
    pub replication_factor: u16,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Topic-level configuration.
    pub config: TopicConfig,
}

impl Topic {
    /// Create a topic with default configuration.
    pub fn new(name: String, num_partitions: u32, replication_factor: u16) -> Self {
        Self {
            name,
            num_partitions,
            replication_factor,
            created_at: Utc::now(),
            config: TopicConfig::default(),
        }
    }

    /// Create a compacted table topic.
    pub fn table(name: String, num_partitions: u32, replication_factor: u16) -> Self {
        Self {
            name,
            num_partitions,
            replication_factor,
            created_at: Utc::now(),
            config: TopicConfig::table(),
        }
    }
}
