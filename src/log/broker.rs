//! The [`RecordLog`] trait and the in-process broker implementation.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Notify;

use super::partition_log::PartitionLog;
use super::record::{ConsumerRecord, DeliveryAck, ProducerRecord};
use super::topic::{CleanupPolicy, Topic, TopicConfig};

/// Errors produced by a record log.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("topic '{0}' already exists")]
    TopicAlreadyExists(String),
    #[error("topic '{0}' not found")]
    TopicNotFound(String),
    #[error("partition {1} not found for topic '{0}'")]
    PartitionNotFound(String, u32),
    #[error("record exceeds max size ({0} > {1})")]
    MessageTooLarge(usize, usize),
}

/// The log interface the engine depends on: topic administration,
/// appending with per-record acknowledgment, fetching, and a per-topic
/// data-arrival notifier so replay pipelines can sleep between arrivals.
#[async_trait]
pub trait RecordLog: Send + Sync {
    /// Create a topic. Fails if it already exists.
    async fn create_topic(
        &self,
        name: &str,
        num_partitions: u32,
        replication_factor: u16,
        config: TopicConfig,
    ) -> Result<Topic, BrokerError>;

    /// Delete a topic and all its partitions.
    async fn delete_topic(&self, name: &str) -> Result<(), BrokerError>;

    /// Describe a topic.
    async fn describe_topic(&self, name: &str) -> Option<Topic>;

    /// Append a record, returning its delivery acknowledgment.
    async fn append(&self, record: ProducerRecord) -> Result<DeliveryAck, BrokerError>;

    /// Block until previously appended records are durable.
    async fn flush(&self) -> Result<(), BrokerError>;

    /// Fetch up to `max_records` from one partition starting at `offset`.
    async fn fetch(
        &self,
        topic: &str,
        partition: u32,
        offset: i64,
        max_records: usize,
    ) -> Result<Vec<ConsumerRecord>, BrokerError>;

    /// High watermark per partition.
    async fn latest_offsets(&self, topic: &str) -> Result<Vec<(u32, i64)>, BrokerError>;

    /// Notifier pulsed after records are appended to `topic`.
    fn data_notifier(&self, topic: &str) -> Arc<Notify>;
}

/// Broker-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Default number of partitions for new topics.
    pub default_partitions: u32,
    /// Default replication factor for new topics.
    pub default_replication_factor: u16,
    /// Compaction runs once a compacted partition accumulates this many
    /// records.
    pub compact_trigger_records: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            default_partitions: 1,
            default_replication_factor: 1,
            compact_trigger_records: 1024,
        }
    }
}

/// In-process record log: partitioned, append-only, compacting.
pub struct InMemoryLogBroker {
    topics: DashMap<String, Topic>,
    partitions: DashMap<(String, u32), RwLock<PartitionLog>>,
    notifiers: DashMap<String, Arc<Notify>>,
    config: BrokerConfig,
    append_count: AtomicU64,
}

impl InMemoryLogBroker {
    /// Create a broker with default configuration.
    pub fn new() -> Self {
        Self::with_config(BrokerConfig::default())
    }

    /// Create a broker with custom configuration.
    pub fn with_config(config: BrokerConfig) -> Self {
        Self {
            topics: DashMap::new(),
            partitions: DashMap::new(),
            notifiers: DashMap::new(),
            config,
            append_count: AtomicU64::new(0),
        }
    }

    /// Total records appended over the broker's lifetime.
    pub fn append_count(&self) -> u64 {
        self.append_count.load(Ordering::Relaxed)
    }

    /// Run compaction on every partition of a compacted topic.
    pub fn compact_topic(&self, name: &str) -> Result<(), BrokerError> {
        let topic = self
            .topics
            .get(name)
            .ok_or_else(|| BrokerError::TopicNotFound(name.into()))?;
        for pid in 0..topic.num_partitions {
            if let Some(log) = self.partitions.get(&(name.to_string(), pid)) {
                log.write().compact();
            }
        }
        Ok(())
    }

    fn partition_for(&self, topic: &Topic, record: &ProducerRecord) -> u32 {
        record.partition.unwrap_or_else(|| {
            let mut hasher = DefaultHasher::new();
            record.key.hash(&mut hasher);
            (hasher.finish() % topic.num_partitions as u64) as u32
        })
    }
}

#[async_trait]
impl RecordLog for InMemoryLogBroker {
    async fn create_topic(
        &self,
        name: &str,
        num_partitions: u32,
        replication_factor: u16,
        config: TopicConfig,
    ) -> Result<Topic, BrokerError> {
        if self.topics.contains_key(name) {
            return Err(BrokerError::TopicAlreadyExists(name.into()));
        }

        let num_partitions = if num_partitions == 0 {
            self.config.default_partitions
        } else {
            num_partitions
        };
        let replication_factor = if replication_factor == 0 {
            self.config.default_replication_factor
        } else {
            replication_factor
        };

        let mut topic = Topic::new(name.to_string(), num_partitions, replication_factor);
        topic.config = config;

        for pid in 0..num_partitions {
            self.partitions
                .insert((name.to_string(), pid), RwLock::new(PartitionLog::new()));
        }

        self.topics.insert(name.to_string(), topic.clone());
        tracing::info!(topic = name, partitions = num_partitions, "topic created");
        Ok(topic)
    }

    async fn delete_topic(&self, name: &str) -> Result<(), BrokerError> {
        let (_, topic) = self
            .topics
            .remove(name)
            .ok_or_else(|| BrokerError::TopicNotFound(name.into()))?;
        for pid in 0..topic.num_partitions {
            self.partitions.remove(&(name.to_string(), pid));
        }
        self.notifiers.remove(name);
        tracing::info!(topic = name, "topic deleted");
        Ok(())
    }

    async fn describe_topic(&self, name: &str) -> Option<Topic> {
        self.topics.get(name).map(|r| r.value().clone())
    }

    async fn append(&self, record: ProducerRecord) -> Result<DeliveryAck, BrokerError> {
        let topic = self
            .topics
            .get(&record.topic)
            .ok_or_else(|| BrokerError::TopicNotFound(record.topic.clone()))?
            .value()
            .clone();

        if let Some(value) = &record.value {
            if value.len() > topic.config.max_message_bytes {
                return Err(BrokerError::MessageTooLarge(
                    value.len(),
                    topic.config.max_message_bytes,
                ));
            }
        }

        let partition = self.partition_for(&topic, &record);
        let partition_key = (record.topic.clone(), partition);
        let log = self
            .partitions
            .get(&partition_key)
            .ok_or_else(|| BrokerError::PartitionNotFound(record.topic.clone(), partition))?;

        let timestamp = record
            .timestamp
            .unwrap_or_else(|| Utc::now().timestamp_millis());
        let consumer_record = ConsumerRecord {
            topic: record.topic.clone(),
            partition,
            offset: 0, // assigned by the log
            key: record.key,
            value: record.value,
            timestamp,
        };

        let offset = {
            let mut log = log.write();
            let offset = log.append(consumer_record);
            if topic.config.cleanup_policy == CleanupPolicy::Compact
                && log.len() >= self.config.compact_trigger_records
            {
                log.compact();
            }
            offset
        };
        self.append_count.fetch_add(1, Ordering::Relaxed);

        if let Some(notify) = self.notifiers.get(&record.topic) {
            notify.notify_waiters();
        }

        Ok(DeliveryAck {
            topic: record.topic,
            partition,
            offset,
            timestamp,
        })
    }

    async fn flush(&self) -> Result<(), BrokerError> {
        // Appends are immediately visible in process.
        Ok(())
    }

    async fn fetch(
        &self,
        topic: &str,
        partition: u32,
        offset: i64,
        max_records: usize,
    ) -> Result<Vec<ConsumerRecord>, BrokerError> {
        let key = (topic.to_string(), partition);
        let log = self
            .partitions
            .get(&key)
            .ok_or_else(|| BrokerError::PartitionNotFound(topic.into(), partition))?;
        let records = log.read().read(offset, max_records);
        Ok(records)
    }

    async fn latest_offsets(&self, topic: &str) -> Result<Vec<(u32, i64)>, BrokerError> {
        let t = self
            .topics
            .get(topic)
            .ok_or_else(|| BrokerError::TopicNotFound(topic.into()))?;
        let mut offsets = Vec::with_capacity(t.num_partitions as usize);
        for pid in 0..t.num_partitions {
            let log = self
                .partitions
                .get(&(topic.to_string(), pid))
                .ok_or_else(|| BrokerError::PartitionNotFound(topic.into(), pid))?;
            offsets.push((pid, log.read().high_watermark()));
        }
        Ok(offsets)
    }

    fn data_notifier(&self, topic: &str) -> Arc<Notify> {
        self.notifiers
            .entry(topic.to_string())
            .or_insert_with(|| Arc::new(Notify::new()))
            .clone()
    }
}

impl Default for InMemoryLogBroker {
    fn default() -> Self {
        Self::new()
    }
}
