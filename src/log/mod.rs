//! Log collaborator: the append-only partitioned record log.
//!
//! The engine talks to the log exclusively through [`RecordLog`]. The
//! bundled [`InMemoryLogBroker`] is a complete in-process implementation
//! with per-topic compaction, suitable for embedded use and tests;
//! production deployments put a real broker client behind the same trait.

pub mod broker;
pub mod partition_log;
pub mod record;
pub mod topic;

pub use broker::{BrokerConfig, BrokerError, InMemoryLogBroker, RecordLog};
pub use partition_log::PartitionLog;
pub use record::{ConsumerRecord, DeliveryAck, ProducerRecord};
pub use topic::{CleanupPolicy, Topic, TopicConfig};
