#![forbid(unsafe_code)]
//! # logtable
//!
//! A log-backed materialized table engine: tables whose system of record
//! is an append-only partitioned commit log, queried through an
//! in-process materialized view.
//!
//! Writes are validated per table (optimistic concurrency, nullability),
//! batched per transaction, and appended to the log; a supervised
//! background pipeline replays the log into a local key-value store, and
//! every reader is gated behind the supervisor's readiness state machine
//! so a partially-replayed view is never observable.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use logtable::{
//!     Cluster, ClusterConfig, EntityEntry, EntityType, InMemoryLogBroker, PropertyDef,
//!     ValueKind,
//! };
//!
//! # async fn demo() -> Result<(), logtable::TableError> {
//! let entity = Arc::new(EntityType::new(
//!     "Order",
//!     vec![
//!         PropertyDef::new("Id", ValueKind::Int).required().auto_increment(),
//!         PropertyDef::new("Total", ValueKind::Float).concurrency_token(),
//!         PropertyDef::new("Status", ValueKind::Text).required(),
//!     ],
//!     &["Id"],
//! )?);
//!
//! let cluster = Cluster::new(ClusterConfig::default(), Arc::new(InMemoryLogBroker::new()));
//! cluster
//!     .execute_transaction(vec![EntityEntry::added(
//!         entity.clone(),
//!         vec![1.into(), 42.5.into(), "open".into()],
//!     )])
//!     .await?;
//!
//! let table = cluster.ensure_table(&entity).await?;
//! for row in table.value_buffers() {
//!     println!("{:?}", row?);
//! }
//! # Ok(())
//! # }
//! ```

pub mod cluster;
pub mod config;
pub mod error;
pub mod log;
pub mod row;
pub mod schema;
pub mod table;
pub mod view;

pub use cluster::{AuditHook, Cluster};
pub use config::ClusterConfig;
pub use error::{PropertyConflict, TableError};
pub use log::{
    BrokerConfig, BrokerError, CleanupPolicy, ConsumerRecord, DeliveryAck, InMemoryLogBroker,
    ProducerRecord, RecordLog, Topic, TopicConfig,
};
pub use row::{CodecError, EntityEntry, EntryState, JsonRowCodec, PendingChange, Row, RowCodec};
pub use schema::{
    EntityType, PropertyDef, PropertyValue, SchemaError, TableKey, ValueComparer, ValueConverter,
    ValueKind,
};
pub use table::Table;
pub use view::{
    MaterializedStore, PipelineRegistry, PipelineState, ReadinessMode, StreamSupervisor,
    TableRetriever, ValueBuffers, ViewStrategy,
};
