//! Materialized-view retrieval.
//!
//! Two interchangeable strategies sit behind [`TableRetriever`]: a
//! continuously-replicated map and a streaming materialized view. Both
//! replay the table's topic into a local store through a supervised
//! pipeline; construction blocks until the supervisor reports the view
//! ready, so readers never observe a partially-initialized store.

pub mod pipeline;
pub mod registry;
pub mod replicated;
pub mod store;
pub mod streaming;
pub mod supervisor;

pub use pipeline::ReplayPipeline;
pub use registry::{PipelineHandle, PipelineRegistry};
pub use replicated::ReplicatedMapRetriever;
pub use store::{MaterializedStore, ValueBuffers};
pub use streaming::StreamingViewRetriever;
pub use supervisor::{PipelineState, ReadinessMode, StreamSupervisor};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::TableError;
use crate::log::{DeliveryAck, ProducerRecord, RecordLog};
use crate::row::{Row, RowCodec};
use crate::schema::TableKey;

/// Which materialization strategy a table uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViewStrategy {
    /// Continuously-replicated local map; commits are also applied
    /// directly, so the committer reads its own writes.
    ReplicatedMap,
    /// Streaming materialized view; commits go through the raw producer
    /// and the view converges by replay.
    StreamingView,
}

/// The retrieval contract both strategies implement.
#[async_trait]
pub trait TableRetriever: Send + Sync {
    /// The strategy behind this retriever.
    fn strategy(&self) -> ViewStrategy;

    /// Whether a key is present in the view.
    async fn exists(&self, key: &TableKey) -> Result<bool, TableError>;

    /// The row for a key, if present.
    async fn try_get(&self, key: &TableKey) -> Result<Option<Row>, TableError>;

    /// Lazy sequence over all rows in the view.
    fn value_buffers(&self) -> ValueBuffers;

    /// Append a batch to the log, returning one acknowledgment per
    /// record.
    async fn commit(&self, records: Vec<ProducerRecord>)
        -> Result<Vec<DeliveryAck>, TableError>;
}

impl std::fmt::Debug for dyn TableRetriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableRetriever")
            .field("strategy", &self.strategy())
            .finish()
    }
}

/// Build a retriever for one table, resolved once per entity type and
/// cached by the caller. Acquires (or shares) the pipeline for
/// `store_id`, starts it, and waits for the supervisor's readiness
/// verdict before returning; a failed pipeline fails construction.
pub async fn build_retriever(
    strategy: ViewStrategy,
    topic: &str,
    store_id: &str,
    broker: Arc<dyn RecordLog>,
    codec: Arc<dyn RowCodec>,
    registry: &Arc<PipelineRegistry>,
    min_quiet_time: Duration,
) -> Result<Arc<dyn TableRetriever>, TableError> {
    let handle = registry.acquire(store_id, || {
        ReplayPipeline::new(store_id, topic, broker.clone(), codec.clone())
    });
    handle.pipeline().start();

    let mode = match strategy {
        ViewStrategy::ReplicatedMap => ReadinessMode::QuietWindow,
        ViewStrategy::StreamingView => ReadinessMode::RunningOnly,
    };
    let supervisor = StreamSupervisor::new(
        handle.pipeline().core(),
        handle.pipeline().subscribe_state(),
        mode,
        min_quiet_time,
    );
    supervisor.wait_until_ready().await?;

    let retriever: Arc<dyn TableRetriever> = match strategy {
        ViewStrategy::ReplicatedMap => {
            Arc::new(ReplicatedMapRetriever::new(handle, broker, codec))
        }
        ViewStrategy::StreamingView => {
            Arc::new(StreamingViewRetriever::new(handle, broker, codec))
        }
    };
    Ok(retriever)
}
