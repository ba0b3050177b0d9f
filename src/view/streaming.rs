//! The streaming materialized-view strategy.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::TableError;
use crate::log::{DeliveryAck, ProducerRecord, RecordLog};
use crate::row::{Row, RowCodec};
use crate::schema::TableKey;

use super::registry::PipelineHandle;
use super::store::ValueBuffers;
use super::{TableRetriever, ViewStrategy};

/// Pull-based retriever: commits go through the raw producer only; the
/// view converges asynchronously as the pipeline replays the topic.
pub struct StreamingViewRetriever {
    handle: PipelineHandle,
    broker: Arc<dyn RecordLog>,
    codec: Arc<dyn RowCodec>,
}

impl StreamingViewRetriever {
    pub(crate) fn new(
        handle: PipelineHandle,
        broker: Arc<dyn RecordLog>,
        codec: Arc<dyn RowCodec>,
    ) -> Self {
        Self {
            handle,
            broker,
            codec,
        }
    }
}

#[async_trait]
impl TableRetriever for StreamingViewRetriever {
    fn strategy(&self) -> ViewStrategy {
        ViewStrategy::StreamingView
    }

    async fn exists(&self, key: &TableKey) -> Result<bool, TableError> {
        Ok(self.handle.pipeline().store().exists(key))
    }

    async fn try_get(&self, key: &TableKey) -> Result<Option<Row>, TableError> {
        match self.handle.pipeline().store().get(key) {
            Some(buffer) => Ok(Some(self.codec.decode_row(&buffer)?)),
            None => Ok(None),
        }
    }

    fn value_buffers(&self) -> ValueBuffers {
        self.handle
            .pipeline()
            .store()
            .value_buffers(self.codec.clone())
    }

    async fn commit(
        &self,
        records: Vec<ProducerRecord>,
    ) -> Result<Vec<DeliveryAck>, TableError> {
        let mut acks = Vec::with_capacity(records.len());
        for record in records {
            acks.push(self.broker.append(record).await?);
        }
        self.broker.flush().await?;
        Ok(acks)
    }
}
