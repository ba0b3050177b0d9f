//! The continuously-replicated map strategy.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::TableError;
use crate::log::{DeliveryAck, ProducerRecord, RecordLog};
use crate::row::{Row, RowCodec};
use crate::schema::TableKey;

use super::registry::PipelineHandle;
use super::store::ValueBuffers;
use super::{TableRetriever, ViewStrategy};

/// Push-based retriever: the pipeline consumes continuously, and commits
/// are additionally applied straight into the local map, so a committer
/// observes its own writes without waiting for replay.
pub struct ReplicatedMapRetriever {
    handle: PipelineHandle,
    broker: Arc<dyn RecordLog>,
    codec: Arc<dyn RowCodec>,
}

impl ReplicatedMapRetriever {
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
impl TableRetriever for ReplicatedMapRetriever {
    fn strategy(&self) -> ViewStrategy {
        ViewStrategy::ReplicatedMap
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
        let store = self.handle.pipeline().store();
        let mut acks = Vec::with_capacity(records.len());
        for record in records {
            let key = self.codec.decode_key(&record.key)?;
            let value = record.value.clone();
            let ack = self.broker.append(record).await?;
            store.apply(key, value);
            acks.push(ack);
        }
        self.broker.flush().await?;
        Ok(acks)
    }
}
