//! Pending changes: validated writes awaiting commit.

use crate::error::TableError;
use crate::log::ProducerRecord;
use crate::schema::TableKey;

use super::codec::RowCodec;
use super::row::Row;

/// An immutable description of one validated create/update/delete, bound
/// to a key and a full row snapshot (`None` for a delete).
///
/// A pending change is consumed exactly once: [`into_record`] takes it by
/// value, so a change cannot be committed twice.
///
/// [`into_record`]: Self::into_record
#[derive(Debug, Clone)]
pub struct PendingChange {
    entity: String,
    key: TableKey,
    row: Option<Row>,
    topic: String,
}

impl PendingChange {
    /// An insert or update carrying a full row.
    pub fn upsert(entity: impl Into<String>, key: TableKey, row: Row, topic: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            key,
            row: Some(row),
            topic: topic.into(),
        }
    }

    /// A delete (tombstone).
    pub fn delete(entity: impl Into<String>, key: TableKey, topic: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            key,
            row: None,
            topic: topic.into(),
        }
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn key(&self) -> &TableKey {
        &self.key
    }

    pub fn row(&self) -> Option<&Row> {
        self.row.as_ref()
    }

    /// Target stream identifier.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn is_delete(&self) -> bool {
        self.row.is_none()
    }

    /// Encode into a log record, consuming the change.
    pub fn into_record(self, codec: &dyn RowCodec) -> Result<ProducerRecord, TableError> {
        let key = codec.encode_key(&self.key)?;
        match self.row {
            Some(row) => {
                let value = codec.encode_row(&self.entity, &row)?;
                Ok(ProducerRecord::new(self.topic, key, value))
            }
            None => Ok(ProducerRecord::tombstone(self.topic, key)),
        }
    }
}
