//! Wire codec: rows and keys to log record payloads and back.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::schema::{PropertyValue, TableKey};

use super::row::Row;

/// Codec failures.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to encode record payload: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("failed to decode record payload: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Converts rows plus schema metadata into wire containers and back.
/// Pluggable: the engine is agnostic to the wire format.
pub trait RowCodec: Send + Sync {
    fn encode_key(&self, key: &TableKey) -> Result<Bytes, CodecError>;
    fn decode_key(&self, bytes: &[u8]) -> Result<TableKey, CodecError>;
    fn encode_row(&self, entity: &str, row: &Row) -> Result<Bytes, CodecError>;
    fn decode_row(&self, bytes: &[u8]) -> Result<Row, CodecError>;
}

/// The container written for each row: the entity name travels with the
/// values so other consumers of the topic can interpret records without
/// out-of-band schema context.
#[derive(Debug, Serialize, Deserialize)]
struct RowEnvelope {
    entity: String,
    values: Vec<PropertyValue>,
}

/// JSON wire format, the default codec.
pub struct JsonRowCodec;

impl RowCodec for JsonRowCodec {
    fn encode_key(&self, key: &TableKey) -> Result<Bytes, CodecError> {
        serde_json::to_vec(key)
            .map(Bytes::from)
            .map_err(CodecError::Encode)
    }

    fn decode_key(&self, bytes: &[u8]) -> Result<TableKey, CodecError> {
        serde_json::from_slice(bytes).map_err(CodecError::Decode)
    }

    fn encode_row(&self, entity: &str, row: &Row) -> Result<Bytes, CodecError> {
        let envelope = RowEnvelope {
            entity: entity.to_string(),
            values: row.values().to_vec(),
        };
        serde_json::to_vec(&envelope)
            .map(Bytes::from)
            .map_err(CodecError::Encode)
    }

    fn decode_row(&self, bytes: &[u8]) -> Result<Row, CodecError> {
        let envelope: RowEnvelope = serde_json::from_slice(bytes).map_err(CodecError::Decode)?;
        Ok(Row::new(envelope.values))
    }
}
