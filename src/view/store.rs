//! Local key-value store materialized from a topic.

use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;

use crate::row::{CodecError, Row, RowCodec};
use crate::schema::TableKey;

/// The local associative store a replay pipeline folds a topic into.
///
/// Values are kept in their encoded container form; decoding happens
/// lazily on read, so replay only pays for key decoding.
pub struct MaterializedStore {
    name: String,
    entries: DashMap<TableKey, Bytes>,
}

impl MaterializedStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: DashMap::new(),
        }
    }

    /// Backing-store identifier.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Apply one replayed record: upsert on a value, remove on a
    /// tombstone.
    pub fn apply(&self, key: TableKey, value: Option<Bytes>) {
        match value {
            Some(v) => {
                self.entries.insert(key, v);
            }
            None => {
                self.entries.remove(&key);
            }
        }
    }

    /// Whether the key is currently materialized.
    pub fn exists(&self, key: &TableKey) -> bool {
        self.entries.contains_key(key)
    }

    /// The encoded container for a key.
    pub fn get(&self, key: &TableKey) -> Option<Bytes> {
        self.entries.get(key).map(|r| r.value().clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Point-in-time snapshot of all encoded containers.
    pub fn snapshot(&self) -> Vec<Bytes> {
        self.entries.iter().map(|r| r.value().clone()).collect()
    }

    /// Lazily-decoded sequence over a point-in-time snapshot.
    pub fn value_buffers(&self, codec: Arc<dyn RowCodec>) -> ValueBuffers {
        ValueBuffers {
            buffers: self.snapshot().into_iter(),
            codec,
        }
    }
}

/// Iterator over a store snapshot that decodes each container on demand.
pub struct ValueBuffers {
    buffers: std::vec::IntoIter<Bytes>,
    codec: Arc<dyn RowCodec>,
}

impl Iterator for ValueBuffers {
    type Item = Result<Row, CodecError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.buffers.next().map(|b| self.codec.decode_row(&b))
    }
}

impl ExactSizeIterator for ValueBuffers {
    fn len(&self) -> usize {
        self.buffers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::JsonRowCodec;
    use crate::schema::PropertyValue;

    fn key(id: i64) -> TableKey {
        TableKey::Scalar(PropertyValue::Int(id))
    }

    fn encoded(id: i64) -> Bytes {
        JsonRowCodec
            .encode_row("Order", &Row::new(vec![id.into(), "open".into()]))
            .unwrap()
    }

    #[test]
    fn test_apply_upsert_and_tombstone() {
        let store = MaterializedStore::new("Table_db.Order");
        store.apply(key(1), Some(encoded(1)));
        assert!(store.exists(&key(1)));

        store.apply(key(1), None);
        assert!(!store.exists(&key(1)));
        assert!(store.is_empty());
    }

    #[test]
    fn test_value_buffers_decode_lazily() {
        let store = MaterializedStore::new("s");
        store.apply(key(1), Some(encoded(1)));
        store.apply(key(2), Some(encoded(2)));

        let rows: Result<Vec<Row>, _> = store.value_buffers(Arc::new(JsonRowCodec)).collect();
        let mut ids: Vec<i64> = rows
            .unwrap()
            .iter()
            .map(|r| r.get(0).unwrap().as_int().unwrap())
            .collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_value_buffers_surface_decode_errors() {
        let store = MaterializedStore::new("s");
        store.apply(key(1), Some(Bytes::from_static(b"not json")));
        let mut buffers = store.value_buffers(Arc::new(JsonRowCodec));
        assert!(buffers.next().unwrap().is_err());
    }
}
