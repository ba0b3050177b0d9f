//! Append-only log for a single partition, with key compaction.

use std::collections::HashMap;

use bytes::Bytes;

use super::record::ConsumerRecord;

/// An in-memory, append-only log for a single partition.
///
/// Offsets are stable across compaction: compaction removes superseded
/// records but never renumbers survivors, so reads filter by offset rather
/// than index.
#[derive(Debug)]
pub struct PartitionLog {
    records: Vec<ConsumerRecord>,
    /// Offset of the next record to be appended.
    high_watermark: i64,
    /// Earliest offset not yet removed by retention.
    log_start_offset: i64,
}

impl PartitionLog {
    /// Create a new empty partition log.
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            high_watermark: 0,
            log_start_offset: 0,
        }
    }

    /// Append a record and return its assigned offset.
    pub fn append(&mut self, mut record: ConsumerRecord) -> i64 {
        let offset = self.high_watermark;
        record.offset = offset;
        self.records.push(record);
        self.high_watermark += 1;
        offset
    }

    /// Read up to `max_records` with offsets at or past `from_offset`.
    pub fn read(&self, from_offset: i64, max_records: usize) -> Vec<ConsumerRecord> {
        self.records
            .iter()
            .filter(|r| r.offset >= from_offset)
            .take(max_records)
            .cloned()
            .collect()
    }

    /// Next offset to be assigned.
    pub fn high_watermark(&self) -> i64 {
        self.high_watermark
    }

    /// Earliest available offset.
    pub fn log_start_offset(&self) -> i64 {
        self.log_start_offset
    }

    /// Compact the log: keep only the latest record per key, and drop a
    /// key entirely when its latest record is a tombstone. The high
    /// watermark and surviving offsets are unchanged.
    pub fn compact(&mut self) {
        let mut latest: HashMap<Bytes, i64> = HashMap::new();
        for r in &self.records {
            latest.insert(r.key.clone(), r.offset);
        }
        self.records.retain(|r| {
            latest.get(&r.key) == Some(&r.offset) && r.value.is_some()
        });
    }

    /// Drop records with offsets before `offset` (retention enforcement
    /// for delete-policy topics).
    pub fn truncate_before(&mut self, offset: i64) {
        if offset <= self.log_start_offset {
            return;
        }
        self.records.retain(|r| r.offset >= offset);
        self.log_start_offset = offset.min(self.high_watermark);
    }

    /// Number of records currently held.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the log holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Default for PartitionLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(key: &str, value: Option<&str>) -> ConsumerRecord {
        ConsumerRecord {
            topic: "t".into(),
            partition: 0,
            offset: 0,
            key: Bytes::copy_from_slice(key.as_bytes()),
            value: value.map(|v| Bytes::copy_from_slice(v.as_bytes())),
            timestamp: 1_700_000_000_000,
        }
    }

    #[test]
    fn test_append_assigns_sequential_offsets() {
        let mut log = PartitionLog::new();
        assert_eq!(log.append(record("a", Some("1"))), 0);
        assert_eq!(log.append(record("b", Some("1"))), 1);
        assert_eq!(log.high_watermark(), 2);
    }

    #[test]
    fn test_read_from_offset() {
        let mut log = PartitionLog::new();
        for i in 0..5 {
            log.append(record(&format!("k{i}"), Some("v")));
        }
        let records = log.read(3, 10);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].offset, 3);
    }

    #[test]
    fn test_compact_keeps_latest_per_key() {
        let mut log = PartitionLog::new();
        log.append(record("a", Some("1")));
        log.append(record("b", Some("1")));
        log.append(record("a", Some("2")));
        log.compact();

        assert_eq!(log.len(), 2);
        let records = log.read(0, 10);
        // Offsets survive compaction.
        assert_eq!(records[0].offset, 1);
        assert_eq!(records[1].offset, 2);
        assert_eq!(records[1].value.as_deref(), Some(&b"2"[..]));
        assert_eq!(log.high_watermark(), 3);
    }

    #[test]
    fn test_compact_drops_tombstoned_keys() {
        let mut log = PartitionLog::new();
        log.append(record("a", Some("1")));
        log.append(record("a", None));
        log.compact();
        assert!(log.is_empty());
        assert_eq!(log.high_watermark(), 2);
    }

    #[test]
    fn test_read_after_compaction_skips_gaps() {
        let mut log = PartitionLog::new();
        log.append(record("a", Some("1")));
        log.append(record("a", Some("2")));
        log.append(record("b", Some("1")));
        log.compact();
        let records = log.read(0, 10);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].offset, 1);
    }

    #[test]
    fn test_truncate_before() {
        let mut log = PartitionLog::new();
        for i in 0..5 {
            log.append(record(&format!("k{i}"), Some("v")));
        }
        log.truncate_before(3);
        assert_eq!(log.log_start_offset(), 3);
        assert_eq!(log.len(), 2);
    }
}
