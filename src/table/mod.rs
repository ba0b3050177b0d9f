//! Per-entity-type tables: validation, id generation, and commit.

pub mod sequence;

pub use sequence::SequenceGenerator;

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{PropertyConflict, TableError};
use crate::log::DeliveryAck;
use crate::row::{EntityEntry, PendingChange, Row, RowCodec};
use crate::schema::{EntityType, PropertyValue, SchemaError, TableKey};
use crate::view::{TableRetriever, ValueBuffers, ViewStrategy};

/// A log-backed table for one entity type (and the types deriving from
/// it). Owns the retriever and the auto-increment generators; validation
/// calls are serialized externally by the cluster lock and never mutate
/// shared state on failure — generators are only bumped once a change
/// has fully validated.
pub struct Table {
    entity: Arc<EntityType>,
    topic: String,
    retriever: Arc<dyn TableRetriever>,
    codec: Arc<dyn RowCodec>,
    sequences: HashMap<usize, SequenceGenerator>,
    sensitive_logging: bool,
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("entity", &self.entity.name())
            .field("topic", &self.topic)
            .field("sensitive_logging", &self.sensitive_logging)
            .finish()
    }
}

impl Table {
    pub fn new(
        entity: Arc<EntityType>,
        topic: impl Into<String>,
        retriever: Arc<dyn TableRetriever>,
        codec: Arc<dyn RowCodec>,
        sensitive_logging: bool,
    ) -> Self {
        let sequences = entity
            .properties()
            .iter()
            .enumerate()
            .filter(|(_, p)| p.is_auto_increment())
            .map(|(i, _)| (i, SequenceGenerator::default()))
            .collect();
        Self {
            entity,
            topic: topic.into(),
            retriever,
            codec,
            sequences,
            sensitive_logging,
        }
    }

    pub fn entity(&self) -> &Arc<EntityType> {
        &self.entity
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn strategy(&self) -> ViewStrategy {
        self.retriever.strategy()
    }

    pub fn retriever(&self) -> &Arc<dyn TableRetriever> {
        &self.retriever
    }

    // ── Reads ───────────────────────────────────────────────────────────

    /// Whether a key is materialized in the view.
    pub async fn exists(&self, key: &TableKey) -> Result<bool, TableError> {
        self.retriever.exists(key).await
    }

    /// The row for a key, if materialized.
    pub async fn try_get(&self, key: &TableKey) -> Result<Option<Row>, TableError> {
        self.retriever.try_get(key).await
    }

    /// Lazy sequence over all materialized rows.
    pub fn value_buffers(&self) -> ValueBuffers {
        self.retriever.value_buffers()
    }

    // ── Validation ──────────────────────────────────────────────────────

    /// Validate an insert and convert it into a pending change.
    pub async fn create(&self, entry: &EntityEntry) -> Result<PendingChange, TableError> {
        self.create_replacing(entry, None).await
    }

    /// Validate an insert whose key may have been freed earlier in the
    /// same transaction by a shared-identity companion delete; that key
    /// does not count as existing.
    pub async fn create_replacing(
        &self,
        entry: &EntityEntry,
        replaced: Option<&TableKey>,
    ) -> Result<PendingChange, TableError> {
        let entity = entry.entity();
        self.check_arity(entity, entry.current())?;

        // Snapshot every property through its comparer and converter.
        // Auto-increment nulls stay null until validation passes.
        let mut values: Vec<PropertyValue> = entity
            .properties()
            .iter()
            .zip(entry.current())
            .map(|(prop, v)| prop.snapshot(v))
            .collect();

        let needs_generation = entity
            .primary_key()
            .iter()
            .any(|&i| entity.properties()[i].is_auto_increment() && values[i].is_null());

        if !needs_generation {
            let key = self.key_of(entity, &values);
            if replaced != Some(&key) && self.retriever.exists(&key).await? {
                return Err(TableError::key_exists(
                    entity.name(),
                    &key,
                    self.sensitive_logging,
                ));
            }
        }

        let nullability_errors: Vec<String> = entity
            .properties()
            .iter()
            .enumerate()
            .filter(|(i, prop)| {
                values[*i].is_null() && !prop.is_nullable() && !prop.is_auto_increment()
            })
            .map(|(_, prop)| prop.name().to_string())
            .collect();
        if !nullability_errors.is_empty() {
            return Err(TableError::nullability(
                entity.name(),
                nullability_errors,
                self.sensitive_logging,
            ));
        }

        // Validation passed: bump the generators.
        for (&i, sequence) in &self.sequences {
            match &values[i] {
                PropertyValue::Null => values[i] = PropertyValue::Int(sequence.reserve()),
                PropertyValue::Int(v) => sequence.observe(*v),
                _ => {}
            }
        }

        let key = self.key_of(entity, &values);
        if needs_generation && replaced != Some(&key) && self.retriever.exists(&key).await? {
            return Err(TableError::key_exists(
                entity.name(),
                &key,
                self.sensitive_logging,
            ));
        }

        Ok(PendingChange::upsert(
            entity.name(),
            key,
            Row::new(values),
            &self.topic,
        ))
    }

    /// Validate an update and convert it into a pending change.
    pub async fn update(&self, entry: &EntityEntry) -> Result<PendingChange, TableError> {
        let entity = entry.entity();
        self.check_arity(entity, entry.current())?;
        self.check_arity(entity, entry.original())?;

        let key = entity.key_from_values(entry.original())?;
        let stored = match self.retriever.try_get(&key).await? {
            Some(row) => row,
            None => {
                return Err(TableError::key_missing(
                    entity.name(),
                    &key,
                    self.sensitive_logging,
                ));
            }
        };

        let concurrency_conflicts = self.token_conflicts(entity, entry, &stored);

        let nullability_errors: Vec<String> = entity
            .properties()
            .iter()
            .enumerate()
            .filter(|(i, prop)| {
                entry.is_modified(*i)
                    && !prop.is_nullable()
                    && prop.snapshot(&entry.current()[*i]).is_null()
            })
            .map(|(_, prop)| prop.name().to_string())
            .collect();

        // Concurrency conflicts take priority over nullability failures.
        if !concurrency_conflicts.is_empty() {
            return Err(TableError::token_mismatch(
                entity.name(),
                concurrency_conflicts,
                self.sensitive_logging,
            ));
        }
        if !nullability_errors.is_empty() {
            return Err(TableError::nullability(
                entity.name(),
                nullability_errors,
                self.sensitive_logging,
            ));
        }

        // Modified properties take the entry's converted value, the rest
        // carry over from the stored row.
        let values: Vec<PropertyValue> = entity
            .properties()
            .iter()
            .enumerate()
            .map(|(i, prop)| {
                if entry.is_modified(i) {
                    prop.snapshot(&entry.current()[i])
                } else {
                    stored.get(i).cloned().unwrap_or(PropertyValue::Null)
                }
            })
            .collect();

        for (&i, sequence) in &self.sequences {
            if let PropertyValue::Int(v) = &values[i] {
                sequence.observe(*v);
            }
        }

        Ok(PendingChange::upsert(
            entity.name(),
            key,
            Row::new(values),
            &self.topic,
        ))
    }

    /// Validate a delete and convert it into a tombstone change.
    pub async fn delete(&self, entry: &EntityEntry) -> Result<PendingChange, TableError> {
        let entity = entry.entity();
        self.check_arity(entity, entry.original())?;

        let key = entity.key_from_values(entry.original())?;
        let stored = match self.retriever.try_get(&key).await? {
            Some(row) => row,
            None => {
                return Err(TableError::key_missing(
                    entity.name(),
                    &key,
                    self.sensitive_logging,
                ));
            }
        };

        // Nullability is irrelevant for a delete; tokens still apply.
        let concurrency_conflicts = self.token_conflicts(entity, entry, &stored);
        if !concurrency_conflicts.is_empty() {
            return Err(TableError::token_mismatch(
                entity.name(),
                concurrency_conflicts,
                self.sensitive_logging,
            ));
        }

        Ok(PendingChange::delete(entity.name(), key, &self.topic))
    }

    // ── Commit ──────────────────────────────────────────────────────────

    /// Append a validated batch to the log. Delivery failures surface as
    /// [`TableError::CommitFailure`] and are not retried here.
    pub async fn commit(
        &self,
        batch: Vec<PendingChange>,
    ) -> Result<Vec<DeliveryAck>, TableError> {
        let mut records = Vec::with_capacity(batch.len());
        for change in batch {
            records.push(change.into_record(self.codec.as_ref())?);
        }
        let count = records.len();
        let acks = self
            .retriever
            .commit(records)
            .await
            .map_err(|e| TableError::CommitFailure {
                entity: self.entity.name().to_string(),
                reason: e.to_string(),
            })?;
        tracing::debug!(
            entity = self.entity.name(),
            topic = %self.topic,
            records = count,
            "batch committed"
        );
        Ok(acks)
    }

    // ── Internals ───────────────────────────────────────────────────────

    fn check_arity(&self, entity: &EntityType, values: &[PropertyValue]) -> Result<(), TableError> {
        if values.len() != entity.properties().len() {
            return Err(SchemaError::RowArity {
                entity: entity.name().to_string(),
                expected: entity.properties().len(),
                actual: values.len(),
            }
            .into());
        }
        Ok(())
    }

    /// Key from already-snapshotted values.
    fn key_of(&self, entity: &EntityType, values: &[PropertyValue]) -> TableKey {
        TableKey::from_components(
            entity
                .primary_key()
                .iter()
                .map(|&i| values[i].clone())
                .collect(),
        )
    }

    /// Compare every concurrency-token property of the stored row against
    /// the entry's original value, through the property's comparer.
    fn token_conflicts(
        &self,
        entity: &EntityType,
        entry: &EntityEntry,
        stored: &Row,
    ) -> Vec<PropertyConflict> {
        entity
            .properties()
            .iter()
            .enumerate()
            .filter(|(_, prop)| prop.is_concurrency_token())
            .filter_map(|(i, prop)| {
                let stored_value = stored.get(i).cloned().unwrap_or(PropertyValue::Null);
                let expected = prop.snapshot(&entry.original()[i]);
                if prop.values_equal(&stored_value, &expected) {
                    None
                } else {
                    Some(PropertyConflict {
                        property: prop.name().to_string(),
                        expected: Some(expected),
                        actual: Some(stored_value),
                    })
                }
            })
            .collect()
    }
}
