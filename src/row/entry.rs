//! Caller-facing pending entries.
//!
//! The query/change-tracking layer sits outside this crate; it hands the
//! engine one [`EntityEntry`] per tracked object. An entry carries the
//! object's current and original value snapshots plus per-property
//! modification flags, which is everything validation needs.

use std::sync::Arc;

use crate::schema::{EntityType, PropertyValue, SchemaError};

/// The tracked state of a pending entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Added,
    Modified,
    Deleted,
    Unchanged,
}

/// One pending write against a table, as described by the tracking layer.
#[derive(Debug, Clone)]
pub struct EntityEntry {
    entity: Arc<EntityType>,
    state: EntryState,
    current: Vec<PropertyValue>,
    original: Vec<PropertyValue>,
    modified: Vec<bool>,
    shared_identity: Option<Box<EntityEntry>>,
}

impl EntityEntry {
    /// An entry for a new object. `current` is aligned with the entity's
    /// property order.
    pub fn added(entity: Arc<EntityType>, current: Vec<PropertyValue>) -> Self {
        let len = entity.properties().len();
        Self {
            entity,
            state: EntryState::Added,
            original: current.clone(),
            modified: vec![true; len],
            current,
            shared_identity: None,
        }
    }

    /// An entry for an updated object. `original` is the snapshot the
    /// caller read; mark changed properties with [`set_modified`].
    ///
    /// [`set_modified`]: Self::set_modified
    pub fn modified(
        entity: Arc<EntityType>,
        current: Vec<PropertyValue>,
        original: Vec<PropertyValue>,
    ) -> Self {
        let len = entity.properties().len();
        Self {
            entity,
            state: EntryState::Modified,
            current,
            original,
            modified: vec![false; len],
            shared_identity: None,
        }
    }

    /// An entry for a deleted object, identified by its original snapshot.
    pub fn deleted(entity: Arc<EntityType>, original: Vec<PropertyValue>) -> Self {
        let len = entity.properties().len();
        Self {
            entity,
            state: EntryState::Deleted,
            current: original.clone(),
            original,
            modified: vec![false; len],
            shared_identity: None,
        }
    }

    /// An entry the tracker still holds but that carries no pending write.
    pub fn unchanged(entity: Arc<EntityType>, current: Vec<PropertyValue>) -> Self {
        let len = entity.properties().len();
        Self {
            entity,
            state: EntryState::Unchanged,
            original: current.clone(),
            modified: vec![false; len],
            current,
            shared_identity: None,
        }
    }

    /// Flag a property as modified.
    pub fn set_modified(mut self, property: &str) -> Result<Self, SchemaError> {
        let (idx, _) = self.entity.property(property).ok_or_else(|| {
            SchemaError::UnknownProperty {
                entity: self.entity.name().to_string(),
                property: property.to_string(),
            }
        })?;
        self.modified[idx] = true;
        Ok(self)
    }

    /// Attach a shared-identity companion: an entry whose delete must be
    /// applied before this one (single-table-inheritance key sharing).
    pub fn with_shared_identity(mut self, companion: EntityEntry) -> Self {
        self.shared_identity = Some(Box::new(companion));
        self
    }

    pub fn entity(&self) -> &Arc<EntityType> {
        &self.entity
    }

    pub fn state(&self) -> EntryState {
        self.state
    }

    /// Current values, aligned with the entity's property order.
    pub fn current(&self) -> &[PropertyValue] {
        &self.current
    }

    /// Original values, as read from the view.
    pub fn original(&self) -> &[PropertyValue] {
        &self.original
    }

    /// Whether the property at `index` is flagged modified.
    pub fn is_modified(&self, index: usize) -> bool {
        self.modified.get(index).copied().unwrap_or(false)
    }

    pub fn shared_identity(&self) -> Option<&EntityEntry> {
        self.shared_identity.as_deref()
    }
}
