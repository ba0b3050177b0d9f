//! Schema collaborator: entity types, properties, values, and keys.
//!
//! The engine consumes these descriptions read-only. They drive topic and
//! store naming, row (de)composition, key derivation, and validation; the
//! engine never mutates them.

pub mod entity;
pub mod key;
pub mod property;
pub mod value;

pub use entity::EntityType;
pub use key::TableKey;
pub use property::{
    DefaultComparer, IdentityConverter, PropertyDef, ValueComparer, ValueConverter,
};
pub use value::{PropertyValue, ValueKind};

use thiserror::Error;

/// Errors raised while interpreting a schema description.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("entity type '{entity}' has no property named '{property}'")]
    UnknownProperty { entity: String, property: String },
    #[error("entity type '{entity}' declares no primary key")]
    EmptyPrimaryKey { entity: String },
    #[error("row for '{entity}' has {actual} values, expected {expected}")]
    RowArity {
        entity: String,
        expected: usize,
        actual: usize,
    },
}
