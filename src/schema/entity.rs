//! Entity type descriptions.

use super::key::TableKey;
use super::property::PropertyDef;
use super::value::PropertyValue;
use super::SchemaError;

/// The description of one entity type: name, ordered properties, and
/// primary-key shape.
///
/// Derived types name their root through `base`; the engine materializes
/// derived and base types into the same stream and table.
#[derive(Debug, Clone)]
pub struct EntityType {
    name: String,
    properties: Vec<PropertyDef>,
    primary_key: Vec<usize>,
    is_abstract: bool,
    base: Option<String>,
}

impl EntityType {
    /// Build an entity type. Primary-key properties are named and must all
    /// exist in `properties`.
    pub fn new(
        name: impl Into<String>,
        properties: Vec<PropertyDef>,
        primary_key: &[&str],
    ) -> Result<Self, SchemaError> {
        let name = name.into();
        if primary_key.is_empty() {
            return Err(SchemaError::EmptyPrimaryKey { entity: name });
        }
        let mut indexes = Vec::with_capacity(primary_key.len());
        for pk in primary_key {
            let idx = properties
                .iter()
                .position(|p| p.name() == *pk)
                .ok_or_else(|| SchemaError::UnknownProperty {
                    entity: name.clone(),
                    property: (*pk).to_string(),
                })?;
            indexes.push(idx);
        }
        Ok(Self {
            name,
            properties,
            primary_key: indexes,
            is_abstract: false,
            base: None,
        })
    }

    /// Mark the type abstract. Abstract types cannot be materialized.
    pub fn abstract_type(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    /// Declare the root type this one derives from. Derived types share the
    /// root's stream and table.
    pub fn with_base(mut self, base: impl Into<String>) -> Self {
        self.base = Some(base.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The stream owner: the base type's name when derived, otherwise this
    /// type's own name.
    pub fn root_name(&self) -> &str {
        self.base.as_deref().unwrap_or(&self.name)
    }

    pub fn is_abstract(&self) -> bool {
        self.is_abstract
    }

    /// Ordered property list.
    pub fn properties(&self) -> &[PropertyDef] {
        &self.properties
    }

    /// Property lookup by name, returning its index and definition.
    pub fn property(&self, name: &str) -> Option<(usize, &PropertyDef)> {
        self.properties
            .iter()
            .enumerate()
            .find(|(_, p)| p.name() == name)
    }

    /// Indexes of primary-key properties, in key order.
    pub fn primary_key(&self) -> &[usize] {
        &self.primary_key
    }

    /// Derive the canonical key from a full value array aligned with this
    /// type's property order. Converters and comparers are applied here, so
    /// the resulting key supports structural equality and hashing.
    pub fn key_from_values(&self, values: &[PropertyValue]) -> Result<TableKey, SchemaError> {
        if values.len() != self.properties.len() {
            return Err(SchemaError::RowArity {
                entity: self.name.clone(),
                expected: self.properties.len(),
                actual: values.len(),
            });
        }
        let components = self
            .primary_key
            .iter()
            .map(|&i| self.properties[i].snapshot(&values[i]))
            .collect();
        Ok(TableKey::from_components(components))
    }
}
