//! Row representation.

use serde::{Deserialize, Serialize};

use crate::schema::PropertyValue;

/// One entity instance's state: a fixed-length array of property values
/// aligned with the entity type's property order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    values: Vec<PropertyValue>,
}

impl Row {
    pub fn new(values: Vec<PropertyValue>) -> Self {
        Self { values }
    }

    /// Value at a property index.
    pub fn get(&self, index: usize) -> Option<&PropertyValue> {
        self.values.get(index)
    }

    /// All values in property order.
    pub fn values(&self) -> &[PropertyValue] {
        &self.values
    }

    pub fn into_values(self) -> Vec<PropertyValue> {
        self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl From<Vec<PropertyValue>> for Row {
    fn from(values: Vec<PropertyValue>) -> Self {
        Self::new(values)
    }
}
