//! Table keys derived from primary-key property values.

use serde::{Deserialize, Serialize};

use super::value::PropertyValue;

/// A key identifying one row within a table's view.
///
/// Keys are canonical: comparers and converters have already been applied
/// during derivation (see [`EntityType::key_from_values`]), so structural
/// equality and hashing here match the schema's own comparison semantics.
///
/// [`EntityType::key_from_values`]: super::EntityType::key_from_values
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TableKey {
    /// Single-property primary key.
    Scalar(PropertyValue),
    /// Composite primary key, in primary-key declaration order.
    Composite(Vec<PropertyValue>),
}

impl TableKey {
    /// Build a key from already-canonical components.
    pub fn from_components(mut components: Vec<PropertyValue>) -> Self {
        if components.len() == 1 {
            Self::Scalar(components.remove(0))
        } else {
            Self::Composite(components)
        }
    }

    /// The key's components in declaration order.
    pub fn components(&self) -> &[PropertyValue] {
        match self {
            Self::Scalar(v) => std::slice::from_ref(v),
            Self::Composite(vs) => vs,
        }
    }
}

impl std::fmt::Display for TableKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Scalar(v) => write!(f, "{v}"),
            Self::Composite(vs) => {
                write!(f, "(")?;
                for (i, v) in vs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, ")")
            }
        }
    }
}
