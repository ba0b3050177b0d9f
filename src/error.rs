//! Error taxonomy for the table engine.
//!
//! Validation errors ([`TableError::ConcurrencyConflict`],
//! [`TableError::NullabilityViolation`]) are raised before any record
//! reaches the log. Pipeline and commit failures surface asynchronously
//! captured causes to the caller that is waiting on them.

use thiserror::Error;

use crate::log::BrokerError;
use crate::row::CodecError;
use crate::schema::{PropertyValue, SchemaError, TableKey};

/// A single property whose stored value diverged from the expected
/// original. Values are `None` when sensitive-data logging is disabled.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyConflict {
    /// Property name.
    pub property: String,
    /// Value the caller expected (the entry's original snapshot).
    pub expected: Option<PropertyValue>,
    /// Value currently stored in the view.
    pub actual: Option<PropertyValue>,
}

/// Errors produced by tables, retrievers, and cluster transactions.
#[derive(Debug, Error)]
pub enum TableError {
    /// A create targeted an existing key, an update/delete targeted a
    /// missing key, or a concurrency-token value mismatched.
    #[error("{message}")]
    ConcurrencyConflict {
        entity: String,
        message: String,
        conflicts: Vec<PropertyConflict>,
    },

    /// A non-nullable property snapshotted to null.
    #[error("{message}")]
    NullabilityViolation {
        entity: String,
        properties: Vec<String>,
        message: String,
    },

    /// The streaming pipeline failed while being brought up or while a
    /// caller was waiting for readiness.
    #[error("streaming pipeline for '{store_id}' failed to start: {reason}")]
    PipelineStartupFailure { store_id: String, reason: String },

    /// Delivery failure surfaced from the log client during commit.
    /// Not retried by the engine.
    #[error("commit failed for table '{entity}': {reason}")]
    CommitFailure { entity: String, reason: String },

    /// Abstract entity types have no stream of their own.
    #[error("entity type '{0}' is abstract and cannot be materialized")]
    AbstractEntity(String),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl TableError {
    /// Conflict raised when a create finds its key already materialized.
    pub(crate) fn key_exists(entity: &str, key: &TableKey, sensitive: bool) -> Self {
        let message = if sensitive {
            format!("cannot insert '{entity}': key {key} already exists in the view")
        } else {
            format!(
                "cannot insert '{entity}': key already exists in the view \
                 (enable sensitive data logging to see key values)"
            )
        };
        Self::ConcurrencyConflict {
            entity: entity.to_string(),
            message,
            conflicts: Vec::new(),
        }
    }

    /// Conflict raised when an update or delete finds no row for its key.
    pub(crate) fn key_missing(entity: &str, key: &TableKey, sensitive: bool) -> Self {
        let message = if sensitive {
            format!("'{entity}' row with key {key} was not found in the view")
        } else {
            format!(
                "'{entity}' row was not found in the view \
                 (enable sensitive data logging to see key values)"
            )
        };
        Self::ConcurrencyConflict {
            entity: entity.to_string(),
            message,
            conflicts: Vec::new(),
        }
    }

    /// Conflict raised when concurrency-token values mismatch. `conflicts`
    /// carries values only when sensitive logging is enabled.
    pub(crate) fn token_mismatch(
        entity: &str,
        conflicts: Vec<PropertyConflict>,
        sensitive: bool,
    ) -> Self {
        let names: Vec<&str> = conflicts.iter().map(|c| c.property.as_str()).collect();
        let message = if sensitive {
            let detail: Vec<String> = conflicts
                .iter()
                .map(|c| {
                    format!(
                        "{} (expected {:?}, stored {:?})",
                        c.property, c.expected, c.actual
                    )
                })
                .collect();
            format!(
                "concurrency token mismatch on '{entity}': {}",
                detail.join(", ")
            )
        } else {
            format!(
                "concurrency token mismatch on '{entity}': {}",
                names.join(", ")
            )
        };
        let conflicts = if sensitive {
            conflicts
        } else {
            conflicts
                .into_iter()
                .map(|c| PropertyConflict {
                    property: c.property,
                    expected: None,
                    actual: None,
                })
                .collect()
        };
        Self::ConcurrencyConflict {
            entity: entity.to_string(),
            message,
            conflicts,
        }
    }

    /// Violation raised when non-nullable properties snapshot to null.
    pub(crate) fn nullability(entity: &str, properties: Vec<String>, sensitive: bool) -> Self {
        let message = if sensitive {
            format!(
                "null value in non-nullable properties of '{entity}': {}",
                properties.join(", ")
            )
        } else {
            format!(
                "null value in {} non-nullable propert{} of '{entity}'",
                properties.len(),
                if properties.len() == 1 { "y" } else { "ies" },
            )
        };
        Self::NullabilityViolation {
            entity: entity.to_string(),
            properties,
            message,
        }
    }

    /// Whether this error is an optimistic-concurrency conflict.
    pub fn is_concurrency_conflict(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict { .. })
    }

    /// Whether this error is a nullability violation.
    pub fn is_nullability_violation(&self) -> bool {
        matches!(self, Self::NullabilityViolation { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::TableKey;

    #[test]
    fn test_key_exists_sensitive_includes_key() {
        let key = TableKey::Scalar(PropertyValue::Int(42));
        let err = TableError::key_exists("Order", &key, true);
        assert!(err.to_string().contains("42"));
        assert!(err.is_concurrency_conflict());
    }

    #[test]
    fn test_key_exists_redacted_omits_key() {
        let key = TableKey::Scalar(PropertyValue::Int(42));
        let err = TableError::key_exists("Order", &key, false);
        assert!(!err.to_string().contains("42"));
        assert!(err.to_string().contains("sensitive data logging"));
    }

    #[test]
    fn test_token_mismatch_redacts_values() {
        let conflicts = vec![PropertyConflict {
            property: "Total".into(),
            expected: Some(PropertyValue::Int(10)),
            actual: Some(PropertyValue::Int(20)),
        }];
        let err = TableError::token_mismatch("Order", conflicts, false);
        match &err {
            TableError::ConcurrencyConflict { conflicts, .. } => {
                assert_eq!(conflicts.len(), 1);
                assert!(conflicts[0].expected.is_none());
                assert!(conflicts[0].actual.is_none());
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.to_string().contains("Total"));
        assert!(!err.to_string().contains("10"));
    }

    #[test]
    fn test_nullability_message_counts_when_redacted() {
        let err = TableError::nullability("Order", vec!["Status".into()], false);
        assert!(err.to_string().contains("1 non-nullable property"));
        assert!(!err.to_string().contains("Status"));

        let err = TableError::nullability("Order", vec!["Status".into()], true);
        assert!(err.to_string().contains("Status"));
    }
}
