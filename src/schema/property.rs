//! Property descriptions and the converter/comparer seams.

use std::sync::Arc;

use super::value::{PropertyValue, ValueKind};

/// Converts values between their caller-facing shape and the shape stored
/// in the log. Applied on every write snapshot and on key derivation.
pub trait ValueConverter: Send + Sync {
    /// Convert a caller-facing value into its log representation.
    fn to_log(&self, value: PropertyValue) -> PropertyValue;
    /// Convert a log value back into its caller-facing representation.
    fn from_log(&self, value: PropertyValue) -> PropertyValue;
}

/// The no-op converter.
pub struct IdentityConverter;

impl ValueConverter for IdentityConverter {
    fn to_log(&self, value: PropertyValue) -> PropertyValue {
        value
    }

    fn from_log(&self, value: PropertyValue) -> PropertyValue {
        value
    }
}

/// Decides equality for a property and produces canonical snapshots.
///
/// Keys derived through a comparer use structural equality afterwards, so
/// `snapshot` must map all comparer-equal inputs to one canonical value.
pub trait ValueComparer: Send + Sync {
    /// Whether two values are equal for this property.
    fn equals(&self, left: &PropertyValue, right: &PropertyValue) -> bool;
    /// A canonical copy of the value used for storage and key derivation.
    fn snapshot(&self, value: &PropertyValue) -> PropertyValue;
}

/// Structural equality, clone snapshots.
pub struct DefaultComparer;

impl ValueComparer for DefaultComparer {
    fn equals(&self, left: &PropertyValue, right: &PropertyValue) -> bool {
        left == right
    }

    fn snapshot(&self, value: &PropertyValue) -> PropertyValue {
        value.clone()
    }
}

/// One property of an entity type.
#[derive(Clone)]
pub struct PropertyDef {
    name: String,
    kind: ValueKind,
    nullable: bool,
    concurrency_token: bool,
    auto_increment: bool,
    converter: Option<Arc<dyn ValueConverter>>,
    comparer: Option<Arc<dyn ValueComparer>>,
}

impl PropertyDef {
    /// A nullable property with no converter or comparer overrides.
    pub fn new(name: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            name: name.into(),
            kind,
            nullable: true,
            concurrency_token: false,
            auto_increment: false,
            converter: None,
            comparer: None,
        }
    }

    /// Mark the property non-nullable.
    pub fn required(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Mark the property as a concurrency token.
    pub fn concurrency_token(mut self) -> Self {
        self.concurrency_token = true;
        self
    }

    /// Mark the property as auto-incrementing. Only meaningful for
    /// [`ValueKind::Int`] properties.
    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    /// Attach a value converter.
    pub fn with_converter(mut self, converter: Arc<dyn ValueConverter>) -> Self {
        self.converter = Some(converter);
        self
    }

    /// Attach a value comparer.
    pub fn with_comparer(mut self, comparer: Arc<dyn ValueComparer>) -> Self {
        self.comparer = Some(comparer);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn is_concurrency_token(&self) -> bool {
        self.concurrency_token
    }

    pub fn is_auto_increment(&self) -> bool {
        self.auto_increment
    }

    /// Canonical snapshot of a caller-facing value: comparer normalization
    /// followed by conversion into the log representation.
    pub fn snapshot(&self, value: &PropertyValue) -> PropertyValue {
        let normalized = match &self.comparer {
            Some(c) => c.snapshot(value),
            None => value.clone(),
        };
        match &self.converter {
            Some(c) => c.to_log(normalized),
            None => normalized,
        }
    }

    /// Equality through the property's comparer.
    pub fn values_equal(&self, left: &PropertyValue, right: &PropertyValue) -> bool {
        match &self.comparer {
            Some(c) => c.equals(left, right),
            None => left == right,
        }
    }
}

impl std::fmt::Debug for PropertyDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertyDef")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("nullable", &self.nullable)
            .field("concurrency_token", &self.concurrency_token)
            .field("auto_increment", &self.auto_increment)
            .field("converter", &self.converter.as_ref().map(|_| "<fn>"))
            .field("comparer", &self.comparer.as_ref().map(|_| "<fn>"))
            .finish()
    }
}
