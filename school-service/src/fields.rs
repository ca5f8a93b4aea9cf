//! Field registry
//!
//! Declarative mapping from the external field names used in query strings
//! and patch bodies to typed accessors on a record. The registry is built
//! once at startup and shared by the query builder and the patch engine.
//!
//! # Example
//!
//! ```rust
//! use school_service::fields::{FieldValue, ValueKind};
//! use school_service::models::{teacher_registry, TeacherField};
//!
//! let registry = teacher_registry().unwrap();
//! let subject = registry.get("subject").unwrap();
//! assert_eq!(subject.field, TeacherField::Subject);
//! assert_eq!(subject.kind(), ValueKind::String);
//! assert_eq!(
//!     ValueKind::Integer.parse_param("42"),
//!     Some(FieldValue::Integer(42))
//! );
//! ```

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Declared type of a record field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// UTF-8 text
    String,
    /// 64-bit signed integer
    Integer,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => write!(f, "string"),
            Self::Integer => write!(f, "integer"),
        }
    }
}

impl ValueKind {
    /// Convert an untyped JSON value into this kind
    ///
    /// Returns `None` when the value is not convertible. Strings only accept
    /// JSON strings; integers only accept JSON numbers without a fractional part.
    #[must_use]
    pub fn coerce_json(&self, raw: &serde_json::Value) -> Option<FieldValue> {
        match self {
            Self::String => raw.as_str().map(|s| FieldValue::Text(s.to_string())),
            Self::Integer => raw.as_i64().map(FieldValue::Integer),
        }
    }

    /// Convert a query-string value into this kind
    #[must_use]
    pub fn parse_param(&self, raw: &str) -> Option<FieldValue> {
        match self {
            Self::String => Some(FieldValue::Text(raw.to_string())),
            Self::Integer => raw.trim().parse::<i64>().ok().map(FieldValue::Integer),
        }
    }
}

/// A typed field value, also used as a positional SQL bind argument
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Text value
    Text(String),
    /// Integer value
    Integer(i64),
}

impl FieldValue {
    /// The kind this value belongs to
    #[must_use]
    pub const fn kind(&self) -> ValueKind {
        match self {
            Self::Text(_) => ValueKind::String,
            Self::Integer(_) => ValueKind::Integer,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => write!(f, "{}", s),
            Self::Integer(n) => write!(f, "{}", n),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for FieldValue {
    fn from(n: i64) -> Self {
        Self::Integer(n)
    }
}

/// A record type whose scalar fields can be addressed through a registry
///
/// `Field` is an enum naming every addressable field; implementations
/// match on it exhaustively so adding a field forces every accessor to
/// handle it.
pub trait Record: Clone + Send + Sync + 'static {
    /// Field selector type
    type Field: Copy + Eq + fmt::Debug + Send + Sync + 'static;

    /// External name of the storage-assigned identifier; never patchable
    const IDENTIFIER: &'static str;

    /// The record's identifier
    fn id(&self) -> i64;

    /// Declared kind of a field
    fn kind_of(field: Self::Field) -> ValueKind;

    /// Read a field
    fn get(&self, field: Self::Field) -> FieldValue;

    /// Overwrite a field, handing the value back if its kind does not match
    fn set(&mut self, field: Self::Field, value: FieldValue) -> Result<(), FieldValue>;
}

/// Errors raised while building a registry
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Two descriptors normalize to the same external name
    #[error("duplicate field name '{name}' (normalized: '{normalized}')")]
    DuplicateField {
        /// The second name seen
        name: String,
        /// Trimmed, lowercased form both names share
        normalized: String,
    },

    /// A descriptor has an empty external name
    #[error("field names must not be empty")]
    EmptyName,

    /// A column is not a plain SQL identifier
    #[error("column '{0}' is not a valid SQL identifier")]
    InvalidColumn(String),
}

/// Mapping from one external name to one record field
#[derive(Debug, Clone)]
pub struct FieldDescriptor<R: Record> {
    /// Name used in query strings and patch bodies
    pub external_name: &'static str,
    /// Storage column backing the field
    pub column: &'static str,
    /// Accessor on the record
    pub field: R::Field,
    /// May appear as an equality filter
    pub filterable: bool,
    /// May appear in a sort spec
    pub sortable: bool,
    /// May be overwritten by the patch engine
    pub patchable: bool,
}

impl<R: Record> FieldDescriptor<R> {
    /// Create a descriptor that is filterable, sortable and patchable
    pub fn new(external_name: &'static str, column: &'static str, field: R::Field) -> Self {
        Self {
            external_name,
            column,
            field,
            filterable: true,
            sortable: true,
            patchable: true,
        }
    }

    /// Mark the field as not patchable
    #[must_use]
    pub fn read_only(mut self) -> Self {
        self.patchable = false;
        self
    }

    /// Declared kind of the described field
    #[must_use]
    pub fn kind(&self) -> ValueKind {
        R::kind_of(self.field)
    }
}

/// Ordered set of field descriptors with unique external names
#[derive(Debug, Clone)]
pub struct FieldRegistry<R: Record> {
    descriptors: Vec<FieldDescriptor<R>>,
    index: HashMap<&'static str, usize>,
}

impl<R: Record> FieldRegistry<R> {
    /// Build a registry, rejecting names that collide after normalization
    pub fn new(descriptors: Vec<FieldDescriptor<R>>) -> Result<Self, RegistryError> {
        let mut seen: HashMap<String, &'static str> = HashMap::new();
        let mut index = HashMap::with_capacity(descriptors.len());

        for (position, descriptor) in descriptors.iter().enumerate() {
            let normalized = normalize(descriptor.external_name);
            if normalized.is_empty() {
                return Err(RegistryError::EmptyName);
            }
            if !is_sql_identifier(descriptor.column) {
                return Err(RegistryError::InvalidColumn(descriptor.column.to_string()));
            }
            if seen.insert(normalized.clone(), descriptor.external_name).is_some() {
                return Err(RegistryError::DuplicateField {
                    name: descriptor.external_name.to_string(),
                    normalized,
                });
            }
            index.insert(descriptor.external_name, position);
        }

        Ok(Self { descriptors, index })
    }

    /// Look up a descriptor by its exact external name
    #[must_use]
    pub fn get(&self, external_name: &str) -> Option<&FieldDescriptor<R>> {
        self.index
            .get(external_name)
            .map(|&position| &self.descriptors[position])
    }

    /// Descriptors in declaration order
    pub fn iter(&self) -> impl Iterator<Item = &FieldDescriptor<R>> {
        self.descriptors.iter()
    }

    /// External names in declaration order
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.descriptors.iter().map(|d| d.external_name)
    }

    /// Number of descriptors
    #[must_use]
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Whether the registry has no descriptors
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

fn normalize(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}

fn is_sql_identifier(column: &str) -> bool {
    let mut chars = column.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
