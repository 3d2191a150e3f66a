//! Declarative object mapping types.
//!
//! A [`TypeDescriptor`] is the immutable, shareable description of a domain
//! type: its entity name, its mapping table (source field → destination
//! attribute, with a declared kind and optional default), and which source
//! field carries the identity key. Descriptors are built once and shared
//! read-only (`Arc`) across every loader mapping that type.

mod mapper;

pub use mapper::map;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Declared kind of a destination attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttrKind {
    Text,
    Integer,
    Float,
    Bool,
    Date,
}

/// A typed attribute value on a mapped instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttrValue {
    Null,
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Date(DateTime<Utc>),
}

impl AttrValue {
    /// Render the value for storage. Dates serialize as RFC 3339 strings.
    pub fn to_json(&self) -> Value {
        match self {
            AttrValue::Null => Value::Null,
            AttrValue::Text(s) => Value::String(s.clone()),
            AttrValue::Integer(i) => Value::Number((*i).into()),
            AttrValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            AttrValue::Bool(b) => Value::Bool(*b),
            AttrValue::Date(d) => Value::String(d.to_rfc3339()),
        }
    }
}

/// One row of the mapping table. Serializable so descriptors can live in
/// configuration rather than code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldMapping {
    /// Field name looked up in the source node.
    pub source: String,
    /// Destination attribute name on the mapped instance.
    pub dest: String,
    /// Declared destination kind.
    pub kind: AttrKind,
    /// Value used when the source field is absent. `None` leaves the
    /// attribute unset so a Store upsert preserves the prior value.
    pub default: Option<AttrValue>,
}

/// Immutable description of a mappable domain type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeDescriptor {
    /// Entity name, also the Store namespace for instances of this type.
    pub entity: String,
    /// The mapping table.
    pub mappings: Vec<FieldMapping>,
    /// Source field supplying the identity key, if the type has one.
    pub identity_field: Option<String>,
}

impl TypeDescriptor {
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            mappings: Vec::new(),
            identity_field: None,
        }
    }

    /// Add a mapping table row.
    pub fn field(mut self, source: &str, dest: &str, kind: AttrKind) -> Self {
        self.mappings.push(FieldMapping {
            source: source.to_string(),
            dest: dest.to_string(),
            kind,
            default: None,
        });
        self
    }

    /// Add a mapping table row with a default for absent source fields.
    pub fn field_with_default(
        mut self,
        source: &str,
        dest: &str,
        kind: AttrKind,
        default: AttrValue,
    ) -> Self {
        self.mappings.push(FieldMapping {
            source: source.to_string(),
            dest: dest.to_string(),
            kind,
            default: Some(default),
        });
        self
    }

    /// Declare which source field carries the identity key.
    pub fn identity(mut self, source_field: &str) -> Self {
        self.identity_field = Some(source_field.to_string());
        self
    }
}

/// A soft per-field mapping fault. Never aborts the mapping pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldFault {
    /// Destination attribute that could not be set.
    pub field: String,
    /// What went wrong.
    pub reason: String,
}

/// One mapped domain instance.
#[derive(Debug, Clone)]
pub struct MappedInstance {
    /// Entity name from the descriptor.
    pub entity: String,
    /// Stable identity key: the identifying field's value, or a fresh UUID
    /// when the payload carried none.
    pub identity: String,
    /// Mapped attributes. Only fields present in the payload (or carrying
    /// a configured default) appear here.
    pub attributes: BTreeMap<String, AttrValue>,
    /// Accumulated soft faults.
    pub faults: Vec<FieldFault>,
    /// Whether the identity key was freshly generated rather than taken
    /// from the payload.
    pub newly_created: bool,
}

impl MappedInstance {
    /// Whether any per-field fault was recorded.
    pub fn is_flagged(&self) -> bool {
        !self.faults.is_empty()
    }

    pub fn attribute(&self, name: &str) -> Option<&AttrValue> {
        self.attributes.get(name)
    }

    /// Attributes rendered for storage.
    pub fn attributes_json(&self) -> serde_json::Map<String, Value> {
        self.attributes
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect()
    }
}

/// Ordered result of one mapping pass. Never contains two instances with
/// the same identity key.
pub type MappedObjectSet = Vec<MappedInstance>;

/// Identity keys of a mapped set, in set order.
pub fn identity_keys(set: &MappedObjectSet) -> Vec<String> {
    set.iter().map(|i| i.identity.clone()).collect()
}

/// Hard mapping failure: the node's top-level shape matches neither a map
/// nor a sequence of maps.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MappingError {
    #[error("node shape mismatch: expected a map or a sequence of maps, found {found}")]
    ShapeMismatch { found: String },
}
