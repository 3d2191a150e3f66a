//! Store collaborator contract.
//!
//! The pipeline consumes a narrow persistence interface: query a universe
//! of cached instances, upsert mapped instances, delete by identity key.
//! The storage engine behind it is out of scope — two implementations ship
//! with the crate, an in-memory store and a SQLite-backed one.
//!
//! Upsert semantics: the instance's set attributes merge over the prior
//! persisted row, so fields a partial payload never mentioned keep their
//! cached values.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::mapping::MappedInstance;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Persistence failure. Hard for upserts, best-effort for eviction.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

/// Describes a slice of cached instances: an entity plus a conjunction of
/// attribute-equality predicates. Doubles as the reconciliation query — the
/// universe against which staleness is computed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    /// Entity name the query ranges over.
    pub entity: String,
    /// Attribute-equality predicates, all of which must hold.
    pub predicates: Vec<(String, Value)>,
}

impl Query {
    /// Query matching every cached instance of an entity.
    pub fn all(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            predicates: Vec::new(),
        }
    }

    /// Narrow the query with an attribute-equality predicate.
    pub fn matching(mut self, attribute: &str, value: Value) -> Self {
        self.predicates.push((attribute.to_string(), value));
        self
    }

    /// Whether a persisted attribute row satisfies every predicate.
    pub fn matches(&self, attributes: &serde_json::Map<String, Value>) -> bool {
        self.predicates
            .iter()
            .all(|(attr, expected)| attributes.get(attr) == Some(expected))
    }
}

/// A cached instance as the Store hands it back.
#[derive(Debug, Clone)]
pub struct PersistedObject {
    pub identity: String,
    pub attributes: serde_json::Map<String, Value>,
}

/// Persistence collaborator. Implementations must be safe to share across
/// concurrently running loaders.
pub trait Store: Send + Sync {
    /// All cached instances matching the query.
    fn find(&self, query: &Query) -> Result<Vec<PersistedObject>, StoreError>;

    /// Insert or update an instance, merging its set attributes over the
    /// prior row.
    fn upsert(&self, instance: &MappedInstance) -> Result<(), StoreError>;

    /// Delete by identity key. Returns whether a row was removed.
    fn delete(&self, entity: &str, identity: &str) -> Result<bool, StoreError>;
}
