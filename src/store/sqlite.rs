//! SQLite-backed Store.
//!
//! Rows live in a single `objects` table keyed by (entity, identity), with
//! attributes serialized as a JSON column. Predicate evaluation happens over
//! the decoded attributes, keeping the schema independent of any particular
//! domain type.

use super::{PersistedObject, Query, Store, StoreError};
use crate::mapping::MappedInstance;
use chrono::Utc;
use rusqlite::Connection;
use serde_json::Value;
use std::path::Path;
use std::sync::Mutex;

/// Store persisting mapped instances in a SQLite database.
pub struct SqliteStore {
    // rusqlite connections are not Sync; the Store contract is.
    db: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a store at the given path.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let db = Connection::open(path)?;
        Self::bootstrap(db)
    }

    /// An in-memory SQLite store (useful for tests).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::bootstrap(Connection::open_in_memory()?)
    }

    fn bootstrap(db: Connection) -> Result<Self, StoreError> {
        db.execute_batch(
            "CREATE TABLE IF NOT EXISTS objects (
                entity     TEXT NOT NULL,
                identity   TEXT NOT NULL,
                attributes TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (entity, identity)
            );",
        )?;
        Ok(Self { db: Mutex::new(db) })
    }

    fn decode_attributes(raw: &str) -> serde_json::Map<String, Value> {
        serde_json::from_str(raw).unwrap_or_default()
    }
}

impl Store for SqliteStore {
    fn find(&self, query: &Query) -> Result<Vec<PersistedObject>, StoreError> {
        let db = self
            .db
            .lock()
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        let mut stmt = db.prepare(
            "SELECT identity, attributes FROM objects WHERE entity = ?1 ORDER BY identity",
        )?;
        let rows = stmt.query_map(rusqlite::params![query.entity], |row| {
            let identity: String = row.get(0)?;
            let raw: String = row.get(1)?;
            Ok((identity, raw))
        })?;

        let mut found = Vec::new();
        for row in rows {
            let (identity, raw) = row?;
            let attributes = Self::decode_attributes(&raw);
            if query.matches(&attributes) {
                found.push(PersistedObject {
                    identity,
                    attributes,
                });
            }
        }
        Ok(found)
    }

    fn upsert(&self, instance: &MappedInstance) -> Result<(), StoreError> {
        let db = self
            .db
            .lock()
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        // Merge over the prior row so unmapped fields keep cached values.
        let prior: Option<String> = match db.query_row(
            "SELECT attributes FROM objects WHERE entity = ?1 AND identity = ?2",
            rusqlite::params![instance.entity, instance.identity],
            |row| row.get(0),
        ) {
            Ok(raw) => Some(raw),
            Err(rusqlite::Error::QueryReturnedNoRows) => None,
            Err(e) => return Err(e.into()),
        };

        let mut attributes = prior
            .as_deref()
            .map(Self::decode_attributes)
            .unwrap_or_default();
        for (attr, value) in instance.attributes_json() {
            attributes.insert(attr, value);
        }

        let raw = serde_json::to_string(&Value::Object(attributes))
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        db.execute(
            "INSERT OR REPLACE INTO objects (entity, identity, attributes, updated_at)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![instance.entity, instance.identity, raw, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn delete(&self, entity: &str, identity: &str) -> Result<bool, StoreError> {
        let db = self
            .db
            .lock()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let rows = db.execute(
            "DELETE FROM objects WHERE entity = ?1 AND identity = ?2",
            rusqlite::params![entity, identity],
        )?;
        Ok(rows > 0)
    }
}
