//! In-memory Store for tests and ephemeral caching.

use super::{PersistedObject, Query, Store, StoreError};
use crate::mapping::MappedInstance;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

/// Store keeping rows in a process-local map. Rows are keyed by
/// (entity, identity) and ordered by insertion within an entity.
#[derive(Default)]
pub struct MemoryStore {
    rows: Mutex<HashMap<(String, String), serde_json::Map<String, Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached rows across all entities.
    pub fn len(&self) -> usize {
        self.rows.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Store for MemoryStore {
    fn find(&self, query: &Query) -> Result<Vec<PersistedObject>, StoreError> {
        let rows = self
            .rows
            .lock()
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        let mut found: Vec<PersistedObject> = rows
            .iter()
            .filter(|((entity, _), attrs)| *entity == query.entity && query.matches(attrs))
            .map(|((_, identity), attrs)| PersistedObject {
                identity: identity.clone(),
                attributes: attrs.clone(),
            })
            .collect();

        // HashMap iteration order is arbitrary; keep results stable.
        found.sort_by(|a, b| a.identity.cmp(&b.identity));
        Ok(found)
    }

    fn upsert(&self, instance: &MappedInstance) -> Result<(), StoreError> {
        let mut rows = self
            .rows
            .lock()
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        let key = (instance.entity.clone(), instance.identity.clone());
        let row = rows.entry(key).or_default();
        for (attr, value) in instance.attributes_json() {
            row.insert(attr, value);
        }
        Ok(())
    }

    fn delete(&self, entity: &str, identity: &str) -> Result<bool, StoreError> {
        let mut rows = self
            .rows
            .lock()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(rows
            .remove(&(entity.to_string(), identity.to_string()))
            .is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{AttrValue, MappedInstance};
    use serde_json::json;

    fn instance(entity: &str, identity: &str, name: &str) -> MappedInstance {
        let mut attributes = std::collections::BTreeMap::new();
        attributes.insert("name".to_string(), AttrValue::Text(name.to_string()));
        MappedInstance {
            entity: entity.to_string(),
            identity: identity.to_string(),
            attributes,
            faults: Vec::new(),
            newly_created: false,
        }
    }

    #[test]
    fn test_upsert_find_delete_roundtrip() {
        let store = MemoryStore::new();
        store.upsert(&instance("product", "1", "Grinder")).unwrap();
        store.upsert(&instance("product", "2", "Kettle")).unwrap();

        let found = store.find(&Query::all("product")).unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].identity, "1");
        assert_eq!(found[0].attributes["name"], json!("Grinder"));

        assert!(store.delete("product", "1").unwrap());
        assert!(!store.delete("product", "1").unwrap());
        assert_eq!(store.find(&Query::all("product")).unwrap().len(), 1);
    }

    #[test]
    fn test_upsert_merges_over_prior_row() {
        let store = MemoryStore::new();
        store.upsert(&instance("product", "1", "Grinder")).unwrap();

        // Second upsert sets a different attribute; "name" must survive.
        let mut attributes = std::collections::BTreeMap::new();
        attributes.insert("price".to_string(), AttrValue::Float(99.0));
        store
            .upsert(&MappedInstance {
                entity: "product".to_string(),
                identity: "1".to_string(),
                attributes,
                faults: Vec::new(),
                newly_created: false,
            })
            .unwrap();

        let found = store.find(&Query::all("product")).unwrap();
        assert_eq!(found[0].attributes["name"], json!("Grinder"));
        assert_eq!(found[0].attributes["price"], json!(99.0));
    }

    #[test]
    fn test_entities_are_isolated() {
        let store = MemoryStore::new();
        store.upsert(&instance("product", "1", "Grinder")).unwrap();
        store.upsert(&instance("order", "1", "Order #1")).unwrap();

        assert_eq!(store.find(&Query::all("product")).unwrap().len(), 1);
        assert_eq!(store.find(&Query::all("order")).unwrap().len(), 1);
        store.delete("order", "1").unwrap();
        assert_eq!(store.find(&Query::all("product")).unwrap().len(), 1);
    }
}
