//! Cache reconciliation — evict cached instances the server no longer
//! reports.
//!
//! Given a reconciliation query (the universe of eviction candidates) and a
//! freshly mapped set, anything cached within the universe but absent from
//! the fresh set is stale and gets deleted. Eviction is best-effort
//! cleanup: individual failures are logged and counted, never escalated
//! into a pipeline failure.
//!
//! The read-compute-delete sequence for a universe runs under a named lock
//! keyed by the query's entity, so two concurrent reconciliations cannot
//! race to evict instances the other is re-inserting.

use crate::mapping::MappedObjectSet;
use crate::store::{Query, Store};
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// What a reconciliation pass did.
#[derive(Debug, Clone, Default)]
pub struct ReconcileReport {
    /// Identity keys actually evicted, in universe order.
    pub evicted: Vec<String>,
    /// Identity keys that could not be evicted (logged, not fatal), plus
    /// a find failure if the universe could not be read at all.
    pub faults: Vec<String>,
}

/// Reconciles freshly mapped sets against a Store.
///
/// Cheap to clone; clones share the lock table.
#[derive(Clone, Default)]
pub struct CacheReconciler {
    // One mutex per entity universe.
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl CacheReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evict every instance in the query's universe that is absent from
    /// the fresh set.
    ///
    /// Idempotent: a second pass with the same inputs finds the universe
    /// already pruned and evicts nothing. Instances outside the universe
    /// are never touched.
    pub fn reconcile(
        &self,
        store: &dyn Store,
        query: &Query,
        fresh: &MappedObjectSet,
    ) -> ReconcileReport {
        let lock = self
            .locks
            .entry(query.entity.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let universe = match store.find(query) {
            Ok(objects) => objects,
            Err(e) => {
                tracing::warn!(entity = %query.entity, error = %e, "reconciliation skipped: universe unreadable");
                return ReconcileReport {
                    evicted: Vec::new(),
                    faults: vec![format!("find: {e}")],
                };
            }
        };

        let fresh_keys: HashSet<&str> = fresh.iter().map(|i| i.identity.as_str()).collect();

        let mut report = ReconcileReport::default();
        for stale in universe
            .iter()
            .filter(|o| !fresh_keys.contains(o.identity.as_str()))
        {
            match store.delete(&query.entity, &stale.identity) {
                Ok(true) => {
                    tracing::debug!(entity = %query.entity, identity = %stale.identity, "evicted stale instance");
                    report.evicted.push(stale.identity.clone());
                }
                Ok(false) => {
                    // Already gone — a concurrent pass got there first.
                }
                Err(e) => {
                    tracing::warn!(
                        entity = %query.entity,
                        identity = %stale.identity,
                        error = %e,
                        "failed to evict stale instance"
                    );
                    report.faults.push(stale.identity.clone());
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{AttrValue, MappedInstance};
    use crate::store::MemoryStore;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn cached(store: &MemoryStore, identity: &str, category: &str) {
        store
            .upsert(&MappedInstance {
                entity: "product".to_string(),
                identity: identity.to_string(),
                attributes: BTreeMap::from([(
                    "category".to_string(),
                    AttrValue::Text(category.to_string()),
                )]),
                faults: Vec::new(),
                newly_created: false,
            })
            .unwrap();
    }

    fn fresh(identities: &[&str]) -> MappedObjectSet {
        identities
            .iter()
            .map(|id| MappedInstance {
                entity: "product".to_string(),
                identity: id.to_string(),
                attributes: BTreeMap::new(),
                faults: Vec::new(),
                newly_created: false,
            })
            .collect()
    }

    #[test]
    fn test_evicts_exactly_the_stale_subset() {
        let store = MemoryStore::new();
        cached(&store, "A", "grinders");
        cached(&store, "B", "grinders");
        cached(&store, "C", "grinders");

        let reconciler = CacheReconciler::new();
        let report = reconciler.reconcile(&store, &Query::all("product"), &fresh(&["A", "B"]));

        assert_eq!(report.evicted, vec!["C"]);
        assert!(report.faults.is_empty());
        assert_eq!(store.find(&Query::all("product")).unwrap().len(), 2);
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let store = MemoryStore::new();
        cached(&store, "A", "grinders");
        cached(&store, "B", "grinders");
        cached(&store, "C", "grinders");

        let reconciler = CacheReconciler::new();
        let query = Query::all("product");
        let set = fresh(&["A", "B"]);

        let first = reconciler.reconcile(&store, &query, &set);
        assert_eq!(first.evicted, vec!["C"]);

        let second = reconciler.reconcile(&store, &query, &set);
        assert!(second.evicted.is_empty());
        assert!(second.faults.is_empty());
    }

    #[test]
    fn test_scoped_to_the_query_universe() {
        let store = MemoryStore::new();
        cached(&store, "A", "grinders");
        cached(&store, "B", "grinders");
        cached(&store, "K", "kettles"); // outside the universe

        let query = Query::all("product").matching("category", json!("grinders"));
        let reconciler = CacheReconciler::new();
        let report = reconciler.reconcile(&store, &query, &fresh(&["A"]));

        assert_eq!(report.evicted, vec!["B"]);
        // The kettle sibling was never a candidate
        let remaining = store.find(&Query::all("product")).unwrap();
        let identities: Vec<_> = remaining.iter().map(|o| o.identity.as_str()).collect();
        assert_eq!(identities, vec!["A", "K"]);
    }

    #[test]
    fn test_empty_fresh_set_clears_the_universe() {
        let store = MemoryStore::new();
        cached(&store, "A", "grinders");
        cached(&store, "B", "grinders");

        let reconciler = CacheReconciler::new();
        let report = reconciler.reconcile(&store, &Query::all("product"), &fresh(&[]));
        assert_eq!(report.evicted, vec!["A", "B"]);
        assert!(store.find(&Query::all("product")).unwrap().is_empty());
    }
}
