//! # In-Memory Backend
//!
//! Process-local metric table behind a single registry-level `RwLock`.
//!
//! ## Design Principles
//!
//! 1. **Two Lock Levels**: The table lock only covers structural operations
//!    (insert, remove, lookup, enumeration). Sample appends take the metric's
//!    own mutex and never touch the table lock.
//! 2. **Shared Entries**: Values are `Arc<Metric>` so a lookup can release the
//!    table lock before the caller reads or appends samples.
//! 3. **No Overwrite**: Inserting an id that already exists is an error; a
//!    32-bit id collision is handled exactly like a duplicate.
//! 4. **Strategy Pattern**: Implements `MetricBackend` to keep callers
//!    decoupled from the table layout.
//!
//! ## Structure Overview
//!
//! ```text
//! MemoryBackend
//!   └── table: RwLock<HashMap<MetricId, Arc<Metric>>>
//!                                         └── Metric { .., buffer: Mutex<SampleBuffer> }
//! ```

use std::sync::Arc;

use ahash::RandomState;
use hashbrown::hash_map::Entry;
use hashbrown::HashMap;
use parking_lot::RwLock;

use mcol_common::{CollectorError, CollectorResult, MetricId};

use crate::backend::{MetricBackend, MEMORY_BACKEND};
use crate::metric::Metric;

/// In-memory metric table.
#[derive(Debug)]
pub struct MemoryBackend {
    table: RwLock<HashMap<MetricId, Arc<Metric>, RandomState>>,
}

impl MemoryBackend {
    /// Creates an empty table.
    pub fn new() -> Self {
        MemoryBackend {
            table: RwLock::new(HashMap::with_hasher(RandomState::new())),
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        MEMORY_BACKEND
    }

    fn insert(&self, metric: Arc<Metric>) -> CollectorResult<()> {
        let mut table = self.table.write();
        match table.entry(metric.id()) {
            Entry::Occupied(_) => Err(CollectorError::InvalidMetric),
            Entry::Vacant(slot) => {
                slot.insert(metric);
                Ok(())
            }
        }
    }

    fn get(&self, id: MetricId) -> Option<Arc<Metric>> {
        self.table.read().get(&id).cloned()
    }

    fn remove(&self, id: MetricId) -> CollectorResult<Arc<Metric>> {
        self.table
            .write()
            .remove(&id)
            .ok_or(CollectorError::InvalidMetric)
    }

    fn clear(&self) -> Vec<Arc<Metric>> {
        self.table.write().drain().map(|(_, metric)| metric).collect()
    }

    fn len(&self) -> usize {
        self.table.read().len()
    }

    fn ids(&self, max_ids: usize) -> Vec<MetricId> {
        let table = self.table.read();
        table.keys().take(max_ids).copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcol_common::{MetricKind, TagList};

    fn metric(name: &str) -> Arc<Metric> {
        Arc::new(Metric::new("ns", name, MetricKind::Gauge, "", TagList::new(), 4).unwrap())
    }

    #[test]
    fn insert_get_remove() {
        let backend = MemoryBackend::new();
        let m = metric("alpha");
        let id = m.id();
        backend.insert(m).unwrap();
        assert_eq!(backend.len(), 1);
        assert_eq!(backend.get(id).unwrap().name(), "alpha");

        let removed = backend.remove(id).unwrap();
        assert_eq!(removed.id(), id);
        assert!(backend.get(id).is_none());
        assert!(backend.is_empty());
    }

    #[test]
    fn duplicate_insert_keeps_original() {
        let backend = MemoryBackend::new();
        let first = metric("alpha");
        first.update(7.0).unwrap();
        backend.insert(first.clone()).unwrap();

        assert_eq!(
            backend.insert(metric("alpha")),
            Err(CollectorError::InvalidMetric)
        );
        assert_eq!(backend.get(first.id()).unwrap().len(), 1);
    }

    #[test]
    fn remove_missing_fails() {
        let backend = MemoryBackend::new();
        assert_eq!(
            backend.remove(MetricId(12345)).unwrap_err(),
            CollectorError::InvalidMetric
        );
    }

    #[test]
    fn ids_are_bounded() {
        let backend = MemoryBackend::new();
        for name in ["a", "b", "c"] {
            backend.insert(metric(name)).unwrap();
        }
        assert_eq!(backend.ids(2).len(), 2);
        assert_eq!(backend.ids(10).len(), 3);
        assert!(backend.ids(0).is_empty());
    }

    #[test]
    fn clear_reports_count() {
        let backend = MemoryBackend::new();
        backend.insert(metric("a")).unwrap();
        backend.insert(metric("b")).unwrap();
        assert_eq!(backend.clear().len(), 2);
        assert!(backend.clear().is_empty());
        assert!(backend.is_empty());
    }
}
