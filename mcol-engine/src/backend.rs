//! # Metric Backend
//!
//! Storage strategy behind a `Registry`.
//!
//! A backend is chosen once, by name, when the registry is built. All
//! operations go through the `MetricBackend` trait so callers never depend on
//! the concrete table layout.

use std::sync::Arc;

use mcol_common::{CollectorError, CollectorResult, MetricId};

use crate::memory::MemoryBackend;
use crate::metric::Metric;

/// Name of the built-in in-memory backend.
pub const MEMORY_BACKEND: &str = "memory";

/// Storage abstraction for registered metrics.
///
/// Implementations must be safe to call from many threads and must never
/// overwrite an existing id on insert.
pub trait MetricBackend: Send + Sync {
    /// Backend name used for selection.
    fn name(&self) -> &'static str;

    /// Inserts a metric.
    ///
    /// Returns `InvalidMetric` if the id is already present.
    fn insert(&self, metric: Arc<Metric>) -> CollectorResult<()>;

    /// Looks up a metric by id.
    fn get(&self, id: MetricId) -> Option<Arc<Metric>>;

    /// Removes a metric by id.
    ///
    /// Returns `InvalidMetric` if the id is absent.
    fn remove(&self, id: MetricId) -> CollectorResult<Arc<Metric>>;

    /// Removes every metric and hands the removed entries back.
    fn clear(&self) -> Vec<Arc<Metric>>;

    /// Number of registered metrics.
    fn len(&self) -> usize;

    /// True when no metric is registered.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Up to `max_ids` registered ids, in unspecified order.
    fn ids(&self, max_ids: usize) -> Vec<MetricId>;
}

/// Known backend implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Process-local hash table.
    Memory,
}

impl BackendKind {
    /// Resolves a backend by configured name.
    ///
    /// # Errors
    /// `InvalidBackend` for unknown names.
    pub fn from_name(name: &str) -> CollectorResult<Self> {
        match name {
            MEMORY_BACKEND => Ok(BackendKind::Memory),
            _ => Err(CollectorError::InvalidBackend),
        }
    }

    /// Configured name of this backend.
    pub const fn name(self) -> &'static str {
        match self {
            BackendKind::Memory => MEMORY_BACKEND,
        }
    }

    /// Instantiates the backend.
    pub fn build(self) -> Box<dyn MetricBackend> {
        match self {
            BackendKind::Memory => Box::new(MemoryBackend::new()),
        }
    }
}
