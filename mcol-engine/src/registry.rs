//! # Registry
//!
//! Server-side table of metrics keyed by `MetricId`. Owns creation and
//! removal; producers append through the `Arc<Metric>` returned by `create`.
//!
//! ## Usage
//!
//! ```text
//! let registry = Registry::new(RegistryConfig::default())?;
//! let metric = registry.create("ns", "requests", MetricKind::Counter, "", tags)?;
//! metric.update(1.0)?;
//! let window = registry.fetch(metric.id(), 10)?;
//! ```

use std::sync::Arc;

use mcol_common::{CollectorError, CollectorResult, MetricId, MetricKind, Sample, TagList, FETCH_CEILING};
use tracing::{debug, info};

use crate::backend::{BackendKind, MetricBackend, MEMORY_BACKEND};
use crate::metric::Metric;

/// Default per-metric buffer capacity in samples.
pub const DEFAULT_BUFFER_CAPACITY: usize = 65_536;

/// Registry construction settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Capacity of every metric buffer created by this registry.
    pub buffer_capacity: usize,
    /// Backend name (`"memory"`).
    pub backend: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        RegistryConfig {
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            backend: MEMORY_BACKEND.to_string(),
        }
    }
}

impl RegistryConfig {
    /// Checks the settings without building anything.
    ///
    /// # Errors
    /// `InvalidConfig` for a capacity outside `1..=FETCH_CEILING`,
    /// `InvalidBackend` for an unknown backend name.
    pub fn validate(&self) -> CollectorResult<BackendKind> {
        if self.buffer_capacity == 0 || self.buffer_capacity as u64 > FETCH_CEILING {
            return Err(CollectorError::InvalidConfig);
        }
        BackendKind::from_name(&self.backend)
    }
}

/// Samples returned by a fetch, with the metric's names.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchWindow {
    pub namespace: String,
    pub name: String,
    /// Most recent samples, oldest first.
    pub samples: Vec<Sample>,
}

/// Metric registry.
pub struct Registry {
    backend: Box<dyn MetricBackend>,
    buffer_capacity: usize,
}

impl Registry {
    /// Builds a registry with the configured backend.
    pub fn new(config: RegistryConfig) -> CollectorResult<Self> {
        let kind = config.validate()?;
        Ok(Registry {
            backend: kind.build(),
            buffer_capacity: config.buffer_capacity,
        })
    }

    /// Name of the active backend.
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Per-metric buffer capacity.
    pub fn buffer_capacity(&self) -> usize {
        self.buffer_capacity
    }

    /// Registers a new metric.
    ///
    /// # Errors
    /// - `InvalidName` for an empty or over-long namespace or name.
    /// - `Allocation` if the buffer cannot be reserved.
    /// - `InvalidMetric` if the id is already registered (including a hash
    ///   collision with a different metric).
    ///
    /// The registry is unchanged on every error.
    pub fn create(
        &self,
        namespace: &str,
        name: &str,
        kind: MetricKind,
        description: &str,
        tags: TagList,
    ) -> CollectorResult<Arc<Metric>> {
        let metric = Arc::new(Metric::new(
            namespace,
            name,
            kind,
            description,
            tags,
            self.buffer_capacity,
        )?);
        self.backend.insert(metric.clone())?;
        info!(
            id = %metric.id(),
            namespace,
            name,
            kind = %kind,
            "metric created"
        );
        Ok(metric)
    }

    /// Looks up a metric by id.
    pub fn get(&self, id: MetricId) -> Option<Arc<Metric>> {
        self.backend.get(id)
    }

    /// Appends `value` to the metric with `id`.
    pub fn update(&self, id: MetricId, value: f64) -> CollectorResult<()> {
        self.lookup(id)?.update(value)
    }

    /// Applies a gauge delta to the metric with `id`.
    pub fn update_gauge_by_delta(&self, id: MetricId, diff: f64) -> CollectorResult<()> {
        self.lookup(id)?.update_gauge_by_delta(diff)
    }

    /// Removes a metric and releases its buffer.
    ///
    /// Outstanding `Arc<Metric>` clones see an empty buffer and their updates
    /// fail with `InvalidMetric`.
    pub fn destroy(&self, id: MetricId) -> CollectorResult<()> {
        let metric = self.backend.remove(id)?;
        metric.retire();
        info!(id = %id, name = metric.name(), "metric destroyed");
        Ok(())
    }

    /// Removes every metric and returns how many were removed.
    pub fn destroy_all(&self) -> usize {
        let drained = self.backend.clear();
        for metric in &drained {
            metric.retire();
        }
        let removed = drained.len();
        info!(removed, "all metrics destroyed");
        removed
    }

    /// Copies the most recent `requested` samples of a metric.
    ///
    /// Negative or over-ceiling requests are clamped to `FETCH_CEILING`; the
    /// result holds `min(requested, written)` samples.
    ///
    /// # Errors
    /// `InvalidMetric` for an unknown id.
    pub fn fetch(&self, id: MetricId, requested: i64) -> CollectorResult<FetchWindow> {
        let metric = self.lookup(id)?;
        let samples = metric.latest_window(requested);
        debug!(id = %id, requested, actual = samples.len(), "fetch");
        Ok(FetchWindow {
            namespace: metric.namespace().to_owned(),
            name: metric.name().to_owned(),
            samples,
        })
    }

    /// Up to `max_ids` registered ids, in unspecified order.
    pub fn list(&self, max_ids: u64) -> Vec<MetricId> {
        let max = usize::try_from(max_ids).unwrap_or(usize::MAX);
        let ids = self.backend.ids(max);
        debug!(max_ids, count = ids.len(), "list");
        ids
    }

    /// Number of registered metrics.
    pub fn len(&self) -> usize {
        self.backend.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backend.is_empty()
    }

    fn lookup(&self, id: MetricId) -> CollectorResult<Arc<Metric>> {
        self.backend.get(id).ok_or(CollectorError::InvalidMetric)
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("backend", &self.backend.name())
            .field("buffer_capacity", &self.buffer_capacity)
            .field("metrics", &self.backend.len())
            .finish()
    }
}
