// mcol-engine - Metric storage for the collector
//
// Metrics, their bounded sample buffers, the pluggable backend table, and the
// registry that ties them together.

pub mod backend;
pub mod export;
pub mod memory;
pub mod metric;
pub mod producer;
pub mod registry;

pub use backend::{BackendKind, MetricBackend, MEMORY_BACKEND};
pub use memory::MemoryBackend;
pub use metric::{Metric, SampleBuffer};
pub use producer::current_producer_id;
pub use registry::{FetchWindow, Registry, RegistryConfig, DEFAULT_BUFFER_CAPACITY};
