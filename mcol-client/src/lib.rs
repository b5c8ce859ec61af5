//! # Collector Sync Client
//!
//! Purpose: Let remote consumers enumerate metrics on a provider and fetch
//! bounded windows of their most recent samples.
//!
//! ## Design Principles
//! 1. **Object Pool Pattern**: Reuse TCP connections per provider address.
//! 2. **Reference-Counted Handles**: Remote metrics are named by handles kept
//!    in a generation-checked arena.
//! 3. **Protocol Clarity**: Frames are encoded and validated explicitly.

mod client;
mod handle;
mod pool;

use mcol_common::{CollectorResult, MetricId};

pub use client::{ClientConfig, ClientEndpoint, FetchSummary, FetchedSamples};
pub use handle::{HandleId, RemoteMetric};

/// Computes the id a provider assigns to `(namespace, name, tags)`.
///
/// Lets a consumer name a metric it did not create. Tag order is irrelevant.
pub fn remote_metric_id<I, S>(namespace: &str, name: &str, tags: I) -> CollectorResult<MetricId>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    mcol_common::metric_id(namespace, name, tags)
}
