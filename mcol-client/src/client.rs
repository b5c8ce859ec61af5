//! # Client Endpoint
//!
//! Purpose: Expose a compact, blocking API for consumers that read metrics
//! from remote providers.
//!
//! ## Design Principles
//! 1. **Facade Pattern**: `ClientEndpoint` hides pooling, framing, and handle
//!    bookkeeping.
//! 2. **Handles Name, Never Own**: A remote handle only records where a metric
//!    lives; creating or releasing one never touches the provider.
//! 3. **Prefix Transfer**: `fetch_into` writes the returned samples to the
//!    front of the caller's slice and reports how many are valid.
//! 4. **Leak Reporting**: `finalize` warns about handles still open.

use std::collections::HashMap;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, info, warn};

use mcol_common::{CollectorError, CollectorResult, FetchRequest, ListRequest, MetricId, Sample};

use crate::handle::{HandleArena, HandleId, RemoteMetric};
use crate::pool::{ConnectionPool, PoolConfig};

/// Configuration for the endpoint and its per-address pools.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Maximum idle connections kept per provider address.
    pub max_idle: usize,
    /// Maximum total connections per provider address (idle + in-use).
    pub max_total: usize,
    /// Optional TCP read timeout.
    pub read_timeout: Option<Duration>,
    /// Optional TCP write timeout.
    pub write_timeout: Option<Duration>,
    /// Optional TCP connect timeout.
    pub connect_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            max_idle: 8,
            max_total: 16,
            read_timeout: None,
            write_timeout: None,
            connect_timeout: None,
        }
    }
}

/// Samples returned by `ClientEndpoint::fetch`.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedSamples {
    pub namespace: String,
    pub name: String,
    /// Most recent samples, oldest first.
    pub samples: Vec<Sample>,
}

/// Outcome of `ClientEndpoint::fetch_into`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchSummary {
    /// Number of valid samples at the front of the destination.
    pub actual_count: usize,
    pub namespace: String,
    pub name: String,
}

/// Client-side context owning remote handles and provider connections.
pub struct ClientEndpoint {
    config: ClientConfig,
    handles: Mutex<HandleArena>,
    pools: Mutex<HashMap<SocketAddr, ConnectionPool>>,
}

impl Default for ClientEndpoint {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientEndpoint {
    /// Creates an endpoint with default configuration.
    pub fn new() -> Self {
        Self::with_config(ClientConfig::default())
    }

    /// Creates an endpoint with a custom configuration.
    pub fn with_config(config: ClientConfig) -> Self {
        ClientEndpoint {
            config,
            handles: Mutex::new(HandleArena::new()),
            pools: Mutex::new(HashMap::new()),
        }
    }

    /// Creates a handle naming `metric_id` on `provider_id` at `address`.
    ///
    /// The address is resolved once, here. The handle starts with one
    /// reference.
    ///
    /// # Errors
    /// `Transport` if the address cannot be resolved.
    pub fn create_handle(
        &self,
        address: &str,
        provider_id: u16,
        metric_id: MetricId,
    ) -> CollectorResult<HandleId> {
        let address = resolve(address)?;
        let id = self.handles().insert(RemoteMetric {
            address,
            provider_id,
            metric_id,
        });
        info!(handle = %id, %address, provider_id, metric = %metric_id, "remote handle created");
        Ok(id)
    }

    /// Adds a reference to a handle.
    ///
    /// # Errors
    /// `InvalidArgs` for a destroyed or unknown handle.
    pub fn ref_incr(&self, handle: HandleId) -> CollectorResult<()> {
        self.handles().ref_incr(handle).map(|_| ())
    }

    /// Drops a reference; the handle is destroyed when none remain.
    ///
    /// # Errors
    /// `InvalidArgs` for a destroyed or unknown handle.
    pub fn release(&self, handle: HandleId) -> CollectorResult<()> {
        if let Some(target) = self.handles().release(handle)? {
            info!(handle = %handle, metric = %target.metric_id, "remote handle destroyed");
        }
        Ok(())
    }

    /// Current reference count, or `None` for a destroyed handle.
    pub fn refcount(&self, handle: HandleId) -> Option<u64> {
        self.handles().refcount(handle)
    }

    /// What a live handle names.
    pub fn target(&self, handle: HandleId) -> CollectorResult<RemoteMetric> {
        self.handles().target(handle).cloned()
    }

    /// Number of handles not yet destroyed.
    pub fn open_handle_count(&self) -> usize {
        self.handles().open()
    }

    /// Fetches up to `requested` most recent samples of the handle's metric.
    ///
    /// Negative or over-ceiling requests ask for `FETCH_CEILING` samples. The
    /// result holds exactly the samples the provider had, never more.
    pub fn fetch(&self, handle: HandleId, requested: i64) -> CollectorResult<FetchedSamples> {
        let target = self.target(handle)?;
        let limit = usize::try_from(mcol_common::clamp_requested(requested)).unwrap_or(usize::MAX);

        let mut samples = Vec::new();
        let reply = self.pool_for(target.address).acquire()?.fetch(
            target.provider_id,
            FetchRequest::new(target.metric_id, requested),
            limit,
            |_, sample| samples.push(sample),
        )?;
        debug!(metric = %target.metric_id, requested, actual = reply.actual_count, "fetched");

        Ok(FetchedSamples {
            namespace: reply.namespace,
            name: reply.name,
            samples,
        })
    }

    /// Fetches up to `dest.len()` most recent samples into the front of `dest`.
    ///
    /// Slots past `actual_count` are left untouched.
    pub fn fetch_into(&self, handle: HandleId, dest: &mut [Sample]) -> CollectorResult<FetchSummary> {
        let target = self.target(handle)?;
        let requested = i64::try_from(dest.len()).unwrap_or(i64::MAX);
        let limit = dest.len();

        let reply = self.pool_for(target.address).acquire()?.fetch(
            target.provider_id,
            FetchRequest::new(target.metric_id, requested),
            limit,
            |index, sample| dest[index] = sample,
        )?;
        debug!(metric = %target.metric_id, requested, actual = reply.actual_count, "fetched into buffer");

        Ok(FetchSummary {
            actual_count: reply.actual_count,
            namespace: reply.namespace,
            name: reply.name,
        })
    }

    /// Lists up to `max_ids` metric ids known to a provider.
    pub fn list_metrics(&self, address: &str, provider_id: u16, max_ids: u64) -> CollectorResult<Vec<MetricId>> {
        let address = resolve(address)?;
        let ids = self
            .pool_for(address)
            .acquire()?
            .list(provider_id, ListRequest::new(max_ids))?;
        debug!(%address, provider_id, max_ids, count = ids.len(), "listed metrics");
        Ok(ids)
    }

    /// Tears the endpoint down, warning about handles that were never
    /// released. Returns the number of leaked handles.
    pub fn finalize(self) -> usize {
        let leaked = self.open_handle_count();
        if leaked != 0 {
            warn!(leaked, "client finalized with open remote handles");
        }
        leaked
    }

    fn handles(&self) -> MutexGuard<'_, HandleArena> {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn pool_for(&self, addr: SocketAddr) -> ConnectionPool {
        let mut pools = self.pools.lock().unwrap_or_else(PoisonError::into_inner);
        pools
            .entry(addr)
            .or_insert_with(|| {
                ConnectionPool::new(PoolConfig {
                    addr,
                    max_idle: self.config.max_idle,
                    max_total: self.config.max_total,
                    read_timeout: self.config.read_timeout,
                    write_timeout: self.config.write_timeout,
                    connect_timeout: self.config.connect_timeout,
                })
            })
            .clone()
    }
}

fn resolve(address: &str) -> CollectorResult<SocketAddr> {
    address
        .to_socket_addrs()
        .map_err(|err| CollectorError::transport(format!("cannot resolve {address}: {err}")))?
        .next()
        .ok_or_else(|| CollectorError::transport(format!("no address for {address}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_lifecycle() {
        let client = ClientEndpoint::new();
        let handle = client.create_handle("127.0.0.1:9", 42, MetricId(7)).unwrap();
        assert_eq!(client.open_handle_count(), 1);
        assert_eq!(client.refcount(handle), Some(1));

        client.ref_incr(handle).unwrap();
        assert_eq!(client.refcount(handle), Some(2));
        client.release(handle).unwrap();
        assert_eq!(client.open_handle_count(), 1);
        client.release(handle).unwrap();
        assert_eq!(client.open_handle_count(), 0);

        assert_eq!(client.release(handle), Err(CollectorError::InvalidArgs));
        assert_eq!(client.ref_incr(handle), Err(CollectorError::InvalidArgs));
        assert_eq!(client.finalize(), 0);
    }

    #[test]
    fn handle_from_another_endpoint_is_rejected() {
        let a = ClientEndpoint::new();
        let b = ClientEndpoint::new();
        let from_a = a.create_handle("127.0.0.1:9", 1, MetricId(1)).unwrap();
        let from_b = b.create_handle("127.0.0.1:9", 1, MetricId(2)).unwrap();

        assert_eq!(b.release(from_a), Err(CollectorError::InvalidArgs));
        assert_eq!(b.ref_incr(from_a), Err(CollectorError::InvalidArgs));
        assert_eq!(b.fetch(from_a, 1), Err(CollectorError::InvalidArgs));
        assert_eq!(b.open_handle_count(), 1);
        assert_eq!(b.refcount(from_b), Some(1));
        assert_eq!(a.refcount(from_a), Some(1));
    }

    #[test]
    fn unresolvable_address_fails() {
        let client = ClientEndpoint::new();
        assert!(matches!(
            client.create_handle("not an address", 1, MetricId(1)),
            Err(CollectorError::Transport(_))
        ));
        assert_eq!(client.open_handle_count(), 0);
    }

    #[test]
    fn target_reports_resolved_address() {
        let client = ClientEndpoint::new();
        let handle = client.create_handle("127.0.0.1:7070", 3, MetricId(11)).unwrap();
        let target = client.target(handle).unwrap();
        assert_eq!(target.address, SocketAddr::from(([127, 0, 0, 1], 7070)));
        assert_eq!(target.provider_id, 3);
        assert_eq!(target.metric_id, MetricId(11));
    }

    #[test]
    fn finalize_reports_leaks() {
        let client = ClientEndpoint::new();
        client.create_handle("127.0.0.1:9", 1, MetricId(1)).unwrap();
        client.create_handle("127.0.0.1:9", 1, MetricId(2)).unwrap();
        assert_eq!(client.finalize(), 2);
    }

    #[test]
    fn fetch_on_destroyed_handle_fails_before_connecting() {
        let client = ClientEndpoint::new();
        let handle = client.create_handle("127.0.0.1:9", 1, MetricId(1)).unwrap();
        client.release(handle).unwrap();
        assert_eq!(client.fetch(handle, 10), Err(CollectorError::InvalidArgs));
        let mut dest = [Sample::default(); 4];
        assert_eq!(client.fetch_into(handle, &mut dest), Err(CollectorError::InvalidArgs));
    }
}
