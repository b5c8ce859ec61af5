//! # Provider
//!
//! A registry served under a numeric provider id.
//!
//! The provider turns decoded request frames into encoded response frames.
//! It never fails a request at the transport level: every protocol-level
//! failure is reported through the response status so the connection stays
//! usable.

use std::sync::Arc;
use std::time::Instant;

use bytes::BytesMut;
use tracing::{debug, warn};

use mcol_common::{
    encode_fetch_response, CollectorError, CollectorResult, FetchRequest, FetchResponseHead,
    ListRequest, ListResponse, MetricId, Request, RequestFrame, STATUS_OK,
};
use mcol_engine::{FetchWindow, Registry};

use crate::config::ProviderConfig;
use crate::stats::{RequestStats, StatsSnapshot};

/// Registry plus the id it is served under.
#[derive(Debug)]
pub struct Provider {
    id: u16,
    registry: Arc<Registry>,
    stats: RequestStats,
}

impl Provider {
    /// Builds a provider with a fresh registry.
    pub fn new(config: &ProviderConfig) -> CollectorResult<Self> {
        let registry = Registry::new(config.registry_config())?;
        Ok(Self::with_registry(config.provider_id, Arc::new(registry)))
    }

    /// Serves an existing registry, shared with local producers.
    pub fn with_registry(id: u16, registry: Arc<Registry>) -> Self {
        Provider {
            id,
            registry,
            stats: RequestStats::new(),
        }
    }

    pub fn id(&self) -> u16 {
        self.id
    }

    /// Registry used by local producers to create and update metrics.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Request accounting so far.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Serves a fetch addressed to provider `target`.
    pub fn fetch(&self, target: u16, request: FetchRequest) -> CollectorResult<FetchWindow> {
        self.check_target(target)?;
        self.registry.fetch(request.metric_id, request.requested_count)
    }

    /// Serves a list addressed to provider `target`.
    pub fn list(&self, target: u16, request: ListRequest) -> CollectorResult<Vec<MetricId>> {
        self.check_target(target)?;
        Ok(self.registry.list(request.max_ids))
    }

    /// Answers one request frame, appending the response frame to `out`.
    pub fn respond(&self, frame: RequestFrame, out: &mut BytesMut) {
        self.stats.record_request_start();
        let started = Instant::now();

        let status = match frame.request {
            Request::Fetch(request) => self.respond_fetch(frame.provider_id, request, out),
            Request::List(request) => {
                let response = match self.list(frame.provider_id, request) {
                    Ok(ids) => ListResponse::ok(ids),
                    Err(err) => ListResponse::failure(&err),
                };
                response.encode_frame(self.id, out);
                response.status
            }
        };

        if status != STATUS_OK {
            self.stats.record_error();
            debug!(
                provider = self.id,
                target = frame.provider_id,
                command = %frame.request.command(),
                error = %CollectorError::from_code(status),
                "request failed"
            );
        }
        self.stats.record_request_end(started.elapsed());
    }

    fn respond_fetch(&self, target: u16, request: FetchRequest, out: &mut BytesMut) -> u16 {
        let window = match self.fetch(target, request) {
            Ok(window) => window,
            Err(err) => return encode_fetch_failure(self.id, &err, out),
        };

        let head = FetchResponseHead {
            status: STATUS_OK,
            actual_count: window.samples.len() as i64,
            name: window.name,
            namespace: window.namespace,
        };
        let mark = out.len();
        match encode_fetch_response(self.id, &head, &window.samples, out) {
            Ok(()) => STATUS_OK,
            Err(err) => {
                warn!(provider = self.id, metric = %request.metric_id, error = %err, "fetch response rejected");
                out.truncate(mark);
                encode_fetch_failure(self.id, &CollectorError::Other, out)
            }
        }
    }

    fn check_target(&self, target: u16) -> CollectorResult<()> {
        if target == self.id {
            Ok(())
        } else {
            Err(CollectorError::InvalidProvider)
        }
    }
}

fn encode_fetch_failure(provider_id: u16, err: &CollectorError, out: &mut BytesMut) -> u16 {
    let head = FetchResponseHead::failure(err);
    // A failure head has empty names and no samples, so encoding cannot fail.
    let _ = encode_fetch_response(provider_id, &head, &[], out);
    head.status
}
