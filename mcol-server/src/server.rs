//! # TCP Server
//!
//! Accept collector connections, parse request frames, and dispatch them to
//! the provider with minimal overhead.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use mcol_common::{clamp_requested, FrameParser, Request, RequestFrame};

use crate::provider::Provider;

/// Fetch windows larger than this many samples are copied and encoded on the
/// blocking pool so they do not stall other connections on the worker.
pub const BLOCKING_FETCH_SAMPLES: u64 = 4_096;

/// A provider bound to a listening socket.
pub struct Server {
    listener: TcpListener,
    provider: Arc<Provider>,
}

impl Server {
    /// Binds `addr` and serves `provider` on it.
    pub async fn bind(addr: SocketAddr, provider: Arc<Provider>) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Server { listener, provider })
    }

    /// Wraps an already-bound std listener.
    ///
    /// Must be called from within a tokio runtime.
    pub fn from_std(listener: std::net::TcpListener, provider: Arc<Provider>) -> io::Result<Self> {
        listener.set_nonblocking(true)?;
        Ok(Server {
            listener: TcpListener::from_std(listener)?,
            provider,
        })
    }

    /// Address the server is listening on.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn provider(&self) -> &Arc<Provider> {
        &self.provider
    }

    /// Accepts connections until `shutdown` resolves.
    ///
    /// Each connection runs on its own task; connection errors are logged and
    /// never stop the accept loop.
    pub async fn run_until<F>(self, shutdown: F) -> io::Result<()>
    where
        F: Future<Output = ()>,
    {
        let addr = self.local_addr()?;
        info!(provider = self.provider.id(), %addr, "provider listening");
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(pair) => pair,
                        Err(err) => {
                            error!(error = %err, "accept failed");
                            continue;
                        }
                    };
                    let provider = self.provider.clone();
                    tokio::spawn(async move {
                        debug!(%peer, "connection opened");
                        if let Err(err) = handle_connection(stream, provider).await {
                            error!(%peer, error = %err, "connection failed");
                        }
                    });
                }
            }
        }

        let stats = self.provider.stats();
        info!(
            provider = self.provider.id(),
            requests = stats.requests_total,
            errors = stats.errors_total,
            mean_latency_us = stats.latency.mean_us(),
            "provider stopped"
        );
        Ok(())
    }
}

/// Handles a single TCP client connection.
///
/// Frames are answered in order. A framing error closes the connection.
pub async fn handle_connection(stream: TcpStream, provider: Arc<Provider>) -> io::Result<()> {
    let mut stream = stream;
    stream.set_nodelay(true)?;
    let mut buffer = BytesMut::with_capacity(8 * 1024);
    let mut response = BytesMut::with_capacity(8 * 1024);
    let mut parser = FrameParser::new();

    loop {
        let bytes = stream.read_buf(&mut buffer).await?;
        if bytes == 0 {
            break;
        }

        loop {
            match parser.parse(&mut buffer) {
                Ok(Some(frame)) => {
                    response = respond(&provider, frame, response).await?;
                    stream.write_all(&response).await?;
                    response.clear();
                }
                Ok(None) => break,
                Err(err) => {
                    warn!(provider = provider.id(), error = %err, "rejected frame, closing connection");
                    return Ok(());
                }
            }
        }
    }

    Ok(())
}

async fn respond(provider: &Arc<Provider>, frame: RequestFrame, mut out: BytesMut) -> io::Result<BytesMut> {
    if !is_large_fetch(provider, &frame) {
        provider.respond(frame, &mut out);
        return Ok(out);
    }

    let provider = provider.clone();
    tokio::task::spawn_blocking(move || {
        provider.respond(frame, &mut out);
        out
    })
    .await
    .map_err(|err| io::Error::new(io::ErrorKind::Other, err))
}

/// True when a fetch may return more than `BLOCKING_FETCH_SAMPLES` samples.
fn is_large_fetch(provider: &Provider, frame: &RequestFrame) -> bool {
    match frame.request {
        Request::Fetch(request) => {
            let capacity = provider.registry().buffer_capacity() as u64;
            clamp_requested(request.requested_count).min(capacity) > BLOCKING_FETCH_SAMPLES
        }
        Request::List(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderConfig;
    use mcol_common::{FetchRequest, ListRequest, MetricId};

    fn provider(buffer_capacity: usize) -> Provider {
        Provider::new(&ProviderConfig {
            buffer_capacity,
            ..ProviderConfig::default()
        })
        .unwrap()
    }

    fn fetch(requested: i64) -> RequestFrame {
        RequestFrame {
            provider_id: 42,
            request: Request::Fetch(FetchRequest::new(MetricId(1), requested)),
        }
    }

    #[test]
    fn large_fetch_is_bounded_by_buffer_capacity() {
        let small = provider(1_024);
        assert!(!is_large_fetch(&small, &fetch(-1)));
        assert!(!is_large_fetch(&small, &fetch(i64::MAX)));

        let big = provider(1 << 20);
        assert!(!is_large_fetch(&big, &fetch(BLOCKING_FETCH_SAMPLES as i64)));
        assert!(is_large_fetch(&big, &fetch(BLOCKING_FETCH_SAMPLES as i64 + 1)));
        assert!(is_large_fetch(&big, &fetch(-1)));

        let list = RequestFrame {
            provider_id: 42,
            request: Request::List(ListRequest::new(u64::MAX)),
        };
        assert!(!is_large_fetch(&big, &list));
    }
}
