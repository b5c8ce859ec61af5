//! # Connection Pool
//!
//! Purpose: Reuse TCP connections to a provider address to reduce handshake
//! latency and allocation churn.
//!
//! ## Design Principles
//! 1. **Object Pool Pattern**: Keep a bounded set of reusable connections.
//! 2. **Minimal Locking**: Hold the mutex only while moving idle connections.
//! 3. **Fail Fast**: Exceeding the pool limit returns an error immediately.
//! 4. **Poisoned Connections Are Dropped**: Any I/O or framing error while a
//!    response is in flight leaves the stream at an unknown offset, so the
//!    connection is closed instead of returned.

use std::collections::VecDeque;
use std::io::{BufReader, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Buf;

use mcol_common::{
    get_sample, CollectorError, CollectorResult, FetchRequest, FetchResponseHead,
    FrameHeader, ListRequest, ListResponse, MetricId, ProtocolError, Request, Sample, FRAME_HEADER_LEN,
    MAX_NAME_LEN, SAMPLE_WIRE_SIZE, STATUS_OK,
};

/// Samples decoded per read when streaming a fetch response.
const SAMPLE_CHUNK: usize = 4096;

/// Largest fetch response head: fixed fields plus two short strings.
const MAX_FETCH_HEAD_LEN: usize = 12 + 2 * (1 + MAX_NAME_LEN);

/// List response fixed fields: status, reserved, count.
const LIST_HEAD_LEN: u64 = 12;

/// Pool configuration for one provider address.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Provider address.
    pub addr: SocketAddr,
    /// Maximum number of idle connections to keep.
    pub max_idle: usize,
    /// Maximum total connections (idle + in-use).
    pub max_total: usize,
    /// Optional TCP read timeout.
    pub read_timeout: Option<Duration>,
    /// Optional TCP write timeout.
    pub write_timeout: Option<Duration>,
    /// Optional TCP connect timeout.
    pub connect_timeout: Option<Duration>,
}

struct PoolState {
    idle: VecDeque<Connection>,
    total: usize,
}

struct PoolInner {
    config: PoolConfig,
    state: Mutex<PoolState>,
}

impl PoolInner {
    fn state(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Connection pool handle.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    /// Creates a new connection pool with the provided configuration.
    pub fn new(config: PoolConfig) -> Self {
        let state = PoolState {
            idle: VecDeque::with_capacity(config.max_idle),
            total: 0,
        };
        ConnectionPool {
            inner: Arc::new(PoolInner {
                config,
                state: Mutex::new(state),
            }),
        }
    }

    /// Acquires a connection from the pool.
    pub fn acquire(&self) -> CollectorResult<PooledConnection> {
        if let Some(conn) = self.pop_idle() {
            return Ok(PooledConnection::new(self.inner.clone(), conn));
        }

        if !self.try_reserve() {
            return Err(CollectorError::transport("connection pool exhausted"));
        }

        match Connection::connect(&self.inner.config) {
            Ok(conn) => Ok(PooledConnection::new(self.inner.clone(), conn)),
            Err(err) => {
                self.release_slot();
                Err(err)
            }
        }
    }

    fn pop_idle(&self) -> Option<Connection> {
        self.inner.state().idle.pop_front()
    }

    fn try_reserve(&self) -> bool {
        let mut state = self.inner.state();
        if state.total >= self.inner.config.max_total {
            return false;
        }
        state.total += 1;
        true
    }

    fn release_slot(&self) {
        let mut state = self.inner.state();
        state.total = state.total.saturating_sub(1);
    }

    fn return_connection(&self, conn: Connection) {
        let mut state = self.inner.state();
        if state.idle.len() < self.inner.config.max_idle {
            state.idle.push_back(conn);
        } else {
            state.total = state.total.saturating_sub(1);
        }
    }
}

/// Result of a fetch call before the samples are handed to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchReply {
    pub actual_count: usize,
    pub name: String,
    pub namespace: String,
}

/// RAII wrapper returning a connection to the pool on drop.
pub struct PooledConnection {
    pool: Arc<PoolInner>,
    conn: Option<Connection>,
    valid: bool,
}

impl PooledConnection {
    fn new(pool: Arc<PoolInner>, conn: Connection) -> Self {
        PooledConnection {
            pool,
            conn: Some(conn),
            valid: true,
        }
    }

    /// Sends a fetch and streams the returned samples into `sink`.
    ///
    /// `sink(i, sample)` is called for `i` in `0..actual_count`. A response
    /// carrying more than `limit` samples is a protocol error.
    pub fn fetch<F>(
        &mut self,
        provider_id: u16,
        request: FetchRequest,
        limit: usize,
        sink: F,
    ) -> CollectorResult<FetchReply>
    where
        F: FnMut(usize, Sample),
    {
        let conn = self.live()?;
        let response = conn.fetch(provider_id, request, limit, sink);
        self.track(response)
    }

    /// Sends a list request.
    pub fn list(&mut self, provider_id: u16, request: ListRequest) -> CollectorResult<Vec<MetricId>> {
        let conn = self.live()?;
        let response = conn.list(provider_id, request);
        self.track(response)
    }

    fn live(&mut self) -> CollectorResult<&mut Connection> {
        self.conn
            .as_mut()
            .ok_or_else(|| CollectorError::transport("connection already closed"))
    }

    fn track<T>(&mut self, response: CollectorResult<T>) -> CollectorResult<T> {
        // Status failures leave the stream aligned; anything else does not.
        if matches!(response, Err(CollectorError::Transport(_))) {
            self.valid = false;
        }
        response
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let conn = match self.conn.take() {
            Some(conn) => conn,
            None => return,
        };

        let pool = ConnectionPool {
            inner: self.pool.clone(),
        };

        if self.valid {
            pool.return_connection(conn);
        } else {
            pool.release_slot();
        }
    }
}

/// Single TCP connection with reusable buffers.
pub struct Connection {
    reader: BufReader<TcpStream>,
    write_buf: Vec<u8>,
    read_buf: Vec<u8>,
}

impl Connection {
    fn connect(config: &PoolConfig) -> CollectorResult<Self> {
        let stream = match config.connect_timeout {
            Some(timeout) => TcpStream::connect_timeout(&config.addr, timeout)?,
            None => TcpStream::connect(config.addr)?,
        };
        if let Some(timeout) = config.read_timeout {
            stream.set_read_timeout(Some(timeout))?;
        }
        if let Some(timeout) = config.write_timeout {
            stream.set_write_timeout(Some(timeout))?;
        }
        stream.set_nodelay(true)?;

        Ok(Connection {
            reader: BufReader::new(stream),
            write_buf: Vec::with_capacity(64),
            read_buf: Vec::with_capacity(SAMPLE_CHUNK * SAMPLE_WIRE_SIZE),
        })
    }

    fn send(&mut self, provider_id: u16, request: Request) -> CollectorResult<FrameHeader> {
        self.write_buf.clear();
        request.encode_frame(provider_id, &mut self.write_buf);

        let stream = self.reader.get_mut();
        stream.write_all(&self.write_buf)?;
        stream.flush()?;

        let mut raw = [0u8; FRAME_HEADER_LEN];
        self.reader.read_exact(&mut raw)?;
        let header = FrameHeader::decode(&mut &raw[..])?;
        if header.command()? != request.command() {
            return Err(ProtocolError::CommandMismatch.into());
        }
        Ok(header)
    }

    fn fetch<F>(
        &mut self,
        provider_id: u16,
        request: FetchRequest,
        limit: usize,
        mut sink: F,
    ) -> CollectorResult<FetchReply>
    where
        F: FnMut(usize, Sample),
    {
        let header = self.send(provider_id, Request::Fetch(request))?;

        // Read at most one maximal head; any sample bytes pulled in with it
        // are decoded before streaming the rest.
        let head_len = usize::try_from(header.payload_len)
            .unwrap_or(usize::MAX)
            .min(MAX_FETCH_HEAD_LEN);
        let mut head_bytes = [0u8; MAX_FETCH_HEAD_LEN];
        self.reader.read_exact(&mut head_bytes[..head_len])?;
        let mut cursor = &head_bytes[..head_len];
        let head = FetchResponseHead::decode(&mut cursor)?;
        let consumed = head_len - cursor.remaining();

        let actual = usize::try_from(head.actual_count)
            .map_err(|_| ProtocolError::Truncated)?;
        let expected_len = consumed as u64 + actual as u64 * SAMPLE_WIRE_SIZE as u64;
        if expected_len != header.payload_len || actual > limit {
            return Err(ProtocolError::Truncated.into());
        }

        // Samples that were already pulled in with the head.
        let mut leftover = cursor;
        let mut index = 0;
        while index < actual && leftover.remaining() >= SAMPLE_WIRE_SIZE {
            sink(index, get_sample(&mut leftover)?);
            index += 1;
        }
        if leftover.has_remaining() {
            let have = leftover.len();
            let mut sample = [0u8; SAMPLE_WIRE_SIZE];
            sample[..have].copy_from_slice(leftover);
            self.reader.read_exact(&mut sample[have..])?;
            sink(index, get_sample(&mut &sample[..])?);
            index += 1;
        }

        while index < actual {
            let batch = (actual - index).min(SAMPLE_CHUNK);
            self.read_buf.resize(batch * SAMPLE_WIRE_SIZE, 0);
            self.reader.read_exact(&mut self.read_buf)?;
            let mut chunk = &self.read_buf[..];
            for _ in 0..batch {
                sink(index, get_sample(&mut chunk)?);
                index += 1;
            }
        }

        if head.status != STATUS_OK {
            return Err(CollectorError::from_code(head.status));
        }
        Ok(FetchReply {
            actual_count: actual,
            name: head.name,
            namespace: head.namespace,
        })
    }

    fn list(&mut self, provider_id: u16, request: ListRequest) -> CollectorResult<Vec<MetricId>> {
        let header = self.send(provider_id, Request::List(request))?;
        // Bound the payload by what was asked for before allocating for it.
        let max_len = LIST_HEAD_LEN.saturating_add(request.max_ids.saturating_mul(4));
        if header.payload_len > max_len {
            return Err(ProtocolError::PayloadTooLarge(header.payload_len).into());
        }
        let payload_len = usize::try_from(header.payload_len)
            .map_err(|_| ProtocolError::PayloadTooLarge(header.payload_len))?;

        self.read_buf.resize(payload_len, 0);
        self.reader.read_exact(&mut self.read_buf)?;
        let mut cursor = &self.read_buf[..];
        let response = ListResponse::decode(&mut cursor)?;
        if cursor.has_remaining() {
            return Err(ProtocolError::Truncated.into());
        }
        if response.status != STATUS_OK {
            return Err(CollectorError::from_code(response.status));
        }
        if response.ids.len() as u64 > request.max_ids {
            return Err(ProtocolError::Truncated.into());
        }
        Ok(response.ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    fn config(addr: SocketAddr, max_total: usize) -> PoolConfig {
        PoolConfig {
            addr,
            max_idle: 1,
            max_total,
            read_timeout: Some(Duration::from_secs(1)),
            write_timeout: Some(Duration::from_secs(1)),
            connect_timeout: Some(Duration::from_secs(1)),
        }
    }

    #[test]
    fn pool_limits_total_connections() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let pool = ConnectionPool::new(config(listener.local_addr().unwrap(), 1));

        let first = pool.acquire().unwrap();
        assert!(matches!(pool.acquire(), Err(CollectorError::Transport(_))));
        drop(first);
        assert!(pool.acquire().is_ok());
    }

    #[test]
    fn connect_failure_frees_slot() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let pool = ConnectionPool::new(config(addr, 1));
        assert!(matches!(pool.acquire(), Err(CollectorError::Transport(_))));
        assert_eq!(pool.inner.state().total, 0);
    }
}
