//! # Protocol Structures
//!
//! Purpose: Define the framed request/response messages exchanged between a
//! client endpoint and a provider, and their little-endian byte encoding.
//!
//! ## Design Principles
//!
//! 1. **Header + Payload**: Every frame starts with a fixed header so the
//!    receiver can validate magic, version, and command before touching the
//!    payload.
//! 2. **Length-Prefixed Payloads**: `payload_len` is 64-bit because a fetch
//!    response may carry up to `FETCH_CEILING` samples.
//! 3. **Prefix Transfer**: A fetch response carries exactly `actual_count`
//!    samples; the client copies them into the front of a destination sized to
//!    its request and leaves the rest untouched.
//!
//! ## Usage Notes
//!
//! - Responses return `STATUS_OK` on success or `CollectorError::code()` on
//!   failure; on failure the rest of the payload is zeroed/empty.
//! - Request payloads are small and capped by `MAX_REQUEST_PAYLOAD`; a larger
//!   length is treated as a framing error.
//!
//! ## Memory Layout Example
//!
//! ```text
//! FrameHeader (16 bytes total):
//! +--------+---------+----------+----------+----------------+----------+----------------+
//! | magic  | version | command  | reserved | provider_id:2B | flags:2B | payload_len:8B |
//! +--------+---------+----------+----------+----------------+----------+----------------+
//!
//! FetchRequest payload (12 bytes):
//! +--------------+--------------------+
//! | metric_id:4B | requested_count:8B |
//! +--------------+--------------------+
//!
//! FetchResponse payload (variable):
//! +-----------+-------------+-----------------+-------------------+------------------+
//! | status:2B | reserved:2B | actual_count:8B | name_len:1B+name  | ns_len:1B+ns     |
//! +-----------+-------------+-----------------+-------------------+------------------+
//! | samples: actual_count x 24B (value:8B | timestamp:8B | producer_id:8B)           |
//! +------------------------------------------------------------------------------------+
//!
//! ListRequest payload (8 bytes):
//! +------------+
//! | max_ids:8B |
//! +------------+
//!
//! ListResponse payload (variable):
//! +-----------+-------------+----------+------------------+
//! | status:2B | reserved:2B | count:8B | ids: count x 4B  |
//! +-----------+-------------+----------+------------------+
//! ```

use bytes::{Buf, BufMut, BytesMut};
use thiserror::Error;

use crate::command::{Command, FRAME_MAGIC};
use crate::error::CollectorError;
use crate::types::{MetricId, Sample, MAX_NAME_LEN, SAMPLE_WIRE_SIZE};

/// Protocol version for wire compatibility checks.
pub const PROTOCOL_VERSION: u8 = 1;

/// Status code indicating success in responses.
pub const STATUS_OK: u16 = 0;

/// Encoded size of `FrameHeader`.
pub const FRAME_HEADER_LEN: usize = 16;

/// Largest request payload a provider will accept.
pub const MAX_REQUEST_PAYLOAD: u64 = 4 * 1024;

/// Encoded size of a fetch request payload.
pub const FETCH_REQUEST_LEN: usize = 12;

/// Encoded size of a list request payload.
pub const LIST_REQUEST_LEN: usize = 8;

/// Framing errors detected while decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Frame does not start with `FRAME_MAGIC`.
    #[error("bad frame magic {0:#04x}")]
    BadMagic(u8),
    /// Peer speaks a different protocol version.
    #[error("unsupported protocol version {0}")]
    BadVersion(u8),
    /// Command number is not known.
    #[error("unknown command {0}")]
    UnknownCommand(u8),
    /// Payload ended before a field was complete.
    #[error("truncated payload")]
    Truncated,
    /// Declared payload exceeds the allowed size.
    #[error("payload of {0} bytes is too large")]
    PayloadTooLarge(u64),
    /// A string field is not valid UTF-8 or is too long.
    #[error("invalid string field")]
    InvalidString,
    /// Response answers a different command than the one sent.
    #[error("response command does not match request")]
    CommandMismatch,
}

impl From<ProtocolError> for CollectorError {
    fn from(err: ProtocolError) -> Self {
        CollectorError::Transport(err.to_string())
    }
}

/// Common header prepended to every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameHeader {
    /// Magic number to validate the protocol.
    pub magic: u8,
    /// Protocol version.
    pub version: u8,
    /// Command number describing the request.
    pub command: u8,
    /// Reserved; must be zero.
    pub reserved: u8,
    /// Provider the frame is addressed to (requests) or sent from (responses).
    pub provider_id: u16,
    /// Reserved for future flags; must be zero.
    pub flags: u16,
    /// Number of payload bytes following the header.
    pub payload_len: u64,
}

impl FrameHeader {
    /// Builds a header for the provided command.
    pub const fn new(command: Command, provider_id: u16, payload_len: u64) -> Self {
        FrameHeader {
            magic: FRAME_MAGIC,
            version: PROTOCOL_VERSION,
            command: command.as_u8(),
            reserved: 0,
            provider_id,
            flags: 0,
            payload_len,
        }
    }

    /// Writes the header in wire order.
    pub fn encode<B: BufMut>(&self, out: &mut B) {
        out.put_u8(self.magic);
        out.put_u8(self.version);
        out.put_u8(self.command);
        out.put_u8(self.reserved);
        out.put_u16_le(self.provider_id);
        out.put_u16_le(self.flags);
        out.put_u64_le(self.payload_len);
    }

    /// Reads and validates a header.
    pub fn decode<B: Buf>(buf: &mut B) -> Result<Self, ProtocolError> {
        if buf.remaining() < FRAME_HEADER_LEN {
            return Err(ProtocolError::Truncated);
        }
        let header = FrameHeader {
            magic: buf.get_u8(),
            version: buf.get_u8(),
            command: buf.get_u8(),
            reserved: buf.get_u8(),
            provider_id: buf.get_u16_le(),
            flags: buf.get_u16_le(),
            payload_len: buf.get_u64_le(),
        };
        if header.magic != FRAME_MAGIC {
            return Err(ProtocolError::BadMagic(header.magic));
        }
        if header.version != PROTOCOL_VERSION {
            return Err(ProtocolError::BadVersion(header.version));
        }
        Ok(header)
    }

    /// Returns the decoded command.
    pub fn command(&self) -> Result<Command, ProtocolError> {
        Command::from_u8(self.command).ok_or(ProtocolError::UnknownCommand(self.command))
    }
}

/// Fetch request payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchRequest {
    /// Metric to read from.
    pub metric_id: MetricId,
    /// Number of most recent samples wanted (clamped by the provider).
    pub requested_count: i64,
}

impl FetchRequest {
    /// Builds a fetch request.
    pub const fn new(metric_id: MetricId, requested_count: i64) -> Self {
        FetchRequest {
            metric_id,
            requested_count,
        }
    }

    fn encode_payload<B: BufMut>(&self, out: &mut B) {
        out.put_u32_le(self.metric_id.get());
        out.put_i64_le(self.requested_count);
    }

    fn decode_payload<B: Buf>(buf: &mut B) -> Result<Self, ProtocolError> {
        if buf.remaining() < FETCH_REQUEST_LEN {
            return Err(ProtocolError::Truncated);
        }
        Ok(FetchRequest {
            metric_id: MetricId(buf.get_u32_le()),
            requested_count: buf.get_i64_le(),
        })
    }
}

/// List request payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListRequest {
    /// Maximum number of ids to return.
    pub max_ids: u64,
}

impl ListRequest {
    /// Builds a list request.
    pub const fn new(max_ids: u64) -> Self {
        ListRequest { max_ids }
    }
}

/// Decoded request body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    /// Fetch samples.
    Fetch(FetchRequest),
    /// List ids.
    List(ListRequest),
}

impl Request {
    /// Command carried by this request.
    pub const fn command(&self) -> Command {
        match self {
            Request::Fetch(_) => Command::Fetch,
            Request::List(_) => Command::List,
        }
    }

    /// Encodes a complete request frame addressed to `provider_id`.
    pub fn encode_frame(&self, provider_id: u16, out: &mut Vec<u8>) {
        let payload_len = match self {
            Request::Fetch(_) => FETCH_REQUEST_LEN,
            Request::List(_) => LIST_REQUEST_LEN,
        };
        out.reserve(FRAME_HEADER_LEN + payload_len);
        FrameHeader::new(self.command(), provider_id, payload_len as u64).encode(out);
        match self {
            Request::Fetch(req) => req.encode_payload(out),
            Request::List(req) => out.put_u64_le(req.max_ids),
        }
    }
}

/// A request together with the provider id from its header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestFrame {
    /// Provider the request is addressed to.
    pub provider_id: u16,
    /// Request body.
    pub request: Request,
}

/// Incremental request frame parser for a server read buffer.
///
/// Consumes bytes from the buffer only once a whole frame is available.
#[derive(Debug, Default)]
pub struct FrameParser;

impl FrameParser {
    /// Creates a parser.
    pub fn new() -> Self {
        FrameParser
    }

    /// Tries to take one request frame from the front of `buffer`.
    ///
    /// Returns `Ok(None)` when more bytes are needed.
    pub fn parse(&mut self, buffer: &mut BytesMut) -> Result<Option<RequestFrame>, ProtocolError> {
        if buffer.len() < FRAME_HEADER_LEN {
            return Ok(None);
        }

        let header = FrameHeader::decode(&mut &buffer[..FRAME_HEADER_LEN])?;
        if header.payload_len > MAX_REQUEST_PAYLOAD {
            return Err(ProtocolError::PayloadTooLarge(header.payload_len));
        }
        let command = header.command()?;

        let total = FRAME_HEADER_LEN + header.payload_len as usize;
        if buffer.len() < total {
            return Ok(None);
        }

        let frame = buffer.split_to(total);
        let mut payload = &frame[FRAME_HEADER_LEN..];
        let request = match command {
            Command::Fetch => Request::Fetch(FetchRequest::decode_payload(&mut payload)?),
            Command::List => {
                if payload.remaining() < LIST_REQUEST_LEN {
                    return Err(ProtocolError::Truncated);
                }
                Request::List(ListRequest::new(payload.get_u64_le()))
            }
        };

        Ok(Some(RequestFrame {
            provider_id: header.provider_id,
            request,
        }))
    }
}

/// Fixed part of a fetch response (everything before the samples).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponseHead {
    /// Status code (0 on success, error code on failure).
    pub status: u16,
    /// Number of samples that follow.
    pub actual_count: i64,
    /// Metric name.
    pub name: String,
    /// Metric namespace.
    pub namespace: String,
}

impl FetchResponseHead {
    /// Builds a failed response head.
    pub fn failure(err: &CollectorError) -> Self {
        FetchResponseHead {
            status: err.code(),
            actual_count: 0,
            name: String::new(),
            namespace: String::new(),
        }
    }

    fn encoded_len(&self) -> usize {
        2 + 2 + 8 + 1 + self.name.len() + 1 + self.namespace.len()
    }

    /// Reads a response head; the samples remain in the source.
    pub fn decode<B: Buf>(buf: &mut B) -> Result<Self, ProtocolError> {
        if buf.remaining() < 12 {
            return Err(ProtocolError::Truncated);
        }
        let status = buf.get_u16_le();
        let _reserved = buf.get_u16_le();
        let actual_count = buf.get_i64_le();
        let name = get_short_string(buf)?;
        let namespace = get_short_string(buf)?;
        Ok(FetchResponseHead {
            status,
            actual_count,
            name,
            namespace,
        })
    }
}

/// Encodes a full fetch response frame: head followed by `samples`.
///
/// `head.actual_count` must equal `samples.len()`.
pub fn encode_fetch_response(
    provider_id: u16,
    head: &FetchResponseHead,
    samples: &[Sample],
    out: &mut BytesMut,
) -> Result<(), ProtocolError> {
    debug_assert_eq!(head.actual_count as usize, samples.len());
    if head.name.len() > MAX_NAME_LEN || head.namespace.len() > MAX_NAME_LEN {
        return Err(ProtocolError::InvalidString);
    }

    let payload_len = head.encoded_len() + samples.len() * SAMPLE_WIRE_SIZE;
    out.reserve(FRAME_HEADER_LEN + payload_len);
    FrameHeader::new(Command::Fetch, provider_id, payload_len as u64).encode(out);
    out.put_u16_le(head.status);
    out.put_u16_le(0);
    out.put_i64_le(head.actual_count);
    put_short_string(out, &head.name);
    put_short_string(out, &head.namespace);
    for sample in samples {
        put_sample(out, sample);
    }
    Ok(())
}

/// Writes one sample in wire order.
#[inline]
pub fn put_sample<B: BufMut>(out: &mut B, sample: &Sample) {
    out.put_f64_le(sample.value);
    out.put_f64_le(sample.timestamp);
    out.put_u64_le(sample.producer_id);
}

/// Reads one sample in wire order.
#[inline]
pub fn get_sample<B: Buf>(buf: &mut B) -> Result<Sample, ProtocolError> {
    if buf.remaining() < SAMPLE_WIRE_SIZE {
        return Err(ProtocolError::Truncated);
    }
    Ok(Sample {
        value: buf.get_f64_le(),
        timestamp: buf.get_f64_le(),
        producer_id: buf.get_u64_le(),
    })
}

/// List response payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListResponse {
    /// Status code (0 on success, error code on failure).
    pub status: u16,
    /// Returned ids (unspecified order).
    pub ids: Vec<MetricId>,
}

impl ListResponse {
    /// Builds a successful response.
    pub fn ok(ids: Vec<MetricId>) -> Self {
        ListResponse {
            status: STATUS_OK,
            ids,
        }
    }

    /// Builds a failed response.
    pub fn failure(err: &CollectorError) -> Self {
        ListResponse {
            status: err.code(),
            ids: Vec::new(),
        }
    }

    /// Encodes a complete list response frame.
    pub fn encode_frame(&self, provider_id: u16, out: &mut BytesMut) {
        let payload_len = 2 + 2 + 8 + self.ids.len() * 4;
        out.reserve(FRAME_HEADER_LEN + payload_len);
        FrameHeader::new(Command::List, provider_id, payload_len as u64).encode(out);
        out.put_u16_le(self.status);
        out.put_u16_le(0);
        out.put_u64_le(self.ids.len() as u64);
        for id in &self.ids {
            out.put_u32_le(id.get());
        }
    }

    /// Decodes a list response payload.
    pub fn decode<B: Buf>(buf: &mut B) -> Result<Self, ProtocolError> {
        if buf.remaining() < 12 {
            return Err(ProtocolError::Truncated);
        }
        let status = buf.get_u16_le();
        let _reserved = buf.get_u16_le();
        let count = buf.get_u64_le();
        if (buf.remaining() as u64) < count.saturating_mul(4) {
            return Err(ProtocolError::Truncated);
        }
        let ids = (0..count).map(|_| MetricId(buf.get_u32_le())).collect();
        Ok(ListResponse { status, ids })
    }
}

fn put_short_string<B: BufMut>(out: &mut B, value: &str) {
    out.put_u8(value.len() as u8);
    out.put_slice(value.as_bytes());
}

fn get_short_string<B: Buf>(buf: &mut B) -> Result<String, ProtocolError> {
    if !buf.has_remaining() {
        return Err(ProtocolError::Truncated);
    }
    let len = buf.get_u8() as usize;
    if len > MAX_NAME_LEN {
        return Err(ProtocolError::InvalidString);
    }
    if buf.remaining() < len {
        return Err(ProtocolError::Truncated);
    }
    let mut raw = vec![0u8; len];
    buf.copy_to_slice(&mut raw);
    String::from_utf8(raw).map_err(|_| ProtocolError::InvalidString)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_header_layout() {
        let mut out = Vec::new();
        FrameHeader::new(Command::List, 42, 8).encode(&mut out);
        assert_eq!(out.len(), FRAME_HEADER_LEN);
        assert_eq!(out[0], FRAME_MAGIC);
        assert_eq!(out[1], PROTOCOL_VERSION);
        assert_eq!(out[2], Command::List.as_u8());
        assert_eq!(&out[4..6], &42u16.to_le_bytes());
        assert_eq!(&out[8..16], &8u64.to_le_bytes());
    }

    #[test]
    fn test_frame_header_rejects_bad_magic() {
        let mut out = Vec::new();
        FrameHeader::new(Command::Fetch, 1, 0).encode(&mut out);
        out[0] = b'X';
        assert_eq!(
            FrameHeader::decode(&mut &out[..]),
            Err(ProtocolError::BadMagic(b'X'))
        );
    }

    #[test]
    fn test_parser_waits_for_full_frame() {
        let mut encoded = Vec::new();
        Request::Fetch(FetchRequest::new(MetricId(7), 10)).encode_frame(3, &mut encoded);
        assert_eq!(encoded.len(), FRAME_HEADER_LEN + FETCH_REQUEST_LEN);

        let mut parser = FrameParser::new();
        let mut buffer = BytesMut::from(&encoded[..10]);
        assert_eq!(parser.parse(&mut buffer), Ok(None));

        buffer.extend_from_slice(&encoded[10..]);
        let frame = parser.parse(&mut buffer).unwrap().unwrap();
        assert_eq!(frame.provider_id, 3);
        assert_eq!(
            frame.request,
            Request::Fetch(FetchRequest::new(MetricId(7), 10))
        );
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_parser_handles_pipelined_frames() {
        let mut encoded = Vec::new();
        Request::List(ListRequest::new(5)).encode_frame(1, &mut encoded);
        Request::Fetch(FetchRequest::new(MetricId(9), -1)).encode_frame(1, &mut encoded);

        let mut parser = FrameParser::new();
        let mut buffer = BytesMut::from(&encoded[..]);
        let first = parser.parse(&mut buffer).unwrap().unwrap();
        let second = parser.parse(&mut buffer).unwrap().unwrap();
        assert_eq!(first.request, Request::List(ListRequest::new(5)));
        assert_eq!(second.request, Request::Fetch(FetchRequest::new(MetricId(9), -1)));
        assert_eq!(parser.parse(&mut buffer), Ok(None));
    }

    #[test]
    fn test_parser_rejects_oversized_payload() {
        let mut out = Vec::new();
        FrameHeader::new(Command::List, 1, MAX_REQUEST_PAYLOAD + 1).encode(&mut out);
        let mut buffer = BytesMut::from(&out[..]);
        assert_eq!(
            FrameParser::new().parse(&mut buffer),
            Err(ProtocolError::PayloadTooLarge(MAX_REQUEST_PAYLOAD + 1))
        );
    }

    #[test]
    fn test_parser_rejects_unknown_command() {
        let mut out = Vec::new();
        FrameHeader::new(Command::List, 1, 0).encode(&mut out);
        out[2] = 77;
        let mut buffer = BytesMut::from(&out[..]);
        assert_eq!(
            FrameParser::new().parse(&mut buffer),
            Err(ProtocolError::UnknownCommand(77))
        );
    }

    #[test]
    fn test_fetch_response_encoding() {
        let head = FetchResponseHead {
            status: STATUS_OK,
            actual_count: 2,
            name: "testmetric".to_string(),
            namespace: "srini".to_string(),
        };
        let samples = [Sample::new(1.0, 10.0, 1), Sample::new(2.0, 11.0, 2)];
        let mut out = BytesMut::new();
        encode_fetch_response(42, &head, &samples, &mut out).unwrap();

        let mut buf = &out[..];
        let header = FrameHeader::decode(&mut buf).unwrap();
        assert_eq!(header.command(), Ok(Command::Fetch));
        assert_eq!(header.provider_id, 42);
        assert_eq!(header.payload_len as usize, buf.len());

        let decoded = FetchResponseHead::decode(&mut buf).unwrap();
        assert_eq!(decoded, head);
        assert_eq!(buf.len(), 2 * SAMPLE_WIRE_SIZE);
        assert_eq!(get_sample(&mut buf).unwrap(), samples[0]);
        assert_eq!(get_sample(&mut buf).unwrap(), samples[1]);
    }

    #[test]
    fn test_fetch_failure_has_no_samples() {
        let head = FetchResponseHead::failure(&CollectorError::InvalidMetric);
        let mut out = BytesMut::new();
        encode_fetch_response(1, &head, &[], &mut out).unwrap();
        let mut buf = &out[FRAME_HEADER_LEN..];
        let decoded = FetchResponseHead::decode(&mut buf).unwrap();
        assert_eq!(decoded.status, CollectorError::InvalidMetric.code());
        assert_eq!(decoded.actual_count, 0);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_list_response_encoding() {
        let response = ListResponse::ok(vec![MetricId(1), MetricId(2)]);
        let mut out = BytesMut::new();
        response.encode_frame(7, &mut out);
        let mut buf = &out[..];
        let header = FrameHeader::decode(&mut buf).unwrap();
        assert_eq!(header.command(), Ok(Command::List));
        assert_eq!(ListResponse::decode(&mut buf).unwrap(), response);
    }

    #[test]
    fn test_list_response_detects_truncation() {
        let mut out = BytesMut::new();
        ListResponse::ok(vec![MetricId(1), MetricId(2)]).encode_frame(7, &mut out);
        let truncated = &out[FRAME_HEADER_LEN..out.len() - 1];
        assert_eq!(
            ListResponse::decode(&mut &truncated[..]),
            Err(ProtocolError::Truncated)
        );
    }
}
