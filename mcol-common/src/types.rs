//! # Metric Type Definitions
//!
//! Core data types shared by producers, the registry, and remote clients.
//!
//! ## Design Principles
//!
//! 1. **Fixed-Width Samples**: `Sample` is `#[repr(C)]` and exactly 24 bytes so a
//!    window of samples can be pushed over the wire as one contiguous payload.
//!
//! 2. **Newtype Ids**: `MetricId` wraps the 32-bit identity hash so it cannot be
//!    mixed up with counts or provider ids.
//!
//! 3. **Order-Free Tags**: `TagList` keeps insertion order for display, but the
//!    identity derived from it ignores order (see `identity`).
//!
//! ## Memory Layout Example
//!
//! ```text
//! Sample (24 bytes total):
//! +----------+--------------+----------------+
//! | value:8B | timestamp:8B | producer_id:8B |
//! +----------+--------------+----------------+
//! ```

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Maximum namespace/name length in bytes (fixed wire field size).
pub const MAX_NAME_LEN: usize = 35;

/// Hard ceiling on samples returned by one fetch request.
pub const FETCH_CEILING: u64 = 160_000_000;

/// Size of one encoded sample on the wire.
pub const SAMPLE_WIRE_SIZE: usize = 24;

/// 32-bit metric identifier derived from namespace, name, and tags.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MetricId(pub u32);

impl MetricId {
    /// Wraps a raw id.
    #[inline]
    pub const fn new(raw: u32) -> Self {
        MetricId(raw)
    }

    /// Returns the raw id.
    #[inline]
    pub const fn get(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for MetricId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Metric semantics.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    /// Monotonically non-decreasing count.
    Counter = 0,
    /// Non-negative elapsed-time measurement.
    Timer = 1,
    /// Arbitrary value that may rise or fall.
    Gauge = 2,
}

impl MetricKind {
    /// Human-readable kind name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Counter => "counter",
            Self::Timer => "timer",
            Self::Gauge => "gauge",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// One recorded `(value, timestamp, producer_id)` triple.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Sample {
    /// Recorded value.
    pub value: f64,
    /// Wall-clock seconds since the Unix epoch at append time.
    pub timestamp: f64,
    /// Identifier of the execution context that appended the sample.
    pub producer_id: u64,
}

impl Sample {
    /// Builds a sample from its parts.
    #[inline]
    pub const fn new(value: f64, timestamp: f64, producer_id: u64) -> Self {
        Sample {
            value,
            timestamp,
            producer_id,
        }
    }
}

/// Ordered list of tag strings attached to a metric.
///
/// Equality here is sequence equality; identity equality is set equality and
/// lives in `identity::metric_id`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TagList {
    tags: Vec<String>,
}

impl TagList {
    /// Creates an empty tag list.
    pub fn new() -> Self {
        TagList { tags: Vec::new() }
    }

    /// Builds a tag list from anything string-like.
    pub fn from_tags<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        TagList {
            tags: tags.into_iter().map(Into::into).collect(),
        }
    }

    /// Appends a tag.
    pub fn push(&mut self, tag: impl Into<String>) {
        self.tags.push(tag.into());
    }

    /// Returns the tags in insertion order.
    #[inline]
    pub fn as_slice(&self) -> &[String] {
        &self.tags
    }

    /// Returns the number of tags.
    #[inline]
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    /// Returns true if there are no tags.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Iterates over the tags.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(String::as_str)
    }
}

/// Current wall-clock time as fractional seconds since the Unix epoch.
pub fn wall_clock_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs_f64()
}

/// Clamps a requested fetch count to `[0, FETCH_CEILING]`.
///
/// Negative requests and requests at or above the ceiling become the ceiling.
pub fn clamp_requested(requested: i64) -> u64 {
    if requested < 0 || requested as u64 >= FETCH_CEILING {
        FETCH_CEILING
    } else {
        requested as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_size() {
        assert_eq!(std::mem::size_of::<Sample>(), SAMPLE_WIRE_SIZE);
    }

    #[test]
    fn test_taglist_keeps_order() {
        let mut tags = TagList::from_tags(["b", "a"]);
        tags.push("c");
        assert_eq!(tags.iter().collect::<Vec<_>>(), vec!["b", "a", "c"]);
        assert_eq!(tags.len(), 3);
        assert!(!tags.is_empty());
        assert!(TagList::new().is_empty());
    }

    #[test]
    fn test_clamp_requested() {
        assert_eq!(clamp_requested(10), 10);
        assert_eq!(clamp_requested(0), 0);
        assert_eq!(clamp_requested(-1), FETCH_CEILING);
        assert_eq!(clamp_requested(FETCH_CEILING as i64), FETCH_CEILING);
        assert_eq!(clamp_requested(i64::MAX), FETCH_CEILING);
        assert_eq!(clamp_requested(FETCH_CEILING as i64 - 1), FETCH_CEILING - 1);
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(MetricKind::Counter.to_string(), "counter");
        assert_eq!(MetricKind::Timer.name(), "timer");
        assert_eq!(MetricKind::Gauge.name(), "gauge");
    }

    #[test]
    fn test_wall_clock_is_positive() {
        assert!(wall_clock_secs() > 0.0);
    }
}
