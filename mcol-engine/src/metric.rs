//! # Metric
//!
//! A named, typed, fixed-capacity sample buffer guarded by its own mutex.
//!
//! ## Design Principles
//!
//! 1. **Per-Metric Locking**: Each metric owns a `parking_lot::Mutex`, so
//!    producers updating different metrics never contend.
//! 2. **Check-and-Append Atomicity**: Kind validation (counter monotonicity,
//!    timer sign) runs under the same lock as the append, so two racing counter
//!    updates cannot both pass the check against a stale previous value.
//! 3. **Bounded Buffers**: Capacity is reserved up front and never grows; a
//!    full buffer rejects further updates with `BufferFull`.
//! 4. **Copy-Out Reads**: Fetch and export copy the samples they need while the
//!    lock is held and do all slow work (encoding, file I/O) after releasing it.
//! 5. **Retire on Destroy**: Destroying a metric frees its samples and marks
//!    the buffer retired; producers still holding an `Arc<Metric>` then get
//!    `InvalidMetric` instead of writing into a buffer nobody can read.
//!
//! ## Structure Overview
//!
//! ```text
//! Metric
//!   ├── id / namespace / name / description / kind / tags   (immutable)
//!   └── buffer: Mutex<SampleBuffer>
//!         └── SampleBuffer { samples: Vec<Sample> (len == next_index), capacity, retired }
//! ```

use parking_lot::Mutex;

use mcol_common::{
    clamp_requested, metric_id, wall_clock_secs, CollectorError, CollectorResult, MetricId,
    MetricKind, Sample, TagList, MAX_NAME_LEN,
};

use crate::producer::current_producer_id;

/// Fixed-capacity append-only storage for samples.
///
/// `len()` plays the role of the next write index: slots `[0, len)` are
/// written, and `len() <= capacity()` always holds.
#[derive(Debug)]
pub struct SampleBuffer {
    samples: Vec<Sample>,
    capacity: usize,
    retired: bool,
}

impl SampleBuffer {
    /// Reserves room for exactly `capacity` samples.
    ///
    /// # Errors
    /// `Allocation` if the reservation fails, `InvalidArgs` for zero capacity.
    pub fn with_capacity(capacity: usize) -> CollectorResult<Self> {
        if capacity == 0 {
            return Err(CollectorError::InvalidArgs);
        }
        let mut samples = Vec::new();
        samples
            .try_reserve_exact(capacity)
            .map_err(|_| CollectorError::Allocation)?;
        Ok(SampleBuffer {
            samples,
            capacity,
            retired: false,
        })
    }

    /// Number of samples written so far.
    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// True when nothing has been written.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Maximum number of samples.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// True when no further sample fits.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.samples.len() >= self.capacity
    }

    /// Most recently written sample.
    #[inline]
    pub fn last(&self) -> Option<&Sample> {
        self.samples.last()
    }

    /// True once the owning metric has been destroyed.
    #[inline]
    pub fn is_retired(&self) -> bool {
        self.retired
    }

    /// Drops every sample, releases the storage and refuses further writes.
    pub fn retire(&mut self) {
        self.retired = true;
        self.samples = Vec::new();
    }

    /// Appends a sample, or fails with `InvalidMetric` once retired and
    /// `BufferFull` at capacity.
    pub fn push(&mut self, sample: Sample) -> CollectorResult<()> {
        if self.retired {
            return Err(CollectorError::InvalidMetric);
        }
        if self.is_full() {
            return Err(CollectorError::BufferFull);
        }
        self.samples.push(sample);
        Ok(())
    }

    /// The `count` most recent samples in chronological order.
    ///
    /// `count` larger than `len()` is truncated to `len()`.
    pub fn latest(&self, count: usize) -> &[Sample] {
        let len = self.samples.len();
        &self.samples[len - count.min(len)..]
    }

    /// All written samples.
    #[inline]
    pub fn as_slice(&self) -> &[Sample] {
        &self.samples
    }
}

/// A registered metric.
#[derive(Debug)]
pub struct Metric {
    id: MetricId,
    namespace: String,
    name: String,
    description: String,
    kind: MetricKind,
    tags: TagList,
    buffer: Mutex<SampleBuffer>,
}

impl Metric {
    /// Builds a metric and reserves its buffer.
    ///
    /// # Errors
    /// - `InvalidName` for an empty or over-long namespace or name.
    /// - `Allocation` when the buffer cannot be reserved.
    pub fn new(
        namespace: &str,
        name: &str,
        kind: MetricKind,
        description: &str,
        tags: TagList,
        capacity: usize,
    ) -> CollectorResult<Self> {
        if namespace.len() > MAX_NAME_LEN || name.len() > MAX_NAME_LEN {
            return Err(CollectorError::InvalidName);
        }
        let id = metric_id(namespace, name, tags.iter())?;
        let buffer = SampleBuffer::with_capacity(capacity)?;

        Ok(Metric {
            id,
            namespace: namespace.to_owned(),
            name: name.to_owned(),
            description: description.to_owned(),
            kind,
            tags,
            buffer: Mutex::new(buffer),
        })
    }

    #[inline]
    pub fn id(&self) -> MetricId {
        self.id
    }

    #[inline]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn description(&self) -> &str {
        &self.description
    }

    #[inline]
    pub fn kind(&self) -> MetricKind {
        self.kind
    }

    #[inline]
    pub fn tags(&self) -> &TagList {
        &self.tags
    }

    /// Buffer capacity in samples.
    pub fn capacity(&self) -> usize {
        self.buffer.lock().capacity()
    }

    /// Number of samples appended so far (the next write index).
    pub fn len(&self) -> usize {
        self.buffer.lock().len()
    }

    /// True when no sample has been appended.
    pub fn is_empty(&self) -> bool {
        self.buffer.lock().is_empty()
    }

    /// Appends `value` after validating it against the metric kind.
    ///
    /// Counters reject values below the most recent one, timers reject
    /// negative values, gauges accept anything. NaN is rejected for counters
    /// and timers since it cannot be ordered.
    ///
    /// # Errors
    /// `InvalidMetric` once the metric was destroyed, `InvalidValue` when
    /// validation fails, `BufferFull` when the buffer is at capacity. Nothing
    /// is written on error.
    pub fn update(&self, value: f64) -> CollectorResult<()> {
        let mut buffer = self.buffer.lock();
        if buffer.is_retired() {
            return Err(CollectorError::InvalidMetric);
        }
        match self.kind {
            MetricKind::Counter => {
                if value.is_nan() || buffer.last().is_some_and(|prev| value < prev.value) {
                    return Err(CollectorError::InvalidValue);
                }
            }
            MetricKind::Timer => {
                if value.is_nan() || value < 0.0 {
                    return Err(CollectorError::InvalidValue);
                }
            }
            MetricKind::Gauge => {}
        }
        buffer.push(stamp(value))
    }

    /// Appends `previous + diff` to a gauge, or `1` when the gauge is empty.
    ///
    /// # Errors
    /// `InvalidValue` for non-gauge metrics, `InvalidMetric` once destroyed,
    /// `BufferFull` at capacity.
    pub fn update_gauge_by_delta(&self, diff: f64) -> CollectorResult<()> {
        if self.kind != MetricKind::Gauge {
            return Err(CollectorError::InvalidValue);
        }
        let mut buffer = self.buffer.lock();
        if buffer.is_retired() {
            return Err(CollectorError::InvalidMetric);
        }
        let value = match buffer.last() {
            Some(prev) => prev.value + diff,
            None => 1.0,
        };
        buffer.push(stamp(value))
    }

    /// Copies the most recent window for a fetch request.
    ///
    /// The request is clamped to `[0, FETCH_CEILING]` (negative means the
    /// ceiling) and then to the number of samples written.
    pub fn latest_window(&self, requested: i64) -> Vec<Sample> {
        let wanted = usize::try_from(clamp_requested(requested)).unwrap_or(usize::MAX);
        self.buffer.lock().latest(wanted).to_vec()
    }

    /// Copies every written sample.
    pub fn snapshot(&self) -> Vec<Sample> {
        self.buffer.lock().as_slice().to_vec()
    }

    /// True once the metric has been destroyed.
    pub fn is_retired(&self) -> bool {
        self.buffer.lock().is_retired()
    }

    /// Frees the samples and rejects every later update.
    pub(crate) fn retire(&self) {
        self.buffer.lock().retire();
    }
}

#[inline]
fn stamp(value: f64) -> Sample {
    Sample::new(value, wall_clock_secs(), current_producer_id())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metric(kind: MetricKind, capacity: usize) -> Metric {
        Metric::new("ns", "m", kind, "test metric", TagList::new(), capacity).unwrap()
    }

    fn values(metric: &Metric) -> Vec<f64> {
        metric.snapshot().iter().map(|s| s.value).collect()
    }

    #[test]
    fn counter_rejects_decrease() {
        let counter = metric(MetricKind::Counter, 8);
        counter.update(1.0).unwrap();
        counter.update(2.0).unwrap();
        assert_eq!(counter.update(1.5), Err(CollectorError::InvalidValue));
        counter.update(2.0).unwrap();
        assert_eq!(values(&counter), vec![1.0, 2.0, 2.0]);
    }

    #[test]
    fn timer_rejects_negative() {
        let timer = metric(MetricKind::Timer, 8);
        assert_eq!(timer.update(-1.0), Err(CollectorError::InvalidValue));
        timer.update(0.0).unwrap();
        assert_eq!(timer.update(f64::NAN), Err(CollectorError::InvalidValue));
        assert_eq!(values(&timer), vec![0.0]);
    }

    #[test]
    fn gauge_accepts_anything() {
        let gauge = metric(MetricKind::Gauge, 8);
        for v in [5.0, -3.0, 0.0, 100.0] {
            gauge.update(v).unwrap();
        }
        assert_eq!(values(&gauge), vec![5.0, -3.0, 0.0, 100.0]);
    }

    #[test]
    fn gauge_delta_starts_at_one() {
        let gauge = metric(MetricKind::Gauge, 8);
        gauge.update_gauge_by_delta(5.0).unwrap();
        gauge.update_gauge_by_delta(2.0).unwrap();
        gauge.update_gauge_by_delta(-4.0).unwrap();
        assert_eq!(values(&gauge), vec![1.0, 3.0, -1.0]);
    }

    #[test]
    fn gauge_delta_rejects_other_kinds() {
        let counter = metric(MetricKind::Counter, 8);
        assert_eq!(counter.update_gauge_by_delta(1.0), Err(CollectorError::InvalidValue));
        assert!(counter.is_empty());
    }

    #[test]
    fn full_buffer_rejects_without_writing() {
        let gauge = metric(MetricKind::Gauge, 2);
        gauge.update(1.0).unwrap();
        gauge.update(2.0).unwrap();
        assert_eq!(gauge.update(3.0), Err(CollectorError::BufferFull));
        assert_eq!(gauge.update_gauge_by_delta(1.0), Err(CollectorError::BufferFull));
        assert_eq!(gauge.len(), 2);
        assert_eq!(values(&gauge), vec![1.0, 2.0]);
    }

    #[test]
    fn retired_metric_rejects_updates() {
        let gauge = metric(MetricKind::Gauge, 4);
        gauge.update(1.0).unwrap();
        gauge.retire();

        assert!(gauge.is_retired());
        assert!(gauge.is_empty());
        assert_eq!(gauge.update(2.0), Err(CollectorError::InvalidMetric));
        assert_eq!(gauge.update_gauge_by_delta(1.0), Err(CollectorError::InvalidMetric));
        assert!(gauge.snapshot().is_empty());
    }

    #[test]
    fn samples_carry_timestamp_and_producer() {
        let gauge = metric(MetricKind::Gauge, 4);
        gauge.update(1.0).unwrap();
        gauge.update(2.0).unwrap();
        let samples = gauge.snapshot();
        assert!(samples[0].timestamp > 0.0);
        assert!(samples[1].timestamp >= samples[0].timestamp);
        assert_eq!(samples[0].producer_id, current_producer_id());
    }

    #[test]
    fn latest_window_truncates() {
        let counter = metric(MetricKind::Counter, 8);
        counter.update(1.0).unwrap();
        counter.update(2.0).unwrap();

        let all: Vec<f64> = counter.latest_window(10).iter().map(|s| s.value).collect();
        assert_eq!(all, vec![1.0, 2.0]);
        let last: Vec<f64> = counter.latest_window(1).iter().map(|s| s.value).collect();
        assert_eq!(last, vec![2.0]);
        assert_eq!(counter.latest_window(-1).len(), 2);
        assert!(counter.latest_window(0).is_empty());
    }

    #[test]
    fn names_are_validated() {
        let long = "x".repeat(MAX_NAME_LEN + 1);
        let exact = "x".repeat(MAX_NAME_LEN);
        let tags = TagList::new;
        assert_eq!(
            Metric::new(&long, "m", MetricKind::Gauge, "", tags(), 4).unwrap_err(),
            CollectorError::InvalidName
        );
        assert_eq!(
            Metric::new("ns", &long, MetricKind::Gauge, "", tags(), 4).unwrap_err(),
            CollectorError::InvalidName
        );
        assert_eq!(
            Metric::new("", "m", MetricKind::Gauge, "", tags(), 4).unwrap_err(),
            CollectorError::InvalidName
        );
        assert!(Metric::new(&exact, &exact, MetricKind::Gauge, "", tags(), 4).is_ok());
    }

    #[test]
    fn zero_capacity_is_rejected() {
        assert_eq!(
            Metric::new("ns", "m", MetricKind::Gauge, "", TagList::new(), 0).unwrap_err(),
            CollectorError::InvalidArgs
        );
    }

    #[test]
    fn huge_capacity_fails_allocation() {
        assert_eq!(
            SampleBuffer::with_capacity(usize::MAX / 2).unwrap_err(),
            CollectorError::Allocation
        );
    }
}
