//! Snapshot export of a metric's samples to text files.
//!
//! Both dumps copy the written samples under the metric lock and format them
//! after the lock is released, so producers are blocked only for the copy.
//!
//! Histogram format:
//!
//! ```text
//! <bucket_count>, <min:.6>, <max:.6>
//! <count of bucket 0>
//! ...
//! <count of bucket bucket_count-1>
//! ```
//!
//! Raw format, one line per sample:
//!
//! ```text
//! <value:.9>, <timestamp:.9>, <producer_id>
//! ```

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use mcol_common::{CollectorError, CollectorResult, Sample};
use tracing::warn;

use crate::metric::Metric;

impl Metric {
    /// Writes a linear histogram of the current samples to `path`.
    ///
    /// # Errors
    /// `InvalidArgs` for zero buckets, `Other` if the file cannot be written.
    pub fn dump_histogram(&self, path: impl AsRef<Path>, bucket_count: usize) -> CollectorResult<()> {
        if bucket_count == 0 {
            return Err(CollectorError::InvalidArgs);
        }
        let samples = self.snapshot();
        let path = path.as_ref();
        write_file(path, |out| write_histogram(&samples, bucket_count, out)).map_err(|err| {
            warn!(metric = %self.id(), path = %path.display(), error = %err, "histogram dump failed");
            CollectorError::Other
        })
    }

    /// Writes every current sample to `path`.
    ///
    /// # Errors
    /// `Other` if the file cannot be written.
    pub fn dump_raw(&self, path: impl AsRef<Path>) -> CollectorResult<()> {
        let samples = self.snapshot();
        let path = path.as_ref();
        write_file(path, |out| write_raw(&samples, out)).map_err(|err| {
            warn!(metric = %self.id(), path = %path.display(), error = %err, "raw dump failed");
            CollectorError::Other
        })
    }
}

fn write_file<F>(path: &Path, body: F) -> io::Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> io::Result<()>,
{
    let mut out = BufWriter::new(File::create(path)?);
    body(&mut out)?;
    out.flush()
}

/// Bucket counts over `[min, max]` plus the observed bounds.
///
/// The maximum lands in the last bucket. When every value is equal all
/// samples land in bucket 0. No samples yields `min == max == 0`.
pub fn histogram(samples: &[Sample], bucket_count: usize) -> (Vec<u64>, f64, f64) {
    let mut buckets = vec![0u64; bucket_count];
    if samples.is_empty() || bucket_count == 0 {
        return (buckets, 0.0, 0.0);
    }

    let (min, max) = samples.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), s| {
        (lo.min(s.value), hi.max(s.value))
    });
    let span = max - min;

    for sample in samples {
        let idx = if span > 0.0 {
            (((sample.value - min) / span) * bucket_count as f64) as usize
        } else {
            0
        };
        buckets[idx.min(bucket_count - 1)] += 1;
    }
    (buckets, min, max)
}

pub fn write_histogram<W: Write>(samples: &[Sample], bucket_count: usize, out: &mut W) -> io::Result<()> {
    let (buckets, min, max) = histogram(samples, bucket_count);
    writeln!(out, "{}, {:.6}, {:.6}", bucket_count, min, max)?;
    for count in buckets {
        writeln!(out, "{}", count)?;
    }
    Ok(())
}

pub fn write_raw<W: Write>(samples: &[Sample], out: &mut W) -> io::Result<()> {
    for sample in samples {
        writeln!(
            out,
            "{:.9}, {:.9}, {}",
            sample.value, sample.timestamp, sample.producer_id
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcol_common::{MetricKind, TagList};

    fn samples(values: &[f64]) -> Vec<Sample> {
        values.iter().map(|&v| Sample::new(v, 1.0, 1)).collect()
    }

    #[test]
    fn histogram_places_max_in_last_bucket() {
        let (buckets, min, max) = histogram(&samples(&[0.0, 1.0, 2.0, 3.0, 4.0]), 4);
        assert_eq!(min, 0.0);
        assert_eq!(max, 4.0);
        assert_eq!(buckets, vec![1, 1, 1, 2]);
    }

    #[test]
    fn histogram_constant_values_go_to_first_bucket() {
        let (buckets, min, max) = histogram(&samples(&[5.0, 5.0, 5.0]), 3);
        assert_eq!((min, max), (5.0, 5.0));
        assert_eq!(buckets, vec![3, 0, 0]);
    }

    #[test]
    fn histogram_text_layout() {
        let mut out = Vec::new();
        write_histogram(&samples(&[1.0, 2.0]), 2, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "2, 1.000000, 2.000000\n1\n1\n");
    }

    #[test]
    fn empty_histogram_text() {
        let mut out = Vec::new();
        write_histogram(&[], 3, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "3, 0.000000, 0.000000\n0\n0\n0\n");
    }

    #[test]
    fn raw_text_layout() {
        let mut out = Vec::new();
        write_raw(&[Sample::new(1.5, 2.25, 7)], &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "1.500000000, 2.250000000, 7\n");
    }

    #[test]
    fn dumps_write_files() {
        let metric = Metric::new("ns", "dump", MetricKind::Gauge, "", TagList::new(), 8).unwrap();
        for v in [3.0, 1.0, 2.0] {
            metric.update(v).unwrap();
        }

        let dir = std::env::temp_dir();
        let hist_path = dir.join(format!("mcol-hist-{}.txt", std::process::id()));
        let raw_path = dir.join(format!("mcol-raw-{}.txt", std::process::id()));

        metric.dump_histogram(&hist_path, 2).unwrap();
        metric.dump_raw(&raw_path).unwrap();

        let hist = std::fs::read_to_string(&hist_path).unwrap();
        assert_eq!(hist.lines().next(), Some("2, 1.000000, 3.000000"));
        assert_eq!(hist.lines().count(), 3);

        let raw = std::fs::read_to_string(&raw_path).unwrap();
        let lines: Vec<&str> = raw.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("3.000000000, "));

        let _ = std::fs::remove_file(hist_path);
        let _ = std::fs::remove_file(raw_path);
    }

    #[test]
    fn zero_buckets_rejected() {
        let metric = Metric::new("ns", "dump", MetricKind::Gauge, "", TagList::new(), 8).unwrap();
        let path = std::env::temp_dir().join("mcol-never-written.txt");
        assert_eq!(metric.dump_histogram(&path, 0), Err(CollectorError::InvalidArgs));
    }

    #[test]
    fn unwritable_path_fails() {
        let metric = Metric::new("ns", "dump", MetricKind::Gauge, "", TagList::new(), 8).unwrap();
        let path = std::env::temp_dir().join("mcol-no-such-dir").join("x").join("out.txt");
        assert_eq!(metric.dump_raw(&path), Err(CollectorError::Other));
    }
}
