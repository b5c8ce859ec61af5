//! # Registry Benchmark Harness
//!
//! Purpose: Provide a dependency-free, repeatable benchmark driver for metric
//! updates and fetches so baseline throughput can be compared over time.
//!
//! ## Design Principles
//! 1. **Deterministic Workload**: Use a fixed PRNG seed for stable comparisons.
//! 2. **Setup Off the Hot Path**: Create every metric before timing starts.
//! 3. **Bounded Buffers**: Size buffers so the timed phases never hit
//!    `BufferFull`.
//!
//! Usage: `bench_registry [metrics] [updates] [fetch_window]`

use std::env;
use std::hint::black_box;
use std::sync::Arc;
use std::time::Instant;

use mcol_common::{CollectorResult, MetricKind, TagList};
use mcol_engine::{Metric, Registry, RegistryConfig};

const DEFAULT_METRIC_COUNT: usize = 1 << 8;
const DEFAULT_UPDATE_COUNT: usize = 1_000_000;
const DEFAULT_FETCH_WINDOW: usize = 1_024;

struct BenchConfig {
    requested_metrics: usize,
    metric_count: usize,
    metric_mask: usize,
    update_count: usize,
    fetch_window: usize,
}

impl BenchConfig {
    fn from_args() -> Self {
        let mut args = env::args().skip(1);
        let requested_metrics = parse_usize(args.next(), DEFAULT_METRIC_COUNT);
        let update_count = parse_usize(args.next(), DEFAULT_UPDATE_COUNT);
        let fetch_window = parse_usize(args.next(), DEFAULT_FETCH_WINDOW);

        let metric_count = normalize_power_of_two(requested_metrics);
        let metric_mask = metric_count - 1;

        BenchConfig {
            requested_metrics,
            metric_count,
            metric_mask,
            update_count,
            fetch_window,
        }
    }

    /// Per-metric capacity with headroom over the uniform average.
    fn buffer_capacity(&self) -> usize {
        (self.update_count / self.metric_count) * 4 + 64
    }
}

fn parse_usize(value: Option<String>, fallback: usize) -> usize {
    value.and_then(|raw| raw.parse().ok()).unwrap_or(fallback)
}

fn normalize_power_of_two(value: usize) -> usize {
    let value = value.max(1);
    if value.is_power_of_two() {
        value
    } else {
        value.next_power_of_two()
    }
}

/// Tiny deterministic PRNG used to avoid external dependencies.
struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }

    #[inline]
    fn next_index(&mut self, mask: usize) -> usize {
        (self.next_u64() as usize) & mask
    }
}

fn report(label: &str, ops: usize, elapsed: std::time::Duration) {
    let secs = elapsed.as_secs_f64();
    let ops_per_sec = (ops as f64) / secs;
    let nanos_per_op = (secs * 1e9) / (ops as f64);
    println!(
        "{label}: {ops} ops in {secs:.3}s ({ops_per_sec:.0} ops/s, {nanos_per_op:.1} ns/op)"
    );
}

fn main() {
    if let Err(err) = run() {
        eprintln!("bench_registry failed: {err}");
        std::process::exit(1);
    }
}

fn run() -> CollectorResult<()> {
    let config = BenchConfig::from_args();
    let registry = Registry::new(RegistryConfig {
        buffer_capacity: config.buffer_capacity(),
        ..RegistryConfig::default()
    })?;

    let metrics: Vec<Arc<Metric>> = (0..config.metric_count)
        .map(|i| {
            registry.create(
                "bench",
                &format!("gauge{i}"),
                MetricKind::Gauge,
                "benchmark gauge",
                TagList::from_tags([format!("slot:{i}")]),
            )
        })
        .collect::<CollectorResult<_>>()?;

    println!(
        "metrics: requested={}, actual={}, updates={}, capacity={}, window={}",
        config.requested_metrics,
        config.metric_count,
        config.update_count,
        config.buffer_capacity(),
        config.fetch_window
    );

    let half = config.update_count / 2;
    let mut rng = XorShift64::new(0x1234_5678_9ABC_DEF0);
    let start = Instant::now();
    for i in 0..half {
        let idx = rng.next_index(config.metric_mask);
        metrics[idx].update(i as f64)?;
    }
    report("UPDATE uniform", half, start.elapsed());

    // The hot metric lives in its own registry so its buffer can hold every
    // update of the phase.
    let hot_registry = Registry::new(RegistryConfig {
        buffer_capacity: half.max(1),
        ..RegistryConfig::default()
    })?;
    let hot = hot_registry.create("bench", "hot", MetricKind::Gauge, "", TagList::new())?;
    let start = Instant::now();
    for _ in 0..half {
        hot.update_gauge_by_delta(1.0)?;
    }
    report("UPDATE hot", half, start.elapsed());

    let fetches = config.metric_count * 16;
    let mut rng = XorShift64::new(0x0FED_CBA9_8765_4321);
    let start = Instant::now();
    for _ in 0..fetches {
        let idx = rng.next_index(config.metric_mask);
        let window = registry.fetch(metrics[idx].id(), config.fetch_window as i64)?;
        black_box(window);
    }
    report("FETCH", fetches, start.elapsed());

    let start = Instant::now();
    let ids = registry.list(u64::MAX);
    black_box(&ids);
    report("LIST", 1, start.elapsed());

    Ok(())
}
