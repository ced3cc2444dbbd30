//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics for hot-path operations to avoid mutex contention.
//! All counter updates are lock-free; reporting is the only operation
//! that needs synchronization (via atomic swap).
//!
//! NOTE: All atomics use Relaxed ordering. These are statistical counters only;
//! do NOT use them for coordination or logic decisions.

use crate::domain::types::EventKind;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Prometheus-style exponential bucket boundaries (microseconds)
/// Buckets: ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, ≤51200, >51200
const BUCKET_BOUNDS: [u64; 10] = [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200];
const NUM_BUCKETS: usize = 11;

/// Compute bucket index for a latency value using binary search
#[inline]
fn bucket_index(latency_us: u64) -> usize {
    BUCKET_BOUNDS.partition_point(|&bound| bound < latency_us)
}

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Swap all buckets to zero and return their values
#[inline]
fn swap_buckets(buckets: &[AtomicU64; NUM_BUCKETS]) -> [u64; NUM_BUCKETS] {
    let mut result = [0u64; NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.swap(0, Ordering::Relaxed);
    }
    result
}

/// Compute percentile from histogram buckets
/// Returns the upper bound of the bucket containing the percentile
fn percentile_from_buckets(buckets: &[u64; NUM_BUCKETS], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }

    let target = (total as f64 * percentile) as u64;
    let mut cumulative = 0u64;

    // Upper bounds for each bucket (last bucket uses 2x the previous bound)
    const BUCKET_UPPER_BOUNDS: [u64; NUM_BUCKETS] =
        [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200, 102400];

    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return BUCKET_UPPER_BOUNDS[i];
        }
    }
    BUCKET_UPPER_BOUNDS[NUM_BUCKETS - 1]
}

/// Lock-free metrics collector
///
/// All recording operations are lock-free using atomics.
/// The `report()` method atomically swaps counters to get a consistent snapshot.
pub struct Metrics {
    /// Scheduler ticks started (monotonic)
    ticks_total: AtomicU64,
    /// Samples evaluated (monotonic)
    samples_total: AtomicU64,
    /// Samples evaluated since last report (reset on report)
    samples_since_report: AtomicU64,
    /// Ticks with no position fix (monotonic)
    positions_unavailable: AtomicU64,
    /// Samples dropped for out-of-range coordinates (monotonic)
    samples_rejected: AtomicU64,
    /// Geofences Inside or Dwelling after the last sample (gauge)
    active_geofences: AtomicU64,
    /// Enter events emitted (monotonic)
    enter_total: AtomicU64,
    /// Exit events emitted (monotonic)
    exit_total: AtomicU64,
    /// Dwell events emitted (monotonic)
    dwell_total: AtomicU64,
    /// Geofences skipped because geometry failed (monotonic)
    evaluation_failures: AtomicU64,
    /// Subscriber callbacks that errored or panicked (monotonic)
    subscriber_failures: AtomicU64,
    /// Sum of evaluation latencies in microseconds (reset on report)
    latency_sum_us: AtomicU64,
    /// Max evaluation latency in microseconds (reset on report)
    latency_max_us: AtomicU64,
    /// Evaluation latency histogram buckets (reset on report)
    latency_buckets: [AtomicU64; NUM_BUCKETS],
    /// Last report time (only accessed from reporter, not atomic)
    last_report_time: parking_lot::Mutex<Instant>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            ticks_total: AtomicU64::new(0),
            samples_total: AtomicU64::new(0),
            samples_since_report: AtomicU64::new(0),
            positions_unavailable: AtomicU64::new(0),
            samples_rejected: AtomicU64::new(0),
            active_geofences: AtomicU64::new(0),
            enter_total: AtomicU64::new(0),
            exit_total: AtomicU64::new(0),
            dwell_total: AtomicU64::new(0),
            evaluation_failures: AtomicU64::new(0),
            subscriber_failures: AtomicU64::new(0),
            latency_sum_us: AtomicU64::new(0),
            latency_max_us: AtomicU64::new(0),
            latency_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            last_report_time: parking_lot::Mutex::new(Instant::now()),
        }
    }

    #[inline]
    pub fn record_tick(&self) {
        self.ticks_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_position_unavailable(&self) {
        self.positions_unavailable.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_sample_rejected(&self) {
        self.samples_rejected.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn set_active_geofences(&self, count: usize) {
        self.active_geofences.store(count as u64, Ordering::Relaxed);
    }

    /// Record a sample was evaluated with given latency (lock-free)
    #[inline]
    pub fn record_sample_evaluated(&self, latency_us: u64) {
        self.samples_total.fetch_add(1, Ordering::Relaxed);
        self.samples_since_report.fetch_add(1, Ordering::Relaxed);
        self.latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);

        let bucket = bucket_index(latency_us);
        self.latency_buckets[bucket].fetch_add(1, Ordering::Relaxed);

        update_atomic_max(&self.latency_max_us, latency_us);
    }

    #[inline]
    pub fn record_event(&self, kind: EventKind) {
        let counter = match kind {
            EventKind::Enter => &self.enter_total,
            EventKind::Exit => &self.exit_total,
            EventKind::Dwell => &self.dwell_total,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_evaluation_failures(&self, count: u64) {
        self.evaluation_failures.fetch_add(count, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_subscriber_failures(&self, count: u64) {
        self.subscriber_failures.fetch_add(count, Ordering::Relaxed);
    }

    #[inline]
    pub fn ticks_total(&self) -> u64 {
        self.ticks_total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn samples_total(&self) -> u64 {
        self.samples_total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn positions_unavailable(&self) -> u64 {
        self.positions_unavailable.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn samples_rejected(&self) -> u64 {
        self.samples_rejected.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn active_geofences(&self) -> usize {
        self.active_geofences.load(Ordering::Relaxed) as usize
    }

    #[inline]
    pub fn events_total(&self, kind: EventKind) -> u64 {
        match kind {
            EventKind::Enter => self.enter_total.load(Ordering::Relaxed),
            EventKind::Exit => self.exit_total.load(Ordering::Relaxed),
            EventKind::Dwell => self.dwell_total.load(Ordering::Relaxed),
        }
    }

    #[inline]
    pub fn evaluation_failures(&self) -> u64 {
        self.evaluation_failures.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn subscriber_failures(&self) -> u64 {
        self.subscriber_failures.load(Ordering::Relaxed)
    }

    /// Take a snapshot, resetting the per-interval latency counters
    pub fn report(&self, geofences: usize) -> MetricsSummary {
        let now = Instant::now();
        let elapsed_secs = {
            let mut last = self.last_report_time.lock();
            let elapsed = now.duration_since(*last).as_secs_f64();
            *last = now;
            elapsed
        };

        let samples = self.samples_since_report.swap(0, Ordering::Relaxed);
        let latency_sum = self.latency_sum_us.swap(0, Ordering::Relaxed);
        let latency_max = self.latency_max_us.swap(0, Ordering::Relaxed);
        let buckets = swap_buckets(&self.latency_buckets);

        MetricsSummary {
            ticks_total: self.ticks_total(),
            samples_total: self.samples_total(),
            samples_per_sec: if elapsed_secs > 0.0 { samples as f64 / elapsed_secs } else { 0.0 },
            positions_unavailable: self.positions_unavailable(),
            samples_rejected: self.samples_rejected(),
            avg_eval_latency_us: if samples > 0 { latency_sum / samples } else { 0 },
            max_eval_latency_us: latency_max,
            lat_buckets: buckets,
            lat_p50_us: percentile_from_buckets(&buckets, 0.50),
            lat_p95_us: percentile_from_buckets(&buckets, 0.95),
            lat_p99_us: percentile_from_buckets(&buckets, 0.99),
            enter_total: self.events_total(EventKind::Enter),
            exit_total: self.events_total(EventKind::Exit),
            dwell_total: self.events_total(EventKind::Dwell),
            evaluation_failures: self.evaluation_failures(),
            subscriber_failures: self.subscriber_failures(),
            geofences,
            active_geofences: self.active_geofences(),
        }
    }
}

/// Point-in-time metrics snapshot
#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub ticks_total: u64,
    pub samples_total: u64,
    pub samples_per_sec: f64,
    pub positions_unavailable: u64,
    pub samples_rejected: u64,
    pub avg_eval_latency_us: u64,
    pub max_eval_latency_us: u64,
    /// Evaluation latency histogram buckets
    /// Bounds: ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, ≤51200, >51200 µs
    pub lat_buckets: [u64; NUM_BUCKETS],
    pub lat_p50_us: u64,
    pub lat_p95_us: u64,
    pub lat_p99_us: u64,
    pub enter_total: u64,
    pub exit_total: u64,
    pub dwell_total: u64,
    pub evaluation_failures: u64,
    pub subscriber_failures: u64,
    pub geofences: usize,
    pub active_geofences: usize,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            ticks_total = %self.ticks_total,
            samples_total = %self.samples_total,
            samples_per_sec = format!("{:.2}", self.samples_per_sec),
            positions_unavailable = %self.positions_unavailable,
            samples_rejected = %self.samples_rejected,
            avg_latency_us = %self.avg_eval_latency_us,
            max_latency_us = %self.max_eval_latency_us,
            p99_us = %self.lat_p99_us,
            enter = %self.enter_total,
            exit = %self.exit_total,
            dwell = %self.dwell_total,
            eval_failures = %self.evaluation_failures,
            subscriber_failures = %self.subscriber_failures,
            geofences = %self.geofences,
            active_geofences = %self.active_geofences,
            "metrics"
        );
    }
}
