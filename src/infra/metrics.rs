//! Lock-free metrics collection and reporting
//!
//! Uses atomics for hot-path operations to avoid mutex contention.
//! All counter updates are lock-free; reporting is the only operation
//! that needs synchronization (via atomic swap).
//!
//! NOTE: All atomics use Relaxed ordering intentionally. These are statistical
//! counters only. Do NOT use these atomics for coordination or logic decisions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Upper bound (µs) of each dispatch latency bucket. Bounds double from 10µs;
/// the last bucket catches everything above 5120µs and reports 10240µs.
const DISPATCH_BUCKET_BOUNDS: [u64; DISPATCH_BUCKETS] =
    [10, 20, 40, 80, 160, 320, 640, 1280, 2560, 5120, 10240];
const DISPATCH_BUCKETS: usize = 11;

/// Windowed histogram of listener dispatch latency.
///
/// Sum, max and bucket counts cover the window since the last `drain`.
struct DispatchHistogram {
    count: AtomicU64,
    sum_us: AtomicU64,
    max_us: AtomicU64,
    buckets: [AtomicU64; DISPATCH_BUCKETS],
}

/// Counts drained from a [`DispatchHistogram`]
#[derive(Debug, Clone, Copy, Default)]
struct DispatchWindow {
    count: u64,
    sum_us: u64,
    max_us: u64,
    buckets: [u64; DISPATCH_BUCKETS],
}

impl DispatchHistogram {
    fn new() -> Self {
        Self {
            count: AtomicU64::new(0),
            sum_us: AtomicU64::new(0),
            max_us: AtomicU64::new(0),
            buckets: std::array::from_fn(|_| AtomicU64::new(0)),
        }
    }

    /// Bucket holding `latency_us`; values past the last finite bound land in the overflow bucket
    #[inline]
    fn bucket_for(latency_us: u64) -> usize {
        DISPATCH_BUCKET_BOUNDS[..DISPATCH_BUCKETS - 1].partition_point(|&bound| bound < latency_us)
    }

    #[inline]
    fn record(&self, latency_us: u64) {
        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum_us.fetch_add(latency_us, Ordering::Relaxed);
        self.max_us.fetch_max(latency_us, Ordering::Relaxed);
        self.buckets[Self::bucket_for(latency_us)].fetch_add(1, Ordering::Relaxed);
    }

    /// Take the current window and start a new one
    fn drain(&self) -> DispatchWindow {
        DispatchWindow {
            count: self.count.swap(0, Ordering::Relaxed),
            sum_us: self.sum_us.swap(0, Ordering::Relaxed),
            max_us: self.max_us.swap(0, Ordering::Relaxed),
            buckets: std::array::from_fn(|i| self.buckets[i].swap(0, Ordering::Relaxed)),
        }
    }
}

impl DispatchWindow {
    fn avg_us(&self) -> u64 {
        self.sum_us.checked_div(self.count).unwrap_or(0)
    }

    /// Upper bound of the first bucket reaching `quantile` of the bucketed dispatches
    fn quantile_us(&self, quantile: f64) -> u64 {
        let total: u64 = self.buckets.iter().sum();
        if total == 0 {
            return 0;
        }

        let rank = (total as f64 * quantile).ceil().max(1.0) as u64;
        self.buckets
            .iter()
            .scan(0u64, |seen, &n| {
                *seen += n;
                Some(*seen)
            })
            .position(|seen| seen >= rank)
            .map_or(DISPATCH_BUCKET_BOUNDS[DISPATCH_BUCKETS - 1], |i| DISPATCH_BUCKET_BOUNDS[i])
    }
}

/// Lock-free metrics collector for the feedback coordinator
pub struct Metrics {
    /// Detailed flows opened (monotonic)
    detailed_started: AtomicU64,
    /// Detailed flows finished and dispatched (monotonic)
    detailed_finished: AtomicU64,
    /// Arrival flows opened, explicitly or by a one-shot submission (monotonic)
    arrival_started: AtomicU64,
    /// Arrival items dispatched (monotonic)
    arrival_finished: AtomicU64,
    /// Cached feedback events accepted into a buffer (monotonic)
    events_recorded: AtomicU64,
    /// Calls rejected with a FlowError (monotonic)
    rejected_calls: AtomicU64,
    /// Successful listener callbacks (monotonic)
    listener_deliveries: AtomicU64,
    /// Listener callbacks that failed or panicked (monotonic)
    listener_failures: AtomicU64,
    /// Dispatch latency since last report (reset on report)
    dispatch: DispatchHistogram,
    /// Last report time (only accessed from reporter)
    last_report_time: parking_lot::Mutex<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            detailed_started: AtomicU64::new(0),
            detailed_finished: AtomicU64::new(0),
            arrival_started: AtomicU64::new(0),
            arrival_finished: AtomicU64::new(0),
            events_recorded: AtomicU64::new(0),
            rejected_calls: AtomicU64::new(0),
            listener_deliveries: AtomicU64::new(0),
            listener_failures: AtomicU64::new(0),
            dispatch: DispatchHistogram::new(),
            last_report_time: parking_lot::Mutex::new(Instant::now()),
        }
    }

    #[inline]
    pub fn record_detailed_started(&self) {
        self.detailed_started.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_arrival_started(&self) {
        self.arrival_started.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_event(&self) {
        self.events_recorded.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_rejected(&self) {
        self.rejected_calls.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a finished detailed flow and its dispatch outcome (lock-free)
    #[inline]
    pub fn record_detailed_finished(&self, delivered: usize, failed: usize, latency_us: u64) {
        self.detailed_finished.fetch_add(1, Ordering::Relaxed);
        self.record_dispatch(delivered, failed, latency_us);
    }

    /// Record a dispatched arrival item and its dispatch outcome (lock-free)
    #[inline]
    pub fn record_arrival_finished(&self, delivered: usize, failed: usize, latency_us: u64) {
        self.arrival_finished.fetch_add(1, Ordering::Relaxed);
        self.record_dispatch(delivered, failed, latency_us);
    }

    fn record_dispatch(&self, delivered: usize, failed: usize, latency_us: u64) {
        self.listener_deliveries.fetch_add(delivered as u64, Ordering::Relaxed);
        self.listener_failures.fetch_add(failed as u64, Ordering::Relaxed);
        self.dispatch.record(latency_us);
    }

    pub fn detailed_started(&self) -> u64 {
        self.detailed_started.load(Ordering::Relaxed)
    }

    pub fn detailed_finished(&self) -> u64 {
        self.detailed_finished.load(Ordering::Relaxed)
    }

    pub fn arrival_started(&self) -> u64 {
        self.arrival_started.load(Ordering::Relaxed)
    }

    pub fn arrival_finished(&self) -> u64 {
        self.arrival_finished.load(Ordering::Relaxed)
    }

    pub fn events_recorded(&self) -> u64 {
        self.events_recorded.load(Ordering::Relaxed)
    }

    pub fn rejected_calls(&self) -> u64 {
        self.rejected_calls.load(Ordering::Relaxed)
    }

    pub fn listener_failures(&self) -> u64 {
        self.listener_failures.load(Ordering::Relaxed)
    }

    /// Calculate and return metrics summary, then reset periodic counters
    ///
    /// This is the only method that resets counters. It uses atomic swap
    /// to get a consistent snapshot while allowing concurrent updates.
    pub fn report(&self, active_flows: usize) -> MetricsSummary {
        let window = self.dispatch.drain();

        let elapsed = {
            let mut last = self.last_report_time.lock();
            let elapsed = last.elapsed();
            *last = Instant::now();
            elapsed
        };

        let dispatches_per_sec = if elapsed.as_secs_f64() > 0.0 {
            window.count as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };

        MetricsSummary {
            detailed_started: self.detailed_started.load(Ordering::Relaxed),
            detailed_finished: self.detailed_finished.load(Ordering::Relaxed),
            arrival_started: self.arrival_started.load(Ordering::Relaxed),
            arrival_finished: self.arrival_finished.load(Ordering::Relaxed),
            events_recorded: self.events_recorded.load(Ordering::Relaxed),
            rejected_calls: self.rejected_calls.load(Ordering::Relaxed),
            listener_deliveries: self.listener_deliveries.load(Ordering::Relaxed),
            listener_failures: self.listener_failures.load(Ordering::Relaxed),
            active_flows,
            dispatches: window.count,
            dispatches_per_sec,
            avg_dispatch_latency_us: window.avg_us(),
            max_dispatch_latency_us: window.max_us,
            lat_buckets: window.buckets,
            lat_p50_us: window.quantile_us(0.50),
            lat_p99_us: window.quantile_us(0.99),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot produced by [`Metrics::report`]
#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub detailed_started: u64,
    pub detailed_finished: u64,
    pub arrival_started: u64,
    pub arrival_finished: u64,
    pub events_recorded: u64,
    pub rejected_calls: u64,
    pub listener_deliveries: u64,
    pub listener_failures: u64,
    /// Detailed or arrival flows opened but not finished
    pub active_flows: usize,
    /// Dispatches since the previous report
    pub dispatches: u64,
    pub dispatches_per_sec: f64,
    pub avg_dispatch_latency_us: u64,
    pub max_dispatch_latency_us: u64,
    /// Dispatch latency histogram buckets
    /// Bounds: ≤10, ≤20, ≤40, ≤80, ≤160, ≤320, ≤640, ≤1280, ≤2560, ≤5120, >5120 µs
    pub lat_buckets: [u64; DISPATCH_BUCKETS],
    pub lat_p50_us: u64,
    pub lat_p99_us: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            detailed_started = %self.detailed_started,
            detailed_finished = %self.detailed_finished,
            arrival_started = %self.arrival_started,
            arrival_finished = %self.arrival_finished,
            events_recorded = %self.events_recorded,
            rejected_calls = %self.rejected_calls,
            listener_deliveries = %self.listener_deliveries,
            listener_failures = %self.listener_failures,
            active_flows = %self.active_flows,
            dispatches_per_sec = format!("{:.1}", self.dispatches_per_sec),
            avg_dispatch_us = %self.avg_dispatch_latency_us,
            max_dispatch_us = %self.max_dispatch_latency_us,
            p50_us = %self.lat_p50_us,
            p99_us = %self.lat_p99_us,
            "metrics"
        );
    }
}
