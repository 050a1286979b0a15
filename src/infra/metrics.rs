//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics so the frame worker never contends with the reporter.
//! Reporting swaps the periodic counters; monotonic counters are only read.
//!
//! NOTE: All atomics use Relaxed ordering. These are statistical counters only
//! and must not be used for coordination.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Processing latency bucket boundaries (microseconds)
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

    // Rank of the percentile sample; at least 1 so empty leading buckets never match
    let target = ((total as f64 * percentile).ceil() as u64).max(1);
    let mut cumulative = 0u64;

    // Last bucket uses 2x the previous bound
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
pub struct Metrics {
    /// Frames offered to the pipeline (monotonic)
    frames_received: AtomicU64,
    /// Frames dropped because the worker was busy (monotonic)
    frames_dropped: AtomicU64,
    /// Frames fully processed (monotonic)
    frames_processed: AtomicU64,
    /// Frames processed since last report (reset on report)
    frames_since_report: AtomicU64,
    /// Sum of processing latencies in microseconds (reset on report)
    latency_sum_us: AtomicU64,
    /// Max processing latency in microseconds (reset on report)
    latency_max_us: AtomicU64,
    /// Processing latency histogram (reset on report)
    latency_buckets: [AtomicU64; NUM_BUCKETS],
    /// Face or pose detector failures (monotonic)
    detector_errors: AtomicU64,
    /// Faces classified (monotonic)
    mouth_classified: AtomicU64,
    /// Faces skipped for a missing or empty lip contour (monotonic)
    mouth_skipped: AtomicU64,
    /// Poses classified (monotonic)
    hands_classified: AtomicU64,
    /// Poses skipped for a missing joint (monotonic)
    hands_skipped: AtomicU64,
    /// Samples opened while recording (monotonic)
    samples_begun: AtomicU64,
    /// Successful exports (monotonic)
    exports_ok: AtomicU64,
    /// Failed exports (monotonic)
    exports_failed: AtomicU64,
    /// Rows written across all exports (monotonic)
    rows_exported: AtomicU64,
    /// Incomplete samples left out of exports (monotonic)
    rows_incomplete: AtomicU64,
    /// Last report time (only accessed from reporter)
    last_report_time: parking_lot::Mutex<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            frames_received: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
            frames_processed: AtomicU64::new(0),
            frames_since_report: AtomicU64::new(0),
            latency_sum_us: AtomicU64::new(0),
            latency_max_us: AtomicU64::new(0),
            latency_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            detector_errors: AtomicU64::new(0),
            mouth_classified: AtomicU64::new(0),
            mouth_skipped: AtomicU64::new(0),
            hands_classified: AtomicU64::new(0),
            hands_skipped: AtomicU64::new(0),
            samples_begun: AtomicU64::new(0),
            exports_ok: AtomicU64::new(0),
            exports_failed: AtomicU64::new(0),
            rows_exported: AtomicU64::new(0),
            rows_incomplete: AtomicU64::new(0),
            last_report_time: parking_lot::Mutex::new(Instant::now()),
        }
    }

    #[inline]
    pub fn record_frame_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_frame_dropped(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a frame was processed with given latency (lock-free)
    #[inline]
    pub fn record_frame_processed(&self, latency_us: u64) {
        self.frames_processed.fetch_add(1, Ordering::Relaxed);
        self.frames_since_report.fetch_add(1, Ordering::Relaxed);
        self.latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);

        let bucket = bucket_index(latency_us);
        self.latency_buckets[bucket].fetch_add(1, Ordering::Relaxed);

        update_atomic_max(&self.latency_max_us, latency_us);
    }

    #[inline]
    pub fn record_detector_error(&self) {
        self.detector_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_mouth(&self, classified: bool) {
        if classified {
            self.mouth_classified.fetch_add(1, Ordering::Relaxed);
        } else {
            self.mouth_skipped.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn record_hands(&self, classified: bool) {
        if classified {
            self.hands_classified.fetch_add(1, Ordering::Relaxed);
        } else {
            self.hands_skipped.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn record_sample_begun(&self) {
        self.samples_begun.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the outcome of one export
    pub fn record_export(&self, ok: bool, rows: usize, incomplete: usize) {
        if ok {
            self.exports_ok.fetch_add(1, Ordering::Relaxed);
            self.rows_exported.fetch_add(rows as u64, Ordering::Relaxed);
        } else {
            self.exports_failed.fetch_add(1, Ordering::Relaxed);
        }
        self.rows_incomplete.fetch_add(incomplete as u64, Ordering::Relaxed);
    }

    pub fn frames_received(&self) -> u64 {
        self.frames_received.load(Ordering::Relaxed)
    }

    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped.load(Ordering::Relaxed)
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed.load(Ordering::Relaxed)
    }

    pub fn detector_errors(&self) -> u64 {
        self.detector_errors.load(Ordering::Relaxed)
    }

    pub fn mouth_skipped(&self) -> u64 {
        self.mouth_skipped.load(Ordering::Relaxed)
    }

    pub fn hands_skipped(&self) -> u64 {
        self.hands_skipped.load(Ordering::Relaxed)
    }

    pub fn exports_ok(&self) -> u64 {
        self.exports_ok.load(Ordering::Relaxed)
    }

    pub fn exports_failed(&self) -> u64 {
        self.exports_failed.load(Ordering::Relaxed)
    }

    /// Calculate and return metrics summary, then reset periodic counters
    pub fn report(&self) -> MetricsSummary {
        let frames_count = self.frames_since_report.swap(0, Ordering::Relaxed);
        let latency_sum = self.latency_sum_us.swap(0, Ordering::Relaxed);
        let max_latency = self.latency_max_us.swap(0, Ordering::Relaxed);
        let lat_buckets = swap_buckets(&self.latency_buckets);

        let elapsed = {
            let mut last = self.last_report_time.lock();
            let elapsed = last.elapsed();
            *last = Instant::now();
            elapsed
        };

        let frames_per_sec = if elapsed.as_secs_f64() > 0.0 {
            frames_count as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };

        let avg_latency = if frames_count > 0 { latency_sum / frames_count } else { 0 };

        MetricsSummary {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            frames_processed: self.frames_processed.load(Ordering::Relaxed),
            frames_per_sec,
            avg_process_latency_us: avg_latency,
            max_process_latency_us: max_latency,
            lat_p50_us: percentile_from_buckets(&lat_buckets, 0.50),
            lat_p99_us: percentile_from_buckets(&lat_buckets, 0.99),
            lat_buckets,
            detector_errors: self.detector_errors.load(Ordering::Relaxed),
            mouth_classified: self.mouth_classified.load(Ordering::Relaxed),
            mouth_skipped: self.mouth_skipped.load(Ordering::Relaxed),
            hands_classified: self.hands_classified.load(Ordering::Relaxed),
            hands_skipped: self.hands_skipped.load(Ordering::Relaxed),
            samples_begun: self.samples_begun.load(Ordering::Relaxed),
            exports_ok: self.exports_ok.load(Ordering::Relaxed),
            exports_failed: self.exports_failed.load(Ordering::Relaxed),
            rows_exported: self.rows_exported.load(Ordering::Relaxed),
            rows_incomplete: self.rows_incomplete.load(Ordering::Relaxed),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct MetricsSummary {
    pub frames_received: u64,
    pub frames_dropped: u64,
    pub frames_processed: u64,
    pub frames_per_sec: f64,
    pub avg_process_latency_us: u64,
    pub max_process_latency_us: u64,
    /// Bounds: ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, ≤51200, >51200 µs
    pub lat_buckets: [u64; NUM_BUCKETS],
    pub lat_p50_us: u64,
    pub lat_p99_us: u64,
    pub detector_errors: u64,
    pub mouth_classified: u64,
    pub mouth_skipped: u64,
    pub hands_classified: u64,
    pub hands_skipped: u64,
    pub samples_begun: u64,
    pub exports_ok: u64,
    pub exports_failed: u64,
    pub rows_exported: u64,
    pub rows_incomplete: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            frames_received = %self.frames_received,
            frames_dropped = %self.frames_dropped,
            frames_processed = %self.frames_processed,
            frames_per_sec = format!("{:.1}", self.frames_per_sec),
            avg_latency_us = %self.avg_process_latency_us,
            max_latency_us = %self.max_process_latency_us,
            p50_us = %self.lat_p50_us,
            p99_us = %self.lat_p99_us,
            detector_errors = %self.detector_errors,
            mouth_skipped = %self.mouth_skipped,
            hands_skipped = %self.hands_skipped,
            samples_begun = %self.samples_begun,
            exports_ok = %self.exports_ok,
            exports_failed = %self.exports_failed,
            rows_exported = %self.rows_exported,
            "metrics"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_frame() {
        let metrics = Metrics::new();

        metrics.record_frame_processed(100);
        metrics.record_frame_processed(200);
        assert_eq!(metrics.frames_processed(), 2);
        assert_eq!(metrics.latency_sum_us.load(Ordering::Relaxed), 300);
    }

    #[test]
    fn test_report_resets_periodic_counters() {
        let metrics = Metrics::new();

        metrics.record_frame_received();
        metrics.record_frame_received();
        metrics.record_frame_dropped();
        metrics.record_frame_processed(100);
        metrics.record_frame_processed(500);

        let summary = metrics.report();
        assert_eq!(summary.frames_received, 2);
        assert_eq!(summary.frames_dropped, 1);
        assert_eq!(summary.frames_processed, 2);
        assert_eq!(summary.avg_process_latency_us, 300);
        assert_eq!(summary.max_process_latency_us, 500);

        assert_eq!(metrics.frames_since_report.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.latency_max_us.load(Ordering::Relaxed), 0);

        // Monotonic counters survive the report
        let again = metrics.report();
        assert_eq!(again.frames_processed, 2);
        assert_eq!(again.avg_process_latency_us, 0);
    }

    #[test]
    fn test_export_counters() {
        let metrics = Metrics::new();
        metrics.record_export(true, 10, 2);
        metrics.record_export(false, 0, 3);

        let summary = metrics.report();
        assert_eq!(summary.exports_ok, 1);
        assert_eq!(summary.exports_failed, 1);
        assert_eq!(summary.rows_exported, 10);
        assert_eq!(summary.rows_incomplete, 5);
    }

    #[test]
    fn test_classification_counters() {
        let metrics = Metrics::new();
        metrics.record_mouth(true);
        metrics.record_mouth(false);
        metrics.record_hands(false);
        assert_eq!(metrics.mouth_skipped(), 1);
        assert_eq!(metrics.hands_skipped(), 1);
        assert_eq!(metrics.report().mouth_classified, 1);
    }

    #[test]
    fn test_bucket_index() {
        assert_eq!(bucket_index(0), 0);
        assert_eq!(bucket_index(100), 0);
        assert_eq!(bucket_index(101), 1);
        assert_eq!(bucket_index(51200), 9);
        assert_eq!(bucket_index(51201), 10);
    }

    #[test]
    fn test_percentile_computation() {
        let metrics = Metrics::new();
        for _ in 0..100 {
            metrics.record_frame_processed(150);
        }

        let summary = metrics.report();
        assert_eq!(summary.lat_p50_us, 200);
        assert_eq!(summary.lat_p99_us, 200);
        assert_eq!(summary.lat_buckets[1], 100);
    }

    #[test]
    fn test_percentile_skips_empty_leading_buckets() {
        let metrics = Metrics::new();
        metrics.record_frame_processed(150);

        let summary = metrics.report();
        assert_eq!(summary.lat_buckets[0], 0);
        assert_eq!(summary.lat_p50_us, 200);
        assert_eq!(summary.lat_p99_us, 200);

        // One fast sample, three slow ones: p50 lands in the slow bucket
        let mut buckets = [0u64; NUM_BUCKETS];
        buckets[0] = 1;
        buckets[3] = 3;
        assert_eq!(percentile_from_buckets(&buckets, 0.5), 800);
        assert_eq!(percentile_from_buckets(&buckets, 0.25), 100);
    }

    #[test]
    fn test_concurrent_updates() {
        use std::sync::Arc;
        use std::thread;

        let metrics = Arc::new(Metrics::new());
        let mut handles = vec![];

        for _ in 0..4 {
            let m = metrics.clone();
            handles.push(thread::spawn(move || {
                for i in 0..1000 {
                    m.record_frame_processed(i as u64);
                }
            }));
        }

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(metrics.frames_processed(), 4_000);
    }
}
