//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics for hot-path operations to avoid mutex contention.
//!
//! NOTE: All atomics use Relaxed ordering intentionally—these are statistical
//! counters only. Do NOT use these atomics for coordination or logic decisions.

use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

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

/// Lock-free metrics collector
///
/// All recording operations are lock-free using atomics. The `report()`
/// method swaps the interval counters for a consistent snapshot.
#[derive(Default)]
pub struct Metrics {
    /// Door open signals accepted (monotonic)
    door_opens: AtomicU64,
    /// Door close signals accepted (monotonic)
    door_closes: AtomicU64,
    /// Cycles started (monotonic)
    cycles_started: AtomicU64,
    /// Cycles that emitted a report with records (monotonic)
    cycles_completed: AtomicU64,
    /// Cycles aborted on timeout or total capture failure (monotonic)
    cycles_aborted: AtomicU64,
    /// Frames captured across all zones (monotonic)
    frames_captured: AtomicU64,
    /// Per-zone capture failures (monotonic)
    capture_failures: AtomicU64,
    /// Change regions produced by the differ (monotonic)
    regions_detected: AtomicU64,
    /// Change records emitted (monotonic)
    records_emitted: AtomicU64,
    /// Capture latencies since last report (reset on report)
    capture_since_report: AtomicU64,
    capture_latency_sum_us: AtomicU64,
    capture_latency_max_us: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_door_open(&self) {
        self.door_opens.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_door_close(&self) {
        self.door_closes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cycle_started(&self) {
        self.cycles_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cycle_completed(&self) {
        self.cycles_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cycle_aborted(&self) {
        self.cycles_aborted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_frame_captured(&self, latency_us: u64) {
        self.frames_captured.fetch_add(1, Ordering::Relaxed);
        self.capture_since_report.fetch_add(1, Ordering::Relaxed);
        self.capture_latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);
        update_atomic_max(&self.capture_latency_max_us, latency_us);
    }

    pub fn record_capture_failure(&self) {
        self.capture_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_regions(&self, count: usize) {
        self.regions_detected.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_records_emitted(&self, count: usize) {
        self.records_emitted.fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Snapshot counters; interval capture stats are reset
    pub fn report(&self) -> MetricsSummary {
        let captures = self.capture_since_report.swap(0, Ordering::Relaxed);
        let latency_sum = self.capture_latency_sum_us.swap(0, Ordering::Relaxed);
        let latency_max = self.capture_latency_max_us.swap(0, Ordering::Relaxed);
        let latency_avg = if captures > 0 { latency_sum / captures } else { 0 };

        MetricsSummary {
            door_opens: self.door_opens.load(Ordering::Relaxed),
            door_closes: self.door_closes.load(Ordering::Relaxed),
            cycles_started: self.cycles_started.load(Ordering::Relaxed),
            cycles_completed: self.cycles_completed.load(Ordering::Relaxed),
            cycles_aborted: self.cycles_aborted.load(Ordering::Relaxed),
            frames_captured: self.frames_captured.load(Ordering::Relaxed),
            capture_failures: self.capture_failures.load(Ordering::Relaxed),
            regions_detected: self.regions_detected.load(Ordering::Relaxed),
            records_emitted: self.records_emitted.load(Ordering::Relaxed),
            interval_captures: captures,
            capture_latency_avg_us: latency_avg,
            capture_latency_max_us: latency_max,
        }
    }
}

/// Consistent snapshot of the metrics counters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSummary {
    pub door_opens: u64,
    pub door_closes: u64,
    pub cycles_started: u64,
    pub cycles_completed: u64,
    pub cycles_aborted: u64,
    pub frames_captured: u64,
    pub capture_failures: u64,
    pub regions_detected: u64,
    pub records_emitted: u64,
    pub interval_captures: u64,
    pub capture_latency_avg_us: u64,
    pub capture_latency_max_us: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            door_opens = %self.door_opens,
            door_closes = %self.door_closes,
            cycles_started = %self.cycles_started,
            cycles_completed = %self.cycles_completed,
            cycles_aborted = %self.cycles_aborted,
            frames_captured = %self.frames_captured,
            capture_failures = %self.capture_failures,
            regions_detected = %self.regions_detected,
            records_emitted = %self.records_emitted,
            capture_avg_us = %self.capture_latency_avg_us,
            capture_max_us = %self.capture_latency_max_us,
            "metrics_summary"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = Metrics::new();
        metrics.record_cycle_started();
        metrics.record_cycle_started();
        metrics.record_cycle_completed();
        metrics.record_cycle_aborted();
        metrics.record_regions(3);
        metrics.record_records_emitted(2);

        let summary = metrics.report();
        assert_eq!(summary.cycles_started, 2);
        assert_eq!(summary.cycles_completed, 1);
        assert_eq!(summary.cycles_aborted, 1);
        assert_eq!(summary.regions_detected, 3);
        assert_eq!(summary.records_emitted, 2);
    }

    #[test]
    fn test_capture_latency_resets_per_interval() {
        let metrics = Metrics::new();
        metrics.record_frame_captured(100);
        metrics.record_frame_captured(300);

        let first = metrics.report();
        assert_eq!(first.interval_captures, 2);
        assert_eq!(first.capture_latency_avg_us, 200);
        assert_eq!(first.capture_latency_max_us, 300);

        // Monotonic total survives, interval stats reset
        let second = metrics.report();
        assert_eq!(second.frames_captured, 2);
        assert_eq!(second.interval_captures, 0);
        assert_eq!(second.capture_latency_avg_us, 0);
        assert_eq!(second.capture_latency_max_us, 0);
    }
}
