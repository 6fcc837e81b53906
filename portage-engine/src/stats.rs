//! Thread-safe transfer statistics
//!
//! Cumulative counters are plain atomics updated lock-free from worker
//! tasks; only the rate-smoothing sample window takes a mutex, and only
//! briefly. Progress is byte-based when the total byte count is known
//! (pre-calculated or enumerated) and file-count-based otherwise. A new
//! retry attempt resets the in-flight counters but never the cumulative
//! totals, so progress is monotone within one attempt.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Point-in-time view of job statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticsSnapshot {
    /// Files transferred successfully (cumulative)
    pub total_transferred_files: u64,
    /// Bytes transferred successfully (cumulative)
    pub total_transferred_bytes: u64,
    /// Files that failed terminally (cumulative)
    pub total_failed_files: u64,
    /// Files whose source was not found (cumulative)
    pub total_files_not_found: u64,
    /// Files skipped (cumulative)
    pub total_skipped_files: u64,
    /// Files transferred in the current attempt; resets when a retry begins
    pub attempt_transferred_files: u64,
    /// Bytes transferred in the current attempt; resets when a retry begins
    pub attempt_transferred_bytes: u64,
    /// Progress percentage, 0-100
    pub progress_percent: f64,
    /// Smoothed transfer rate over the sliding window
    pub bytes_per_second: f64,
    /// Estimated remaining time; `None` when total work is unknown
    pub eta: Option<Duration>,
    /// Current retry attempt counter (0 before any retry)
    pub retry_attempt: u32,
    /// Wall time since the aggregator was created
    pub elapsed: Duration,
}

/// Shared accumulator for job counters and derived metrics
///
/// All record methods are safe to call concurrently from worker tasks.
pub struct StatisticsAggregator {
    started: Instant,
    transferred_files: AtomicU64,
    transferred_bytes: AtomicU64,
    failed_files: AtomicU64,
    not_found_files: AtomicU64,
    skipped_files: AtomicU64,
    retry_attempt: AtomicU64,
    // In-flight counters for the current attempt; reset by begin_attempt
    attempt_files: AtomicU64,
    attempt_bytes: AtomicU64,
    // 0 means unknown
    total_files: AtomicU64,
    total_bytes: AtomicU64,
    window: Mutex<VecDeque<(Instant, u64)>>,
    window_size: usize,
}

impl StatisticsAggregator {
    /// Create an aggregator with the given rate-window size
    pub fn new(window_size: usize) -> Self {
        Self {
            started: Instant::now(),
            transferred_files: AtomicU64::new(0),
            transferred_bytes: AtomicU64::new(0),
            failed_files: AtomicU64::new(0),
            not_found_files: AtomicU64::new(0),
            skipped_files: AtomicU64::new(0),
            retry_attempt: AtomicU64::new(0),
            attempt_files: AtomicU64::new(0),
            attempt_bytes: AtomicU64::new(0),
            total_files: AtomicU64::new(0),
            total_bytes: AtomicU64::new(0),
            window: Mutex::new(VecDeque::new()),
            window_size: window_size.max(1),
        }
    }

    /// Declare the total amount of work, once known (e.g. from enumeration)
    ///
    /// A zero value leaves the corresponding total unknown.
    pub fn set_totals(&self, files: u64, bytes: u64) {
        self.total_files.store(files, Ordering::Relaxed);
        self.total_bytes.store(bytes, Ordering::Relaxed);
    }

    /// Record one successfully transferred file
    pub fn record_success(&self, bytes: u64) {
        self.transferred_files.fetch_add(1, Ordering::Relaxed);
        self.transferred_bytes.fetch_add(bytes, Ordering::Relaxed);
        self.attempt_files.fetch_add(1, Ordering::Relaxed);
        self.attempt_bytes.fetch_add(bytes, Ordering::Relaxed);

        let mut window = self.window.lock().expect("stats window lock poisoned");
        window.push_back((Instant::now(), bytes));
        while window.len() > self.window_size {
            window.pop_front();
        }
    }

    /// Record one terminally failed file
    pub fn record_failure(&self) {
        self.failed_files.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one file whose source was not found
    pub fn record_not_found(&self) {
        self.not_found_files.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one skipped file
    pub fn record_skipped(&self) {
        self.skipped_files.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one scheduled retry
    pub fn record_retry(&self) {
        self.retry_attempt.fetch_add(1, Ordering::Relaxed);
    }

    /// Begin a new attempt: reset the in-flight counters, keep cumulative
    /// totals untouched
    pub fn begin_attempt(&self) {
        self.attempt_files.store(0, Ordering::Relaxed);
        self.attempt_bytes.store(0, Ordering::Relaxed);
    }

    /// Files that reached any terminal outcome
    fn completed_files(&self) -> u64 {
        self.transferred_files.load(Ordering::Relaxed)
            + self.failed_files.load(Ordering::Relaxed)
            + self.not_found_files.load(Ordering::Relaxed)
            + self.skipped_files.load(Ordering::Relaxed)
    }

    /// Consistent point-in-time view of all counters and derived metrics
    pub fn snapshot(&self) -> StatisticsSnapshot {
        let transferred_bytes = self.transferred_bytes.load(Ordering::Relaxed);
        let total_files = self.total_files.load(Ordering::Relaxed);
        let total_bytes = self.total_bytes.load(Ordering::Relaxed);

        let progress_percent = if total_bytes > 0 {
            (transferred_bytes as f64 / total_bytes as f64 * 100.0).min(100.0)
        } else if total_files > 0 {
            (self.completed_files() as f64 / total_files as f64 * 100.0).min(100.0)
        } else {
            0.0
        };

        let bytes_per_second = self.smoothed_rate();

        let eta = if total_bytes > 0 && bytes_per_second > 0.0 {
            let remaining = total_bytes.saturating_sub(transferred_bytes);
            Some(Duration::from_secs_f64(remaining as f64 / bytes_per_second))
        } else {
            None
        };

        StatisticsSnapshot {
            total_transferred_files: self.transferred_files.load(Ordering::Relaxed),
            total_transferred_bytes: transferred_bytes,
            total_failed_files: self.failed_files.load(Ordering::Relaxed),
            total_files_not_found: self.not_found_files.load(Ordering::Relaxed),
            total_skipped_files: self.skipped_files.load(Ordering::Relaxed),
            attempt_transferred_files: self.attempt_files.load(Ordering::Relaxed),
            attempt_transferred_bytes: self.attempt_bytes.load(Ordering::Relaxed),
            progress_percent,
            bytes_per_second,
            eta,
            retry_attempt: self.retry_attempt.load(Ordering::Relaxed) as u32,
            elapsed: self.started.elapsed(),
        }
    }

    /// Rate over the most recent window of samples
    ///
    /// Smooths instantaneous fluctuations; returns 0 until at least two
    /// samples exist.
    fn smoothed_rate(&self) -> f64 {
        let window = self.window.lock().expect("stats window lock poisoned");
        let (Some((oldest, _)), Some((newest, _))) = (window.front(), window.back()) else {
            return 0.0;
        };

        let span = newest.duration_since(*oldest).as_secs_f64();
        if span <= 0.0 {
            return 0.0;
        }

        // The oldest sample marks the window start; its bytes predate it
        let bytes: u64 = window.iter().skip(1).map(|(_, b)| *b).sum();
        bytes as f64 / span
    }
}

impl Default for StatisticsAggregator {
    fn default() -> Self {
        Self::new(portage_common::DEFAULT_RATE_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let stats = StatisticsAggregator::new(8);
        stats.record_success(100);
        stats.record_success(50);
        stats.record_failure();
        stats.record_not_found();
        stats.record_skipped();

        let snap = stats.snapshot();
        assert_eq!(snap.total_transferred_files, 2);
        assert_eq!(snap.total_transferred_bytes, 150);
        assert_eq!(snap.total_failed_files, 1);
        assert_eq!(snap.total_files_not_found, 1);
        assert_eq!(snap.total_skipped_files, 1);
    }

    #[test]
    fn test_progress_byte_based_when_total_known() {
        let stats = StatisticsAggregator::new(8);
        stats.set_totals(4, 1000);
        stats.record_success(250);
        let snap = stats.snapshot();
        assert!((snap.progress_percent - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_progress_file_based_without_byte_total() {
        let stats = StatisticsAggregator::new(8);
        stats.set_totals(4, 0);
        stats.record_success(10);
        stats.record_failure();
        let snap = stats.snapshot();
        assert!((snap.progress_percent - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_progress_unknown_without_totals() {
        let stats = StatisticsAggregator::new(8);
        stats.record_success(10);
        let snap = stats.snapshot();
        assert_eq!(snap.progress_percent, 0.0);
        assert!(snap.eta.is_none());
    }

    #[test]
    fn test_progress_clamped_to_100() {
        let stats = StatisticsAggregator::new(8);
        stats.set_totals(1, 100);
        stats.record_success(250);
        assert_eq!(stats.snapshot().progress_percent, 100.0);
    }

    #[test]
    fn test_begin_attempt_keeps_cumulative_totals() {
        let stats = StatisticsAggregator::new(8);
        stats.record_success(100);
        stats.record_retry();
        stats.begin_attempt();

        let snap = stats.snapshot();
        assert_eq!(snap.total_transferred_files, 1);
        assert_eq!(snap.total_transferred_bytes, 100);
        assert_eq!(snap.retry_attempt, 1);
        // The in-flight counters start the new attempt at zero
        assert_eq!(snap.attempt_transferred_files, 0);
        assert_eq!(snap.attempt_transferred_bytes, 0);
    }

    #[test]
    fn test_attempt_counters_track_the_current_attempt() {
        let stats = StatisticsAggregator::new(8);
        stats.record_success(100);
        stats.record_success(50);

        let snap = stats.snapshot();
        assert_eq!(snap.attempt_transferred_files, 2);
        assert_eq!(snap.attempt_transferred_bytes, 150);

        stats.begin_attempt();
        stats.record_success(25);
        let snap = stats.snapshot();
        assert_eq!(snap.attempt_transferred_files, 1);
        assert_eq!(snap.attempt_transferred_bytes, 25);
        assert_eq!(snap.total_transferred_bytes, 175);
    }

    #[test]
    fn test_progress_monotone_within_attempt() {
        let stats = StatisticsAggregator::new(8);
        stats.set_totals(10, 1000);
        let mut last = 0.0;
        for _ in 0..10 {
            stats.record_success(100);
            let progress = stats.snapshot().progress_percent;
            assert!(progress >= last);
            last = progress;
        }
        assert_eq!(last, 100.0);
    }

    #[test]
    fn test_rate_needs_two_samples() {
        let stats = StatisticsAggregator::new(8);
        assert_eq!(stats.snapshot().bytes_per_second, 0.0);
        stats.record_success(100);
        assert_eq!(stats.snapshot().bytes_per_second, 0.0);
    }

    #[test]
    fn test_window_drops_old_samples() {
        let stats = StatisticsAggregator::new(2);
        for _ in 0..10 {
            stats.record_success(1);
        }
        let window = stats.window.lock().unwrap();
        assert_eq!(window.len(), 2);
    }
}
