//! Sampled percent-complete reporting.
//!
//! The ratio is recomputed on every reference completion but logged at
//! most once per interval. Queued counts move while we read them, so the
//! reported total is eventually consistent by design of the store.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

pub const STATUS_LOGGING_INTERVAL: Duration = Duration::from_secs(5);

const PROGRESS_SCALE: f64 = 10_000.0;

pub struct ProgressReporter {
    interval: Duration,
    last_logged: Mutex<Instant>,
}

impl ProgressReporter {
    pub fn new() -> Self {
        Self::with_interval(STATUS_LOGGING_INTERVAL)
    }

    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            last_logged: Mutex::new(Instant::now()),
        }
    }

    /// Progress as a fraction, truncated to four decimals.
    pub fn ratio(processed: u64, queued: u64) -> f64 {
        let total = processed + queued;
        if total == 0 {
            return 0.0;
        }
        ((processed as f64 / total as f64) * PROGRESS_SCALE).trunc() / PROGRESS_SCALE
    }

    /// Recompute progress and emit a status line if the interval elapsed.
    pub fn update(&self, processed: u64, queued: u64) {
        let progress = Self::ratio(processed, queued);

        let mut last = self.last_logged.lock();
        if last.elapsed() < self.interval {
            return;
        }
        *last = Instant::now();
        drop(last);

        let percent = (progress * 100.0) as u32;
        tracing::info!(
            "{}% completed ({} processed/{} total)",
            percent,
            processed,
            processed + queued
        );
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ratio_truncates_to_four_decimals() {
        // 1/3 = 0.3333... -> 0.3333, not rounded up anywhere
        assert_eq!(ProgressReporter::ratio(1, 2), 0.3333);
        // 2/3 = 0.6666... -> 0.6666 (rounding would give 0.6667)
        assert_eq!(ProgressReporter::ratio(2, 1), 0.6666);
    }

    #[test]
    fn test_ratio_edge_cases() {
        assert_eq!(ProgressReporter::ratio(0, 0), 0.0);
        assert_eq!(ProgressReporter::ratio(5, 0), 1.0);
        assert_eq!(ProgressReporter::ratio(0, 5), 0.0);
    }
}
