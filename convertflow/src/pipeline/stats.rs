//! Running statistics across every run of one orchestrator.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Runs finished.
    pub total: u64,
    /// Runs that succeeded.
    pub succeeded: u64,
    /// Runs that failed.
    pub failed: u64,
    /// Running average of run duration in milliseconds.
    pub average_duration_ms: f64,
}

impl StatsSnapshot {
    /// Fraction of runs that succeeded, or 0.0 before the first run.
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.succeeded as f64 / self.total as f64
        }
    }
}

/// Counters updated once per finished run.
///
/// Each update happens inside one critical section, so concurrent runs never
/// interleave their increments with the average update.
#[derive(Debug, Default)]
pub struct RunningStats {
    inner: Mutex<StatsSnapshot>,
}

impl RunningStats {
    /// Creates zeroed statistics.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one finished run and returns the updated counters.
    pub fn record(&self, duration_ms: f64, success: bool) -> StatsSnapshot {
        let mut stats = self.inner.lock();
        stats.total += 1;
        if success {
            stats.succeeded += 1;
        } else {
            stats.failed += 1;
        }
        stats.average_duration_ms +=
            (duration_ms - stats.average_duration_ms) / stats.total as f64;
        *stats
    }

    /// Returns the current counters.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        *self.inner.lock()
    }
}
