//! Cumulative engine statistics across runs.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use super::RunReport;

/// Lifetime counters for the engine, updated after every run.
#[derive(Debug, Default)]
pub struct EngineStats {
    pub runs_completed: AtomicU64,
    pub total_attempted: AtomicU64,
    pub total_sent: AtomicU64,
    pub total_failed: AtomicU64,
    pub total_exhausted: AtomicU64,
    pub total_rate_limited: AtomicU64,
}

impl EngineStats {
    pub fn record_run(&self, report: &RunReport) {
        self.runs_completed.fetch_add(1, Ordering::Relaxed);
        self.total_attempted
            .fetch_add(report.attempted as u64, Ordering::Relaxed);
        self.total_sent
            .fetch_add(report.sent as u64, Ordering::Relaxed);
        self.total_failed
            .fetch_add(report.failed as u64, Ordering::Relaxed);
        self.total_exhausted
            .fetch_add(report.exhausted as u64, Ordering::Relaxed);
        self.total_rate_limited
            .fetch_add(report.rate_limited as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> EngineStatsSnapshot {
        EngineStatsSnapshot {
            runs_completed: self.runs_completed.load(Ordering::Relaxed),
            total_attempted: self.total_attempted.load(Ordering::Relaxed),
            total_sent: self.total_sent.load(Ordering::Relaxed),
            total_failed: self.total_failed.load(Ordering::Relaxed),
            total_exhausted: self.total_exhausted.load(Ordering::Relaxed),
            total_rate_limited: self.total_rate_limited.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of engine statistics
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatsSnapshot {
    pub runs_completed: u64,
    pub total_attempted: u64,
    pub total_sent: u64,
    pub total_failed: u64,
    pub total_exhausted: u64,
    pub total_rate_limited: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_run_accumulates() {
        let stats = EngineStats::default();
        let report = RunReport {
            attempted: 5,
            sent: 4,
            failed: 1,
            ..Default::default()
        };

        stats.record_run(&report);
        stats.record_run(&report);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.runs_completed, 2);
        assert_eq!(snapshot.total_attempted, 10);
        assert_eq!(snapshot.total_sent, 8);
        assert_eq!(snapshot.total_failed, 2);
    }
}
