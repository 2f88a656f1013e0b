//! Scheduler event counters.
//!
//! Counters are updated with relaxed atomics on the worker hot paths and
//! read through [`MetricsSnapshot`]. Values are monotone over the life of a
//! pool; a snapshot is consistent enough for tests and dashboards, not a
//! linearizable observation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Live counters shared by every worker of a pool.
#[derive(Debug)]
pub(crate) struct Metrics {
    /// Tasks resumed to completion.
    pub tasks_executed: AtomicU64,
    /// Submissions accepted from outside the pool.
    pub submissions: AtomicU64,
    /// Steal attempts that produced a task.
    pub steals_success: AtomicU64,
    /// Steal attempts that found a victim empty or contended.
    pub steals_missed: AtomicU64,
    /// Times a worker committed to sleep.
    pub sleeps: AtomicU64,
    /// Times a sleeping worker was woken.
    pub wakes: AtomicU64,
    /// Times the last hunting worker woke a sleeper before going active.
    pub handoffs: AtomicU64,
    start_time: Instant,
}

impl Metrics {
    pub(crate) fn new() -> Self {
        Self {
            tasks_executed: AtomicU64::new(0),
            submissions: AtomicU64::new(0),
            steals_success: AtomicU64::new(0),
            steals_missed: AtomicU64::new(0),
            sleeps: AtomicU64::new(0),
            wakes: AtomicU64::new(0),
            handoffs: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub(crate) fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            tasks_executed: self.tasks_executed.load(Ordering::Relaxed),
            submissions: self.submissions.load(Ordering::Relaxed),
            steals_success: self.steals_success.load(Ordering::Relaxed),
            steals_missed: self.steals_missed.load(Ordering::Relaxed),
            sleeps: self.sleeps.load(Ordering::Relaxed),
            wakes: self.wakes.load(Ordering::Relaxed),
            handoffs: self.handoffs.load(Ordering::Relaxed),
            elapsed_seconds: self.start_time.elapsed().as_secs_f64(),
        }
    }
}

/// Point-in-time view of a pool's counters.
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub tasks_executed: u64,
    pub submissions: u64,
    pub steals_success: u64,
    pub steals_missed: u64,
    pub sleeps: u64,
    pub wakes: u64,
    pub handoffs: u64,
    pub elapsed_seconds: f64,
}

impl MetricsSnapshot {
    /// Task throughput since the pool started.
    pub fn tasks_per_second(&self) -> f64 {
        if self.elapsed_seconds > 0.0 {
            self.tasks_executed as f64 / self.elapsed_seconds
        } else {
            0.0
        }
    }

    /// Fraction of steal attempts that found work.
    pub fn steal_hit_rate(&self) -> f64 {
        let attempts = self.steals_success + self.steals_missed;
        if attempts > 0 {
            self.steals_success as f64 / attempts as f64
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_updates() {
        let metrics = Metrics::new();
        metrics.tasks_executed.fetch_add(5, Ordering::Relaxed);
        metrics.steals_success.fetch_add(1, Ordering::Relaxed);
        metrics.steals_missed.fetch_add(3, Ordering::Relaxed);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.tasks_executed, 5);
        assert_eq!(snapshot.steals_success, 1);
        assert_eq!(snapshot.steals_missed, 3);
        assert!((snapshot.steal_hit_rate() - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn rates_are_zero_without_activity() {
        let snapshot = Metrics::new().snapshot();
        assert_eq!(snapshot.steal_hit_rate(), 0.0);
        assert!(snapshot.tasks_per_second() >= 0.0);
    }
}
