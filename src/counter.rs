//! Completion tracking for submitted tasks.
//!
//! A counter starts at the number of tasks it tracks and is decremented by
//! the scheduler as each one finishes. Waiters poll for zero; the pool
//! facade and [`Context`](crate::Context) both offer wait helpers built on
//! top of this.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// A shared countdown over a group of tasks.
///
/// Cloning is cheap and shares the underlying count.
#[derive(Clone, Debug)]
pub struct Counter {
    inner: Arc<AtomicUsize>,
}

impl Counter {
    /// Creates a counter tracking `initial` outstanding tasks.
    pub fn new(initial: usize) -> Self {
        Counter {
            inner: Arc::new(AtomicUsize::new(initial)),
        }
    }

    /// Adds one outstanding task.
    pub fn increment(&self) {
        self.inner.fetch_add(1, Ordering::AcqRel);
    }

    /// Marks one tracked task as finished.
    ///
    /// Release ordering publishes the finished task's effects to anyone who
    /// observes the counter hit zero with [`is_complete`](Self::is_complete).
    pub fn decrement(&self) {
        let prev = self.inner.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev >= 1, "counter decremented below zero");
    }

    /// Current number of outstanding tasks.
    pub fn value(&self) -> usize {
        self.inner.load(Ordering::Acquire)
    }

    /// Whether every tracked task has finished.
    pub fn is_complete(&self) -> bool {
        self.value() == 0
    }
}

impl Default for Counter {
    fn default() -> Self {
        Counter::new(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_down_to_complete() {
        let counter = Counter::new(2);
        assert!(!counter.is_complete());

        counter.decrement();
        assert_eq!(counter.value(), 1);

        counter.decrement();
        assert!(counter.is_complete());
    }

    #[test]
    fn clones_share_the_count() {
        let counter = Counter::new(1);
        let clone = counter.clone();
        clone.decrement();
        assert!(counter.is_complete());
    }

    #[test]
    fn increment_reopens() {
        let counter = Counter::new(0);
        assert!(counter.is_complete());
        counter.increment();
        assert!(!counter.is_complete());
    }
}
