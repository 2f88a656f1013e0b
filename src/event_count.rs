//! Condition-variable-like primitive for sleeping without lost wakeups.
//!
//! The classic problem with parking an idle worker is the window between
//! "I checked for work and found none" and "I went to sleep": work submitted
//! inside that window would never wake the worker. An event count closes the
//! window with a three-step protocol:
//!
//! 1. `prepare_wait` registers the caller and returns a key (the current
//!    notification epoch).
//! 2. The caller re-checks its condition. If work appeared, `cancel_wait`.
//! 3. Otherwise `wait(key)` blocks, but only while the epoch still matches
//!    the key. Any notification issued after `prepare_wait` bumps the epoch,
//!    so a racing `wait` returns immediately instead of sleeping.
//!
//! `wait` may also return spuriously; callers must re-evaluate their
//! condition and loop.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// One registered waiter, packed in the low half of the state word.
const WAITER: u64 = 1;
/// Low 32 bits count registered waiters, high 32 bits hold the epoch.
const WAITER_MASK: u64 = EPOCH - 1;
/// One notification epoch tick.
const EPOCH: u64 = 1 << 32;

/// Opaque ticket returned by [`EventCount::prepare_wait`].
///
/// Holds the notification epoch observed at registration time. A `wait` on
/// this key blocks only while the epoch is unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitKey(u32);

/// A lock-free-to-arm sleep/wake primitive.
///
/// Waiter count and epoch share one atomic word so that a notifier can
/// observe "are there waiters to invalidate" and bump the epoch without a
/// race between the two. Blocking itself goes through a mutex and condvar;
/// arming, cancelling and notifying with no registered waiters never touch
/// the lock.
#[derive(Debug, Default)]
pub struct EventCount {
    state: AtomicU64,
    lock: Mutex<()>,
    cond: Condvar,
}

impl EventCount {
    /// Creates an event count with no waiters and epoch zero.
    pub fn new() -> Self {
        Self {
            state: AtomicU64::new(0),
            lock: Mutex::new(()),
            cond: Condvar::new(),
        }
    }

    #[inline]
    fn lock_unpoisoned(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[inline]
    fn epoch_of(state: u64) -> u32 {
        (state >> 32) as u32
    }

    /// Registers intent to sleep and returns the key to sleep on.
    ///
    /// Registration and notification are RMWs on the same word, so every
    /// notification is ordered either before this call (then the returned
    /// key already reflects it, and the acquire edge makes the notifier's
    /// prior writes visible to the caller's re-check) or after it (then the
    /// notifier sees the registered waiter and invalidates the key). That
    /// dichotomy is what makes the "re-check after prepare" idiom sound.
    #[inline]
    pub fn prepare_wait(&self) -> WaitKey {
        let prev = self.state.fetch_add(WAITER, Ordering::AcqRel);
        WaitKey(Self::epoch_of(prev))
    }

    /// Deregisters after the caller decided not to sleep.
    #[inline]
    pub fn cancel_wait(&self) {
        let prev = self.state.fetch_sub(WAITER, Ordering::AcqRel);
        debug_assert!(prev & WAITER_MASK >= 1);
    }

    /// Blocks until a notification ordered after the matching
    /// [`prepare_wait`](Self::prepare_wait) arrives.
    ///
    /// Returns promptly if the epoch already moved past `key`. May wake
    /// spuriously; the caller re-evaluates its condition either way.
    pub fn wait(&self, key: WaitKey) {
        let mut guard = self.lock_unpoisoned();
        while Self::epoch_of(self.state.load(Ordering::Acquire)) == key.0 {
            guard = self
                .cond
                .wait(guard)
                .unwrap_or_else(PoisonError::into_inner);
        }
        drop(guard);
        let prev = self.state.fetch_sub(WAITER, Ordering::AcqRel);
        debug_assert!(prev & WAITER_MASK >= 1);
    }

    /// Wakes one waiter, invalidating every currently prepared key.
    #[inline]
    pub fn notify_one(&self) {
        self.notify(false);
    }

    /// Wakes every waiter, invalidating every currently prepared key.
    #[inline]
    pub fn notify_all(&self) {
        self.notify(true);
    }

    fn notify(&self, all: bool) {
        // The epoch moves unconditionally, and on the same word the waiters
        // register on. A checked-then-bump variant would leave a window
        // where a notifier misses a waiter that misses the notification; the
        // shared RMW order makes one of the two sides see the other.
        let prev = self.state.fetch_add(EPOCH, Ordering::AcqRel);
        if prev & WAITER_MASK == 0 {
            return;
        }
        // A registered waiter not yet parked re-checks the epoch under this
        // same lock before it can block, so the signal cannot slip by it.
        let guard = self.lock_unpoisoned();
        if all {
            self.cond.notify_all();
        } else {
            self.cond.notify_one();
        }
        drop(guard);
    }

    /// Number of currently registered waiters. Test and diagnostics only;
    /// the value is stale the moment it is read.
    pub fn waiters(&self) -> u32 {
        (self.state.load(Ordering::Acquire) & WAITER_MASK) as u32
    }
}
