//! State shared by every worker of a pool.
//!
//! Workers are always in one of three roles: *thief* (hunting for work),
//! *active* (executing a task) or *sleeper* (blocked in the notifier). The
//! protocol below maintains one property at all times:
//!
//! > while any worker is active, at least one worker is hunting, or no
//! > worker is asleep.
//!
//! An active worker can produce new work at any moment; the property
//! guarantees somebody is awake to find it, so pushes onto a local queue
//! never need to notify anyone.
//!
//! Thief and active counts live in the two halves of a single 64-bit word.
//! That is load-bearing: the sleep handshake must learn "was I the last
//! thief" and "is anything active" at one linearization point. Two separate
//! atomics would leave a window where both read zero right before an active
//! worker publishes new work, stranding a sleeper. The sleeper count is
//! never stored; it is `pool size - thieves - active`.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crossbeam::utils::CachePadded;

use crate::event_count::EventCount;

/// One thief, in the low half of the packed word.
const THIEF: u64 = 1;
/// One active worker, in the high half.
const ACTIVE: u64 = 1 << 32;
const THIEF_MASK: u64 = ACTIVE - 1;

/// Shared coordination block, one per pool.
///
/// Each field sits on its own cache line; the counter, the stop flag and the
/// notifier are all on the hot path of different threads and must not
/// false-share.
///
/// The halves of `counts` are 32-bit; a pool of 2^32 workers would overflow
/// them, which is assumed impossible and not checked.
#[derive(Debug, Default)]
pub(crate) struct SharedState {
    counts: CachePadded<AtomicU64>,
    stop: CachePadded<AtomicBool>,
    pub(crate) notifier: CachePadded<EventCount>,
}

impl SharedState {
    pub(crate) fn new() -> Self {
        Self {
            counts: CachePadded::new(AtomicU64::new(0)),
            stop: CachePadded::new(AtomicBool::new(false)),
            notifier: CachePadded::new(EventCount::new()),
        }
    }

    /// Registers the caller as a thief. Used on worker start, on wakeup
    /// from sleep, and when reverting a retirement that broke the wake
    /// property. Adding a thief can never break it.
    #[inline]
    pub(crate) fn enter_thief(&self) {
        self.counts.fetch_add(THIEF, Ordering::Release);
    }

    /// Promotes the calling thief to active, about to execute found work.
    ///
    /// Returns `true` if the caller was the only thief: the hunt population
    /// just dropped to zero while a task is about to run, so the caller must
    /// wake one sleeper (if any) to take over the hunt.
    #[inline]
    pub(crate) fn begin_active(&self) -> bool {
        let prev = self.counts.fetch_add(ACTIVE - THIEF, Ordering::AcqRel);
        debug_assert!(prev & THIEF_MASK >= 1, "begin_active without being a thief");
        prev & THIEF_MASK == 1
    }

    /// Demotes the caller from active back to thief after finishing a task.
    /// The thief count grows, so the wake property is never at risk here.
    #[inline]
    pub(crate) fn finish_active(&self) {
        let prev = self.counts.fetch_sub(ACTIVE - THIEF, Ordering::AcqRel);
        debug_assert!(prev >> 32 >= 1, "finish_active without being active");
    }

    /// Attempts to retire the calling thief in preparation for sleep.
    ///
    /// Returns `true` when sleeping is legal. Returns `false` when the
    /// caller was the last thief while workers are still active: the wake
    /// property is broken at that instant and nobody else can be relied on
    /// to fix it (everyone else may already be asleep), so the caller must
    /// immediately re-enter as thief and resume hunting.
    #[inline]
    pub(crate) fn try_retire_thief(&self) -> bool {
        let prev = self.counts.fetch_sub(THIEF, Ordering::AcqRel);
        debug_assert!(prev & THIEF_MASK >= 1, "retire without being a thief");
        let thieves = prev & THIEF_MASK;
        let active = prev >> 32;
        !(thieves == 1 && active > 0)
    }

    /// Requests every worker to exit once it runs out of work.
    #[inline]
    pub(crate) fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    #[inline]
    pub(crate) fn is_stopping(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// Snapshot of `(thieves, active)`, decoded from one atomic load.
    pub(crate) fn counts(&self) -> (u32, u32) {
        let word = self.counts.load(Ordering::Acquire);
        ((word & THIEF_MASK) as u32, (word >> 32) as u32)
    }
}
