//! Per-worker queue for submissions arriving from other threads.
//!
//! Any thread may push a batch; only the owning worker drains. The drain
//! takes every pending batch in a single swap, so the owner sees the whole
//! backlog as one merged submission.
//!
//! Implemented as a lock-free stack of heap nodes. Order across batches is
//! reversed by the drain, which is fine: submissions carry no ordering
//! guarantee.

use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

use crate::task::Submission;

struct Node {
    submission: Submission,
    next: *mut Node,
}

/// Multi-producer, single-consumer handoff point.
///
/// All head operations are RMWs, so pushes and drains of one inbox are
/// totally ordered. Combined with the notifier's epoch protocol this rules
/// out the sleep race: a push the worker's final pre-sleep
/// [`take`](Self::take) missed is ordered after that drain, hence after the
/// worker's waiter registration, and the pusher's notification then sees
/// the registered waiter and invalidates its key.
#[derive(Debug)]
pub(crate) struct Inbox {
    head: AtomicPtr<Node>,
}

impl Inbox {
    pub(crate) fn new() -> Self {
        Inbox {
            head: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// Pushes a batch. Callable from any thread.
    pub(crate) fn push(&self, submission: Submission) {
        if submission.is_empty() {
            return;
        }
        let node = Box::into_raw(Box::new(Node {
            submission,
            next: ptr::null_mut(),
        }));
        let mut head = self.head.load(Ordering::Acquire);
        loop {
            // SAFETY: `node` came from Box::into_raw above and is not yet
            // shared; writing its link field is exclusive access.
            unsafe { (*node).next = head };
            match self
                .head
                .compare_exchange(head, node, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return,
                Err(current) => head = current,
            }
        }
    }

    /// Drains every pending batch, merged into one submission.
    ///
    /// Owner-only: after the swap the detached chain is exclusively ours and
    /// each task will be handed out exactly once.
    ///
    /// The swap stays an RMW even when the inbox is empty; the sleep
    /// handshake's ordering argument needs every drain to participate in
    /// the head's modification order, so do not add an is-null fast path.
    pub(crate) fn take(&self) -> Option<Submission> {
        let mut head = self.head.swap(ptr::null_mut(), Ordering::AcqRel);
        if head.is_null() {
            return None;
        }
        let mut merged = Submission::new();
        while !head.is_null() {
            // SAFETY: the swap above removed the chain from the shared head;
            // every node in it was created by push() via Box::into_raw and
            // is reclaimed exactly once here.
            let node = unsafe { Box::from_raw(head) };
            head = node.next;
            merged.append(node.submission);
        }
        Some(merged)
    }
}

impl Drop for Inbox {
    fn drop(&mut self) {
        // Reclaim batches that were never drained (pool dropped with
        // pending submissions); their tasks are dropped unexecuted.
        let _ = self.take();
    }
}

// SAFETY: the head pointer is only manipulated through atomic operations and
// the nodes behind it hold Send tasks.
unsafe impl Send for Inbox {}
unsafe impl Sync for Inbox {}
