//! Worker threads and the steal-or-sleep loop.
//!
//! Each worker owns a task deque (local end LIFO, foreign end stolen FIFO)
//! and an inbox for submissions from outside the pool. The loop hunts in a
//! fixed order: drain the own inbox, then try to steal from peers walking
//! the NUMA neighbor rings near to far. Only when both come up empty does
//! the worker start the sleep handshake against the shared notifier.
//!
//! The handshake is where the subtlety lives. Arming the notifier *before*
//! the final inbox and stop checks means a submission landing in the race
//! window invalidates the armed key and the worker never sleeps over fresh
//! work. Retiring the thief count *after* those checks lets the worker
//! detect that it was the last hunter while somebody is still active, in
//! which case it cancels the sleep and keeps hunting; the active worker's
//! children would otherwise sit in a deque with every hunter asleep.

use std::cell::{Cell, RefCell};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use core_affinity::CoreId;
use crossbeam::deque::{Steal, Stealer, Worker as Deque};
use rand::Rng;
use rand_xoshiro::Xoshiro256PlusPlus;
use tracing::{debug, trace};

use crate::context::Context;
use crate::inbox::Inbox;
use crate::metrics::Metrics;
use crate::state::SharedState;
use crate::task::{Submission, Task};

thread_local! {
    static CURRENT_WORKER: Cell<Option<usize>> = const { Cell::new(None) };
}

/// Id of the pool worker running the current thread, if any.
pub fn current_worker() -> Option<usize> {
    CURRENT_WORKER.with(Cell::get)
}

/// Marks the current thread as a worker for its lifetime.
///
/// Installation and teardown are programmer-error checked: initializing a
/// thread twice, or finalizing a thread that was never initialized, is a
/// bug in the embedding and panics.
struct ThreadSlot {
    id: usize,
}

impl ThreadSlot {
    fn install(id: usize) -> Self {
        CURRENT_WORKER.with(|slot| {
            assert!(
                slot.get().is_none(),
                "worker thread-local state initialized twice"
            );
            slot.set(Some(id));
        });
        ThreadSlot { id }
    }
}

impl Drop for ThreadSlot {
    fn drop(&mut self) {
        CURRENT_WORKER.with(|slot| {
            assert_eq!(
                slot.get(),
                Some(self.id),
                "worker finalized on a thread it never initialized"
            );
            slot.set(None);
        });
    }
}

/// The pool-side face of a worker: everything another thread may touch.
pub(crate) struct WorkerHandle {
    inbox: Arc<Inbox>,
    shared: Arc<SharedState>,
    metrics: Arc<Metrics>,
}

impl WorkerHandle {
    pub(crate) fn new(inbox: Arc<Inbox>, shared: Arc<SharedState>, metrics: Arc<Metrics>) -> Self {
        WorkerHandle {
            inbox,
            shared,
            metrics,
        }
    }

    /// Hands a batch to this worker. Callable from any thread.
    ///
    /// The wakeup is a broadcast: outside submissions are presumed rare, and
    /// a single notification could land on a sleeper that loses the
    /// subsequent race and goes back to sleep, stranding the batch. Waking
    /// everyone strictly over-delivers.
    pub(crate) fn submit(&self, submission: Submission) {
        if submission.is_empty() {
            return;
        }
        self.metrics.submissions.fetch_add(1, Ordering::Relaxed);
        self.inbox.push(submission);
        self.shared.notifier.notify_all();
    }
}

/// Per-worker state, owned by the worker thread once it starts.
pub(crate) struct WorkerContext {
    id: usize,
    deque: Deque<Task>,
    stealers: Arc<Vec<Stealer<Task>>>,
    rings: Vec<Vec<usize>>,
    inbox: Arc<Inbox>,
    rng: RefCell<Xoshiro256PlusPlus>,
    shared: Arc<SharedState>,
    metrics: Arc<Metrics>,
}

impl WorkerContext {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: usize,
        deque: Deque<Task>,
        stealers: Arc<Vec<Stealer<Task>>>,
        rings: Vec<Vec<usize>>,
        inbox: Arc<Inbox>,
        rng: Xoshiro256PlusPlus,
        shared: Arc<SharedState>,
        metrics: Arc<Metrics>,
    ) -> Self {
        WorkerContext {
            id,
            deque,
            stealers,
            rings,
            inbox,
            rng: RefCell::new(rng),
            shared,
            metrics,
        }
    }

    pub(crate) fn id(&self) -> usize {
        self.id
    }

    /// Pushes a task onto the own deque. Task-layer entry point; the hunt
    /// loop itself never pushes.
    pub(crate) fn push_local(&self, task: Task) {
        self.deque.push(task);
    }

    /// Pops a task from the own deque, newest first.
    pub(crate) fn pop_local(&self) -> Option<Task> {
        self.deque.pop()
    }

    /// Drains the own inbox. Owner-only; returns the entire backlog.
    pub(crate) fn take_submitted(&self) -> Option<Submission> {
        self.inbox.take()
    }

    /// One hunting pass over the neighbor rings.
    ///
    /// Draws a uniform victim per ring, nearest ring first, and gives up
    /// after one probe each; the caller's loop provides the retries. A
    /// contended probe counts as a miss rather than being retried, which
    /// keeps the pass bounded. Every peer is in some ring, so repeated
    /// passes reach the whole pool.
    pub(crate) fn try_steal(&self) -> Option<Task> {
        let mut rng = self.rng.borrow_mut();
        for ring in &self.rings {
            let victim = ring[rng.gen_range(0..ring.len())];
            match self.stealers[victim].steal() {
                Steal::Success(task) => {
                    self.metrics.steals_success.fetch_add(1, Ordering::Relaxed);
                    trace!(worker = self.id, victim, "stole a task");
                    return Some(task);
                }
                Steal::Empty | Steal::Retry => {
                    self.metrics.steals_missed.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
        None
    }

    /// Runs one task to completion.
    pub(crate) fn resume(&self, task: Task) {
        self.metrics.tasks_executed.fetch_add(1, Ordering::Relaxed);
        let cx = Context::new(self);
        task.resume(&cx);
    }

    /// Thief-to-active promotion, with the last-thief handoff.
    fn go_active(&self) {
        if self.shared.begin_active() {
            // The hunt population just hit zero while a task is about to
            // run. Promote one sleeper into the hunt, or future children of
            // this task may never be found.
            self.metrics.handoffs.fetch_add(1, Ordering::Relaxed);
            trace!(worker = self.id, "last thief handing off");
            self.shared.notifier.notify_one();
        }
    }

    /// Drains children spawned during resumption, then drops back to thief.
    fn settle_active(&self) {
        while let Some(task) = self.deque.pop() {
            self.resume(task);
        }
        self.shared.finish_active();
    }

    fn execute(&self, task: Task) {
        self.go_active();
        self.resume(task);
        self.settle_active();
    }

    fn execute_batch(&self, batch: Submission) {
        self.go_active();
        // Keep one task and expose the rest on the own deque, where hunting
        // peers can steal them; running a whole batch inline would serialize
        // it on this worker.
        let mut tasks = batch.into_iter();
        if let Some(first) = tasks.next() {
            for task in tasks {
                self.deque.push(task);
            }
            self.resume(first);
        }
        self.settle_active();
    }

    /// The worker thread body.
    pub(crate) fn run(self, core: Option<CoreId>) {
        if let Some(core) = core {
            core_affinity::set_for_current(core);
        }
        let _worker_slot = ThreadSlot::install(self.id);
        debug!(worker = self.id, "worker online");

        'hunt: loop {
            self.shared.enter_thief();
            loop {
                // Fast path: find work without touching the notifier.
                if let Some(batch) = self.take_submitted() {
                    self.execute_batch(batch);
                    continue;
                }
                if let Some(task) = self.try_steal() {
                    self.execute(task);
                    continue;
                }

                // Sleep handshake. Order matters: arm the key, re-check the
                // inbox (an in-flight submission must not be dropped even if
                // shutdown is racing us), then check stop, then retire.
                let key = self.shared.notifier.prepare_wait();

                if let Some(batch) = self.take_submitted() {
                    self.shared.notifier.cancel_wait();
                    self.execute_batch(batch);
                    continue;
                }

                if self.shared.is_stopping() {
                    self.shared.notifier.cancel_wait();
                    // Leave the thief count as is. Nobody may sleep once
                    // stop is set, so the count guards nothing anymore and
                    // decrementing it buys nothing.
                    debug!(worker = self.id, "worker exiting");
                    return;
                }

                if self.shared.try_retire_thief() {
                    self.metrics.sleeps.fetch_add(1, Ordering::Relaxed);
                    trace!(worker = self.id, "sleeping");
                    self.shared.notifier.wait(key);
                    trace!(worker = self.id, "woke");
                    self.metrics.wakes.fetch_add(1, Ordering::Relaxed);
                } else {
                    // We were the last thief while a task is running; its
                    // children could strand with every hunter asleep. Void
                    // the sleep and rejoin the hunt ourselves, because any
                    // other worker may already be sleeping.
                    self.shared.notifier.cancel_wait();
                }
                continue 'hunt;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    fn test_contexts(workers: usize) -> Vec<WorkerContext> {
        let shared = Arc::new(SharedState::new());
        let metrics = Arc::new(Metrics::new());

        let mut deques = Vec::new();
        let mut stealers = Vec::new();
        for _ in 0..workers {
            let deque: Deque<Task> = Deque::new_lifo();
            stealers.push(deque.stealer());
            deques.push(deque);
        }
        let stealers = Arc::new(stealers);

        deques
            .into_iter()
            .enumerate()
            .map(|(worker, deque)| {
                let rings: Vec<Vec<usize>> = {
                    let peers: Vec<usize> = (0..workers).filter(|&p| p != worker).collect();
                    if peers.is_empty() {
                        Vec::new()
                    } else {
                        vec![peers]
                    }
                };
                WorkerContext::new(
                    worker,
                    deque,
                    Arc::clone(&stealers),
                    rings,
                    Arc::new(Inbox::new()),
                    Xoshiro256PlusPlus::seed_from_u64(worker as u64 + 1),
                    Arc::clone(&shared),
                    Arc::clone(&metrics),
                )
            })
            .collect()
    }

    #[test]
    fn steals_from_a_peer_deque() {
        let contexts = test_contexts(2);
        let hit = Arc::new(AtomicUsize::new(0));

        let hit_clone = Arc::clone(&hit);
        contexts[1].push_local(Task::new(move || {
            hit_clone.fetch_add(1, Ordering::SeqCst);
        }));

        let stolen = contexts[0].try_steal().expect("peer deque holds a task");
        contexts[0].resume(stolen);
        assert_eq!(hit.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn solo_worker_steal_is_empty() {
        let contexts = test_contexts(1);
        assert!(contexts[0].try_steal().is_none());
    }

    #[test]
    fn thread_slot_reports_current_worker() {
        thread::spawn(|| {
            assert_eq!(current_worker(), None);
            {
                let _slot = ThreadSlot::install(7);
                assert_eq!(current_worker(), Some(7));
            }
            assert_eq!(current_worker(), None);
        })
        .join()
        .expect("thread should complete");
    }

    #[test]
    fn double_install_fails_loudly() {
        let result = thread::spawn(|| {
            let _first = ThreadSlot::install(0);
            let _second = ThreadSlot::install(1);
        })
        .join();
        assert!(result.is_err(), "second install must panic");
    }
}
