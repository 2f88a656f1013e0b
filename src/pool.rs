//! The pool facade: construction, submission and shutdown.
//!
//! A [`Pool`] owns its worker threads. Submissions go to a uniformly random
//! worker's inbox; idle workers sleep in the shared notifier and the
//! submission path broadcasts a wakeup. Dropping the pool (or calling
//! [`shutdown`](Pool::shutdown)) requests a stop, wakes every sleeper and
//! joins all threads; work submitted before the stop still completes,
//! because workers only honor the stop once their hunt comes up empty.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::deque::Worker as Deque;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use tracing::debug;

use crate::context::Context;
use crate::counter::Counter;
use crate::error::PoolError;
use crate::inbox::Inbox;
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::state::SharedState;
use crate::task::{Submission, Task};
use crate::topology::{self, Placement};
use crate::worker::{WorkerContext, WorkerHandle};

/// Configuration for a [`Pool`].
#[derive(Debug, Clone)]
pub struct PoolBuilder {
    workers: Option<usize>,
    numa_aware: bool,
    worker_stack_size: Option<usize>,
}

impl Default for PoolBuilder {
    fn default() -> Self {
        PoolBuilder {
            workers: None,
            numa_aware: true,
            worker_stack_size: None,
        }
    }
}

impl PoolBuilder {
    /// Number of worker threads. Defaults to the hardware concurrency.
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    /// Whether placement consults the machine topology (pinning and
    /// distance-ordered steal victims). Enabled by default.
    pub fn numa_aware(mut self, enabled: bool) -> Self {
        self.numa_aware = enabled;
        self
    }

    /// Stack size for worker threads, in bytes. Defaults to the platform
    /// default.
    pub fn worker_stack_size(mut self, bytes: usize) -> Self {
        self.worker_stack_size = Some(bytes);
        self
    }

    /// Builds the pool and starts its workers.
    ///
    /// If a worker thread fails to spawn, the workers already started are
    /// stopped and joined before the error is returned.
    pub fn build(self) -> Result<Pool, PoolError> {
        let workers = self.workers.unwrap_or_else(default_workers).max(1);
        let shared = Arc::new(SharedState::new());
        let metrics = Arc::new(Metrics::new());
        let placements = topology::plan(workers, self.numa_aware);

        let mut deques = Vec::with_capacity(workers);
        let mut stealers = Vec::with_capacity(workers);
        for _ in 0..workers {
            let deque: Deque<Task> = Deque::new_lifo();
            stealers.push(deque.stealer());
            deques.push(deque);
        }
        let stealers = Arc::new(stealers);

        let inboxes: Vec<Arc<Inbox>> = (0..workers).map(|_| Arc::new(Inbox::new())).collect();
        let handles = inboxes
            .iter()
            .map(|inbox| {
                WorkerHandle::new(Arc::clone(inbox), Arc::clone(&shared), Arc::clone(&metrics))
            })
            .collect();

        let mut pool = Pool {
            handles,
            shared,
            metrics,
            threads: Vec::with_capacity(workers),
        };

        // One xoshiro stream, sliced with long jumps so no two workers
        // share a victim-choice sequence.
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(rand::random());

        for (id, (deque, placement)) in deques.into_iter().zip(placements).enumerate() {
            let Placement { core, rings } = placement;
            let context = WorkerContext::new(
                id,
                deque,
                Arc::clone(&stealers),
                rings,
                Arc::clone(&inboxes[id]),
                rng.clone(),
                Arc::clone(&pool.shared),
                Arc::clone(&pool.metrics),
            );
            rng.long_jump();

            let mut builder = thread::Builder::new().name(format!("lazypool-worker-{id}"));
            if let Some(bytes) = self.worker_stack_size {
                builder = builder.stack_size(bytes);
            }

            match builder.spawn(move || context.run(core)) {
                Ok(handle) => pool.threads.push(handle),
                Err(source) => {
                    debug!(worker = id, "worker spawn failed, rolling back");
                    pool.stop_and_join();
                    return Err(PoolError::WorkerSpawn { worker: id, source });
                }
            }
        }

        Ok(pool)
    }
}

fn default_workers() -> usize {
    thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
}

/// A work-stealing thread pool whose workers sleep when idle.
pub struct Pool {
    handles: Vec<WorkerHandle>,
    shared: Arc<SharedState>,
    metrics: Arc<Metrics>,
    threads: Vec<JoinHandle<()>>,
}

impl Pool {
    /// Starts configuring a pool.
    pub fn builder() -> PoolBuilder {
        PoolBuilder::default()
    }

    /// Builds a pool with `workers` threads and default settings.
    ///
    /// # Panics
    ///
    /// Panics if a worker thread cannot be spawned; use
    /// [`builder`](Self::builder) to handle that case.
    pub fn new(workers: usize) -> Self {
        Self::builder()
            .workers(workers)
            .build()
            .expect("failed to start worker threads")
    }

    /// Builds a pool with one worker per hardware thread.
    pub fn with_default_workers() -> Self {
        Self::builder()
            .build()
            .expect("failed to start worker threads")
    }

    /// Hands a batch of tasks to a uniformly random worker.
    ///
    /// Non-blocking and callable from any thread, including worker threads.
    pub fn schedule(&self, submission: Submission) {
        if submission.is_empty() {
            return;
        }
        let victim = rand::thread_rng().gen_range(0..self.handles.len());
        self.handles[victim].submit(submission);
    }

    /// Submits one task; the returned counter completes when it finishes.
    pub fn run<F>(&self, work: F) -> Counter
    where
        F: FnOnce() + Send + 'static,
    {
        let counter = Counter::new(1);
        self.schedule(Submission::from(Task::with_counter(work, counter.clone())));
        counter
    }

    /// Submits one context-taking task, which may spawn children and join
    /// on them through its [`Context`].
    pub fn run_with_context<F>(&self, work: F) -> Counter
    where
        F: FnOnce(&Context<'_>) + Send + 'static,
    {
        let counter = Counter::new(1);
        self.schedule(Submission::from(Task::with_context(work, counter.clone())));
        counter
    }

    /// Submits a batch of tasks as one handoff; the returned counter
    /// completes when all of them have finished.
    pub fn run_batch<I>(&self, jobs: I) -> Counter
    where
        I: IntoIterator<Item = Box<dyn FnOnce() + Send + 'static>>,
    {
        let jobs: Vec<_> = jobs.into_iter().collect();
        let counter = Counter::new(jobs.len());
        let submission: Submission = jobs
            .into_iter()
            .map(|work| Task::with_counter(work, counter.clone()))
            .collect();
        self.schedule(submission);
        counter
    }

    /// Blocks the calling thread until `counter` completes.
    ///
    /// Polls with exponential backoff. Meant for threads outside the pool;
    /// inside a task, use [`Context::wait_for`], which executes other work
    /// instead of sleeping.
    pub fn wait_for_counter(&self, counter: &Counter) {
        let mut backoff_us = 1;
        const MAX_BACKOFF_US: u64 = 1000;

        while !counter.is_complete() {
            thread::sleep(Duration::from_micros(backoff_us));
            backoff_us = (backoff_us * 2).min(MAX_BACKOFF_US);
        }
    }

    /// Wakes every sleeping worker so it re-checks for work.
    ///
    /// For embedders that make work runnable through side channels. With
    /// nothing pending, woken workers find no work and go back to sleep;
    /// the broadcast by itself never executes anything.
    pub fn wake_workers(&self) {
        self.shared.notifier.notify_all();
    }

    /// Number of worker threads.
    pub fn worker_count(&self) -> usize {
        self.handles.len()
    }

    /// Snapshot of `(hunting, executing)` worker counts.
    ///
    /// On an idle pool both are 0; after shutdown the hunting count stays
    /// inflated by design (exiting workers do not retire it).
    pub fn counts(&self) -> (u32, u32) {
        self.shared.counts()
    }

    /// Snapshot of the pool's event counters.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Stops the pool and joins every worker.
    ///
    /// Safe to call with work still in flight: in-flight and already
    /// submitted tasks complete first. Returns the number of workers that
    /// panicked, as an error.
    pub fn shutdown(mut self) -> Result<(), usize> {
        match self.stop_and_join() {
            0 => Ok(()),
            panicked => Err(panicked),
        }
    }

    fn stop_and_join(&mut self) -> usize {
        debug!("requesting pool stop");
        self.shared.request_stop();
        self.shared.notifier.notify_all();

        let mut panicked = 0;
        for handle in self.threads.drain(..) {
            if handle.join().is_err() {
                panicked += 1;
            }
        }
        panicked
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        let panicked = self.stop_and_join();
        if panicked > 0 {
            tracing::error!(panicked, "worker threads panicked during execution");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn pool_reports_worker_count() {
        let pool = Pool::new(3);
        assert_eq!(pool.worker_count(), 3);
        pool.shutdown().expect("shutdown should succeed");
    }

    #[test]
    fn run_executes_exactly_once() {
        let pool = Pool::new(2);
        let executed = Arc::new(AtomicUsize::new(0));

        let executed_clone = Arc::clone(&executed);
        let counter = pool.run(move || {
            executed_clone.fetch_add(1, Ordering::SeqCst);
        });

        pool.wait_for_counter(&counter);
        assert_eq!(executed.load(Ordering::SeqCst), 1);
        pool.shutdown().expect("shutdown should succeed");
    }

    #[test]
    fn batch_counter_tracks_all_jobs() {
        let pool = Pool::new(4);
        let executed = Arc::new(AtomicUsize::new(0));

        let jobs: Vec<Box<dyn FnOnce() + Send>> = (0..16)
            .map(|_| {
                let executed = Arc::clone(&executed);
                Box::new(move || {
                    executed.fetch_add(1, Ordering::SeqCst);
                }) as Box<dyn FnOnce() + Send>
            })
            .collect();

        let counter = pool.run_batch(jobs);
        pool.wait_for_counter(&counter);
        assert_eq!(executed.load(Ordering::SeqCst), 16);
        pool.shutdown().expect("shutdown should succeed");
    }

    #[test]
    fn context_spawns_run_on_the_pool() {
        let pool = Pool::new(2);
        let total = Arc::new(AtomicUsize::new(0));

        let total_clone = Arc::clone(&total);
        let counter = pool.run_with_context(move |cx| {
            let children: Vec<Counter> = (0..8)
                .map(|_| {
                    let total = Arc::clone(&total_clone);
                    cx.spawn(move || {
                        total.fetch_add(1, Ordering::SeqCst);
                    })
                })
                .collect();
            for child in &children {
                cx.wait_for(child);
            }
        });

        pool.wait_for_counter(&counter);
        assert_eq!(total.load(Ordering::SeqCst), 8);
        pool.shutdown().expect("shutdown should succeed");
    }

    #[test]
    fn empty_submission_is_ignored() {
        let pool = Pool::new(1);
        pool.schedule(Submission::new());
        let snapshot = pool.metrics();
        assert_eq!(snapshot.submissions, 0);
        pool.shutdown().expect("shutdown should succeed");
    }
}
