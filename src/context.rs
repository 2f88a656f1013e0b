//! Capabilities handed to a running task.
//!
//! A context-taking task receives a [`Context`] built by the worker that
//! resumes it. Through it the task can spawn children onto that worker's
//! own deque and join on counters without ever blocking the thread.

use crate::counter::Counter;
use crate::task::Task;
use crate::worker::WorkerContext;

/// Scheduler access for code running inside a task.
pub struct Context<'a> {
    worker: &'a WorkerContext,
}

impl<'a> Context<'a> {
    pub(crate) fn new(worker: &'a WorkerContext) -> Self {
        Context { worker }
    }

    /// Id of the worker resuming the current task.
    pub fn worker_id(&self) -> usize {
        self.worker.id()
    }

    /// Spawns a child task and returns its completion counter.
    pub fn spawn<F>(&self, work: F) -> Counter
    where
        F: FnOnce() + Send + 'static,
    {
        let counter = Counter::new(1);
        self.spawn_task(Task::with_counter(work, counter.clone()));
        counter
    }

    /// Spawns a child that itself receives a context.
    pub fn spawn_with_context<F>(&self, work: F) -> Counter
    where
        F: FnOnce(&Context<'_>) + Send + 'static,
    {
        let counter = Counter::new(1);
        self.spawn_task(Task::with_context(work, counter.clone()));
        counter
    }

    /// Spawns a prepared task onto the resuming worker's deque.
    ///
    /// No wakeup is issued here: while this task runs, the pool keeps at
    /// least one worker hunting (or nobody is asleep), so locally pushed
    /// children are always discoverable.
    pub fn spawn_task(&self, task: Task) {
        self.worker.push_local(task);
    }

    /// Waits for `counter` to complete, executing other tasks meanwhile.
    ///
    /// The worker first drains its own children, then its inbox, then
    /// steals; it yields the thread only when none turn up work. Never
    /// sleeps, so joining inside a task cannot deadlock the pool, even on a
    /// single worker waiting on work it submitted to itself.
    pub fn wait_for(&self, counter: &Counter) {
        while !counter.is_complete() {
            if let Some(task) = self.worker.pop_local() {
                self.worker.resume(task);
            } else if let Some(batch) = self.worker.take_submitted() {
                // Spill onto the own deque: the next iterations pop from it
                // and peers can steal their share.
                for task in batch {
                    self.worker.push_local(task);
                }
            } else if let Some(task) = self.worker.try_steal() {
                self.worker.resume(task);
            } else {
                std::thread::yield_now();
            }
        }
    }
}
