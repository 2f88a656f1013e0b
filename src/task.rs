//! Task handles and submission batches.
//!
//! A [`Task`] is a resumable unit of work: a closure plus an optional
//! completion counter. Exactly one worker resumes it, and resumption runs to
//! completion on that worker's thread. Closures that want to spawn children
//! or join on counters take a [`Context`](crate::Context) argument, built by
//! the resuming worker.
//!
//! A [`Submission`] carries one or more tasks into the scheduler as a single
//! handoff. Batching matters at the submission site: a whole batch costs one
//! queue push and one broadcast, however many tasks it holds.

use crate::context::Context;
use crate::counter::Counter;

/// The work carried by a task.
pub enum Work {
    /// Plain closure.
    Plain(Box<dyn FnOnce() + Send + 'static>),
    /// Closure that receives scheduler capabilities at resume time.
    WithContext(Box<dyn FnOnce(&Context<'_>) + Send + 'static>),
}

impl std::fmt::Debug for Work {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Work::Plain(_) => f.write_str("Work::Plain"),
            Work::WithContext(_) => f.write_str("Work::WithContext"),
        }
    }
}

/// A unit of work to be executed once by some worker.
#[derive(Debug)]
pub struct Task {
    work: Work,
    counter: Option<Counter>,
}

impl Task {
    /// Creates a task from a plain closure.
    pub fn new<F>(work: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Task {
            work: Work::Plain(Box::new(work)),
            counter: None,
        }
    }

    /// Creates a task whose completion decrements `counter`.
    pub fn with_counter<F>(work: F, counter: Counter) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Task {
            work: Work::Plain(Box::new(work)),
            counter: Some(counter),
        }
    }

    /// Creates a context-taking task whose completion decrements `counter`.
    pub fn with_context<F>(work: F, counter: Counter) -> Self
    where
        F: FnOnce(&Context<'_>) + Send + 'static,
    {
        Task {
            work: Work::WithContext(Box::new(work)),
            counter: Some(counter),
        }
    }

    /// Runs the task to completion, then signals its counter.
    pub(crate) fn resume(self, cx: &Context<'_>) {
        match self.work {
            Work::Plain(work) => work(),
            Work::WithContext(work) => work(cx),
        }
        if let Some(counter) = self.counter {
            counter.decrement();
        }
    }
}

/// A batch of tasks handed to the scheduler as one unit.
///
/// Tasks inside a submission are consumed exactly once, in no particular
/// order. Submissions merge cheaply, which is what the per-worker inbox
/// relies on when it drains every pending batch in one swap.
#[derive(Debug, Default)]
pub struct Submission {
    tasks: Vec<Task>,
}

impl Submission {
    /// Creates an empty submission.
    pub fn new() -> Self {
        Submission { tasks: Vec::new() }
    }

    /// Adds one task to the batch.
    pub fn push(&mut self, task: Task) {
        self.tasks.push(task);
    }

    /// Moves every task of `other` into this batch.
    pub fn append(&mut self, mut other: Submission) {
        if self.tasks.is_empty() {
            self.tasks = other.tasks;
        } else {
            self.tasks.append(&mut other.tasks);
        }
    }

    /// Number of tasks in the batch.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether the batch holds no tasks.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl From<Task> for Submission {
    fn from(task: Task) -> Self {
        Submission { tasks: vec![task] }
    }
}

impl IntoIterator for Submission {
    type Item = Task;
    type IntoIter = std::vec::IntoIter<Task>;

    fn into_iter(self) -> Self::IntoIter {
        self.tasks.into_iter()
    }
}

impl FromIterator<Task> for Submission {
    fn from_iter<I: IntoIterator<Item = Task>>(iter: I) -> Self {
        Submission {
            tasks: iter.into_iter().collect(),
        }
    }
}
