//! Pool construction errors.
//!
//! Construction is the only fallible operation the scheduler exposes.
//! Runtime misuse of worker thread-local state is a programmer error and
//! panics instead; task failures are the task layer's concern and never
//! surface through the scheduler.

use std::io;

use thiserror::Error;

/// Errors returned while building a [`Pool`](crate::Pool).
#[derive(Debug, Error)]
pub enum PoolError {
    /// Spawning a worker thread failed. Workers started before the failure
    /// have already been stopped and joined when this is returned.
    #[error("failed to spawn worker thread {worker}")]
    WorkerSpawn {
        /// Index of the worker that could not be started.
        worker: usize,
        #[source]
        source: io::Error,
    },
}
