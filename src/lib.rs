//! # lazypool - work-stealing thread pool with sleeping workers
//!
//! A fixed pool of worker threads cooperatively executes a dynamically
//! generated graph of fine-grained tasks. Workers that run out of work go
//! to sleep instead of spinning, and wake exactly when new work can exist
//! for them. The coordination is lock-free: a packed counter of hunting and
//! executing workers, a stop flag and an event count, maintained so that
//! whenever any task is running, either some worker is hunting for more
//! work or no worker is asleep.
//!
//! ## Architecture
//!
//! - **Tasks and submissions**: units of work (closures) batched into
//!   submissions and handed to a random worker's inbox.
//! - **Workers**: each owns a steal-able task deque and an inbox, hunts
//!   inbox-first then steals from NUMA-near peers, and commits to sleep
//!   through a prepare/re-check/wait handshake that cannot lose a wakeup.
//! - **Placement**: workers are pinned across cores and steal from
//!   topologically near peers first.
//!
//! ## Example
//!
//! ```no_run
//! use lazypool::Pool;
//!
//! let pool = Pool::new(4);
//!
//! let counter = pool.run(|| {
//!     println!("hello from the pool");
//! });
//!
//! pool.wait_for_counter(&counter);
//! pool.shutdown().expect("workers exited cleanly");
//! ```

pub mod context;
pub mod counter;
pub mod error;
pub mod event_count;
pub mod metrics;
pub mod pool;
pub mod task;
pub mod topology;
pub mod worker;

mod inbox;
mod state;

pub use context::Context;
pub use counter::Counter;
pub use error::PoolError;
pub use event_count::{EventCount, WaitKey};
pub use metrics::MetricsSnapshot;
pub use pool::{Pool, PoolBuilder};
pub use task::{Submission, Task};
pub use worker::current_worker;
