//! filament - a minimal cooperative task-scheduling runtime.
//!
//! A fixed-size worker pool plus a one-shot [`Task`] primitive that supports
//! completion, chained continuations, barrier composition, timer delays, and
//! sequential driving of a lazily produced sequence of sub-tasks — an
//! async/await emulation built from continuations alone, re-derived from raw
//! threads and locks.
//!
//! # Quick Start
//!
//! ```no_run
//! use filament::prelude::*;
//! use std::time::Duration;
//!
//! // Initialize the runtime (one worker per logical core)
//! filament::init().unwrap();
//!
//! // Fire work at the pool and join through a barrier
//! let tasks: Vec<Task> = (0..4).map(|i| Task::run(move || println!("task {i}"))).collect();
//! Task::when_all(tasks).wait();
//!
//! // Drive an "async function": each step resumes only after the
//! // previous delay has elapsed, without ever parking a worker.
//! let mut i = 0;
//! let master = Task::iterate(std::iter::from_fn(move || {
//!     if i == 3 {
//!         return None;
//!     }
//!     i += 1;
//!     println!("tick {i}");
//!     Some(Task::delay(Duration::from_millis(100)))
//! }));
//! master.wait();
//! ```
//!
//! # Pieces
//!
//! - **Worker pool** ([`pool`]): fixed set of background threads, one shared
//!   unbounded FIFO queue, blocking dequeue. The sole execution substrate for
//!   all continuations and all initial work.
//! - **Task** ([`task`]): thread-safe one-shot completion cell. Continuations
//!   are trampolined through the pool queue, so arbitrarily long chains run
//!   in constant stack depth.
//! - **Ambient context** ([`context`]): call-site-local state captured as an
//!   immutable snapshot when work is scheduled and restored on whichever
//!   worker runs it.

#![warn(missing_debug_implementations)]

pub mod config;
pub mod context;
pub mod error;
pub mod pool;
pub mod prelude;
pub mod runtime;
pub mod task;

// Re-export key types at crate root
pub use config::{Config, ConfigBuilder};
pub use context::{AmbientContext, TaskLocal};
pub use error::{Error, Result};
pub use pool::{PanicStrategy, WorkerPool};
pub use runtime::{init, init_thread_local, init_with_config, shutdown};
pub use task::{Failure, Task};
