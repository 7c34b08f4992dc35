//! Fixed-size worker pool.
//!
//! One shared unbounded FIFO queue, one worker thread per logical core (by
//! default), blocking dequeue. Every continuation in the task layer and every
//! directly scheduled action runs here; the pool is the sole execution
//! substrate. There is no work stealing, no priorities, and no cancellation
//! of queued items.

pub mod panic;
pub(crate) mod worker;

pub use panic::PanicStrategy;

use crate::config::Config;
use crate::context::AmbientContext;
use crate::error::{Error, Result};
use crossbeam_channel::{unbounded, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

#[cfg(target_os = "linux")]
fn pin_thread_to_core(core_id: usize) {
    unsafe {
        let mut cpuset: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_SET(core_id, &mut cpuset);
        let result = libc::sched_setaffinity(
            0, // current thread
            std::mem::size_of::<libc::cpu_set_t>(),
            &cpuset,
        );
        if result != 0 {
            eprintln!(
                "[filament] failed to pin thread {} to core {}",
                thread::current().name().unwrap_or("unknown"),
                core_id
            );
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn pin_thread_to_core(_core_id: usize) {}

/// The unit the queue holds: an action plus the ambient-context snapshot
/// captured when it was scheduled.
pub(crate) struct WorkItem {
    pub(crate) action: Box<dyn FnOnce() + Send + 'static>,
    pub(crate) context: Option<AmbientContext>,
}

/// State the worker threads share with the pool handle.
pub(crate) struct PoolState {
    pub(crate) tasks_executed: AtomicU64,
    pub(crate) tasks_panicked: AtomicU64,
    pub(crate) panic_strategy: PanicStrategy,
}

pub struct WorkerPool {
    tx: Option<Sender<WorkItem>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    num_threads: usize,
    state: Arc<PoolState>,
}

impl WorkerPool {
    pub fn new(config: &Config) -> Result<Arc<Self>> {
        let num_threads = config.worker_threads();
        if num_threads == 0 {
            return Err(Error::config("need at least 1 thread"));
        }

        let (tx, rx) = unbounded::<WorkItem>();
        let state = Arc::new(PoolState {
            tasks_executed: AtomicU64::new(0),
            tasks_panicked: AtomicU64::new(0),
            panic_strategy: config.panic_strategy,
        });

        let pool = Arc::new(Self {
            tx: Some(tx),
            handles: Mutex::new(Vec::with_capacity(num_threads)),
            num_threads,
            state: state.clone(),
        });

        for id in 0..num_threads {
            let rx = rx.clone();
            let state = state.clone();
            let weak = Arc::downgrade(&pool);
            let name = format!("{}-{}", config.thread_name_prefix, id);
            let pin_workers = config.pin_workers;

            let mut builder = thread::Builder::new().name(name);
            if let Some(stack_size) = config.stack_size {
                builder = builder.stack_size(stack_size);
            }

            let handle = builder
                .spawn(move || {
                    if pin_workers {
                        pin_thread_to_core(id);
                    }
                    worker::run(weak, rx, state);
                })
                .map_err(|e| Error::pool(format!("spawn failed: {}", e)))?;

            pool.handles.lock().push(handle);
        }

        Ok(pool)
    }

    /// Queue `action` for execution on some worker, together with a snapshot
    /// of the calling thread's ambient context. Fire-and-forget: returns
    /// immediately, FIFO dispatch, unbounded capacity.
    pub fn schedule<F>(&self, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let item = WorkItem {
            action: Box::new(action),
            context: AmbientContext::capture(),
        };

        if let Some(tx) = &self.tx {
            if tx.send(item).is_err() {
                eprintln!("[filament] work item dropped: pool queue closed");
            }
        }
    }

    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    /// Work items that ran to completion on some worker.
    pub fn tasks_executed(&self) -> u64 {
        self.state.tasks_executed.load(Ordering::Relaxed)
    }

    /// Work items whose action panicked on some worker.
    pub fn tasks_panicked(&self) -> u64 {
        self.state.tasks_panicked.load(Ordering::Relaxed)
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Closing the sender drains the queue and lets every worker's
        // blocking recv return Err, ending its loop.
        self.tx.take();

        // The last pool handle can be dropped from a worker thread (a task
        // clone held by a running continuation); that thread must not join
        // itself and instead exits on its own once the queue closes.
        let current = thread::current().id();
        for handle in self.handles.get_mut().drain(..) {
            if handle.thread().id() == current {
                continue;
            }
            let _ = handle.join();
        }
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("num_threads", &self.num_threads)
            .field("tasks_executed", &self.tasks_executed())
            .field("tasks_panicked", &self.tasks_panicked())
            .finish()
    }
}
