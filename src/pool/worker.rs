// worker thread loop
use super::panic::{panic_message, PanicStrategy};
use super::{PoolState, WorkItem, WorkerPool};
use crossbeam_channel::Receiver;
use std::cell::RefCell;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};
use std::thread;

thread_local! {
    // Set once at worker startup so that work running on a pool thread can
    // reach its own pool (nested Task::run, continuations creating tasks).
    static WORKER_POOL: RefCell<Option<Weak<WorkerPool>>> = const { RefCell::new(None) };
}

/// The pool owning the calling thread, when the caller is a worker.
pub(crate) fn current_pool() -> Option<Arc<WorkerPool>> {
    WORKER_POOL.with(|pool| pool.borrow().as_ref().and_then(Weak::upgrade))
}

// main loop: blocking dequeue until the queue closes
pub(crate) fn run(pool: Weak<WorkerPool>, rx: Receiver<WorkItem>, state: Arc<PoolState>) {
    WORKER_POOL.with(|slot| {
        *slot.borrow_mut() = Some(pool);
    });

    while let Ok(item) = rx.recv() {
        execute(item, &state);
    }
}

fn execute(item: WorkItem, state: &PoolState) {
    let WorkItem { action, context } = item;

    // Restore the snapshot captured at schedule time for the duration of the
    // action; without one, the action sees whatever ambient state this worker
    // already carries.
    let invoke = move || match context {
        Some(ctx) => ctx.run(action),
        None => action(),
    };

    match state.panic_strategy {
        PanicStrategy::Propagate => {
            // An escaping panic unwinds run() and the thread dies with it.
            invoke();
            state.tasks_executed.fetch_add(1, Ordering::Relaxed);
        }
        PanicStrategy::LogAndContinue => match catch_unwind(AssertUnwindSafe(invoke)) {
            Ok(()) => {
                state.tasks_executed.fetch_add(1, Ordering::Relaxed);
            }
            Err(payload) => {
                state.tasks_panicked.fetch_add(1, Ordering::Relaxed);
                eprintln!(
                    "[filament] worker '{}' caught panic from scheduled action: {}",
                    thread::current().name().unwrap_or("unnamed"),
                    panic_message(payload.as_ref())
                );
            }
        },
    }
}
