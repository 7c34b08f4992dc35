//! Task factories and composition: `run`, `when_all`, `iterate`.

use super::cell::{Failure, Task};
use crate::runtime;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

impl Task {
    /// Schedule `action` on the pool and return a task tracking it: a panic
    /// becomes the task's failure, a normal return completes it.
    pub fn run<F>(action: F) -> Task
    where
        F: FnOnce() + Send + 'static,
    {
        let pool = runtime::current_pool();
        let task = Task::with_pool(pool.clone());
        let completion = task.clone();

        pool.schedule(move || match catch_unwind(AssertUnwindSafe(action)) {
            Ok(()) => completion.finish(None),
            Err(payload) => completion.finish(Some(Failure::from_panic(payload))),
        });

        task
    }

    /// Barrier: a task that completes once every input task has completed.
    ///
    /// The countdown ticks on completion, not on success: a failed child
    /// still counts down, and its failure is observed but not propagated —
    /// the barrier always completes successfully. That is the behavior this
    /// crate reproduces deliberately; callers who care about child outcomes
    /// must inspect the children themselves.
    pub fn when_all<I>(tasks: I) -> Task
    where
        I: IntoIterator<Item = Task>,
    {
        let barrier = Task::new();
        let tasks: Vec<Task> = tasks.into_iter().collect();

        if tasks.is_empty() {
            barrier.finish(None);
            return barrier;
        }

        let remaining = Arc::new(AtomicUsize::new(tasks.len()));
        for child in &tasks {
            let remaining = remaining.clone();
            let barrier = barrier.clone();
            child.register(move || {
                if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                    barrier.finish(None);
                }
            });
        }

        barrier
    }

    /// Drive a lazily produced sequence of tasks to completion, one at a
    /// time, in order. The sequence may be infinite and is consumed exactly
    /// once.
    ///
    /// Returns a master task that completes when the sequence is exhausted.
    /// Side effects inside the iterator's `next` run strictly after the
    /// previously yielded task has completed, even though successive steps
    /// may land on different workers. A failed step (or a panic inside
    /// `next`) fails the master task and stops the drive.
    pub fn iterate<I>(sequence: I) -> Task
    where
        I: IntoIterator<Item = Task>,
        I::IntoIter: Send + 'static,
    {
        let master = Task::new();
        advance(sequence.into_iter(), master.clone());
        master
    }
}

// One pull step of the drive. The "recursion" goes through the pulled task's
// continuation, which re-enters via the pool queue rather than a direct call,
// so stack depth stays flat however many steps the sequence yields.
fn advance<I>(mut sequence: I, master: Task)
where
    I: Iterator<Item = Task> + Send + 'static,
{
    let pulled = match catch_unwind(AssertUnwindSafe(|| sequence.next())) {
        Ok(pulled) => pulled,
        Err(payload) => {
            master.finish(Some(Failure::from_panic(payload)));
            return;
        }
    };

    match pulled {
        Some(step) => {
            let observed = step.clone();
            step.register(move || {
                if let Some(failure) = observed.failure() {
                    master.finish(Some(failure));
                } else {
                    advance(sequence, master);
                }
            });
        }
        None => master.finish(None),
    }
}
