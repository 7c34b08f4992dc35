//! Timer facility backing [`Task::delay`].
//!
//! A single dedicated thread sleeps on a deadline heap and completes delay
//! tasks as they come due. Waiting never occupies a pool worker; only the
//! completion (and whatever continuation it releases) touches the pool. The
//! thread is started lazily and lives for the rest of the process.

use super::cell::Task;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::{Duration, Instant};

struct TimerEntry {
    deadline: Instant,
    // tie-breaker keeping equal deadlines in registration order
    seq: u64,
    task: Task,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for TimerEntry {}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerEntry {
    // Reversed so the BinaryHeap pops the earliest deadline first.
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct TimerShared {
    queue: Mutex<BinaryHeap<TimerEntry>>,
    ready: Condvar,
    next_seq: AtomicU64,
}

pub(crate) struct Timer {
    shared: Arc<TimerShared>,
}

static TIMER: OnceLock<Timer> = OnceLock::new();

impl Timer {
    pub(crate) fn global() -> &'static Timer {
        TIMER.get_or_init(|| {
            let shared = Arc::new(TimerShared {
                queue: Mutex::new(BinaryHeap::new()),
                ready: Condvar::new(),
                next_seq: AtomicU64::new(0),
            });

            let thread_shared = shared.clone();
            thread::Builder::new()
                .name("filament-timer".to_string())
                .spawn(move || run(thread_shared))
                .expect("failed to spawn timer thread");

            Timer { shared }
        })
    }

    pub(crate) fn register(&self, deadline: Instant, task: Task) {
        let seq = self.shared.next_seq.fetch_add(1, Ordering::Relaxed);
        let mut queue = self.shared.queue.lock();
        queue.push(TimerEntry {
            deadline,
            seq,
            task,
        });
        self.shared.ready.notify_one();
    }
}

fn run(shared: Arc<TimerShared>) {
    let mut due: Vec<Task> = Vec::new();
    let mut queue = shared.queue.lock();

    loop {
        let now = Instant::now();
        while queue.peek().map_or(false, |entry| entry.deadline <= now) {
            due.push(queue.pop().expect("peeked entry").task);
        }

        if !due.is_empty() {
            // Completing a task schedules its continuation; do it without
            // holding the heap lock. A delay task that was completed from
            // elsewhere in the meantime is simply skipped.
            MutexGuard::unlocked(&mut queue, || {
                for task in due.drain(..) {
                    let _ = task.set_result();
                }
            });
            continue;
        }

        match queue.peek().map(|entry| entry.deadline) {
            Some(deadline) => {
                let _timed_out = shared.ready.wait_until(&mut queue, deadline);
            }
            None => shared.ready.wait(&mut queue),
        }
    }
}

impl Task {
    /// A task that completes once `duration` has elapsed, via the timer
    /// thread. It carries nothing; its only purpose is to mark elapsed time.
    pub fn delay(duration: Duration) -> Task {
        let task = Task::new();
        Timer::global().register(Instant::now() + duration, task.clone());
        task
    }
}
