//! Ambient-context propagation across thread hops.

use filament::prelude::*;
use parking_lot::Mutex;
use std::sync::Arc;

#[test]
fn scheduled_work_sees_the_value_set_at_schedule_time() {
    filament::init_thread_local().unwrap();

    // The closures capture nothing; the value travels through the ambient
    // snapshot the pool captured when each task was scheduled.
    let local: Arc<TaskLocal<usize>> = Arc::new(TaskLocal::new());
    let observed = Arc::new(Mutex::new(vec![None; 50]));

    let tasks: Vec<Task> = (0..50)
        .map(|i| {
            local.set(i);
            let local = local.clone();
            let observed = observed.clone();
            Task::run(move || {
                observed.lock()[i] = local.get().map(|v| *v);
            })
        })
        .collect();
    Task::when_all(tasks).wait();

    let observed = observed.lock();
    for (i, seen) in observed.iter().enumerate() {
        assert_eq!(*seen, Some(i));
    }

    filament::shutdown();
}

#[test]
fn mutations_inside_work_items_stay_isolated() {
    filament::init_thread_local().unwrap();

    let local: Arc<TaskLocal<usize>> = Arc::new(TaskLocal::new());
    let clean = Arc::new(std::sync::atomic::AtomicBool::new(true));

    let tasks: Vec<Task> = (0..64)
        .map(|i| {
            local.set(i);
            let local = local.clone();
            let clean = clean.clone();
            Task::run(move || {
                // Overwrite our own snapshot, then check nobody else's
                // overwrite leaked into it.
                local.set(i + 1000);
                if local.get().map(|v| *v) != Some(i + 1000) {
                    clean.store(false, std::sync::atomic::Ordering::Relaxed);
                }
            })
        })
        .collect();
    Task::when_all(tasks).wait();

    assert!(clean.load(std::sync::atomic::Ordering::Relaxed));

    filament::shutdown();
}

#[test]
fn continuation_carries_the_registration_time_snapshot() {
    filament::init_thread_local().unwrap();

    let local: Arc<TaskLocal<&'static str>> = Arc::new(TaskLocal::new());

    local.set("at registration");
    let seen = Arc::new(Mutex::new(None));
    let seen_in_continuation = seen.clone();
    let local_in_continuation = local.clone();

    let chained = Task::delay(std::time::Duration::from_millis(10)).continue_with(move || {
        *seen_in_continuation.lock() = local_in_continuation.get().map(|v| *v);
    });

    // Mutating after registration must not affect the stored snapshot.
    local.set("after registration");
    chained.wait();

    assert_eq!(*seen.lock(), Some("at registration"));

    filament::shutdown();
}
