use filament::prelude::*;
use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[test]
fn run_executes_on_a_worker_thread() {
    filament::init_thread_local().unwrap();

    let caller = std::thread::current().id();
    let ran_elsewhere = Arc::new(AtomicBool::new(false));
    let flag = ran_elsewhere.clone();

    Task::run(move || {
        if std::thread::current().id() != caller {
            flag.store(true, Ordering::Relaxed);
        }
    })
    .wait();

    assert!(ran_elsewhere.load(Ordering::Relaxed));
    filament::shutdown();
}

#[test]
fn wait_reraises_the_original_failure() {
    filament::init_thread_local().unwrap();

    // black_box keeps the argument non-constant so the panic payload is a
    // String; rustc flattens constant format args into a &'static str.
    let task = Task::run(|| panic!("broke at step {}", std::hint::black_box(3)));
    let caught = catch_unwind(AssertUnwindSafe(|| task.wait())).unwrap_err();

    // Same payload type and message as the original panic, not a wrapper.
    let message = caught.downcast_ref::<String>().unwrap();
    assert_eq!(message, "broke at step 3");

    filament::shutdown();
}

#[test]
fn continuation_runs_strictly_after_antecedent() {
    filament::init_thread_local().unwrap();

    let order = Arc::new(Mutex::new(Vec::new()));
    let first = order.clone();
    let second = order.clone();

    Task::run(move || {
        std::thread::sleep(Duration::from_millis(20));
        first.lock().push("a");
    })
    .continue_with(move || second.lock().push("b"))
    .wait();

    assert_eq!(*order.lock(), vec!["a", "b"]);
    filament::shutdown();
}

#[test]
fn failed_antecedent_skips_continuation_and_propagates() {
    filament::init_thread_local().unwrap();

    let continuation_ran = Arc::new(AtomicBool::new(false));
    let flag = continuation_ran.clone();

    let chained = Task::run(|| panic!("upstream"))
        .continue_with(move || flag.store(true, Ordering::Relaxed));

    let caught = catch_unwind(AssertUnwindSafe(|| chained.wait())).unwrap_err();
    assert_eq!(caught.downcast_ref::<&str>(), Some(&"upstream"));
    assert!(!continuation_ran.load(Ordering::Relaxed));

    filament::shutdown();
}

#[test]
fn continue_with_on_completed_task_still_runs() {
    filament::init_thread_local().unwrap();

    let antecedent = Task::run(|| {});
    antecedent.wait();

    let ran = Arc::new(AtomicBool::new(false));
    let flag = ran.clone();
    antecedent
        .continue_with(move || flag.store(true, Ordering::Relaxed))
        .wait();

    assert!(ran.load(Ordering::Relaxed));
    filament::shutdown();
}

#[test]
fn continue_with_task_completes_with_the_inner_task() {
    filament::init_thread_local().unwrap();

    let start = Instant::now();
    let outer = Task::run(|| {}).continue_with_task(|| Task::delay(Duration::from_millis(50)));
    outer.wait();

    assert!(start.elapsed() >= Duration::from_millis(50));
    filament::shutdown();
}

#[test]
fn continue_with_task_propagates_inner_failure() {
    filament::init_thread_local().unwrap();

    let outer = Task::run(|| {}).continue_with_task(|| Task::run(|| panic!("inner failed")));

    let caught = catch_unwind(AssertUnwindSafe(|| outer.wait())).unwrap_err();
    assert_eq!(caught.downcast_ref::<&str>(), Some(&"inner failed"));

    filament::shutdown();
}

#[test]
fn when_all_waits_for_every_input() {
    filament::init_thread_local().unwrap();

    let counter = Arc::new(AtomicUsize::new(0));
    let tasks: Vec<Task> = (0..32)
        .map(|_| {
            let counter = counter.clone();
            Task::run(move || {
                std::thread::sleep(Duration::from_millis(1));
                counter.fetch_add(1, Ordering::Relaxed);
            })
        })
        .collect();

    let barrier = Task::when_all(tasks.clone());
    barrier.wait();

    assert_eq!(counter.load(Ordering::Relaxed), 32);
    assert!(tasks.iter().all(Task::is_completed));

    filament::shutdown();
}

#[test]
fn when_all_of_nothing_completes_immediately() {
    filament::init_thread_local().unwrap();

    let barrier = Task::when_all(Vec::new());
    assert!(barrier.is_completed());
    barrier.wait();

    filament::shutdown();
}

#[test]
fn when_all_swallows_child_failures() {
    filament::init_thread_local().unwrap();

    let ok = Task::run(|| {});
    let failed = Task::run(|| panic!("child failed"));

    // Documented behavior: the barrier completes successfully even though a
    // child failed. The failure stays observable on the child itself.
    let barrier = Task::when_all(vec![ok, failed.clone()]);
    barrier.wait();

    assert!(failed.is_completed());
    assert!(catch_unwind(AssertUnwindSafe(|| failed.wait())).is_err());

    filament::shutdown();
}

#[test]
fn delay_respects_the_duration() {
    filament::init_thread_local().unwrap();

    let start = Instant::now();
    Task::delay(Duration::from_millis(60)).wait();
    assert!(start.elapsed() >= Duration::from_millis(60));

    filament::shutdown();
}

#[test]
fn zero_delay_does_not_deadlock() {
    filament::init_thread_local().unwrap();

    Task::delay(Duration::ZERO).wait();

    filament::shutdown();
}

#[test]
fn iterate_interleaves_delays_and_side_effects_in_order() {
    filament::init_thread_local().unwrap();

    let effects = Arc::new(Mutex::new(Vec::new()));
    let seen = effects.clone();
    let start = Instant::now();

    let mut step = 0;
    let master = Task::iterate(std::iter::from_fn(move || {
        match step {
            0 => {}
            1 => seen.lock().push("first"),
            2 => seen.lock().push("second"),
            _ => return None,
        }
        step += 1;
        Some(Task::delay(Duration::from_millis(50)))
    }));
    master.wait();

    assert_eq!(*effects.lock(), vec!["first", "second"]);
    // Three delays ran back to back, so both effects are separated by real
    // elapsed time.
    assert!(start.elapsed() >= Duration::from_millis(150));

    filament::shutdown();
}

#[test]
fn iterate_over_empty_sequence_completes() {
    filament::init_thread_local().unwrap();

    Task::iterate(std::iter::empty()).wait();

    filament::shutdown();
}

#[test]
fn iterate_fails_the_master_on_a_failed_step() {
    filament::init_thread_local().unwrap();

    let steps_after_failure = Arc::new(AtomicUsize::new(0));
    let observed = steps_after_failure.clone();

    let mut step = 0;
    let master = Task::iterate(std::iter::from_fn(move || {
        step += 1;
        match step {
            1 => Some(Task::run(|| {})),
            2 => Some(Task::run(|| panic!("step blew up"))),
            _ => {
                observed.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }));

    let caught = catch_unwind(AssertUnwindSafe(|| master.wait())).unwrap_err();
    assert_eq!(caught.downcast_ref::<&str>(), Some(&"step blew up"));
    assert_eq!(steps_after_failure.load(Ordering::Relaxed), 0);

    filament::shutdown();
}
