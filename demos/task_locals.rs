//! Ambient-context demo: the scheduled closures capture nothing, yet each one
//! prints the value that was ambient when it was scheduled, because the pool
//! snapshots and restores the context around every work item.

use filament::prelude::*;
use std::sync::Arc;
use std::time::Duration;

fn main() {
    filament::init().unwrap();

    let local: Arc<TaskLocal<i32>> = Arc::new(TaskLocal::new());

    let tasks: Vec<Task> = (0..20)
        .map(|i| {
            local.set(i);
            let local = local.clone();
            Task::run(move || {
                println!("{}", *local.get().unwrap());
                std::thread::sleep(Duration::from_millis(100));
            })
        })
        .collect();

    Task::when_all(tasks).wait();
    filament::shutdown();
}
