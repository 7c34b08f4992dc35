//! Barrier demo: fan twenty tasks out across the pool, then join them all
//! through a single `when_all` barrier.

use filament::prelude::*;
use std::time::Duration;

fn main() {
    filament::init().unwrap();

    let tasks: Vec<Task> = (0..20)
        .map(|i| {
            Task::run(move || {
                std::thread::sleep(Duration::from_millis(50 * (i % 4) as u64));
                println!("task {i} done on {:?}", std::thread::current().name());
            })
        })
        .collect();

    Task::when_all(tasks).wait();
    println!("all done");

    filament::shutdown();
}
