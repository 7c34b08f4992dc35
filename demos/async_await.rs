//! Async/await emulated with continuations alone: `iterate` drives a lazy
//! sequence of delay tasks, resuming the "function" after each one completes.
//! No thread sleeps while a delay is pending; the prints below happen between
//! suspension points, one second apart.

use filament::prelude::*;
use std::time::Duration;

fn print_async() -> impl Iterator<Item = Task> {
    let mut i = 0;
    std::iter::from_fn(move || {
        if i > 0 {
            println!("{}", i - 1);
        }
        if i == 5 {
            return None;
        }
        i += 1;
        Some(Task::delay(Duration::from_secs(1)))
    })
}

fn main() {
    filament::init().unwrap();

    Task::iterate(print_async()).wait();

    filament::shutdown();
}
