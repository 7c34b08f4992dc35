//! The task layer: one-shot completion cells and their composition.
//!
//! [`Task`] is a promise-like cell with no payload: pending until its single
//! completion transition, then completed-ok or completed-failed. Composition
//! is continuation-based and pool-driven throughout; `Task::wait` is the only
//! blocking operation.

pub mod cell;
pub mod combinators;
pub mod timer;

pub use cell::{Failure, Task};
