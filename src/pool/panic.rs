use std::any::Any;

/// What a worker does with a panic escaping a directly scheduled action.
///
/// Actions submitted through the task layer are always wrapped in failure
/// capture, so this only matters for raw [`WorkerPool::schedule`] calls.
///
/// [`WorkerPool::schedule`]: super::WorkerPool::schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanicStrategy {
    /// Let the panic unwind the worker's loop. The thread terminates and pool
    /// capacity shrinks permanently. This mirrors a pool that does no
    /// shielding of its own.
    Propagate,
    /// Report the panic and keep the worker alive. Only that work item is
    /// lost.
    LogAndContinue,
}

impl Default for PanicStrategy {
    fn default() -> Self {
        PanicStrategy::LogAndContinue
    }
}

/// Best-effort message extraction from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
