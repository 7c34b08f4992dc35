use crate::context::AmbientContext;
use crate::error::{Error, Result};
use crate::pool::panic::panic_message;
use crate::pool::WorkerPool;
use crate::runtime;
use crossbeam_channel::bounded;
use parking_lot::Mutex;
use std::any::Any;
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// A captured task failure.
///
/// Wraps the panic payload raised inside a task's action. The first observer
/// to re-raise gets the original payload back via `resume_unwind`, preserving
/// its identity; any later observer unwinds with a copy of the extracted
/// message.
#[derive(Clone)]
pub struct Failure {
    inner: Arc<FailureInner>,
}

struct FailureInner {
    payload: Mutex<Option<Box<dyn Any + Send>>>,
    message: String,
}

impl Failure {
    /// A failure carrying just a message, for completing a task by hand.
    pub fn new<S: Into<String>>(message: S) -> Self {
        let message = message.into();
        Self {
            inner: Arc::new(FailureInner {
                payload: Mutex::new(None),
                message,
            }),
        }
    }

    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = panic_message(payload.as_ref());
        Self {
            inner: Arc::new(FailureInner {
                payload: Mutex::new(Some(payload)),
                message,
            }),
        }
    }

    pub fn message(&self) -> &str {
        &self.inner.message
    }

    /// Resume unwinding with the captured payload.
    pub fn raise(&self) -> ! {
        if let Some(payload) = self.inner.payload.lock().take() {
            resume_unwind(payload);
        }
        resume_unwind(Box::new(self.inner.message.clone()))
    }
}

impl std::fmt::Debug for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Failure")
            .field("message", &self.inner.message)
            .finish()
    }
}

struct Continuation {
    action: Box<dyn FnOnce() + Send + 'static>,
    context: Option<AmbientContext>,
}

struct TaskState {
    completed: bool,
    failure: Option<Failure>,
    continuation: Option<Continuation>,
}

struct TaskInner {
    pool: Arc<WorkerPool>,
    state: Mutex<TaskState>,
}

/// A one-shot completion cell: "something that will have finished, or failed,
/// in the future."
///
/// Tasks carry no payload; they mark completion or a captured failure. They
/// compose through continuations ([`continue_with`](Task::continue_with)),
/// barriers ([`when_all`](Task::when_all)), timers ([`delay`](Task::delay))
/// and sequential driving ([`iterate`](Task::iterate)). All continuations run
/// on the worker pool; [`wait`](Task::wait) is the only operation that blocks
/// a thread.
///
/// Each task holds at most one registered continuation. Registering a second
/// one while the first is still pending replaces it — a known limitation of
/// this design, kept rather than silently widened to a callback list.
#[derive(Clone)]
pub struct Task {
    inner: Arc<TaskInner>,
}

impl Task {
    /// A pending task bound to the current runtime's pool. Complete it with
    /// [`set_result`](Task::set_result) or [`set_failure`](Task::set_failure).
    pub fn new() -> Self {
        Self::with_pool(runtime::current_pool())
    }

    pub(crate) fn with_pool(pool: Arc<WorkerPool>) -> Self {
        Self {
            inner: Arc::new(TaskInner {
                pool,
                state: Mutex::new(TaskState {
                    completed: false,
                    failure: None,
                    continuation: None,
                }),
            }),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.inner.state.lock().completed
    }

    /// Transition to completed-ok. Returns [`Error::TaskCompleted`] if the
    /// task has already completed; the transition happens exactly once.
    pub fn set_result(&self) -> Result<()> {
        self.complete(None)
    }

    /// Transition to completed-failed.
    pub fn set_failure(&self, failure: Failure) -> Result<()> {
        self.complete(Some(failure))
    }

    fn complete(&self, failure: Option<Failure>) -> Result<()> {
        let mut state = self.inner.state.lock();
        if state.completed {
            return Err(Error::TaskCompleted);
        }
        state.completed = true;
        state.failure = failure;

        // Hand a stored continuation to the pool together with its
        // registration-time snapshot. The invocation itself happens on a
        // worker, never under this lock.
        if let Some(continuation) = state.continuation.take() {
            let Continuation { action, context } = continuation;
            self.inner.pool.schedule(move || match context {
                Some(ctx) => ctx.run(action),
                None => action(),
            });
        }

        Ok(())
    }

    // Completion path for tasks owned by a combinator wrapper: the wrapper is
    // the sole completer, so a collision means someone completed the task out
    // from under it.
    pub(crate) fn finish(&self, failure: Option<Failure>) {
        self.complete(failure).expect("task already completed");
    }

    pub(crate) fn failure(&self) -> Option<Failure> {
        self.inner.state.lock().failure.clone()
    }

    /// Store `callback` to run on the pool after this task's single
    /// completion transition, whatever the outcome. If the task is already
    /// complete it is scheduled immediately; otherwise it is kept with a
    /// fresh ambient-context snapshot.
    pub(crate) fn register<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.inner.state.lock();
        if state.completed {
            drop(state);
            self.inner.pool.schedule(callback);
        } else {
            state.continuation = Some(Continuation {
                action: Box::new(callback),
                context: AmbientContext::capture(),
            });
        }
    }

    /// Run `action` after this task completes, on the pool.
    ///
    /// Returns a task tracking the continuation: a panic inside `action`
    /// becomes its failure, a normal return completes it. If this task
    /// failed, `action` never runs and the failure is propagated to the
    /// returned task verbatim.
    pub fn continue_with<F>(&self, action: F) -> Task
    where
        F: FnOnce() + Send + 'static,
    {
        let task = Task::with_pool(self.inner.pool.clone());
        let antecedent = self.clone();
        let completion = task.clone();

        self.register(move || {
            if let Some(failure) = antecedent.failure() {
                completion.finish(Some(failure));
                return;
            }
            match catch_unwind(AssertUnwindSafe(action)) {
                Ok(()) => completion.finish(None),
                Err(payload) => completion.finish(Some(Failure::from_panic(payload))),
            }
        });

        task
    }

    /// Like [`continue_with`](Task::continue_with), but `action` itself
    /// returns a task, and the returned outer task completes only once that
    /// inner task does, propagating its failure. This is what lets one
    /// asynchronous step depend on another without parking a thread.
    pub fn continue_with_task<F>(&self, action: F) -> Task
    where
        F: FnOnce() -> Task + Send + 'static,
    {
        let task = Task::with_pool(self.inner.pool.clone());
        let antecedent = self.clone();
        let completion = task.clone();

        self.register(move || {
            if let Some(failure) = antecedent.failure() {
                completion.finish(Some(failure));
                return;
            }
            let next = match catch_unwind(AssertUnwindSafe(action)) {
                Ok(next) => next,
                Err(payload) => {
                    completion.finish(Some(Failure::from_panic(payload)));
                    return;
                }
            };
            let observed = next.clone();
            next.register(move || {
                completion.finish(observed.failure());
            });
        });

        task
    }

    /// Block the calling thread until this task completes, then re-raise a
    /// captured failure with its original identity.
    ///
    /// The sole blocking primitive in the crate: if the task is pending, a
    /// one-shot signal is registered as its continuation and the caller parks
    /// on it. Everything else composes through the pool without blocking.
    pub fn wait(&self) {
        if !self.is_completed() {
            let (tx, rx) = bounded::<()>(1);
            self.register(move || {
                let _ = tx.send(());
            });
            let _ = rx.recv();
        }

        if let Some(failure) = self.failure() {
            failure.raise();
        }
    }
}

impl Default for Task {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Task")
            .field("completed", &state.completed)
            .field("failed", &state.failure.is_some())
            .field("has_continuation", &state.continuation.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn pool() -> Arc<WorkerPool> {
        let config = Config::builder().num_threads(2).build().unwrap();
        WorkerPool::new(&config).unwrap()
    }

    #[test]
    fn second_completion_is_invalid_state() {
        let task = Task::with_pool(pool());
        assert!(task.set_result().is_ok());
        assert!(matches!(task.set_result(), Err(Error::TaskCompleted)));
        assert!(matches!(
            task.set_failure(Failure::new("late")),
            Err(Error::TaskCompleted)
        ));
    }

    #[test]
    fn failure_then_result_is_invalid_state() {
        let task = Task::with_pool(pool());
        assert!(task.set_failure(Failure::new("first")).is_ok());
        assert!(matches!(task.set_result(), Err(Error::TaskCompleted)));
        assert!(task.is_completed());
    }

    #[test]
    fn wait_returns_immediately_on_completed_task() {
        let task = Task::with_pool(pool());
        task.set_result().unwrap();
        task.wait();
    }

    #[test]
    fn manual_failure_reraises_message() {
        let task = Task::with_pool(pool());
        task.set_failure(Failure::new("manual failure")).unwrap();

        let caught = catch_unwind(AssertUnwindSafe(|| task.wait())).unwrap_err();
        let message = caught.downcast_ref::<String>().unwrap();
        assert_eq!(message, "manual failure");
    }

    #[test]
    fn continuation_registered_before_completion_runs() {
        let pool = pool();
        let task = Task::with_pool(pool);
        let chained = task.continue_with(|| {});

        assert!(!chained.is_completed());
        task.set_result().unwrap();
        chained.wait();
        assert!(chained.is_completed());
    }
}
