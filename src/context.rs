//! Ambient context: call-site-local state that flows across thread hops.
//!
//! A [`TaskLocal`] behaves like a thread-local whose value follows scheduled
//! work instead of staying on the thread that set it. The pool captures an
//! immutable [`AmbientContext`] snapshot whenever work is scheduled or a
//! continuation is registered, and restores it on whichever worker ends up
//! running the code. Snapshots are copy-on-write: a `set` builds a fresh map
//! for the calling thread, so two work items executing concurrently can never
//! observe each other's mutations.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

type ContextMap = HashMap<u64, Arc<dyn Any + Send + Sync>>;

thread_local! {
    static CURRENT: RefCell<Option<Arc<ContextMap>>> = const { RefCell::new(None) };
}

/// Immutable snapshot of every [`TaskLocal`] value visible on the capturing
/// thread at capture time.
#[derive(Clone)]
pub struct AmbientContext {
    values: Arc<ContextMap>,
}

impl AmbientContext {
    /// Snapshot the calling thread's ambient state. Returns `None` when the
    /// thread carries no ambient values, in which case the associated work
    /// runs with whatever context its worker already has.
    pub fn capture() -> Option<AmbientContext> {
        CURRENT.with(|current| {
            current
                .borrow()
                .as_ref()
                .map(|values| AmbientContext {
                    values: values.clone(),
                })
        })
    }

    /// Run `f` with this snapshot installed, restoring the thread's previous
    /// ambient state afterwards, including on unwind.
    pub fn run<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let prev = CURRENT.with(|current| current.replace(Some(self.values.clone())));
        let _restore = RestoreGuard { prev: Some(prev) };
        f()
    }

    /// Number of distinct values in the snapshot.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl std::fmt::Debug for AmbientContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AmbientContext")
            .field("values", &self.values.len())
            .finish()
    }
}

struct RestoreGuard {
    prev: Option<Option<Arc<ContextMap>>>,
}

impl Drop for RestoreGuard {
    fn drop(&mut self) {
        if let Some(prev) = self.prev.take() {
            CURRENT.with(|current| {
                *current.borrow_mut() = prev;
            });
        }
    }
}

/// A typed cell whose value travels with scheduled work.
///
/// The equivalent of a thread-local that the scheduler snapshots and restores
/// around every continuation, so state set before scheduling is visible inside
/// the scheduled closure no matter which worker runs it.
pub struct TaskLocal<T> {
    key: u64,
    _marker: PhantomData<fn(T) -> T>,
}

impl<T: Send + Sync + 'static> TaskLocal<T> {
    pub fn new() -> Self {
        static NEXT_KEY: AtomicU64 = AtomicU64::new(1);
        Self {
            key: NEXT_KEY.fetch_add(1, Ordering::Relaxed),
            _marker: PhantomData,
        }
    }

    /// Bind `value` in the calling thread's ambient state. Existing snapshots
    /// are unaffected: the thread gets a fresh map with the value inserted.
    pub fn set(&self, value: T) {
        CURRENT.with(|current| {
            let mut map = match current.borrow().as_deref() {
                Some(existing) => existing.clone(),
                None => ContextMap::new(),
            };
            map.insert(self.key, Arc::new(value));
            *current.borrow_mut() = Some(Arc::new(map));
        });
    }

    /// Read the value bound in the current ambient state, if any.
    pub fn get(&self) -> Option<Arc<T>> {
        CURRENT.with(|current| {
            current
                .borrow()
                .as_ref()
                .and_then(|map| map.get(&self.key).cloned())
                .and_then(|value| value.downcast::<T>().ok())
        })
    }
}

impl<T: Send + Sync + 'static> Default for TaskLocal<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for TaskLocal<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskLocal").field("key", &self.key).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get() {
        let local = TaskLocal::new();
        assert!(local.get().is_none());

        local.set(7usize);
        assert_eq!(*local.get().unwrap(), 7);
    }

    #[test]
    fn capture_is_immutable() {
        let local = TaskLocal::new();
        local.set(1i32);
        let snapshot = AmbientContext::capture().unwrap();

        local.set(2i32);
        assert_eq!(*local.get().unwrap(), 2);

        // The earlier snapshot still sees the value from capture time.
        snapshot.run(|| {
            assert_eq!(*local.get().unwrap(), 1);
        });

        // And the thread's own state is restored afterwards.
        assert_eq!(*local.get().unwrap(), 2);
    }

    #[test]
    fn restore_survives_unwind() {
        let local = TaskLocal::new();
        local.set("outer");
        let snapshot = AmbientContext::capture().unwrap();

        local.set("inner");
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            snapshot.run(|| panic!("boom"));
        }));
        assert!(result.is_err());
        assert_eq!(*local.get().unwrap(), "inner");
    }

    #[test]
    fn capture_empty_thread_is_none() {
        std::thread::spawn(|| {
            assert!(AmbientContext::capture().is_none());
        })
        .join()
        .unwrap();
    }

    #[test]
    fn distinct_locals_do_not_collide() {
        let a = TaskLocal::new();
        let b = TaskLocal::new();
        a.set(1u8);
        b.set(2u8);
        assert_eq!(*a.get().unwrap(), 1);
        assert_eq!(*b.get().unwrap(), 2);
    }
}
