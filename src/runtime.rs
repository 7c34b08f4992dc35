use crate::config::Config;
use crate::error::{Error, Result};
use crate::pool::{worker, WorkerPool};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};
use std::thread::ThreadId;

pub struct Runtime {
    pub(crate) pool: Arc<WorkerPool>,
    config: Config,
}

impl Runtime {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let pool = WorkerPool::new(&config)?;

        Ok(Self { pool, config })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("pool", &self.pool)
            .finish()
    }
}

// Global runtime for simple API
static GLOBAL_RUNTIME: RwLock<Option<Arc<Runtime>>> = RwLock::new(None);

// Thread-local runtime for isolated tests
thread_local! {
    static THREAD_RUNTIME: std::cell::RefCell<Option<Arc<Runtime>>> =
        const { std::cell::RefCell::new(None) };
}

// Track which threads have thread-local runtimes
static THREAD_RUNTIME_MAP: OnceLock<Mutex<HashMap<ThreadId, bool>>> = OnceLock::new();

fn get_thread_runtime_map() -> &'static Mutex<HashMap<ThreadId, bool>> {
    THREAD_RUNTIME_MAP.get_or_init(|| Mutex::new(HashMap::new()))
}

fn thread_uses_local_runtime() -> bool {
    let thread_id = std::thread::current().id();
    get_thread_runtime_map()
        .lock()
        .unwrap()
        .get(&thread_id)
        .copied()
        .unwrap_or(false)
}

pub fn init() -> Result<()> {
    init_with_config(Config::default())
}

pub fn init_with_config(config: Config) -> Result<()> {
    if thread_uses_local_runtime() {
        let has_existing = THREAD_RUNTIME.with(|rt| rt.borrow().is_some());
        if has_existing {
            return Err(Error::AlreadyInitialized);
        }

        let rt = Runtime::new(config)?;
        THREAD_RUNTIME.with(|rt_cell| {
            *rt_cell.borrow_mut() = Some(Arc::new(rt));
        });

        Ok(())
    } else {
        let mut runtime = GLOBAL_RUNTIME.write();

        if runtime.is_some() {
            return Err(Error::AlreadyInitialized);
        }

        let rt = Runtime::new(config)?;
        *runtime = Some(Arc::new(rt));

        Ok(())
    }
}

/// Initialize runtime in thread-local mode (for tests)
pub fn init_thread_local() -> Result<()> {
    init_thread_local_with_config(Config::default())
}

/// Initialize runtime in thread-local mode with config (for tests)
pub fn init_thread_local_with_config(config: Config) -> Result<()> {
    let thread_id = std::thread::current().id();
    get_thread_runtime_map()
        .lock()
        .unwrap()
        .insert(thread_id, true);

    let has_existing = THREAD_RUNTIME.with(|rt| rt.borrow().is_some());
    if has_existing {
        return Err(Error::AlreadyInitialized);
    }

    let rt = Runtime::new(config)?;
    THREAD_RUNTIME.with(|rt_cell| {
        *rt_cell.borrow_mut() = Some(Arc::new(rt));
    });

    Ok(())
}

pub(crate) fn current_runtime() -> Arc<Runtime> {
    if thread_uses_local_runtime() {
        THREAD_RUNTIME.with(|rt| {
            rt.borrow()
                .as_ref()
                .expect("filament runtime not initialized - call filament::init() first")
                .clone()
        })
    } else {
        GLOBAL_RUNTIME
            .read()
            .as_ref()
            .expect("filament runtime not initialized - call filament::init() first")
            .clone()
    }
}

/// The pool the calling thread should schedule onto: a worker's own pool when
/// called from a pool thread, otherwise the installed runtime's pool.
pub(crate) fn current_pool() -> Arc<WorkerPool> {
    if let Some(pool) = worker::current_pool() {
        return pool;
    }
    current_runtime().pool.clone()
}

pub fn shutdown() {
    if thread_uses_local_runtime() {
        THREAD_RUNTIME.with(|rt_cell| {
            *rt_cell.borrow_mut() = None;
        });
        let thread_id = std::thread::current().id();
        get_thread_runtime_map().lock().unwrap().remove(&thread_id);
    } else {
        let mut runtime = GLOBAL_RUNTIME.write();
        *runtime = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_init() {
        init_thread_local().unwrap();

        let result = init();
        assert!(result.is_err());

        shutdown();
    }

    #[test]
    fn test_custom_config() {
        let config = Config::builder().num_threads(2).build().unwrap();

        init_thread_local_with_config(config).unwrap();

        let rt = current_runtime();
        assert_eq!(rt.pool.num_threads(), 2);
        assert_eq!(rt.config().worker_threads(), 2);

        shutdown();
    }
}
