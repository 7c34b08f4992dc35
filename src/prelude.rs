pub use crate::config::{Config, ConfigBuilder};
pub use crate::context::{AmbientContext, TaskLocal};
pub use crate::error::{Error, Result};
pub use crate::pool::{PanicStrategy, WorkerPool};
pub use crate::task::{Failure, Task};

pub use crate::{init, init_thread_local, init_with_config, shutdown};
