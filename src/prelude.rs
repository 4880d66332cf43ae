pub use crate::config::{Config, ConfigBuilder, QueueMode};
pub use crate::error::{Error, Result};
pub use crate::executor::{TaskBuilder, TaskFuture, ThreadPool};
pub use crate::manager::{PoolManager, Precedence};
pub use crate::scheduler::PriorityQueue;
pub use crate::telemetry::{MetricsSnapshot, PoolStatus};
