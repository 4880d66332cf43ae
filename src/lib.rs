//! heapwell - a worker pool with a priority heap
//!
//! Worker threads pull tasks from one shared queue, either in submission
//! order or highest priority first, and hand results back through
//! single-use futures.
//!
//! # Quick Start
//!
//! ```no_run
//! use heapwell::prelude::*;
//!
//! let pool = ThreadPool::with_threads(4).unwrap();
//!
//! let futures: Vec<_> = (0..100u64)
//!     .map(|i| pool.submit(move || i * i).unwrap())
//!     .collect();
//!
//! let sum: u64 = futures.into_iter().map(|f| f.get().unwrap()).sum();
//! assert_eq!(sum, 328350);
//! ```
//!
//! # Features
//!
//! - **FIFO or priority queueing**: chosen per pool through [`QueueMode`]
//! - **Retries**: failed (panicking) tasks are re-queued while they have budget
//! - **Elastic sizing**: optional controller grows and shrinks the pool with load
//! - **Drain on drop**: no queued task is lost when the pool goes away
//! - **Telemetry**: counters and latency percentiles via [`PoolMetrics`]
//! - **Configure-then-get**: a process-wide [`PoolManager`] with precedence levels

// Lint configuration
#![warn(missing_debug_implementations)]

pub mod config;
pub mod error;
pub mod executor;
pub mod manager;
pub mod prelude;
pub mod scheduler;
pub mod telemetry;

// Re-export key types at crate root
pub use config::{Config, ConfigBuilder, QueueMode};
pub use error::{Error, Result};
pub use executor::{Task, TaskBuilder, TaskFuture, TaskId, TaskState, ThreadPool};
pub use manager::{PoolManager, Precedence};
pub use scheduler::{Completable, PriorityQueue};
pub use telemetry::{MetricsSnapshot, PoolMetrics, PoolStatus};
