//! Task execution infrastructure.
//!
//! This module provides the task type and its result handle, the worker
//! threads, and the thread pool that feeds them.

pub mod builder;
pub mod future;
pub mod panic_handler;
pub mod pool;
pub mod task;
pub mod worker;

pub use builder::TaskBuilder;
pub use future::{AnyValue, TaskFuture};
pub use panic_handler::{catch_panic, PanicInfo};
pub use pool::ThreadPool;
pub use task::{Task, TaskId, TaskState};
pub use worker::{IdAllocator, WorkerId};
