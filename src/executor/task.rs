//! Task representation and execution.

use super::future::{self, AnyValue, Outcome, Promise, TaskFuture};
use super::panic_handler::catch_panic;
use crate::error::{Error, Result};
use crate::scheduler::priority::Completable;
use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use std::any::TypeId;
use std::cmp::Ordering as CmpOrdering;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU16, AtomicU64, AtomicU8, Ordering};

/// Global task ID counter
static TASK_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

fn next_sequence() -> u64 {
    TASK_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Unique identifier for a task. Ids grow with creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(u64);

impl TaskId {
    fn next() -> Self {
        TaskId(next_sequence())
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

/// Lifecycle of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TaskState {
    Pending = 0,
    Completed = 1,
    Retrieved = 2,
}

/// A callable with its arguments already bound, returning its result
/// type-erased.
trait Invocable: Send {
    fn invoke(&mut self) -> AnyValue;
}

struct Thunk<F, R> {
    func: F,
    _ret: PhantomData<fn() -> R>,
}

impl<F, R> Invocable for Thunk<F, R>
where
    F: FnMut() -> R + Send,
    R: Send + 'static,
{
    fn invoke(&mut self) -> AnyValue {
        Box::new((self.func)())
    }
}

struct TaskInner {
    func: Option<Box<dyn Invocable>>,
    state: TaskState,
    promise: Promise,
    future: Option<Receiver<Outcome>>,
    last_error: Option<String>,
}

/// A unit of work: callable, priority, retry budget and result channel.
///
/// The callable may be invoked more than once when retries are configured,
/// hence `FnMut`. Panics inside it count as a failed attempt.
pub struct Task {
    id: TaskId,
    // arrival order among equal priorities
    sequence: AtomicU64,
    priority: AtomicU16,
    retries: AtomicU8,
    returns_value: bool,
    inner: Mutex<TaskInner>,
}

impl Task {
    /// Create a task with priority 0 and no retries
    pub fn new<F, R>(f: F) -> Self
    where
        F: FnMut() -> R + Send + 'static,
        R: Send + 'static,
    {
        Self::with_options(f, 0, 0)
    }

    pub fn with_options<F, R>(f: F, priority: u16, retries: u8) -> Self
    where
        F: FnMut() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (promise, rx) = future::channel();
        let thunk = Thunk {
            func: f,
            _ret: PhantomData,
        };

        let id = TaskId::next();
        Task {
            id,
            sequence: AtomicU64::new(id.0),
            priority: AtomicU16::new(priority),
            retries: AtomicU8::new(retries),
            returns_value: TypeId::of::<R>() != TypeId::of::<()>(),
            inner: Mutex::new(TaskInner {
                func: Some(Box::new(thunk)),
                state: TaskState::Pending,
                promise,
                future: Some(rx),
                last_error: None,
            }),
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Position among equal-priority tasks; lower is served first. Starts
    /// at creation order and is renewed each time the task is submitted.
    pub fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::Relaxed)
    }

    /// Stamp the task as arriving now. Must not be called while the task
    /// sits in a heap.
    pub(crate) fn mark_arrival(&self) {
        self.sequence.store(next_sequence(), Ordering::Relaxed);
    }

    /// False for callables returning `()`.
    pub fn returns_value(&self) -> bool {
        self.returns_value
    }

    /// Run until an attempt succeeds or the retry budget is spent.
    ///
    /// `retries` counts attempts after the first one, so a task that always
    /// fails runs `retries + 1` times and ends with a budget of zero.
    /// Returns whether the task completed.
    pub fn execute(&self) -> bool {
        loop {
            if self.status() != TaskState::Pending {
                return false;
            }
            if self.try_execute() {
                return true;
            }
            if !self.consume_retry() {
                return false;
            }
        }
    }

    /// Attempt exactly one run. Leaves the retry budget alone.
    ///
    /// A task that already completed is not run again.
    pub fn try_execute(&self) -> bool {
        let mut func = {
            let mut inner = self.inner.lock();
            if inner.state != TaskState::Pending {
                return false;
            }
            match inner.func.take() {
                Some(func) => func,
                // another thread is running it
                None => return false,
            }
        };

        let result = catch_panic(|| func.invoke());

        let mut inner = self.inner.lock();
        match result {
            Ok(value) => {
                inner.promise.resolve(value);
                inner.state = TaskState::Completed;
                inner.last_error = None;
                true
            }
            Err(info) => {
                inner.func = Some(func);
                inner.last_error = Some(info.message);
                false
            }
        }
    }

    /// Retrieve the result of a completed task. Works once.
    pub fn get_future(&self) -> Result<TaskFuture<AnyValue>> {
        if !self.returns_value {
            return Err(Error::NoResult);
        }

        let mut inner = self.inner.lock();
        match inner.state {
            TaskState::Pending => Err(Error::NotExecuted),
            TaskState::Retrieved => Err(Error::FutureAlreadyRetrieved),
            TaskState::Completed => {
                let rx = inner.future.take().ok_or(Error::FutureAlreadyRetrieved)?;
                inner.state = TaskState::Retrieved;
                Ok(TaskFuture::erased(rx))
            }
        }
    }

    /// Hand out the result handle before the task runs. Used by the pool,
    /// where the submitter waits on the result while a worker executes.
    pub(crate) fn take_future<T: 'static>(&self) -> Option<TaskFuture<T>> {
        self.inner.lock().future.take().map(TaskFuture::new)
    }

    /// Settle the result channel with a terminal failure.
    pub(crate) fn fail(&self, reason: String) {
        self.inner.lock().promise.reject(reason);
    }

    pub fn done(&self) -> bool {
        match self.status() {
            TaskState::Retrieved => true,
            TaskState::Completed => !self.returns_value,
            TaskState::Pending => false,
        }
    }

    pub fn status(&self) -> TaskState {
        self.inner.lock().state
    }

    /// Raw state code: 0 pending, 1 completed, 2 retrieved.
    pub fn status_code(&self) -> u8 {
        self.status() as u8
    }

    /// Panic message of the most recent failed attempt.
    pub fn last_error(&self) -> Option<String> {
        self.inner.lock().last_error.clone()
    }

    pub fn priority(&self) -> u16 {
        self.priority.load(Ordering::Acquire)
    }

    pub fn set_priority(&self, priority: u16) {
        self.priority.store(priority, Ordering::Release);
    }

    pub fn increase_priority(&self, amount: u16) {
        let _ = self
            .priority
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |p| {
                Some(p.saturating_add(amount))
            });
    }

    pub fn decrease_priority(&self, amount: u16) {
        let _ = self
            .priority
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |p| {
                Some(p.saturating_sub(amount))
            });
    }

    pub fn retries(&self) -> u8 {
        self.retries.load(Ordering::Acquire)
    }

    pub fn set_retries(&self, retries: u8) {
        self.retries.store(retries, Ordering::Release);
    }

    pub fn increase_retries(&self, amount: u8) {
        let _ = self
            .retries
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |r| {
                Some(r.saturating_add(amount))
            });
    }

    pub fn decrease_retries(&self, amount: u8) {
        let _ = self
            .retries
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |r| {
                Some(r.saturating_sub(amount))
            });
    }

    /// Take one retry from the budget. False when it was already empty.
    pub(crate) fn consume_retry(&self) -> bool {
        self.retries
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |r| r.checked_sub(1))
            .is_ok()
    }
}

impl Completable for Task {
    fn is_done(&self) -> bool {
        self.done()
    }
}

impl PartialEq for Task {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Task {}

impl PartialOrd for Task {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

/// Higher priority is greater; on equal priority the task that arrived
/// first (lower [`Task::sequence`]) is greater so that a max-heap serves it
/// first. A pool stamps arrival at submission, not at creation.
impl Ord for Task {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.priority()
            .cmp(&other.priority())
            .then_with(|| other.sequence().cmp(&self.sequence()))
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("priority", &self.priority())
            .field("retries", &self.retries())
            .field("state", &self.status())
            .finish()
    }
}
