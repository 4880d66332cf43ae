//! Single-use result channel between a task and whoever waits on it.

use crate::error::{Error, Result};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::any::Any;
use std::fmt;
use std::time::Duration;

/// Type-erased task result.
pub type AnyValue = Box<dyn Any + Send>;

pub(crate) enum Outcome {
    Value(AnyValue),
    Failed(String),
}

/// Producer half. Resolves at most once.
pub(crate) struct Promise {
    tx: Option<Sender<Outcome>>,
}

impl Promise {
    pub(crate) fn resolve(&mut self, value: AnyValue) -> bool {
        self.send(Outcome::Value(value))
    }

    pub(crate) fn reject(&mut self, reason: String) -> bool {
        self.send(Outcome::Failed(reason))
    }

    #[cfg(test)]
    pub(crate) fn is_settled(&self) -> bool {
        self.tx.is_none()
    }

    fn send(&mut self, outcome: Outcome) -> bool {
        match self.tx.take() {
            // capacity is one and this is the only send, so it never blocks;
            // a dropped receiver just means nobody is waiting
            Some(tx) => {
                let _ = tx.try_send(outcome);
                true
            }
            None => false,
        }
    }
}

pub(crate) fn channel() -> (Promise, Receiver<Outcome>) {
    let (tx, rx) = bounded(1);
    (Promise { tx: Some(tx) }, rx)
}

/// Handle to a task's eventual result.
///
/// Consuming it with [`get`](TaskFuture::get) blocks until the task either
/// produced a value or failed for good. If the task is dropped without ever
/// running, `get` returns [`Error::Disconnected`].
pub struct TaskFuture<T> {
    rx: Receiver<Outcome>,
    convert: fn(AnyValue) -> Result<T>,
}

fn keep_erased(value: AnyValue) -> Result<AnyValue> {
    Ok(value)
}

fn downcast<T: 'static>(value: AnyValue) -> Result<T> {
    value
        .downcast::<T>()
        .map(|boxed| *boxed)
        .map_err(|_| Error::TypeMismatch)
}

impl TaskFuture<AnyValue> {
    pub(crate) fn erased(rx: Receiver<Outcome>) -> Self {
        Self {
            rx,
            convert: keep_erased,
        }
    }

    /// Reinterpret the erased result as `T`. A wrong `T` surfaces as
    /// [`Error::TypeMismatch`] from `get`.
    pub fn typed<T: 'static>(self) -> TaskFuture<T> {
        TaskFuture {
            rx: self.rx,
            convert: downcast::<T>,
        }
    }
}

impl<T: 'static> TaskFuture<T> {
    pub(crate) fn new(rx: Receiver<Outcome>) -> Self {
        Self {
            rx,
            convert: downcast::<T>,
        }
    }

    /// True once the result (or a failure) is available.
    pub fn is_ready(&self) -> bool {
        !self.rx.is_empty()
    }

    /// Block until the task settles.
    pub fn get(self) -> Result<T> {
        match self.rx.recv() {
            Ok(outcome) => self.settle(outcome),
            Err(_) => Err(Error::Disconnected),
        }
    }

    /// Like [`get`](TaskFuture::get) but gives the handle back if nothing
    /// arrived within `timeout`.
    pub fn get_timeout(self, timeout: Duration) -> std::result::Result<Result<T>, Self> {
        match self.rx.recv_timeout(timeout) {
            Ok(outcome) => Ok(self.settle(outcome)),
            Err(RecvTimeoutError::Timeout) => Err(self),
            Err(RecvTimeoutError::Disconnected) => Ok(Err(Error::Disconnected)),
        }
    }

    fn settle(&self, outcome: Outcome) -> Result<T> {
        match outcome {
            Outcome::Value(value) => (self.convert)(value),
            Outcome::Failed(reason) => Err(Error::task_failed(reason)),
        }
    }
}

impl<T> fmt::Debug for TaskFuture<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskFuture")
            .field("ready", &!self.rx.is_empty())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_once() {
        let (mut promise, rx) = channel();
        let future = TaskFuture::<i32>::new(rx);

        assert!(!future.is_ready());
        assert!(promise.resolve(Box::new(7)));
        assert!(!promise.resolve(Box::new(8)));
        assert!(promise.is_settled());
        assert!(future.is_ready());
        assert_eq!(future.get().unwrap(), 7);
    }

    #[test]
    fn test_reject() {
        let (mut promise, rx) = channel();
        let future = TaskFuture::<i32>::new(rx);

        promise.reject("gave up".to_string());
        match future.get() {
            Err(Error::TaskFailed(reason)) => assert_eq!(reason, "gave up"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_dropped_promise_disconnects() {
        let (promise, rx) = channel();
        let future = TaskFuture::<()>::new(rx);
        drop(promise);
        assert!(matches!(future.get(), Err(Error::Disconnected)));
    }

    #[test]
    fn test_typed_mismatch() {
        let (mut promise, rx) = channel();
        promise.resolve(Box::new("text"));
        let future = TaskFuture::erased(rx).typed::<u64>();
        assert!(matches!(future.get(), Err(Error::TypeMismatch)));
    }

    #[test]
    fn test_get_timeout_returns_handle() {
        let (mut promise, rx) = channel();
        let future = TaskFuture::<u8>::new(rx);

        let future = future
            .get_timeout(Duration::from_millis(5))
            .expect_err("nothing sent yet");
        promise.resolve(Box::new(3u8));
        assert_eq!(future.get_timeout(Duration::from_millis(5)).unwrap().unwrap(), 3);
    }
}
