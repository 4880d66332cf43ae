use super::future::TaskFuture;
use super::pool::ThreadPool;
use super::task::Task;
use crate::config::QueueMode;
use crate::error::{Error, Result};
use std::fmt;

/// A task that has not been submitted yet, returned by
/// [`ThreadPool::queue`].
///
/// ```no_run
/// # use heapwell::{Config, QueueMode, ThreadPool};
/// let config = Config::builder().queue_mode(QueueMode::Priority).build().unwrap();
/// let pool = ThreadPool::new(config).unwrap();
///
/// let answer = pool.queue(false, || 6 * 7).priority(5).retries(2).get().unwrap();
/// assert_eq!(answer, 42);
/// ```
///
/// A builder that is never submitted explicitly submits itself when dropped.
/// Priority and retries only matter for priority pools and are ignored once
/// the task has been submitted.
pub struct TaskBuilder<'a, R> {
    pool: &'a ThreadPool,
    task: Option<Task>,
    future: Option<TaskFuture<R>>,
}

impl<'a, R: Send + 'static> TaskBuilder<'a, R> {
    pub(crate) fn new(pool: &'a ThreadPool, task: Task, auto_submit: bool) -> Self {
        let future = task.take_future::<R>();
        let mut builder = Self {
            pool,
            task: Some(task),
            future,
        };

        if auto_submit {
            if let Err(err) = builder.submit() {
                tracing::warn!(error = %err, "auto-submit rejected");
            }
        }

        builder
    }

    pub fn priority(self, priority: u16) -> Self {
        if let Some(task) = self.pending() {
            task.set_priority(priority);
        }
        self
    }

    pub fn retries(self, retries: u8) -> Self {
        if let Some(task) = self.pending() {
            task.set_retries(retries);
        }
        self
    }

    /// Hand the task to the pool. Later calls do nothing.
    pub fn submit(&mut self) -> Result<()> {
        match self.task.take() {
            Some(task) => self.pool.enqueue(task),
            None => Ok(()),
        }
    }

    pub fn is_submitted(&self) -> bool {
        self.task.is_none()
    }

    /// Take the result handle. Works once.
    pub fn get_future(&mut self) -> Result<TaskFuture<R>> {
        self.future.take().ok_or(Error::FutureAlreadyRetrieved)
    }

    /// Submit if needed and block for the result.
    pub fn get(&mut self) -> Result<R> {
        let future = self.get_future()?;
        self.submit()?;
        future.get()
    }

    // the task, while its options still have an effect
    fn pending(&self) -> Option<&Task> {
        match self.pool.mode() {
            QueueMode::Priority => self.task.as_ref(),
            QueueMode::Fifo => None,
        }
    }
}

impl<R> Drop for TaskBuilder<'_, R> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            if let Err(err) = self.pool.enqueue(task) {
                tracing::warn!(error = %err, "dropped task builder could not submit");
            }
        }
    }
}

impl<R> fmt::Debug for TaskBuilder<'_, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskBuilder")
            .field("task", &self.task)
            .field("submitted", &self.task.is_none())
            .field("future_taken", &self.future.is_none())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn priority_pool() -> ThreadPool {
        let config = Config::builder()
            .num_threads(1)
            .queue_mode(QueueMode::Priority)
            .build()
            .unwrap();
        ThreadPool::new(config).unwrap()
    }

    #[test]
    fn test_get_is_single_use() {
        let pool = priority_pool();
        let mut builder = pool.queue(false, || 1 + 1).priority(3);
        assert_eq!(builder.get().unwrap(), 2);
        assert!(matches!(builder.get(), Err(Error::FutureAlreadyRetrieved)));
        assert!(matches!(builder.get_future(), Err(Error::FutureAlreadyRetrieved)));
    }

    #[test]
    fn test_submit_idempotent() {
        let runs = Arc::new(AtomicUsize::new(0));
        let pool = priority_pool();
        let r = runs.clone();
        let mut builder = pool.queue(false, move || {
            r.fetch_add(1, Ordering::SeqCst);
        });
        builder.submit().unwrap();
        builder.submit().unwrap();
        assert!(builder.is_submitted());
        builder.get().unwrap();
        drop(builder);
        drop(pool);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_submits() {
        let runs = Arc::new(AtomicUsize::new(0));
        {
            let pool = priority_pool();
            let r = runs.clone();
            let _ = pool.queue(false, move || {
                r.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_auto_submit_ignores_later_options() {
        let pool = priority_pool();
        let mut builder = pool.queue(true, || 9).priority(100).retries(7);
        assert!(builder.is_submitted());
        assert_eq!(builder.get_future().unwrap().get().unwrap(), 9);
    }

    #[test]
    fn test_options_applied_before_submit() {
        let pool = priority_pool();
        let builder = pool.queue(false, || 0).priority(12).retries(4);
        let task = builder.task.as_ref().unwrap();
        assert_eq!(task.priority(), 12);
        assert_eq!(task.retries(), 4);
    }

    #[test]
    fn test_fifo_ignores_options() {
        let pool = ThreadPool::with_threads(1).unwrap();
        let builder = pool.queue(false, || 0).priority(12).retries(4);
        let task = builder.task.as_ref().unwrap();
        assert_eq!(task.priority(), 0);
        assert_eq!(task.retries(), 0);
    }
}
