use super::builder::TaskBuilder;
use super::future::TaskFuture;
use super::task::Task;
use super::worker::{self, IdAllocator, WorkerId};
use crate::config::{Config, QueueMode};
use crate::error::{Error, Result};
use crate::scheduler::elastic::{ElasticPolicy, LoadSnapshot, ScalingDecision};
use crate::scheduler::queue::TaskQueue;
use crate::telemetry::{MetricsSnapshot, PoolMetrics, PoolStatus};
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

pub(crate) struct WorkerHandle {
    thread: Option<JoinHandle<()>>,
    stop: Arc<AtomicBool>,
}

/// Everything guarded by the pool lock.
pub(crate) struct PoolState {
    pub(crate) workers: BTreeMap<WorkerId, WorkerHandle>,
    pub(crate) idle: BTreeSet<WorkerId>,
    /// Workers that observed a stop signal and are about to return.
    pub(crate) exited: BTreeSet<WorkerId>,
    pub(crate) executing: usize,
    pub(crate) stopping: bool,
    pub(crate) ids: IdAllocator,
    pub(crate) queue: TaskQueue,
}

pub(crate) struct Shared {
    pub(crate) state: Mutex<PoolState>,
    pub(crate) task_available: Condvar,
    /// Signalled when a worker exits and when the pool runs dry.
    pub(crate) all_stopped: Condvar,
    pub(crate) metrics: PoolMetrics,
    config: Config,
}

/// A pool of worker threads fed from one shared queue.
///
/// The queue is FIFO or priority-ordered depending on
/// [`Config::queue_mode`]. With a non-zero [`Config::elastic_tick`] a
/// controller thread resizes the pool between the lower and upper thresholds
/// as load changes.
///
/// Dropping the pool drains it: every queued task runs before the workers
/// are joined.
pub struct ThreadPool {
    shared: Arc<Shared>,
    controller: Option<JoinHandle<()>>,
    lower: usize,
    upper: usize,
    terminated: bool,
}

impl ThreadPool {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let lower = config.lower_threshold();
        let upper = config.upper_threshold();
        let num_threads = config.worker_threads();
        let mode = config.queue_mode;

        let shared = Arc::new(Shared {
            state: Mutex::new(PoolState {
                workers: BTreeMap::new(),
                idle: BTreeSet::new(),
                exited: BTreeSet::new(),
                executing: 0,
                stopping: false,
                ids: IdAllocator::new(),
                queue: TaskQueue::new(mode, 64),
            }),
            task_available: Condvar::new(),
            all_stopped: Condvar::new(),
            metrics: PoolMetrics::new(),
            config,
        });

        // from here on an early return drops the pool, which joins whatever
        // was already spawned
        let mut pool = ThreadPool {
            shared,
            controller: None,
            lower,
            upper,
            terminated: false,
        };

        {
            let mut state = pool.shared.state.lock();
            for _ in 0..num_threads {
                spawn_worker(&pool.shared, &mut state)?;
            }
        }

        let config = &pool.shared.config;
        if config.is_elastic() {
            let shared = pool.shared.clone();
            let tick = config.elastic_tick;
            let policy = ElasticPolicy::from(config);
            let handle = thread::Builder::new()
                .name(format!("{}-elastic", config.thread_name_prefix))
                .spawn(move || control_loop(shared, tick, policy))?;
            pool.controller = Some(handle);
        }

        tracing::info!(
            workers = num_threads,
            lower,
            upper,
            mode = mode.name(),
            elastic = pool.is_elastic(),
            "thread pool started"
        );

        Ok(pool)
    }

    /// Fixed-size FIFO pool of `n` workers, clamped to the hardware thread
    /// count.
    pub fn with_threads(n: usize) -> Result<Self> {
        let config = Config {
            num_threads: Some(n),
            ..Config::default()
        };
        Self::new(config)
    }

    /// Queue `f` and return a handle to its result. Runs at priority 0 with
    /// no retries.
    pub fn submit<F, R>(&self, f: F) -> Result<TaskFuture<R>>
    where
        F: FnMut() -> R + Send + 'static,
        R: Send + 'static,
    {
        let task = Task::new(f);
        let future = task
            .take_future::<R>()
            .ok_or_else(|| Error::executor("result handle already taken"))?;
        self.enqueue(task)?;
        Ok(future)
    }

    /// Fire and forget.
    pub fn execute<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let mut f = Some(f);
        self.enqueue(Task::new(move || {
            if let Some(f) = f.take() {
                f();
            }
        }))
    }

    /// Start building a task. Priority and retries can be set on the
    /// returned builder until it is submitted; with `auto_submit` that
    /// happens right away.
    pub fn queue<F, R>(&self, auto_submit: bool, f: F) -> TaskBuilder<'_, R>
    where
        F: FnMut() -> R + Send + 'static,
        R: Send + 'static,
    {
        TaskBuilder::new(self, Task::new(f), auto_submit)
    }

    pub(crate) fn enqueue(&self, task: Task) -> Result<()> {
        let mut state = self.shared.state.lock();
        if state.stopping {
            return Err(Error::ShuttingDown);
        }
        task.mark_arrival();
        state.queue.push(task);
        self.shared.metrics.record_submitted();
        drop(state);

        self.shared.task_available.notify_one();
        Ok(())
    }

    pub fn active_worker_count(&self) -> usize {
        self.shared.state.lock().workers.len()
    }

    pub fn idle_worker_count(&self) -> usize {
        self.shared.state.lock().idle.len()
    }

    pub fn queued_task_count(&self) -> usize {
        self.shared.state.lock().queue.len()
    }

    pub fn status(&self) -> PoolStatus {
        self.shared.metrics.status()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    pub fn mode(&self) -> QueueMode {
        self.shared.config.queue_mode
    }

    pub fn is_elastic(&self) -> bool {
        self.shared.config.is_elastic()
    }

    pub fn elastic_tick(&self) -> Duration {
        self.shared.config.elastic_tick
    }

    /// `(lower, upper)` bounds on the worker count.
    pub fn thresholds(&self) -> (usize, usize) {
        (self.lower, self.upper)
    }

    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    /// Wait for the queue to drain, then stop and join every thread.
    /// Calling it again is a no-op; later submissions fail with
    /// [`Error::ShuttingDown`].
    pub fn shutdown(&mut self) {
        if self.terminated {
            return;
        }
        self.terminated = true;

        {
            let mut state = self.shared.state.lock();
            while !(state.queue.is_empty() && state.executing == 0) && !state.workers.is_empty() {
                self.shared.all_stopped.wait(&mut state);
            }
            state.stopping = true;
        }
        self.shared.task_available.notify_all();
        self.shared.all_stopped.notify_all();

        if let Some(controller) = self.controller.take() {
            if controller.join().is_err() {
                tracing::warn!("elastic controller panicked");
            }
        }

        let workers = {
            let mut state = self.shared.state.lock();
            while state.exited.len() < state.workers.len() {
                self.shared.all_stopped.wait(&mut state);
            }
            state.exited.clear();
            state.idle.clear();
            std::mem::take(&mut state.workers)
        };

        let count = workers.len();
        for (id, handle) in workers {
            join_worker(id, handle);
        }

        let status = self.shared.metrics.status();
        tracing::info!(
            workers = count,
            completed = status.completed,
            retried = status.retried,
            failed = status.failed,
            "thread pool shut down"
        );
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("ThreadPool")
            .field("mode", &self.shared.config.queue_mode)
            .field("workers", &state.workers.len())
            .field("idle", &state.idle.len())
            .field("queued", &state.queue.len())
            .field("thresholds", &(self.lower, self.upper))
            .finish()
    }
}

fn spawn_worker(shared: &Arc<Shared>, state: &mut PoolState) -> Result<WorkerId> {
    let id = state.ids.next().ok_or(Error::WorkerIdsExhausted)?;
    let stop = Arc::new(AtomicBool::new(false));

    let mut builder =
        thread::Builder::new().name(format!("{}-{}", shared.config.thread_name_prefix, id));
    if let Some(stack_size) = shared.config.stack_size {
        builder = builder.stack_size(stack_size);
    }

    let worker_shared = shared.clone();
    let worker_stop = stop.clone();
    let thread = builder.spawn(move || worker::run(worker_shared, id, worker_stop))?;

    state.workers.insert(
        id,
        WorkerHandle {
            thread: Some(thread),
            stop,
        },
    );
    tracing::debug!(worker = id, "worker spawned");
    Ok(id)
}

fn join_worker(id: WorkerId, mut handle: WorkerHandle) {
    if let Some(thread) = handle.thread.take() {
        if thread.join().is_err() {
            tracing::warn!(worker = id, "worker thread panicked");
        }
    }
}

fn control_loop(shared: Arc<Shared>, tick: Duration, policy: ElasticPolicy) {
    let mut state = shared.state.lock();

    loop {
        let deadline = Instant::now() + tick;
        while !state.stopping {
            if shared.all_stopped.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        if state.stopping {
            break;
        }

        let pruned = state.queue.prune();
        let load = LoadSnapshot {
            workers: state.workers.len(),
            queued_tasks: state.queue.len(),
            idle_worker: state.idle.iter().next().copied(),
        };
        tracing::trace!(
            workers = load.workers,
            queued = load.queued_tasks,
            pruned,
            "elastic tick"
        );

        match policy.decide(&load) {
            ScalingDecision::Hold => {}
            ScalingDecision::Retire(id) => {
                let handle = retire_worker(&shared, &mut state, id);
                if let Some(handle) = handle {
                    MutexGuard::unlocked(&mut state, || join_worker(id, handle));
                }
            }
            ScalingDecision::Grow(count) => {
                for _ in 0..count {
                    if let Err(err) = spawn_worker(&shared, &mut state) {
                        tracing::warn!(error = %err, "failed to grow pool");
                        break;
                    }
                }
            }
        }
    }

    tracing::debug!("elastic controller stopped");
}

// Signal one worker and wait for its acknowledgement. The handle comes back
// so it can be joined after the lock is released.
fn retire_worker(
    shared: &Shared,
    state: &mut MutexGuard<'_, PoolState>,
    id: WorkerId,
) -> Option<WorkerHandle> {
    match state.workers.get(&id) {
        Some(handle) => handle.stop.store(true, Ordering::Release),
        None => return None,
    }
    shared.task_available.notify_all();

    while !state.exited.contains(&id) {
        shared.all_stopped.wait(state);
    }
    state.exited.remove(&id);
    tracing::debug!(worker = id, "worker retired");
    state.workers.remove(&id)
}
