// worker thread stuff
use super::pool::Shared;
use super::task::Task;
use crate::config::QueueMode;
use parking_lot::MutexGuard;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub type WorkerId = usize;

/// Hands out worker ids in increasing order. Ids are never reused.
#[derive(Debug)]
pub struct IdAllocator {
    next: WorkerId,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    pub fn starting_at(first: WorkerId) -> Self {
        Self { next: first }
    }

    /// `None` once the id space is used up.
    pub fn next(&mut self) -> Option<WorkerId> {
        let id = self.next;
        match id.checked_add(1) {
            Some(next) => {
                self.next = next;
                Some(id)
            }
            None => {
                tracing::warn!(last = id, "worker id space exhausted, refusing to spawn");
                None
            }
        }
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

// main loop
pub(crate) fn run(shared: Arc<Shared>, id: WorkerId, stop: Arc<AtomicBool>) {
    tracing::debug!(worker = id, "worker started");
    let mut state = shared.state.lock();

    loop {
        state.idle.insert(id);
        while !stop.load(Ordering::Acquire) && !state.stopping && state.queue.is_empty() {
            shared.task_available.wait(&mut state);
        }

        if stop.load(Ordering::Acquire) || (state.stopping && state.queue.is_empty()) {
            break;
        }

        let task = match state.queue.pop() {
            Some(task) => task,
            None => continue,
        };
        state.idle.remove(&id);
        state.executing += 1;

        let mode = state.queue.mode();
        let requeue = MutexGuard::unlocked(&mut state, || run_task(&shared, mode, task));

        state.executing -= 1;
        if let Some(task) = requeue {
            state.queue.push(task);
            shared.task_available.notify_one();
        }

        if state.queue.is_empty() && state.executing == 0 {
            shared.all_stopped.notify_all();
        }
    }

    state.idle.remove(&id);
    state.exited.insert(id);
    shared.all_stopped.notify_all();
    tracing::debug!(worker = id, "worker exited");
}

// One attempt, its accounting and, unless the task is handed back for a
// retry, its drop. Runs outside the pool lock so user code, destructors
// included, never runs under it.
fn run_task(shared: &Shared, mode: QueueMode, task: Task) -> Option<Task> {
    let (failed, elapsed) = attempt(task);
    match failed {
        None => {
            shared.metrics.record_completed(elapsed);
            None
        }
        Some(task) => handle_failure(shared, mode, task, elapsed),
    }
}

fn attempt(task: Task) -> (Option<Task>, Duration) {
    let start = Instant::now();
    if task.try_execute() {
        (None, start.elapsed())
    } else {
        (Some(task), start.elapsed())
    }
}

/// Decide what happens to a task whose attempt just failed. Returns the task
/// when it should go back on the queue.
fn handle_failure(
    shared: &Shared,
    mode: QueueMode,
    task: Task,
    elapsed: Duration,
) -> Option<Task> {
    if mode == QueueMode::Priority && task.consume_retry() {
        shared.metrics.record_retried(elapsed);
        tracing::debug!(
            task = task.id().as_u64(),
            retries = task.retries(),
            "task failed, requeueing"
        );
        return Some(task);
    }

    shared.metrics.record_failed(elapsed);
    let reason = task
        .last_error()
        .unwrap_or_else(|| "task failed".to_string());
    tracing::warn!(task = task.id().as_u64(), error = %reason, "task failed for good");
    task.fail(reason);
    None
}
