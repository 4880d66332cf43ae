use super::priority::PriorityQueue;
use crate::config::QueueMode;
use crate::executor::Task;
use std::collections::VecDeque;

/// The pool's task container. Which variant is used is decided once, from
/// [`QueueMode`], when the pool is built.
#[derive(Debug)]
pub(crate) enum TaskQueue {
    Fifo(VecDeque<Task>),
    Priority(PriorityQueue<Task>),
}

impl TaskQueue {
    pub(crate) fn new(mode: QueueMode, capacity: usize) -> Self {
        match mode {
            QueueMode::Fifo => TaskQueue::Fifo(VecDeque::with_capacity(capacity)),
            QueueMode::Priority => {
                let queue = PriorityQueue::new();
                queue.reserve(capacity);
                TaskQueue::Priority(queue)
            }
        }
    }

    pub(crate) fn mode(&self) -> QueueMode {
        match self {
            TaskQueue::Fifo(_) => QueueMode::Fifo,
            TaskQueue::Priority(_) => QueueMode::Priority,
        }
    }

    pub(crate) fn push(&mut self, task: Task) {
        match self {
            TaskQueue::Fifo(deque) => deque.push_back(task),
            TaskQueue::Priority(heap) => heap.push(task),
        }
    }

    pub(crate) fn pop(&mut self) -> Option<Task> {
        match self {
            TaskQueue::Fifo(deque) => deque.pop_front(),
            TaskQueue::Priority(heap) => heap.pop_top(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        match self {
            TaskQueue::Fifo(deque) => deque.len(),
            TaskQueue::Priority(heap) => heap.len(),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop tasks that no longer need to run.
    pub(crate) fn prune(&mut self) -> usize {
        match self {
            TaskQueue::Fifo(deque) => {
                let before = deque.len();
                deque.retain(|task| !task.done());
                before - deque.len()
            }
            TaskQueue::Priority(heap) => heap.remove_finished(),
        }
    }
}
