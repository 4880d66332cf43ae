use parking_lot::{Mutex, MutexGuard};
use std::cmp::Ordering as CmpOrdering;
use std::fmt;

/// Ordering relation for a [`PriorityQueue`]. The element comparing
/// greatest is served first.
pub trait Comparator<T> {
    fn compare(&self, a: &T, b: &T) -> CmpOrdering;
}

/// `Ord` order: the largest element is the head.
#[derive(Debug, Clone, Copy, Default)]
pub struct NaturalOrder;

impl<T: Ord> Comparator<T> for NaturalOrder {
    fn compare(&self, a: &T, b: &T) -> CmpOrdering {
        a.cmp(b)
    }
}

/// Inverted `Ord` order: the smallest element is the head.
#[derive(Debug, Clone, Copy, Default)]
pub struct Reversed;

impl<T: Ord> Comparator<T> for Reversed {
    fn compare(&self, a: &T, b: &T) -> CmpOrdering {
        b.cmp(a)
    }
}

/// Comparator built from a closure.
#[derive(Clone, Copy)]
pub struct OrderBy<F>(pub F);

impl<T, F> Comparator<T> for OrderBy<F>
where
    F: Fn(&T, &T) -> CmpOrdering,
{
    fn compare(&self, a: &T, b: &T) -> CmpOrdering {
        (self.0)(a, b)
    }
}

impl<F> fmt::Debug for OrderBy<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("OrderBy(..)")
    }
}

/// Elements that can report they no longer need to run. Enables
/// [`PriorityQueue::remove_finished`].
pub trait Completable {
    fn is_done(&self) -> bool;
}

struct Heap<T, C> {
    data: Vec<T>,
    cmp: C,
}

impl<T, C: Comparator<T>> Heap<T, C> {
    fn less(&self, i: usize, j: usize) -> bool {
        self.cmp.compare(&self.data[i], &self.data[j]) == CmpOrdering::Less
    }

    fn sift_up(&mut self, mut i: usize) {
        while i > 0 {
            let parent = (i - 1) / 2;
            if !self.less(parent, i) {
                break;
            }
            self.data.swap(parent, i);
            i = parent;
        }
    }

    fn sift_down(&mut self, mut i: usize) {
        let len = self.data.len();
        loop {
            let left = 2 * i + 1;
            if left >= len {
                break;
            }
            let right = left + 1;
            let mut child = left;
            if right < len && self.less(left, right) {
                child = right;
            }
            if !self.less(i, child) {
                break;
            }
            self.data.swap(i, child);
            i = child;
        }
    }

    fn push(&mut self, value: T) {
        self.data.push(value);
        let last = self.data.len() - 1;
        self.sift_up(last);
    }

    fn pop(&mut self) -> Option<T> {
        if self.data.is_empty() {
            return None;
        }
        let last = self.data.len() - 1;
        self.data.swap(0, last);
        let top = self.data.pop();
        if !self.data.is_empty() {
            self.sift_down(0);
        }
        top
    }

    fn rebuild(&mut self) {
        for i in (0..self.data.len() / 2).rev() {
            self.sift_down(i);
        }
    }

    #[cfg(test)]
    fn is_heap(&self) -> bool {
        (1..self.data.len()).all(|i| !self.less((i - 1) / 2, i))
    }
}

/// Thread-safe binary heap with a pluggable ordering.
///
/// Every method takes the internal lock for its whole duration, so each call
/// is atomic with respect to the others. None of them are reentrant: do not
/// call back into the queue from a comparator or predicate.
pub struct PriorityQueue<T, C = NaturalOrder> {
    heap: Mutex<Heap<T, C>>,
}

impl<T: Ord> PriorityQueue<T, NaturalOrder> {
    pub fn new() -> Self {
        Self::with_comparator(NaturalOrder)
    }
}

impl<T, F> PriorityQueue<T, OrderBy<F>>
where
    F: Fn(&T, &T) -> CmpOrdering,
{
    pub fn by(compare: F) -> Self {
        Self::with_comparator(OrderBy(compare))
    }
}

impl<T, C: Comparator<T>> PriorityQueue<T, C> {
    pub fn with_comparator(cmp: C) -> Self {
        Self {
            heap: Mutex::new(Heap {
                data: Vec::new(),
                cmp,
            }),
        }
    }

    pub fn push(&self, value: T) {
        self.heap.lock().push(value);
    }

    /// Build the element in place from anything convertible into it.
    pub fn emplace<A: Into<T>>(&self, args: A) {
        self.heap.lock().push(args.into());
    }

    pub fn extend<I: IntoIterator<Item = T>>(&self, values: I) {
        let mut heap = self.heap.lock();
        heap.data.extend(values);
        heap.rebuild();
    }

    /// Copy of the head element.
    pub fn top(&self) -> Option<T>
    where
        T: Clone,
    {
        self.heap.lock().data.first().cloned()
    }

    /// Inspect the head element without copying it.
    ///
    /// Elements with interior mutability (such as [`Task`] priorities) can
    /// have their ordering key changed through the shared reference, either
    /// here or through another handle to the same element. The heap does not
    /// notice; ordering is undefined until [`rebuild`](Self::rebuild) runs.
    ///
    /// [`Task`]: crate::executor::Task
    pub fn peek_with<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        self.heap.lock().data.first().map(f)
    }

    /// Restore heap order after queued elements changed their ordering key
    /// in place.
    pub fn rebuild(&self) {
        self.heap.lock().rebuild();
    }

    /// Drop the head element; no-op when empty.
    pub fn pop(&self) {
        self.heap.lock().pop();
    }

    /// Remove and return the head element in one lock acquisition.
    pub fn pop_top(&self) -> Option<T> {
        self.heap.lock().pop()
    }

    pub fn len(&self) -> usize {
        self.heap.lock().data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.lock().data.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.heap.lock().data.capacity()
    }

    pub fn reserve(&self, additional: usize) {
        self.heap.lock().data.reserve(additional);
    }

    pub fn clear(&self) {
        self.heap.lock().data.clear();
    }

    /// Remove the first element equal to `value`. O(n).
    pub fn remove_item(&self, value: &T) -> bool
    where
        T: PartialEq,
    {
        let mut heap = self.heap.lock();
        match heap.data.iter().position(|v| v == value) {
            Some(index) => {
                heap.data.swap_remove(index);
                heap.rebuild();
                true
            }
            None => false,
        }
    }

    /// Keep only the elements matching `keep`. Returns how many were removed.
    pub fn retain(&self, mut keep: impl FnMut(&T) -> bool) -> usize {
        let mut heap = self.heap.lock();
        let before = heap.data.len();
        heap.data.retain(|v| keep(v));
        let removed = before - heap.data.len();
        if removed > 0 {
            heap.rebuild();
        }
        removed
    }

    /// Remove every element whose work is already done.
    pub fn remove_finished(&self) -> usize
    where
        T: Completable,
    {
        self.retain(|v| !v.is_done())
    }

    /// Empty the queue, returning its elements head first.
    pub fn drain_sorted(&self) -> Vec<T> {
        let mut heap = self.heap.lock();
        let mut out = Vec::with_capacity(heap.data.len());
        while let Some(v) = heap.pop() {
            out.push(v);
        }
        out
    }

    pub fn into_sorted_vec(self) -> Vec<T> {
        self.drain_sorted()
    }

    /// Copy assignment: replace this queue's contents and ordering with a
    /// copy of `other`'s. Both locks are held at once.
    pub fn assign_from(&self, other: &Self)
    where
        T: Clone,
        C: Clone,
    {
        if std::ptr::eq(self, other) {
            return;
        }
        let (mut mine, theirs) = self.lock_both(other);
        mine.data = theirs.data.clone();
        mine.cmp = theirs.cmp.clone();
    }

    /// Move assignment in both directions: exchange contents with `other`.
    pub fn swap(&self, other: &Self) {
        if std::ptr::eq(self, other) {
            return;
        }
        let (mut mine, mut theirs) = self.lock_both(other);
        std::mem::swap(&mut *mine, &mut *theirs);
    }

    /// Lock `self` and `other` in address order so that two threads
    /// assigning the same pair in opposite directions cannot deadlock.
    fn lock_both<'a>(
        &'a self,
        other: &'a Self,
    ) -> (MutexGuard<'a, Heap<T, C>>, MutexGuard<'a, Heap<T, C>>) {
        if (self as *const Self) < (other as *const Self) {
            let mine = self.heap.lock();
            let theirs = other.heap.lock();
            (mine, theirs)
        } else {
            let theirs = other.heap.lock();
            let mine = self.heap.lock();
            (mine, theirs)
        }
    }

    #[cfg(test)]
    pub(crate) fn is_heap(&self) -> bool {
        self.heap.lock().is_heap()
    }
}

impl<T, C: Comparator<T> + Default> Default for PriorityQueue<T, C> {
    fn default() -> Self {
        Self::with_comparator(C::default())
    }
}

impl<T: Clone, C: Clone> Clone for PriorityQueue<T, C> {
    fn clone(&self) -> Self {
        let heap = self.heap.lock();
        Self {
            heap: Mutex::new(Heap {
                data: heap.data.clone(),
                cmp: heap.cmp.clone(),
            }),
        }
    }
}

impl<T, C> fmt::Debug for PriorityQueue<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PriorityQueue")
            .field("len", &self.heap.lock().data.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_construct_empty() {
        let queue: PriorityQueue<i32> = PriorityQueue::new();
        assert!(queue.is_empty());
        assert_eq!(queue.len(), 0);
        assert_eq!(queue.top(), None);
        assert_eq!(queue.pop_top(), None);
        queue.pop();
    }

    #[test]
    fn test_order_elements() {
        let queue = PriorityQueue::new();
        for v in [3, 1, 4, 1, 5, 9, 2, 6] {
            queue.push(v);
        }

        assert_eq!(queue.top(), Some(9));
        queue.pop();
        assert_eq!(queue.pop_top(), Some(6));
        assert_eq!(queue.len(), 6);
        assert_eq!(queue.into_sorted_vec(), vec![5, 4, 3, 2, 1, 1]);
    }

    #[test]
    fn test_emplace() {
        let queue: PriorityQueue<i64> = PriorityQueue::new();
        queue.emplace(7i32);
        queue.emplace(9u8);
        assert_eq!(queue.top(), Some(9));
        assert!(queue.is_heap());
    }

    #[test]
    fn test_remove_item() {
        let queue = PriorityQueue::new();
        queue.extend([10, 20, 30, 20]);

        assert!(queue.remove_item(&20));
        assert_eq!(queue.len(), 3);
        assert!(!queue.remove_item(&99));
        assert!(queue.is_heap());
        assert_eq!(queue.drain_sorted(), vec![30, 20, 10]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_reversed_and_closure_order() {
        let min_queue = PriorityQueue::with_comparator(Reversed);
        min_queue.extend([5, 2, 8]);
        assert_eq!(min_queue.pop_top(), Some(2));

        let by_len = PriorityQueue::by(|a: &String, b: &String| a.len().cmp(&b.len()));
        by_len.push("ab".to_string());
        by_len.push("abcd".to_string());
        by_len.push("a".to_string());
        assert_eq!(by_len.peek_with(|s| s.len()), Some(4));
    }

    #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
    struct Job {
        priority: u8,
        finished: bool,
    }

    impl Completable for Job {
        fn is_done(&self) -> bool {
            self.finished
        }
    }

    #[test]
    fn test_remove_finished() {
        let queue = PriorityQueue::new();
        for i in 0..10u8 {
            queue.push(Job {
                priority: i,
                finished: i % 3 == 0,
            });
        }

        assert_eq!(queue.remove_finished(), 4);
        assert_eq!(queue.len(), 6);
        assert!(queue.is_heap());
        assert_eq!(queue.top().map(|j| j.priority), Some(8));
        assert_eq!(queue.remove_finished(), 0);
    }

    #[test]
    fn test_rebuild_after_priority_change() {
        use crate::executor::Task;

        let queue = PriorityQueue::new();
        for priority in [5u16, 3, 1] {
            queue.push(Task::with_options(move || priority, priority, 0));
        }

        // demote the head in place
        queue.peek_with(|task| task.set_priority(0));
        queue.rebuild();
        assert!(queue.is_heap());

        let order: Vec<u16> = std::iter::from_fn(|| queue.pop_top())
            .map(|task| task.priority())
            .collect();
        assert_eq!(order, vec![3, 1, 0]);
    }

    #[test]
    fn test_heap_invariant_random() {
        let mut rng = rand::thread_rng();
        let queue = PriorityQueue::new();
        let mut reference = Vec::new();

        for _ in 0..2000 {
            match rng.gen_range(0..4) {
                0 | 1 => {
                    let v: u32 = rng.gen_range(0..500);
                    queue.push(v);
                    reference.push(v);
                }
                2 => {
                    let expected = reference.iter().copied().max();
                    if let Some(max) = expected {
                        let pos = reference.iter().position(|&v| v == max).unwrap();
                        reference.swap_remove(pos);
                    }
                    assert_eq!(queue.pop_top(), expected);
                }
                _ => {
                    if let Some(max) = reference.iter().copied().max() {
                        let pos = reference.iter().position(|&v| v == max).unwrap();
                        reference.swap_remove(pos);
                    }
                    queue.pop();
                }
            }
            assert_eq!(queue.len(), reference.len());
        }
        assert!(queue.is_heap());
    }

    #[test]
    fn test_concurrent_pop_top_no_duplicates() {
        let queue = Arc::new(PriorityQueue::new());
        queue.reserve(4000);
        assert!(queue.capacity() >= 4000);

        let producers: Vec<_> = (0..4)
            .map(|t| {
                let queue = queue.clone();
                thread::spawn(move || {
                    for i in 0..1000 {
                        queue.push(t * 1000 + i);
                    }
                })
            })
            .collect();
        for p in producers {
            p.join().unwrap();
        }
        assert_eq!(queue.len(), 4000);

        let consumers: Vec<_> = (0..4)
            .map(|_| {
                let queue = queue.clone();
                thread::spawn(move || {
                    let mut seen = Vec::new();
                    while let Some(v) = queue.pop_top() {
                        seen.push(v);
                    }
                    seen
                })
            })
            .collect();

        let mut all = HashSet::new();
        for c in consumers {
            for v in c.join().unwrap() {
                assert!(all.insert(v), "value {} popped twice", v);
            }
        }
        assert_eq!(all.len(), 4000);
    }

    #[test]
    fn test_clone_is_deep() {
        let queue = PriorityQueue::new();
        queue.extend([1, 2, 3]);
        let copy = queue.clone();
        queue.clear();
        assert_eq!(copy.len(), 3);
        assert_eq!(copy.top(), Some(3));
    }

    #[test]
    fn test_assign_and_swap() {
        let a = PriorityQueue::new();
        let b = PriorityQueue::new();
        a.extend([1, 2]);
        b.extend([7, 8, 9]);

        a.assign_from(&b);
        assert_eq!(a.len(), 3);
        assert_eq!(b.len(), 3);

        a.assign_from(&a);
        assert_eq!(a.len(), 3);

        let c = PriorityQueue::new();
        c.push(100);
        a.swap(&c);
        assert_eq!(a.top(), Some(100));
        assert_eq!(c.top(), Some(9));
        c.swap(&c);
        assert_eq!(c.len(), 3);
    }

    #[test]
    fn test_opposite_assignments_do_not_deadlock() {
        let a = Arc::new(PriorityQueue::new());
        let b = Arc::new(PriorityQueue::new());
        a.extend(0..100);
        b.extend(100..200);

        let (a1, b1) = (a.clone(), b.clone());
        let t1 = thread::spawn(move || {
            for _ in 0..500 {
                a1.swap(&b1);
            }
        });
        let (a2, b2) = (a.clone(), b.clone());
        let t2 = thread::spawn(move || {
            for _ in 0..500 {
                b2.swap(&a2);
            }
        });
        t1.join().unwrap();
        t2.join().unwrap();

        assert_eq!(a.len() + b.len(), 200);
    }
}
