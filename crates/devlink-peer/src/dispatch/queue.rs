use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Dispatch priority; earlier variants are served first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Priority {
    VeryHigh,
    High,
    #[default]
    Medium,
    Low,
}

struct Entry<T> {
    priority: Priority,
    seq: u64,
    item: T,
}

impl<T> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl<T> Eq for Entry<T> {}

impl<T> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Entry<T> {
    // BinaryHeap pops the greatest entry, so lower (priority, seq) compares greater.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct Inner<T> {
    heap: BinaryHeap<Entry<T>>,
    next_seq: u64,
}

/// Thread-safe queue ordered by `(priority, insertion order)`.
pub struct PriorityQueue<T> {
    inner: Mutex<Inner<T>>,
    available: Condvar,
}

impl<T> PriorityQueue<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                heap: BinaryHeap::new(),
                next_seq: 0,
            }),
            available: Condvar::new(),
        }
    }

    pub fn push(&self, item: T, priority: Priority) {
        let mut inner = self.lock();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.heap.push(Entry {
            priority,
            seq,
            item,
        });
        drop(inner);
        self.available.notify_one();
    }

    /// Pop the first item without waiting.
    pub fn try_pop(&self) -> Option<(Priority, T)> {
        self.lock()
            .heap
            .pop()
            .map(|entry| (entry.priority, entry.item))
    }

    /// Pop the first item, waiting up to `timeout` for one to arrive.
    ///
    /// Returns early with `None` when woken by [`notify_all`](Self::notify_all)
    /// on an empty queue.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<(Priority, T)> {
        let mut inner = self.lock();
        if inner.heap.is_empty() {
            inner = self
                .available
                .wait_timeout(inner, timeout)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        inner.heap.pop().map(|entry| (entry.priority, entry.item))
    }

    pub fn len(&self) -> usize {
        self.lock().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().heap.is_empty()
    }

    /// Drop every queued item, returning how many were dropped.
    pub fn clear(&self) -> usize {
        let mut inner = self.lock();
        let dropped = inner.heap.len();
        inner.heap.clear();
        dropped
    }

    /// Wake every waiter in [`pop_timeout`](Self::pop_timeout).
    pub fn notify_all(&self) {
        self.available.notify_all();
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> Default for PriorityQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Instant;

    use super::*;

    fn drain(queue: &PriorityQueue<u32>) -> Vec<u32> {
        std::iter::from_fn(|| queue.try_pop().map(|(_, item)| item)).collect()
    }

    #[test]
    fn test_priority_order_then_fifo() {
        let queue = PriorityQueue::new();
        queue.push(1, Priority::Low);
        queue.push(2, Priority::Medium);
        queue.push(3, Priority::VeryHigh);
        queue.push(4, Priority::Medium);
        queue.push(5, Priority::High);
        queue.push(6, Priority::VeryHigh);

        assert_eq!(drain(&queue), vec![3, 6, 5, 2, 4, 1]);
    }

    #[test]
    fn test_fifo_survives_many_equal_priorities() {
        let queue = PriorityQueue::new();
        for i in 0..100 {
            queue.push(i, Priority::High);
        }
        assert_eq!(drain(&queue), (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_pop_timeout_on_empty_queue() {
        let queue: PriorityQueue<u32> = PriorityQueue::new();
        let started = Instant::now();
        assert!(queue.pop_timeout(Duration::from_millis(20)).is_none());
        assert!(started.elapsed() >= Duration::from_millis(15));
    }

    #[test]
    fn test_pop_timeout_wakes_on_push() {
        let queue = Arc::new(PriorityQueue::new());
        let producer = {
            let queue = Arc::clone(&queue);
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                queue.push(7u32, Priority::Low);
            })
        };

        let popped = queue.pop_timeout(Duration::from_secs(5));
        producer.join().unwrap();
        assert_eq!(popped, Some((Priority::Low, 7)));
    }

    #[test]
    fn test_len_and_clear() {
        let queue = PriorityQueue::new();
        assert!(queue.is_empty());
        queue.push("a", Priority::Medium);
        queue.push("b", Priority::Medium);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.clear(), 2);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_default_priority_is_medium() {
        assert_eq!(Priority::default(), Priority::Medium);
        assert!(Priority::VeryHigh < Priority::Low);
    }
}
