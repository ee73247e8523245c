//! Binary-heap priority queue, synchronous (non-suspending) API only.
//!
//! `std::collections::BinaryHeap` behind `parking_lot::Mutex`, the same
//! lock-guarded-collection shape as `sync::waitgroup`'s counter. Ties are
//! broken by insertion order
//! (earlier enqueue dequeues first among equal priorities), implemented by
//! packing a monotonically increasing sequence number into the heap's `Ord`
//! so a max-heap naturally prefers the lower sequence number on a tie.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use parking_lot::Mutex as RawMutex;

use crate::error::{Error, Result};

struct Entry<T> {
    priority: i64,
    seq: u64,
    value: T,
}

impl<T> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}
impl<T> Eq for Entry<T> {}

impl<T> Ord for Entry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Higher priority wins; on a tie, the *lower* sequence number (the
        // earlier arrival) must compare greater so `BinaryHeap`'s max-heap
        // pops it first.
        self.priority.cmp(&other.priority).then_with(|| other.seq.cmp(&self.seq))
    }
}

impl<T> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A fixed-capacity priority queue. Higher `priority` values dequeue first;
/// equal priorities dequeue in FIFO (insertion) order.
pub struct PriorityQueue<T> {
    heap: RawMutex<BinaryHeap<Entry<T>>>,
    capacity: usize,
    next_seq: AtomicU64,
}

impl<T> PriorityQueue<T> {
    pub fn new(capacity: usize) -> Self {
        PriorityQueue { heap: RawMutex::new(BinaryHeap::new()), capacity, next_seq: AtomicU64::new(0) }
    }

    /// Non-suspending enqueue; fails with [`Error::InvalidState`] once `capacity` is reached.
    pub fn enqueue_sync(&self, priority: i64, value: T) -> Result<()> {
        let mut heap = self.heap.lock();
        if heap.len() >= self.capacity {
            return Err(Error::invalid_state("priority queue at capacity"));
        }
        let seq = self.next_seq.fetch_add(1, AtomicOrdering::Relaxed);
        heap.push(Entry { priority, seq, value });
        Ok(())
    }

    /// Non-suspending dequeue of the highest-priority (earliest on ties) entry.
    pub fn dequeue_sync(&self) -> Option<T> {
        self.heap.lock().pop().map(|e| e.value)
    }

    pub fn peek_priority(&self) -> Option<i64> {
        self.heap.lock().peek().map(|e| e.priority)
    }

    pub fn len(&self) -> usize {
        self.heap.lock().len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn destroy(&self) {
        self.heap.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn higher_priority_dequeues_first() {
        let q = PriorityQueue::new(8);
        q.enqueue_sync(1, "low").unwrap();
        q.enqueue_sync(10, "high").unwrap();
        q.enqueue_sync(5, "mid").unwrap();
        assert_eq!(q.dequeue_sync(), Some("high"));
        assert_eq!(q.dequeue_sync(), Some("mid"));
        assert_eq!(q.dequeue_sync(), Some("low"));
    }

    #[test]
    fn equal_priority_is_fifo() {
        let q = PriorityQueue::new(8);
        q.enqueue_sync(1, "a").unwrap();
        q.enqueue_sync(1, "b").unwrap();
        q.enqueue_sync(1, "c").unwrap();
        assert_eq!(q.dequeue_sync(), Some("a"));
        assert_eq!(q.dequeue_sync(), Some("b"));
        assert_eq!(q.dequeue_sync(), Some("c"));
    }

    #[test]
    fn capacity_enforced() {
        let q = PriorityQueue::new(1);
        q.enqueue_sync(0, 1).unwrap();
        assert!(q.enqueue_sync(0, 2).is_err());
    }

    #[test]
    fn empty_dequeue_is_none() {
        let q: PriorityQueue<i32> = PriorityQueue::new(2);
        assert_eq!(q.dequeue_sync(), None);
    }
}
