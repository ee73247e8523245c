//! Single-producer/single-consumer ring buffer.
//!
//! [`SpscQueue<T>`] is `crossbeam_queue::ArrayQueue<T>` — already a
//! wait-free ring with atomic head/tail cursors, so no bespoke atomics are
//! needed for the in-process, typed case. [`SharedByteRing`] is a
//! byte-oriented variant optionally backed by shared memory for
//! cross-thread use: its cursors are plain `AtomicUsize` (in a single Rust
//! process these are already as cross-thread-safe as a shared-memory atomic
//! cell would be) and its storage is a [`crate::sharedmem::SharedRegion`] of
//! fixed-size slots, so raw bytes can be addressed by the region's name the
//! way a worker looks up other shared buffers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_queue::ArrayQueue;

use crate::error::{Error, Result};
use crate::sharedmem::SharedRegion;

/// A fixed-capacity, wait-free single-producer/single-consumer queue.
pub struct SpscQueue<T> {
    inner: ArrayQueue<T>,
}

impl<T> SpscQueue<T> {
    pub fn new(capacity: usize) -> Self {
        SpscQueue { inner: ArrayQueue::new(capacity.max(1)) }
    }

    /// Enqueues `value`. Returns it back if the ring is full.
    pub fn enqueue(&self, value: T) -> std::result::Result<(), T> {
        self.inner.push(value)
    }

    /// Dequeues the oldest value, or `None` if the ring is empty.
    pub fn dequeue(&self) -> Option<T> {
        self.inner.pop()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.inner.is_full()
    }

    /// Drains any remaining entries. A `SpscQueue` holds no external
    /// resources beyond its own storage, so this simply empties it.
    pub fn destroy(&self) {
        while self.inner.pop().is_some() {}
    }
}

/// Byte-oriented SPSC ring backed by a [`SharedRegion`]: `capacity` fixed-size
/// `slot_size`-byte slots, addressed by two `AtomicUsize` cursors counting
/// mod `2 * capacity` (so `size = (tail - head) mod (2 * capacity)`), so the
/// full/empty ambiguity a naive `% capacity` scheme would have is avoided
/// without needing a separate "is full" flag.
pub struct SharedByteRing {
    region: Arc<SharedRegion>,
    capacity: usize,
    slot_size: usize,
    head: AtomicUsize,
    tail: AtomicUsize,
}

impl SharedByteRing {
    pub fn new(region: Arc<SharedRegion>, capacity: usize, slot_size: usize) -> Result<Self> {
        if region.len() < capacity * slot_size {
            return Err(Error::invalid_state(format!(
                "shared region '{}' is too small for {capacity} slots of {slot_size} bytes",
                region.name()
            )));
        }
        Ok(SharedByteRing { region, capacity, slot_size, head: AtomicUsize::new(0), tail: AtomicUsize::new(0) })
    }

    fn len_raw(&self, head: usize, tail: usize) -> usize {
        (tail + 2 * self.capacity - head) % (2 * self.capacity)
    }

    pub fn len(&self) -> usize {
        self.len_raw(self.head.load(Ordering::Acquire), self.tail.load(Ordering::Acquire))
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() == self.capacity
    }

    /// Enqueues a byte slice no longer than `slot_size`. Returns `false`
    /// (without copying) if the ring is full.
    pub fn enqueue(&self, bytes: &[u8]) -> Result<bool> {
        if bytes.len() > self.slot_size {
            return Err(Error::invalid_state(format!(
                "payload of {} bytes exceeds slot size {}",
                bytes.len(),
                self.slot_size
            )));
        }
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        if self.len_raw(head, tail) == self.capacity {
            return Ok(false);
        }
        let slot = tail % self.capacity;
        self.region.copy_in(slot * self.slot_size, bytes)?;
        // Zero-pad the remainder of the slot so a short write never leaks a
        // previous occupant's trailing bytes to `dequeue`.
        if bytes.len() < self.slot_size {
            let pad = vec![0u8; self.slot_size - bytes.len()];
            self.region.copy_in(slot * self.slot_size + bytes.len(), &pad)?;
        }
        self.tail.store((tail + 1) % (2 * self.capacity), Ordering::Release);
        Ok(true)
    }

    /// Dequeues one slot's worth of bytes (always `slot_size` long), or
    /// `None` if the ring is empty.
    pub fn dequeue(&self) -> Option<Vec<u8>> {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        if self.len_raw(head, tail) == 0 {
            return None;
        }
        let slot = head % self.capacity;
        let bytes = self.region.copy_out(slot * self.slot_size, self.slot_size).ok()?;
        self.head.store((head + 1) % (2 * self.capacity), Ordering::Release);
        Some(bytes)
    }

    pub fn destroy(self) -> Arc<SharedRegion> {
        self.region
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sharedmem::SharedMemoryManager;

    #[test]
    fn fifo_enqueue_dequeue_typed() {
        let q: SpscQueue<u32> = SpscQueue::new(4);
        assert!(q.enqueue(1).is_ok());
        assert!(q.enqueue(2).is_ok());
        assert_eq!(q.dequeue(), Some(1));
        assert_eq!(q.dequeue(), Some(2));
        assert_eq!(q.dequeue(), None);
    }

    #[test]
    fn full_enqueue_returns_value() {
        let q: SpscQueue<u32> = SpscQueue::new(1);
        assert!(q.enqueue(1).is_ok());
        assert_eq!(q.enqueue(2), Err(2));
    }

    #[test]
    fn interleaved_order_preserved() {
        let q: SpscQueue<u32> = SpscQueue::new(8);
        for i in 0..5 {
            q.enqueue(i).unwrap();
        }
        assert_eq!(q.dequeue(), Some(0));
        assert_eq!(q.dequeue(), Some(1));
        q.enqueue(5).unwrap();
        assert_eq!(q.dequeue(), Some(2));
        assert_eq!(q.dequeue(), Some(3));
        assert_eq!(q.dequeue(), Some(4));
        assert_eq!(q.dequeue(), Some(5));
    }

    #[test]
    fn shared_byte_ring_roundtrip() {
        let mgr = SharedMemoryManager::new();
        let region = mgr.create("spsc-bytes", 4 * 8).unwrap();
        let ring = SharedByteRing::new(region, 4, 8).unwrap();
        assert!(ring.enqueue(b"hello").unwrap());
        assert!(ring.is_empty() == false);
        let out = ring.dequeue().unwrap();
        assert_eq!(&out[..5], b"hello");
        assert_eq!(&out[5..], &[0, 0, 0]);
        assert!(ring.is_empty());
    }

    #[test]
    fn shared_byte_ring_respects_capacity() {
        let mgr = SharedMemoryManager::new();
        let region = mgr.create("spsc-bytes-2", 2 * 4).unwrap();
        let ring = SharedByteRing::new(region, 2, 4).unwrap();
        assert!(ring.enqueue(b"ab").unwrap());
        assert!(ring.enqueue(b"cd").unwrap());
        assert!(!ring.enqueue(b"ef").unwrap(), "ring should report full rather than overwrite");
        ring.dequeue();
        assert!(ring.enqueue(b"ef").unwrap());
    }
}
