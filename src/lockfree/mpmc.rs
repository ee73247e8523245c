//! Multi-producer (single- or multi-consumer) async queue.
//!
//! `crossbeam_channel` bounded/unbounded provides the lock-based contention
//! handling; this wraps it with async `enqueue`/`dequeue` that suspend via
//! [`crate::waitqueue`] when the underlying channel reports full/empty,
//! since `crossbeam_channel` itself only offers blocking or non-blocking
//! operations, never a `Future`. Fairness under contention is
//! FIFO-per-producer: a producer that fails its non-blocking attempt parks
//! behind every producer that parked before it and is woken in that order
//! once room frees up.

use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError};

use crate::clock::resolve_timeout;
use crate::error::{Error, Result};
use crate::waitqueue::{park, WaitQueue};

/// An async multi-producer queue backed by `crossbeam_channel`.
pub struct MpmcQueue<T> {
    sender: Sender<T>,
    receiver: Receiver<T>,
    capacity: Option<usize>,
    enqueue_waiters: WaitQueue,
    dequeue_waiters: WaitQueue,
    destroyed: std::sync::atomic::AtomicBool,
}

impl<T> MpmcQueue<T> {
    pub fn bounded(capacity: usize) -> Self {
        let (sender, receiver) = crossbeam_channel::bounded(capacity);
        MpmcQueue {
            sender,
            receiver,
            capacity: Some(capacity),
            enqueue_waiters: WaitQueue::new(),
            dequeue_waiters: WaitQueue::new(),
            destroyed: std::sync::atomic::AtomicBool::new(false),
        }
    }

    pub fn unbounded() -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        MpmcQueue {
            sender,
            receiver,
            capacity: None,
            enqueue_waiters: WaitQueue::new(),
            dequeue_waiters: WaitQueue::new(),
            destroyed: std::sync::atomic::AtomicBool::new(false),
        }
    }

    fn check_alive(&self) -> Result<()> {
        if self.destroyed.load(std::sync::atomic::Ordering::Acquire) {
            Err(Error::invalid_state("queue destroyed"))
        } else {
            Ok(())
        }
    }

    /// Enqueues `value`, suspending while the queue reports full.
    pub async fn enqueue(&self, mut value: T, timeout_ms: i64) -> Result<()> {
        loop {
            self.check_alive()?;
            match self.sender.try_send(value) {
                Ok(()) => {
                    self.dequeue_waiters.dequeue_one();
                    return Ok(());
                }
                Err(TrySendError::Full(v)) => {
                    value = v;
                    let ticket = self.enqueue_waiters.enqueue();
                    let timeout = resolve_timeout(timeout_ms, None);
                    park(&self.enqueue_waiters, ticket, timeout).await?;
                }
                Err(TrySendError::Disconnected(_)) => return Err(Error::invalid_state("queue destroyed")),
            }
        }
    }

    /// Dequeues the next value, suspending while the queue reports empty.
    pub async fn dequeue(&self, timeout_ms: i64) -> Result<T> {
        loop {
            self.check_alive()?;
            match self.receiver.try_recv() {
                Ok(v) => {
                    self.enqueue_waiters.dequeue_one();
                    return Ok(v);
                }
                Err(TryRecvError::Empty) => {
                    let ticket = self.dequeue_waiters.enqueue();
                    let timeout = resolve_timeout(timeout_ms, None);
                    park(&self.dequeue_waiters, ticket, timeout).await?;
                }
                Err(TryRecvError::Disconnected) => return Err(Error::invalid_state("queue destroyed")),
            }
        }
    }

    pub fn try_enqueue(&self, value: T) -> std::result::Result<(), T> {
        match self.sender.try_send(value) {
            Ok(()) => {
                self.dequeue_waiters.dequeue_one();
                Ok(())
            }
            Err(TrySendError::Full(v)) | Err(TrySendError::Disconnected(v)) => Err(v),
        }
    }

    pub fn try_dequeue(&self) -> Option<T> {
        match self.receiver.try_recv() {
            Ok(v) => {
                self.enqueue_waiters.dequeue_one();
                Some(v)
            }
            Err(_) => None,
        }
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    /// Marks the queue destroyed: subsequent enqueue/dequeue calls fail, and
    /// any currently parked caller is woken to observe that failure.
    pub fn destroy(&self) {
        self.destroyed.store(true, std::sync::atomic::Ordering::Release);
        self.enqueue_waiters.drain_all();
        self.dequeue_waiters.drain_all();
    }
}
