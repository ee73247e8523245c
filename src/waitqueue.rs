//! FIFO wait-queue substrate shared by every suspending primitive in this
//! crate (mutex, rwmutex, semaphore, once, wait group, cond, channel).
//!
//! A `parking_lot::Mutex`-guarded `VecDeque` generalized into a reusable
//! waiter list with Drop-based cleanup, so that a waiter's timeout/cancel
//! handle is cleared on any removal path falls out of ordinary Rust
//! `Future`/`Drop` semantics instead of needing a manual timer handle per
//! waiter.
//!
//! A primitive's own state (locked flag, permit count, buffer, …) is never
//! stored here — `WaitQueue<P>` only ever holds the FIFO order and an
//! optional payload `P` per waiter (e.g. the value a channel send-waiter is
//! offering). Callers enqueue a [`Ticket`] while holding their own state
//! lock, then `.await` it outside that lock.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::time::Duration;

use crate::error::{Error, Result};

static NEXT_WAITER_ID: AtomicU64 = AtomicU64::new(1);

struct Slot<P> {
    id: u64,
    woken: AtomicBool,
    waker: Mutex<Option<Waker>>,
    payload: Mutex<Option<P>>,
}

/// A waiter's place in a [`WaitQueue`]. Cheap to clone (an `Arc` handle);
/// dropping every clone without the waiter having been woken removes it from
/// its queue (see [`WaitFuture`]'s `Drop` impl) and the associated `Waker`
/// with it — this is how timeouts and cancellations "clear the waiter's
/// timeout handle on any exit path" without a separate handle to track.
pub struct Ticket<P = ()> {
    slot: Arc<Slot<P>>,
}

impl<P> Clone for Ticket<P> {
    fn clone(&self) -> Self {
        Ticket { slot: self.slot.clone() }
    }
}

impl<P> Ticket<P> {
    fn new(payload: Option<P>) -> Self {
        Ticket {
            slot: Arc::new(Slot {
                id: NEXT_WAITER_ID.fetch_add(1, Ordering::Relaxed),
                woken: AtomicBool::new(false),
                waker: Mutex::new(None),
                payload: Mutex::new(payload),
            }),
        }
    }

    /// Stable identity used for FIFO removal; two tickets from different
    /// `enqueue` calls never compare equal.
    pub fn id(&self) -> u64 {
        self.slot.id
    }

    pub fn is_woken(&self) -> bool {
        self.slot.woken.load(Ordering::Acquire)
    }

    /// Replace this waiter's payload (e.g. a semaphore topping up a request
    /// count, or a channel handing a value directly to a receive-waiter).
    pub fn set_payload(&self, payload: P) {
        *self.slot.payload.lock() = Some(payload);
    }

    /// Take the payload, if any was ever set.
    pub fn take_payload(&self) -> Option<P> {
        self.slot.payload.lock().take()
    }

    fn wake(&self) {
        self.slot.woken.store(true, Ordering::Release);
        if let Some(waker) = self.slot.waker.lock().take() {
            waker.wake();
        }
    }
}

/// Strict FIFO list of suspended waiters.
pub struct WaitQueue<P = ()> {
    waiters: Mutex<VecDeque<Ticket<P>>>,
}

impl<P> Default for WaitQueue<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> WaitQueue<P> {
    pub fn new() -> Self {
        WaitQueue { waiters: Mutex::new(VecDeque::new()) }
    }

    /// Append a new waiter to the tail of the queue. Call while holding the
    /// primitive's own state lock, then `.await` the returned ticket with
    /// [`park`] outside that lock.
    pub fn enqueue(&self) -> Ticket<P> {
        self.enqueue_with(None)
    }

    pub fn enqueue_with(&self, payload: Option<P>) -> Ticket<P> {
        let ticket = Ticket::new(payload);
        self.waiters.lock().push_back(ticket.clone());
        ticket
    }

    /// Pop and wake the head waiter, if any. Returns the woken ticket so the
    /// caller can inspect/consume its payload (e.g. a semaphore reading how
    /// many permits the head waiter still needs).
    pub fn dequeue_one(&self) -> Option<Ticket<P>> {
        let ticket = self.waiters.lock().pop_front()?;
        ticket.wake();
        Some(ticket)
    }

    /// Peek the head waiter without removing it from the queue (used by
    /// semaphore release, which may need to leave a partially-satisfied
    /// waiter at the head).
    pub fn peek_front(&self) -> Option<Ticket<P>> {
        self.waiters.lock().front().cloned()
    }

    pub fn pop_front(&self) -> Option<Ticket<P>> {
        self.waiters.lock().pop_front()
    }

    /// Wake and remove every waiter, atomically with respect to new
    /// enqueues: the wake set equals the queue's contents at the instant
    /// this is called.
    pub fn drain_all(&self) -> Vec<Ticket<P>> {
        let drained: Vec<_> = self.waiters.lock().drain(..).collect();
        for ticket in &drained {
            ticket.wake();
        }
        drained
    }

    /// Remove a specific waiter (timeout/cancellation path). No-op if it was
    /// already dequeued by a signal.
    pub fn remove(&self, ticket: &Ticket<P>) -> bool {
        let mut waiters = self.waiters.lock();
        if let Some(pos) = waiters.iter().position(|t| t.id() == ticket.id()) {
            waiters.remove(pos);
            true
        } else {
            false
        }
    }

    pub fn len(&self) -> usize {
        self.waiters.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiters.lock().is_empty()
    }
}

/// Awaits a ticket being woken, removing it from `queue` if dropped before
/// that happens (timeout elapse, `select!` losing branch, task cancellation).
struct WaitFuture<'a, P> {
    queue: &'a WaitQueue<P>,
    ticket: Option<Ticket<P>>,
}

impl<'a, P> Future for WaitFuture<'a, P> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        let ticket = this.ticket.as_ref().expect("WaitFuture polled after completion");
        if ticket.is_woken() {
            this.ticket = None;
            return Poll::Ready(());
        }
        *ticket.slot.waker.lock() = Some(cx.waker().clone());
        // Re-check after registering the waker to close the lost-wakeup race
        // against a `dequeue_one`/`drain_all` that ran between our first
        // check and the registration above.
        if ticket.is_woken() {
            this.ticket = None;
            return Poll::Ready(());
        }
        Poll::Pending
    }
}

impl<'a, P> Drop for WaitFuture<'a, P> {
    fn drop(&mut self) {
        if let Some(ticket) = self.ticket.take() {
            if !ticket.is_woken() {
                self.queue.remove(&ticket);
            }
        }
    }
}

/// Suspends the caller until `ticket` is woken, or `timeout` elapses.
///
/// On timeout the ticket is removed from `queue` before returning
/// `Err(Error::Timeout)` — this is the "clear the waiter on any exit path"
/// behavior, driven entirely by `WaitFuture::drop`.
pub async fn park<P>(queue: &WaitQueue<P>, ticket: Ticket<P>, timeout: Option<Duration>) -> Result<()> {
    let fut = WaitFuture { queue, ticket: Some(ticket) };
    match timeout {
        None => {
            fut.await;
            Ok(())
        }
        Some(d) => tokio::time::timeout(d, fut).await.map_err(|_| Error::Timeout(d)),
    }
}
