//! Counting semaphore with FIFO admission and partial-satisfaction handling
//! at the head of the queue.
//!
//! Unlike [`crate::sync::mutex::Mutex`] and [`crate::sync::rwmutex::RwMutex`],
//! a semaphore waiter can be blocked on a multi-permit request that a single
//! `release` does not fully satisfy — FIFO order must be preserved even then
//! (a later waiter asking for fewer permits must not jump the queue). This
//! is built on the same
//! [`crate::waitqueue::WaitQueue`] substrate as the other primitives, using
//! its `Ticket<usize>` payload to carry "permits still owed to this waiter"
//! and topping that payload up across successive `release` calls until it
//! reaches zero.

use parking_lot::Mutex as RawMutex;

use crate::clock::resolve_timeout;
use crate::config::LockOptions;
use crate::error::{Error, Result};
use crate::waitqueue::{park, WaitQueue};

struct State {
    available: usize,
}

/// A counting semaphore. Manual acquire/release rather than an RAII permit
/// guard, since a released permit need not be released by the same task
/// that acquired it.
pub struct Semaphore {
    state: RawMutex<State>,
    waiters: WaitQueue<usize>,
    opts: LockOptions,
}

impl Semaphore {
    pub fn new(initial_permits: usize) -> Self {
        Self::with_options(initial_permits, LockOptions::default())
    }

    pub fn with_options(initial_permits: usize, opts: LockOptions) -> Self {
        Semaphore {
            state: RawMutex::new(State { available: initial_permits }),
            waiters: WaitQueue::new(),
            opts,
        }
    }

    /// Acquires `n` permits, suspending in FIFO order until they are all
    /// available. `n == 0` resolves immediately.
    pub async fn acquire(&self, n: usize, timeout_ms: i64) -> Result<()> {
        if n == 0 {
            return Ok(());
        }
        loop {
            let ticket = {
                let mut state = self.state.lock();
                if self.waiters.is_empty() && state.available >= n {
                    state.available -= n;
                    return Ok(());
                }
                self.waiters.enqueue_with(Some(n))
            };
            let timeout = resolve_timeout(timeout_ms, self.default_timeout());
            let result = park(&self.waiters, ticket.clone(), timeout).await;
            if let Err(e) = result {
                // `release` may have already applied some permits to this
                // waiter's payload (reducing "still owed" below `n`) before
                // it gave up; refund whatever was granted but never
                // delivered so the pool's total stays conserved.
                let still_owed = ticket.take_payload().unwrap_or(n);
                let granted = n - still_owed;
                if granted > 0 {
                    self.release(granted)?;
                }
                return Err(e);
            }
            // Only fully-satisfied waiters are dequeued/woken (see `release`),
            // so reaching here means all `n` permits were granted.
            return Ok(());
        }
    }

    /// Acquires `n` permits only if immediately available, without suspending.
    pub fn try_acquire(&self, n: usize) -> bool {
        if n == 0 {
            return true;
        }
        let mut state = self.state.lock();
        if self.waiters.is_empty() && state.available >= n {
            state.available -= n;
            true
        } else {
            false
        }
    }

    /// Returns `n` permits, satisfying queued waiters in FIFO order. A waiter
    /// needing more than is currently available keeps its place at the head
    /// and has its remaining need reduced by whatever was applied; waiters
    /// behind it are left untouched until it is fully satisfied.
    pub fn release(&self, n: usize) -> Result<()> {
        if n == 0 {
            return Ok(());
        }
        let mut state = self.state.lock();
        state.available += n;
        loop {
            let head = match self.waiters.peek_front() {
                Some(h) => h,
                None => break,
            };
            let need = head.take_payload().unwrap_or(0);
            if state.available >= need {
                state.available -= need;
                self.waiters.dequeue_one();
            } else {
                head.set_payload(need - state.available);
                state.available = 0;
                break;
            }
        }
        Ok(())
    }

    pub fn available_permits(&self) -> usize {
        self.state.lock().available
    }

    fn default_timeout(&self) -> Option<std::time::Duration> {
        resolve_timeout(self.opts.timeout_ms, None)
    }
}

impl Default for Semaphore {
    fn default() -> Self {
        Semaphore::new(0)
    }
}

/// `n` must be representable without overflow when added to the current
/// permit count; overflow is reported as a caller error.
pub fn validate_release_count(n: usize, current: usize) -> Result<()> {
    current
        .checked_add(n)
        .map(|_| ())
        .ok_or_else(|| Error::invalid_state("semaphore release would overflow permit count"))
}
