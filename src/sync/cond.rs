//! Condition variable paired with a [`crate::sync::mutex::Mutex`] guard.
//!
//! The classic release-then-enqueue-then-reacquire dance, built on
//! [`crate::waitqueue::WaitQueue`]: the ticket is
//! enqueued *while the caller still holds the guard*, so a concurrent
//! `signal`/`broadcast` cannot run (it would need to observe the changed
//! predicate under the same mutex first) between "we decided to wait" and
//! "we actually stopped holding the lock" — the lost-wakeup window the
//! pattern exists to close.

use crate::clock::resolve_timeout;
use crate::config::LockOptions;
use crate::error::Result;
use crate::sync::mutex::{Mutex, MutexGuard};
use crate::waitqueue::{park, WaitQueue};

/// A condition variable. Always used together with a [`Mutex`] guarding the
/// predicate being waited on.
pub struct Cond {
    waiters: WaitQueue,
    opts: LockOptions,
}

impl Cond {
    pub fn new() -> Self {
        Self::with_options(LockOptions::default())
    }

    pub fn with_options(opts: LockOptions) -> Self {
        Cond { waiters: WaitQueue::new(), opts }
    }

    /// Atomically releases `guard`'s mutex and suspends the caller; on
    /// signal/broadcast or on timeout, re-acquires the same mutex before
    /// returning — the locker is always held again by the time this
    /// resolves, matching the usual condition-variable contract, even on the
    /// `Err(Timeout)` path (there is no guard to hand back through an `Err`,
    /// so the reacquired lock is released again immediately rather than
    /// leaked). The caller must re-check its predicate after this returns
    /// (spurious-wake-safe usage). `timeout_ms` overrides this `Cond`'s
    /// configured default for this call only; see [`crate::clock`] for
    /// sentinel values.
    pub async fn wait<'a, T>(&self, guard: MutexGuard<'a, T>, timeout_ms: i64) -> Result<MutexGuard<'a, T>> {
        let mutex: &'a Mutex<T> = guard.mutex();
        let ticket = self.waiters.enqueue();
        drop(guard);
        let timeout = resolve_timeout(timeout_ms, self.default_timeout());
        match park(&self.waiters, ticket, timeout).await {
            Ok(()) => mutex.lock(-1).await,
            Err(e) => {
                let reacquired = mutex.lock(-1).await?;
                drop(reacquired);
                Err(e)
            }
        }
    }

    fn default_timeout(&self) -> Option<std::time::Duration> {
        resolve_timeout(self.opts.timeout_ms, None)
    }

    /// Wakes at most one waiter, in FIFO order.
    pub fn signal(&self) {
        self.waiters.dequeue_one();
    }

    /// Wakes every currently parked waiter.
    pub fn broadcast(&self) {
        self.waiters.drain_all();
    }

    pub fn waiter_count(&self) -> usize {
        self.waiters.len()
    }
}

impl Default for Cond {
    fn default() -> Self {
        Cond::new()
    }
}
