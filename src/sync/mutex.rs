//! Async mutual-exclusion lock with FIFO, no-thundering-herd handoff.
//!
//! Returns an RAII [`MutexGuard`] from `lock()`/`try_lock()` — unlock
//! happens on `Drop` — rather than a manual `lock()`/`unlock()` pair with
//! holder tracking, which makes "unlock by a non-holder" structurally
//! unrepresentable instead of a runtime-checked error (see DESIGN.md). FIFO
//! ordering and direct hand-off to the head waiter (no thundering herd) are
//! preserved.

use std::cell::UnsafeCell;
use std::ops::{Deref, DerefMut};

use parking_lot::Mutex as RawMutex;

use crate::clock::resolve_timeout;
use crate::config::LockOptions;
use crate::error::Result;
use crate::waitqueue::{park, WaitQueue};

struct State {
    locked: bool,
}

/// An async mutex guarding `T`.
pub struct Mutex<T> {
    state: RawMutex<State>,
    waiters: WaitQueue,
    data: UnsafeCell<T>,
    opts: LockOptions,
}

// SAFETY: access to `data` is only ever granted through a `MutexGuard`,
// which is only handed out while `state.locked` is exclusively held by the
// guard's owner; the `RawMutex` around `State` provides the synchronization.
unsafe impl<T: Send> Send for Mutex<T> {}
unsafe impl<T: Send> Sync for Mutex<T> {}

impl<T> Mutex<T> {
    pub fn new(value: T) -> Self {
        Self::with_options(value, LockOptions::default())
    }

    pub fn with_options(value: T, opts: LockOptions) -> Self {
        Mutex {
            state: RawMutex::new(State { locked: false }),
            waiters: WaitQueue::new(),
            data: UnsafeCell::new(value),
            opts,
        }
    }

    /// Acquires the lock, suspending in FIFO order behind any existing
    /// holder/waiters. `timeout_ms` overrides the mutex's configured default
    /// for this call only; see [`crate::clock`] for sentinel values.
    pub async fn lock(&self, timeout_ms: i64) -> Result<MutexGuard<'_, T>> {
        loop {
            let ticket = {
                let mut state = self.state.lock();
                if !state.locked && self.waiters.is_empty() {
                    state.locked = true;
                    return Ok(MutexGuard { mutex: self });
                }
                self.waiters.enqueue()
            };
            let timeout = resolve_timeout(timeout_ms, self.default_timeout());
            park(&self.waiters, ticket, timeout).await?;
            // Woken means we were handed the lock directly by `unlock`.
            return Ok(MutexGuard { mutex: self });
        }
    }

    /// Non-suspending variant: acquires the lock only if free right now.
    pub fn try_lock(&self) -> Option<MutexGuard<'_, T>> {
        let mut state = self.state.lock();
        if !state.locked && self.waiters.is_empty() {
            state.locked = true;
            Some(MutexGuard { mutex: self })
        } else {
            None
        }
    }

    pub fn is_locked(&self) -> bool {
        self.state.lock().locked
    }

    fn default_timeout(&self) -> Option<std::time::Duration> {
        resolve_timeout(self.opts.timeout_ms, None)
    }

    /// Hands the lock to the next waiter (if any) or marks it free.
    fn unlock(&self) {
        let mut state = self.state.lock();
        if let Some(next) = self.waiters.dequeue_one() {
            // `locked` stays true: the lock is handed off, never released to
            // a "free" state that a concurrent `try_lock` could steal ahead
            // of the FIFO-designated waiter.
            drop(next);
        } else {
            state.locked = false;
        }
    }
}

impl<T: Default> Default for Mutex<T> {
    fn default() -> Self {
        Mutex::new(T::default())
    }
}

/// RAII guard returned by [`Mutex::lock`]/[`Mutex::try_lock`]; unlocks on drop.
pub struct MutexGuard<'a, T> {
    mutex: &'a Mutex<T>,
}

impl<'a, T> MutexGuard<'a, T> {
    /// Exposes the guarded mutex so [`crate::sync::cond::Cond`] can release
    /// and later reacquire it around a wait.
    pub(crate) fn mutex(&self) -> &'a Mutex<T> {
        self.mutex
    }
}

impl<'a, T> Deref for MutexGuard<'a, T> {
    type Target = T;
    fn deref(&self) -> &T {
        // SAFETY: see `Mutex`'s Send/Sync justification above.
        unsafe { &*self.mutex.data.get() }
    }
}

impl<'a, T> DerefMut for MutexGuard<'a, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: see `Mutex`'s Send/Sync justification above.
        unsafe { &mut *self.mutex.data.get() }
    }
}

impl<'a, T> Drop for MutexGuard<'a, T> {
    fn drop(&mut self) {
        self.mutex.unlock();
    }
}
