//! Async reader/writer lock with writer preference.
//!
//! Invariant: `writer-held ⇒ readers == 0` and `readers > 0 ⇒
//! ¬writer-held`. Writer preference (a pending writer blocks new readers
//! from joining) is implemented the same way [`crate::sync::mutex::Mutex`]
//! hands off its lock — by checking for queued writers before granting a
//! new reader, not by tracking reader/writer counts with separate bespoke
//! wake logic. Two [`crate::waitqueue::WaitQueue`]s (readers, writers) sit
//! side by side, mirroring the single queue in `mutex.rs` generalized to two
//! wait classes.

use std::cell::UnsafeCell;
use std::ops::{Deref, DerefMut};

use parking_lot::Mutex as RawMutex;

use crate::clock::resolve_timeout;
use crate::config::LockOptions;
use crate::error::Result;
use crate::waitqueue::{park, WaitQueue};

struct State {
    /// Number of readers currently holding the lock.
    readers: usize,
    writer: bool,
}

/// An async reader/writer lock guarding `T`.
pub struct RwMutex<T> {
    state: RawMutex<State>,
    read_waiters: WaitQueue,
    write_waiters: WaitQueue,
    data: UnsafeCell<T>,
    opts: LockOptions,
}

// SAFETY: readers get `&T` only while `state.writer == false`, a writer gets
// `&mut T` only while `state.readers == 0 && state.writer == true`; `state`
// itself is only ever mutated under `RawMutex`.
unsafe impl<T: Send> Send for RwMutex<T> {}
unsafe impl<T: Send + Sync> Sync for RwMutex<T> {}

impl<T> RwMutex<T> {
    pub fn new(value: T) -> Self {
        Self::with_options(value, LockOptions::default())
    }

    pub fn with_options(value: T, opts: LockOptions) -> Self {
        RwMutex {
            state: RawMutex::new(State { readers: 0, writer: false }),
            read_waiters: WaitQueue::new(),
            write_waiters: WaitQueue::new(),
            data: UnsafeCell::new(value),
            opts,
        }
    }

    /// Acquires a shared read lock. Blocks behind any held or queued writer
    /// (writer preference) even if the lock is currently unheld by a writer.
    pub async fn read(&self, timeout_ms: i64) -> Result<RwMutexReadGuard<'_, T>> {
        loop {
            let ticket = {
                let mut state = self.state.lock();
                if !state.writer && self.write_waiters.is_empty() && self.read_waiters.is_empty() {
                    state.readers += 1;
                    return Ok(RwMutexReadGuard { lock: self });
                }
                self.read_waiters.enqueue()
            };
            let timeout = resolve_timeout(timeout_ms, self.default_timeout());
            park(&self.read_waiters, ticket, timeout).await?;
            return Ok(RwMutexReadGuard { lock: self });
        }
    }

    /// Acquires the exclusive write lock.
    pub async fn write(&self, timeout_ms: i64) -> Result<RwMutexWriteGuard<'_, T>> {
        loop {
            let ticket = {
                let mut state = self.state.lock();
                if !state.writer && state.readers == 0 && self.write_waiters.is_empty() {
                    state.writer = true;
                    return Ok(RwMutexWriteGuard { lock: self });
                }
                self.write_waiters.enqueue()
            };
            let timeout = resolve_timeout(timeout_ms, self.default_timeout());
            park(&self.write_waiters, ticket, timeout).await?;
            return Ok(RwMutexWriteGuard { lock: self });
        }
    }

    pub fn try_read(&self) -> Option<RwMutexReadGuard<'_, T>> {
        let mut state = self.state.lock();
        if !state.writer && self.write_waiters.is_empty() && self.read_waiters.is_empty() {
            state.readers += 1;
            Some(RwMutexReadGuard { lock: self })
        } else {
            None
        }
    }

    pub fn try_write(&self) -> Option<RwMutexWriteGuard<'_, T>> {
        let mut state = self.state.lock();
        if !state.writer && state.readers == 0 && self.write_waiters.is_empty() {
            state.writer = true;
            Some(RwMutexWriteGuard { lock: self })
        } else {
            None
        }
    }

    fn default_timeout(&self) -> Option<std::time::Duration> {
        resolve_timeout(self.opts.timeout_ms, None)
    }

    /// Called when a read guard drops. If this was the last reader and a
    /// writer is queued, hands the lock straight to it.
    fn unlock_read(&self) {
        let mut state = self.state.lock();
        state.readers -= 1;
        if state.readers == 0 {
            if let Some(_writer) = self.write_waiters.dequeue_one() {
                state.writer = true;
            }
        }
    }

    /// Called when the write guard drops. Prefers waking queued writers over
    /// readers, matching the acquisition-side preference.
    fn unlock_write(&self) {
        let mut state = self.state.lock();
        if let Some(_writer) = self.write_waiters.dequeue_one() {
            // state.writer stays true: handed straight to the next writer.
            return;
        }
        state.writer = false;
        let woken = self.read_waiters.drain_all();
        state.readers += woken.len();
    }
}

impl<T: Default> Default for RwMutex<T> {
    fn default() -> Self {
        RwMutex::new(T::default())
    }
}

/// RAII shared-read guard returned by [`RwMutex::read`]/[`RwMutex::try_read`].
pub struct RwMutexReadGuard<'a, T> {
    lock: &'a RwMutex<T>,
}

impl<'a, T> Deref for RwMutexReadGuard<'a, T> {
    type Target = T;
    fn deref(&self) -> &T {
        // SAFETY: see `RwMutex`'s Send/Sync justification above.
        unsafe { &*self.lock.data.get() }
    }
}

impl<'a, T> Drop for RwMutexReadGuard<'a, T> {
    fn drop(&mut self) {
        self.lock.unlock_read();
    }
}

/// RAII exclusive-write guard returned by [`RwMutex::write`]/[`RwMutex::try_write`].
pub struct RwMutexWriteGuard<'a, T> {
    lock: &'a RwMutex<T>,
}

impl<'a, T> Deref for RwMutexWriteGuard<'a, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<'a, T> DerefMut for RwMutexWriteGuard<'a, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<'a, T> Drop for RwMutexWriteGuard<'a, T> {
    fn drop(&mut self) {
        self.lock.unlock_write();
    }
}
