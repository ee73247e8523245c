//! Non-negative counter that releases all waiters when it reaches zero.
//!
//! Uses the same wake-everyone pattern as
//! [`crate::waitqueue::WaitQueue::drain_all`] used by `sync::rwmutex`'s
//! writer-to-readers handoff: `done()` decrements the counter and, on
//! reaching zero, wakes every currently parked `wait()` caller atomically.
//! `add()` with a negative delta that would drive the counter below zero is
//! an `InvalidState` error — the counter must never go negative.

use parking_lot::Mutex as RawMutex;

use crate::clock::resolve_timeout;
use crate::error::{Error, Result};
use crate::waitqueue::{park, WaitQueue};

struct State {
    count: i64,
}

/// A counter-based rendezvous: any number of callers can `wait()` for the
/// count to return to zero.
pub struct WaitGroup {
    state: RawMutex<State>,
    waiters: WaitQueue,
}

impl WaitGroup {
    pub fn new() -> Self {
        WaitGroup { state: RawMutex::new(State { count: 0 }), waiters: WaitQueue::new() }
    }

    /// Adjusts the counter by `delta` (may be negative). Returns
    /// `InvalidState` if this would take the counter below zero. Waking
    /// happens here too: a zero-delta `add()` that brings the count to zero
    /// is equivalent to a `done()` for this purpose, though in practice only
    /// negative deltas do so.
    pub fn add(&self, delta: i64) -> Result<()> {
        let mut state = self.state.lock();
        let new_count = state.count + delta;
        if new_count < 0 {
            return Err(Error::invalid_state(format!(
                "wait group counter would go negative: {} + {delta}",
                state.count
            )));
        }
        state.count = new_count;
        if new_count == 0 {
            self.waiters.drain_all();
        }
        Ok(())
    }

    /// Shorthand for `add(-1)`.
    pub fn done(&self) -> Result<()> {
        self.add(-1)
    }

    /// Suspends until the counter reaches zero. Resolves immediately if it
    /// is already zero when called.
    pub async fn wait(&self, timeout_ms: i64) -> Result<()> {
        loop {
            let ticket = {
                let state = self.state.lock();
                if state.count == 0 {
                    return Ok(());
                }
                self.waiters.enqueue()
            };
            let timeout = resolve_timeout(timeout_ms, None);
            park(&self.waiters, ticket, timeout).await?;
            return Ok(());
        }
    }

    pub fn count(&self) -> i64 {
        self.state.lock().count
    }
}

impl Default for WaitGroup {
    fn default() -> Self {
        WaitGroup::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn wait_resolves_immediately_at_zero() {
        let wg = WaitGroup::new();
        wg.wait(-1).await.unwrap();
    }

    #[tokio::test]
    async fn negative_count_rejected() {
        let wg = WaitGroup::new();
        assert!(wg.add(-1).is_err());
        wg.add(2).unwrap();
        assert!(wg.add(-3).is_err());
        assert_eq!(wg.count(), 2);
    }

    #[tokio::test]
    async fn all_waiters_released_at_zero() {
        let wg = Arc::new(WaitGroup::new());
        wg.add(3).unwrap();
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let mut handles = Vec::new();
                for _ in 0..5 {
                    let wg = wg.clone();
                    handles.push(tokio::task::spawn_local(async move {
                        wg.wait(-1).await.unwrap();
                    }));
                }
                tokio::task::yield_now().await;
                wg.done().unwrap();
                wg.done().unwrap();
                wg.done().unwrap();
                for h in handles {
                    h.await.unwrap();
                }
            })
            .await;
        assert_eq!(wg.count(), 0);
    }

    #[tokio::test]
    async fn timeout_while_pending() {
        let wg = WaitGroup::new();
        wg.add(1).unwrap();
        let res = wg.wait(10).await;
        assert!(res.is_err());
    }
}
