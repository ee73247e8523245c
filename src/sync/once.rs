//! Exactly-once initialization latch with sticky failure.
//!
//! Fresh/Running/Done state machine built on the same
//! [`crate::waitqueue::WaitQueue`] substrate as the other primitives:
//! concurrent callers that arrive while the winning caller's closure is
//! running enqueue and park with no payload, then re-read the now-`Done`
//! state once woken.
//!
//! Sticky failure: if the winning call's closure fails, every caller
//! (including ones that arrive afterward) observes a failure forever — the
//! first caller gets the original error, later callers get an
//! [`crate::error::Error::InvalidState`] wrapping its message, since
//! arbitrary user errors are not `Clone` and storing the `Display` text is
//! the idiomatic way to keep the latch itself cheap and `Send + Sync` (see
//! DESIGN.md).

use std::future::Future;

use parking_lot::Mutex as RawMutex;

use crate::error::{Error, Result};
use crate::waitqueue::{park, WaitQueue};

enum OnceState {
    Fresh,
    Running,
    Done(std::result::Result<(), String>),
}

/// A latch that runs its closure at most once across any number of
/// concurrent callers.
pub struct Once {
    state: RawMutex<OnceState>,
    waiters: WaitQueue,
}

impl Once {
    pub fn new() -> Self {
        Once { state: RawMutex::new(OnceState::Fresh), waiters: WaitQueue::new() }
    }

    /// Runs `f` exactly once across all callers. Callers that lose the race
    /// suspend until the winner's closure completes, then observe its result.
    pub async fn call<F, Fut>(&self, f: F) -> Result<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        enum Action {
            RunNow,
            Wait(crate::waitqueue::Ticket),
            Done(std::result::Result<(), String>),
        }

        let action = {
            let mut state = self.state.lock();
            match &*state {
                OnceState::Fresh => {
                    *state = OnceState::Running;
                    Action::RunNow
                }
                OnceState::Running => Action::Wait(self.waiters.enqueue()),
                OnceState::Done(r) => Action::Done(r.clone()),
            }
        };

        match action {
            Action::RunNow => {
                let result = f().await;
                let stored = match &result {
                    Ok(()) => Ok(()),
                    Err(e) => Err(e.to_string()),
                };
                *self.state.lock() = OnceState::Done(stored);
                self.waiters.drain_all();
                result
            }
            Action::Wait(ticket) => {
                park(&self.waiters, ticket, None).await?;
                let state = self.state.lock();
                match &*state {
                    OnceState::Done(Ok(())) => Ok(()),
                    OnceState::Done(Err(msg)) => {
                        Err(Error::invalid_state(format!("once: previous call failed: {msg}")))
                    }
                    _ => unreachable!("waiter woken before the winning call reached Done"),
                }
            }
            Action::Done(Ok(())) => Ok(()),
            Action::Done(Err(msg)) => {
                Err(Error::invalid_state(format!("once: previous call failed: {msg}")))
            }
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(&*self.state.lock(), OnceState::Done(_))
    }
}

impl Default for Once {
    fn default() -> Self {
        Once::new()
    }
}
