//! Bounded/unbounded rendezvous channel with closed-channel semantics.
//!
//! Built on two [`crate::waitqueue::WaitQueue`]s side by side — one for blocked senders
//! (each carrying the value it is offering as its ticket payload), one for
//! blocked receivers (woken with the value it receives as its payload, or
//! with no payload at all when woken by `close()`, which is how a parked
//! receiver tells a closed channel apart from a delivered value) — the same
//! two-queue shape `sync::rwmutex` uses for its reader/writer wait classes.
//! `capacity == 0` is the unbuffered/rendezvous case: the buffer never holds
//! anything, so every send either hands off directly to an already-parked
//! receiver or itself parks as a send-waiter.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex as RawMutex;

use crate::clock::resolve_timeout;
use crate::config::ChannelOptions;
use crate::error::{Error, Result};
use crate::waitqueue::{park, Ticket, WaitQueue};

struct State<T> {
    buffer: VecDeque<T>,
    closed: bool,
}

/// Error returned by [`Channel::try_send`] — never suspends, so a full
/// channel hands the value back instead of discarding it.
#[derive(Debug)]
pub enum TrySendError<T> {
    Closed(T),
    Full(T),
}

/// Error returned by [`Channel::try_receive`].
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum TryReceiveError {
    Empty,
    Closed,
}

/// A channel of `T`, buffered (`capacity > 0`) or unbuffered (`capacity == 0`).
pub struct Channel<T> {
    state: RawMutex<State<T>>,
    send_waiters: WaitQueue<T>,
    recv_waiters: WaitQueue<T>,
    capacity: usize,
    opts: ChannelOptions,
}

impl<T> Channel<T> {
    pub fn new(capacity: usize) -> Self {
        Self::with_options(ChannelOptions { buffer_size: capacity, ..ChannelOptions::default() })
    }

    pub fn with_options(opts: ChannelOptions) -> Self {
        Channel {
            state: RawMutex::new(State { buffer: VecDeque::new(), closed: false }),
            send_waiters: WaitQueue::new(),
            recv_waiters: WaitQueue::new(),
            capacity: opts.buffer_size,
            opts,
        }
    }

    /// Sends `value`, suspending if the channel is full and no receiver is
    /// waiting. Fails immediately with [`Error::ChannelClosed`] on a closed
    /// channel, and also if woken by a concurrent `close()` while parked.
    pub async fn send(&self, value: T, timeout_ms: i64) -> Result<()> {
        enum Step<T> {
            Done,
            Park(Ticket<T>),
        }
        let step = {
            let mut state = self.state.lock();
            if state.closed {
                return Err(Error::ChannelClosed);
            }
            if let Some(recv) = self.recv_waiters.dequeue_one() {
                recv.set_payload(value);
                Step::Done
            } else if state.buffer.len() < self.capacity {
                state.buffer.push_back(value);
                Step::Done
            } else {
                Step::Park(self.send_waiters.enqueue_with(Some(value)))
            }
        };
        match step {
            Step::Done => Ok(()),
            Step::Park(ticket) => {
                let timeout = resolve_timeout(timeout_ms, self.default_timeout());
                park(&self.send_waiters, ticket.clone(), timeout).await?;
                if ticket.take_payload().is_some() {
                    // Nobody consumed our value before waking us: we were
                    // drained by `close()`, not handed off by a receiver.
                    return Err(Error::ChannelClosed);
                }
                Ok(())
            }
        }
    }

    /// Receives a value, suspending if the channel is empty and open. On a
    /// closed channel this drains buffered values first, then returns `Ok(None)`.
    pub async fn receive(&self, timeout_ms: i64) -> Result<Option<T>> {
        enum Step<T> {
            Value(T),
            Closed,
            Park(Ticket<T>),
        }
        let step = {
            let mut state = self.state.lock();
            if let Some(value) = state.buffer.pop_front() {
                if let Some(sender) = self.send_waiters.dequeue_one() {
                    if let Some(v) = sender.take_payload() {
                        state.buffer.push_back(v);
                    }
                }
                Step::Value(value)
            } else if let Some(sender) = self.send_waiters.dequeue_one() {
                let v = sender.take_payload().expect("send waiter ticket missing its payload");
                Step::Value(v)
            } else if state.closed {
                Step::Closed
            } else {
                Step::Park(self.recv_waiters.enqueue())
            }
        };
        match step {
            Step::Value(v) => Ok(Some(v)),
            Step::Closed => Ok(None),
            Step::Park(ticket) => {
                let timeout = resolve_timeout(timeout_ms, self.default_timeout());
                park(&self.recv_waiters, ticket.clone(), timeout).await?;
                Ok(ticket.take_payload())
            }
        }
    }

    /// Non-suspending send: succeeds immediately or hands `value` back.
    pub fn try_send(&self, value: T) -> std::result::Result<(), TrySendError<T>> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(TrySendError::Closed(value));
        }
        if let Some(recv) = self.recv_waiters.dequeue_one() {
            recv.set_payload(value);
            return Ok(());
        }
        if state.buffer.len() < self.capacity {
            state.buffer.push_back(value);
            return Ok(());
        }
        Err(TrySendError::Full(value))
    }

    /// Non-suspending receive.
    pub fn try_receive(&self) -> std::result::Result<T, TryReceiveError> {
        let mut state = self.state.lock();
        if let Some(value) = state.buffer.pop_front() {
            if let Some(sender) = self.send_waiters.dequeue_one() {
                if let Some(v) = sender.take_payload() {
                    state.buffer.push_back(v);
                }
            }
            return Ok(value);
        }
        if let Some(sender) = self.send_waiters.dequeue_one() {
            return Ok(sender.take_payload().expect("send waiter ticket missing its payload"));
        }
        if state.closed {
            return Err(TryReceiveError::Closed);
        }
        Err(TryReceiveError::Empty)
    }

    /// Marks the channel closed. Idempotent-in-effect on parked waiters, but
    /// a *second explicit* close is reported as [`Error::InvalidState`].
    /// Parked senders observe [`Error::ChannelClosed`]; parked receivers with
    /// nothing buffered observe the closed sentinel (`Ok(None)`).
    pub fn close(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(Error::invalid_state("channel already closed"));
        }
        state.closed = true;
        drop(state);
        self.send_waiters.drain_all();
        self.recv_waiters.drain_all();
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Number of values currently buffered (does not count parked waiters).
    pub fn len(&self) -> usize {
        self.state.lock().buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn default_timeout(&self) -> Option<std::time::Duration> {
        resolve_timeout(self.opts.timeout_ms, None)
    }
}

/// Constructs a channel and returns a cloneable sender/receiver pair sharing
/// the same underlying [`Channel`], mirroring the split-handle convention
/// most Rust channel crates (and `tokio::sync::mpsc`) use.
pub fn channel<T>(opts: ChannelOptions) -> (Sender<T>, Receiver<T>) {
    let chan = Arc::new(Channel::with_options(opts));
    (Sender { chan: chan.clone() }, Receiver { chan })
}

pub struct Sender<T> {
    chan: Arc<Channel<T>>,
}

impl<T> Clone for Sender<T> {
    fn clone(&self) -> Self {
        Sender { chan: self.chan.clone() }
    }
}

impl<T> Sender<T> {
    pub async fn send(&self, value: T, timeout_ms: i64) -> Result<()> {
        self.chan.send(value, timeout_ms).await
    }

    pub fn try_send(&self, value: T) -> std::result::Result<(), TrySendError<T>> {
        self.chan.try_send(value)
    }

    pub fn close(&self) -> Result<()> {
        self.chan.close()
    }

    pub fn is_closed(&self) -> bool {
        self.chan.is_closed()
    }

    /// Exposes the shared channel for use as a [`crate::select`] case.
    pub fn channel(&self) -> &Channel<T> {
        &self.chan
    }
}

pub struct Receiver<T> {
    chan: Arc<Channel<T>>,
}

impl<T> Clone for Receiver<T> {
    fn clone(&self) -> Self {
        Receiver { chan: self.chan.clone() }
    }
}

impl<T> Receiver<T> {
    pub async fn receive(&self, timeout_ms: i64) -> Result<Option<T>> {
        self.chan.receive(timeout_ms).await
    }

    pub fn try_receive(&self) -> std::result::Result<T, TryReceiveError> {
        self.chan.try_receive()
    }

    pub fn is_closed(&self) -> bool {
        self.chan.is_closed()
    }

    pub fn channel(&self) -> &Channel<T> {
        &self.chan
    }
}
