//! Crate-wide error taxonomy.
//!
//! A `thiserror`-derived enum plus a `Result<T>` alias, covering every
//! failure mode a primitive in this crate can surface.

use thiserror::Error;

/// All errors surfaced by this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// An operation exceeded its wait budget.
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The governing context was cancelled explicitly.
    #[error("cancelled")]
    Cancelled,

    /// The governing context hit its deadline.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// Send to a closed channel, or receive from an empty closed channel.
    #[error("channel closed")]
    ChannelClosed,

    /// unlock-when-unlocked, double-close, negative wait-group counter,
    /// use-after-destroy, unlock by non-holder.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A buffer pool size category has reached its configured limit.
    #[error("pool exhausted for size category {0}")]
    PoolExhausted(usize),

    /// A function or argument could not be marshalled to a worker thread.
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// A worker missed too many heartbeats / invocation deadline elapsed.
    #[error("worker unresponsive: {0}")]
    WorkerUnresponsive(String),

    /// A failure raised by user code, propagated verbatim.
    #[error("user error: {0}")]
    UserError(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// `true` for errors a caller may reasonably retry.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Error::Timeout(_) | Error::WorkerUnresponsive(_))
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Error::InvalidState(msg.into())
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;
