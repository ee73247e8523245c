//! The worker-thread mailbox protocol.
//!
//! Five message kinds cover a worker's whole lifecycle: init, execute,
//! context update, heartbeat, shutdown. A reply never needs an explicit
//! envelope of its own: the worker resolves the caller's pending invocation
//! directly (see `scheduler::worker`'s doc comment) rather than posting a
//! response back down a return channel, so only the request half of the
//! protocol is modeled as a type here.

use crate::context::ContextSnapshot;

/// One message sent down a worker's mailbox.
pub enum WorkerMessage {
    /// Sent once, immediately after the worker thread starts. Binds the
    /// names of any shared-memory regions the worker should be able to look
    /// up via `SharedMemoryManager` without re-creating them.
    Init { shared_buffer_names: Vec<String> },

    /// Invoke a registered task. `invocation_id` is unique for the lifetime
    /// of the scheduler and is how the worker finds the caller's pending
    /// response slot.
    Execute { invocation_id: u64, task_id: String, args: Vec<u8>, context_state: Option<ContextSnapshot> },

    /// Refresh the stored snapshot for an in-flight invocation's context —
    /// sent when the governing `Context` is cancelled or its deadline fires
    /// after dispatch but before the worker finishes.
    ContextUpdate { context_state: ContextSnapshot },

    /// Advisory liveness ping; processing it (like any message) refreshes
    /// the worker's last-seen timestamp that `scheduler::health` watches.
    Heartbeat,

    /// Graceful stop: the worker finishes its current `Execute`, if any,
    /// then exits its loop without taking further messages.
    Shutdown,
}

/// A worker's point-in-time lifecycle state, surfaced for diagnostics and
/// consulted by `scheduler::loadbalance`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WorkerStatus {
    Starting,
    Idle,
    Busy,
    Unresponsive,
    Terminated,
}
