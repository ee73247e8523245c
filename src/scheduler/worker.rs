//! The per-worker-thread message loop.
//!
//! A dedicated OS thread blocking on a single inbound channel, dispatching
//! each message synchronously before looping back to `recv`. Rather than
//! posting a reply back down a dedicated outbound channel for a dispatcher
//! to demultiplex, the worker resolves the caller's pending invocation
//! directly through the scheduler's `pending` map, since `DashMap` already
//! gives safe concurrent access from any thread — one less moving part (see
//! DESIGN.md).
//!
//! `scheduler::Scheduler` does not preempt a worker mid-`Execute`: a task
//! that never returns simply never replies, and eventually the invocation's
//! `dispatch` timeout and the health monitor's missed-heartbeat check both
//! notice independently.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use parking_lot::Mutex as RawMutex;

use super::protocol::{WorkerMessage, WorkerStatus};
use super::PendingInvocation;
use crate::context::{ContextSnapshot, WorkerContext};

/// Runs on its own `std::thread`, one per scheduler worker slot. Blocks on
/// `inbox.recv()` and returns only once the channel disconnects (the
/// scheduler dropped every `Sender`) or a `Shutdown` message arrives.
pub(crate) fn worker_loop(
    worker_id: usize,
    inbox: crossbeam_channel::Receiver<WorkerMessage>,
    pending: Arc<DashMap<u64, PendingInvocation>>,
    pending_count: Arc<AtomicUsize>,
    status: Arc<RawMutex<WorkerStatus>>,
    last_seen: Arc<RawMutex<Instant>>,
    context_registry: Arc<DashMap<u64, RawMutex<ContextSnapshot>>>,
    ready_tx: tokio::sync::oneshot::Sender<()>,
) {
    let mut ready_tx = Some(ready_tx);

    while let Ok(msg) = inbox.recv() {
        *last_seen.lock() = Instant::now();
        match msg {
            WorkerMessage::Init { shared_buffer_names } => {
                tracing::debug!(worker_id, buffers = shared_buffer_names.len(), "worker ready");
                *status.lock() = WorkerStatus::Idle;
                if let Some(tx) = ready_tx.take() {
                    let _ = tx.send(());
                }
            }

            WorkerMessage::Execute { invocation_id, task_id, args, context_state } => {
                let context_id = context_state.as_ref().map(|s| s.context_id).unwrap_or(0);
                if let Some(snapshot) = context_state {
                    context_registry.insert(snapshot.context_id, RawMutex::new(snapshot));
                }

                *status.lock() = WorkerStatus::Busy;
                let worker_ctx = WorkerContext::new(context_id, context_registry.clone());
                let outcome = crate::task::registry::invoke(&task_id, args, worker_ctx);
                *status.lock() = WorkerStatus::Idle;
                pending_count.fetch_sub(1, Ordering::SeqCst);

                if let Some((_, invocation)) = pending.remove(&invocation_id) {
                    let _ = invocation.responder.send(outcome.map_err(|e| e.to_string()));
                } else {
                    // The caller already timed out and reclaimed its slot;
                    // the result has no one left to deliver to.
                    tracing::debug!(worker_id, invocation_id, "result dropped, no pending caller");
                }
            }

            WorkerMessage::ContextUpdate { context_state } => {
                context_registry.insert(context_state.context_id, RawMutex::new(context_state));
            }

            WorkerMessage::Heartbeat => {}

            WorkerMessage::Shutdown => {
                *status.lock() = WorkerStatus::Terminated;
                break;
            }
        }
    }
}
