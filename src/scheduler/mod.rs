//! Parallel scheduler: a fixed pool of OS threads running registered tasks,
//! addressed by `&str` id, with `initialize_parallel_scheduler`/
//! `shutdown_parallel_scheduler`/`get_parallel_scheduler` managing its
//! process-wide lifecycle.
//!
//! One OS thread per worker, a mailbox channel, a shared `DashMap` for
//! cross-thread bookkeeping. One process-wide scheduler lives behind a
//! `parking_lot::Mutex<Option<Arc<Scheduler>>>` static — one of two
//! deliberate pieces of global mutable state this crate carries (the other
//! being [`crate::context::background`]).

pub mod health;
pub mod loadbalance;
pub mod protocol;
pub mod worker;

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use parking_lot::Mutex as RawMutex;
use serde::de::DeserializeOwned;

use crate::config::SchedulerConfig;
use crate::context::{Context, ContextSnapshot};
use crate::error::{Error, Result};
use protocol::{WorkerMessage, WorkerStatus};

pub(crate) struct PendingInvocation {
    responder: tokio::sync::oneshot::Sender<std::result::Result<Vec<u8>, String>>,
    worker_id: usize,
}

struct WorkerHandle {
    mailbox: crossbeam_channel::Sender<WorkerMessage>,
    pending_count: Arc<AtomicUsize>,
    status: Arc<RawMutex<WorkerStatus>>,
    last_seen: Arc<RawMutex<Instant>>,
    thread: Option<std::thread::JoinHandle<()>>,
}

/// A running pool of worker threads plus the bookkeeping to dispatch to and
/// monitor them. Obtain one via [`initialize_parallel_scheduler`].
pub struct Scheduler {
    config: SchedulerConfig,
    workers: RawMutex<Vec<WorkerHandle>>,
    pending: Arc<DashMap<u64, PendingInvocation>>,
    context_registry: Arc<DashMap<u64, RawMutex<ContextSnapshot>>>,
    next_invocation_id: AtomicU64,
    rr_counter: AtomicUsize,
    health_task: RawMutex<Option<tokio::task::JoinHandle<()>>>,
}

impl Scheduler {
    fn new(config: SchedulerConfig) -> Self {
        Scheduler {
            config,
            workers: RawMutex::new(Vec::new()),
            pending: Arc::new(DashMap::new()),
            context_registry: Arc::new(DashMap::new()),
            next_invocation_id: AtomicU64::new(1),
            rr_counter: AtomicUsize::new(0),
            health_task: RawMutex::new(None),
        }
    }

    async fn spawn_one_worker(self: &Arc<Self>, worker_id: usize) -> Result<WorkerHandle> {
        let (mailbox_tx, mailbox_rx) = crossbeam_channel::unbounded();
        let pending_count = Arc::new(AtomicUsize::new(0));
        let status = Arc::new(RawMutex::new(WorkerStatus::Starting));
        let last_seen = Arc::new(RawMutex::new(Instant::now()));
        let (ready_tx, ready_rx) = tokio::sync::oneshot::channel();

        let t_pending = self.pending.clone();
        let t_pending_count = pending_count.clone();
        let t_status = status.clone();
        let t_last_seen = last_seen.clone();
        let t_context_registry = self.context_registry.clone();

        let thread = std::thread::Builder::new()
            .name(format!("gonex-worker-{worker_id}"))
            .spawn(move || {
                worker::worker_loop(worker_id, mailbox_rx, t_pending, t_pending_count, t_status, t_last_seen, t_context_registry, ready_tx);
            })
            .map_err(|e| Error::invalid_state(format!("failed to spawn worker thread: {e}")))?;

        mailbox_tx
            .send(WorkerMessage::Init { shared_buffer_names: Vec::new() })
            .map_err(|_| Error::invalid_state("worker mailbox closed before init"))?;

        tokio::time::timeout(std::time::Duration::from_secs(5), ready_rx)
            .await
            .map_err(|_| Error::WorkerUnresponsive(format!("worker {worker_id} did not become ready in time")))?
            .map_err(|_| Error::WorkerUnresponsive(format!("worker {worker_id} dropped its readiness channel")))?;

        Ok(WorkerHandle { mailbox: mailbox_tx, pending_count, status, last_seen, thread: Some(thread) })
    }

    async fn spawn_workers(self: &Arc<Self>) -> Result<()> {
        let mut handles = Vec::with_capacity(self.config.thread_count);
        for worker_id in 0..self.config.thread_count {
            handles.push(self.spawn_one_worker(worker_id).await?);
        }
        *self.workers.lock() = handles;
        Ok(())
    }

    fn choose_worker(&self) -> Result<usize> {
        let workers = self.workers.lock();
        let unavailable: Vec<bool> = workers.iter().map(|w| matches!(*w.status.lock(), WorkerStatus::Unresponsive | WorkerStatus::Terminated)).collect();
        let pending_counts: Vec<_> = workers.iter().map(|w| w.pending_count.clone()).collect();
        loadbalance::choose(self.config.load_balancing, workers.len(), &self.rr_counter, &pending_counts, &unavailable)
    }

    /// Dispatches `task_id` with pre-serialized `args`, deserializing the
    /// reply as `R`. Used by [`crate::task::go_on_worker`]; exposed so
    /// callers with their own bincode-compatible types need no extra
    /// wrapping.
    pub async fn dispatch<R: DeserializeOwned>(
        &self,
        task_id: &str,
        args: Vec<u8>,
        ctx: Option<&Context>,
        timeout: Option<std::time::Duration>,
    ) -> Result<R> {
        let bytes = self.dispatch_bytes(task_id, args, ctx, timeout).await?;
        bincode::deserialize(&bytes).map_err(|e| Error::SerializationError(e.to_string()))
    }

    async fn dispatch_bytes(&self, task_id: &str, args: Vec<u8>, ctx: Option<&Context>, timeout: Option<std::time::Duration>) -> Result<Vec<u8>> {
        let worker_idx = self.choose_worker()?;
        let invocation_id = self.next_invocation_id.fetch_add(1, Ordering::Relaxed);
        let (responder, rx) = tokio::sync::oneshot::channel();
        self.pending.insert(invocation_id, PendingInvocation { responder, worker_id: worker_idx });

        let context_state = ctx.map(Context::snapshot);
        {
            let workers = self.workers.lock();
            let w = &workers[worker_idx];
            w.pending_count.fetch_add(1, Ordering::SeqCst);
            if w.mailbox.send(WorkerMessage::Execute { invocation_id, task_id: task_id.to_string(), args, context_state }).is_err() {
                self.pending.remove(&invocation_id);
                return Err(Error::WorkerUnresponsive(format!("worker {worker_idx} mailbox closed")));
            }
        }

        let wait = timeout.unwrap_or(self.config.timeout);
        match tokio::time::timeout(wait, rx).await {
            Ok(Ok(Ok(bytes))) => Ok(bytes),
            Ok(Ok(Err(user_message))) => Err(Error::UserError(user_message.into())),
            Ok(Err(_recv_dropped)) => Err(Error::Cancelled),
            Err(_elapsed) => {
                self.pending.remove(&invocation_id);
                Err(Error::WorkerUnresponsive(format!("invocation {invocation_id} on worker {worker_idx} timed out")))
            }
        }
    }

    /// Pushes a fresh [`ContextSnapshot`] to every worker, used when a
    /// governing `Context` transitions to done after its invocation was
    /// already dispatched.
    pub fn broadcast_context_update(&self, ctx: &Context) {
        let snapshot = ctx.snapshot();
        for w in self.workers.lock().iter() {
            let _ = w.mailbox.send(WorkerMessage::ContextUpdate { context_state: snapshot.clone() });
        }
    }

    fn check_health(&self) {
        let stale_after = self.config.heartbeat_interval * self.config.max_missed_heartbeats;
        let mut to_replace = Vec::new();
        {
            let workers = self.workers.lock();
            for (idx, w) in workers.iter().enumerate() {
                let mut status = w.status.lock();
                if matches!(*status, WorkerStatus::Terminated) {
                    continue;
                }
                if w.last_seen.lock().elapsed() >= stale_after {
                    *status = WorkerStatus::Unresponsive;
                    to_replace.push(idx);
                } else {
                    let _ = w.mailbox.send(WorkerMessage::Heartbeat);
                }
            }
        }
        for idx in to_replace {
            self.fail_pending_for_worker(idx);
            tracing::warn!(worker_id = idx, "worker unresponsive, scheduling replacement");
        }
    }

    fn fail_pending_for_worker(&self, worker_id: usize) {
        let stale: Vec<u64> = self
            .pending
            .iter()
            .filter(|entry| entry.value().worker_id == worker_id)
            .map(|entry| *entry.key())
            .collect();
        for id in stale {
            if let Some((_, invocation)) = self.pending.remove(&id) {
                let _ = invocation.responder.send(Err(format!("worker {worker_id} became unresponsive")));
            }
        }
    }

    /// Replaces any worker currently marked `Unresponsive` with a fresh
    /// thread. Separate from [`check_health`] so tests can drive detection
    /// and replacement independently; in production the health monitor
    /// calls [`check_health`] on each tick and a caller (or a future tick)
    /// invokes this to complete the replacement.
    pub async fn replace_unresponsive_workers(self: &Arc<Self>) -> Result<()> {
        let stale_indices: Vec<usize> = self
            .workers
            .lock()
            .iter()
            .enumerate()
            .filter(|(_, w)| matches!(*w.status.lock(), WorkerStatus::Unresponsive))
            .map(|(i, _)| i)
            .collect();
        for idx in stale_indices {
            let fresh = self.spawn_one_worker(idx).await?;
            let mut workers = self.workers.lock();
            let old = std::mem::replace(&mut workers[idx], fresh);
            drop(workers);
            // The old OS thread may still be blocked inside user code (no
            // preemption); detach rather than join.
            drop(old.thread);
        }
        Ok(())
    }

    fn spawn_health_monitor(self: &Arc<Self>) {
        let handle = health::spawn_monitor(Arc::downgrade(self), self.config.heartbeat_interval);
        *self.health_task.lock() = Some(handle);
    }

    /// Stops the health monitor, asks every worker to stop, and fails any
    /// invocation still pending. Worker threads that are mid-`Execute` are
    /// given `grace_period` to finish before being detached.
    pub async fn shutdown(&self) {
        if let Some(h) = self.health_task.lock().take() {
            h.abort();
        }
        let workers = std::mem::take(&mut *self.workers.lock());
        for w in &workers {
            let _ = w.mailbox.send(WorkerMessage::Shutdown);
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        self.pending.clear();
        for w in workers {
            drop(w.thread);
        }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.lock().len()
    }
}

static GLOBAL: RawMutex<Option<Arc<Scheduler>>> = RawMutex::new(None);

/// Builds a [`Scheduler`] with `config`, starts its worker threads and
/// health monitor, and installs it as the process-wide scheduler returned
/// by [`get_parallel_scheduler`]. Replaces (and does not shut down) any
/// previously installed scheduler — callers that want a clean handoff
/// should call [`shutdown_parallel_scheduler`] first.
pub async fn initialize_parallel_scheduler(config: SchedulerConfig) -> Result<Arc<Scheduler>> {
    config.validate()?;
    let scheduler = Arc::new(Scheduler::new(config));
    scheduler.spawn_workers().await?;
    scheduler.spawn_health_monitor();
    *GLOBAL.lock() = Some(scheduler.clone());
    Ok(scheduler)
}

/// The process-wide scheduler, if one has been installed.
pub fn get_parallel_scheduler() -> Option<Arc<Scheduler>> {
    GLOBAL.lock().clone()
}

/// Shuts down and uninstalls the process-wide scheduler, if one exists.
pub async fn shutdown_parallel_scheduler() {
    let scheduler = GLOBAL.lock().take();
    if let Some(scheduler) = scheduler {
        scheduler.shutdown().await;
    }
}
