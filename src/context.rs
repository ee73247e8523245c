//! Cancellation / deadline / value context tree rooted at [`background`].
//!
//! Child→parent is the only strong edge; the parent's child-set is weak
//! references cleaned up on cancellation (see DESIGN.md). A child holds a
//! strong [`Context`] (`Arc`) to its parent; the parent holds `Weak<Inner>`
//! handles to its children in `Inner::children`, used only to cascade a
//! cancellation down the tree synchronously — by the time `cancel()`/a
//! deadline fire returns, every descendant's `err()` is already set.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex as RawMutex;

use crate::error::Error;
use crate::waitqueue::WaitQueue;

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// The two ways a context can terminate; kept separate from [`crate::error::Error`]
/// because it must be `Copy`/`Clone` to cascade into arbitrarily many children
/// without needing user errors (which are not `Clone`) anywhere near it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum CtxError {
    Cancelled,
    DeadlineExceeded,
}

impl From<CtxError> for Error {
    fn from(e: CtxError) -> Error {
        match e {
            CtxError::Cancelled => Error::Cancelled,
            CtxError::DeadlineExceeded => Error::DeadlineExceeded,
        }
    }
}

enum CtxState {
    Active,
    Done(CtxError),
}

struct Inner {
    id: u64,
    parent: Option<Context>,
    children: RawMutex<Vec<Weak<Inner>>>,
    state: RawMutex<CtxState>,
    done_waiters: WaitQueue,
    deadline: Option<Instant>,
    /// The single key/value this node overlays, if created via `with_value`.
    kv: Option<(String, Arc<dyn std::any::Any + Send + Sync>)>,
    timer: RawMutex<Option<tokio::task::JoinHandle<()>>>,
}

/// A node in the cancellation/deadline/value tree. Cheap to clone (`Arc`).
#[derive(Clone)]
pub struct Context {
    inner: Arc<Inner>,
}

impl Context {
    fn new(parent: Option<Context>, deadline: Option<Instant>, kv: Option<(String, Arc<dyn std::any::Any + Send + Sync>)>) -> Context {
        let inner = Arc::new(Inner {
            id: NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
            parent: parent.clone(),
            children: RawMutex::new(Vec::new()),
            state: RawMutex::new(CtxState::Active),
            done_waiters: WaitQueue::new(),
            deadline,
            kv,
            timer: RawMutex::new(None),
        });
        let child = Context { inner };
        if let Some(parent) = parent {
            parent.inner.children.lock().push(Arc::downgrade(&child.inner));
            // The parent may already be done (explicit cancel or elapsed
            // deadline) by the time this child is derived from it; a
            // cascade only reaches children registered *before* the parent
            // transitioned, so a late-registered child must inherit the
            // parent's terminal state here instead of waiting for a
            // cascade that already happened.
            if let Some(err) = parent.err() {
                let ctx_err = match err {
                    Error::Cancelled => CtxError::Cancelled,
                    Error::DeadlineExceeded => CtxError::DeadlineExceeded,
                    _ => unreachable!("a context's err() is always Cancelled or DeadlineExceeded"),
                };
                *child.inner.state.lock() = CtxState::Done(ctx_err);
                child.inner.done_waiters.drain_all();
            }
        }
        child
    }

    /// Stable identity, used as the worker-thread protocol's `contextId`.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// `None` while active; `Some(Cancelled | DeadlineExceeded)` once done.
    pub fn err(&self) -> Option<Error> {
        match *self.inner.state.lock() {
            CtxState::Active => None,
            CtxState::Done(e) => Some(e.into()),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// Suspends until this context is cancelled, its deadline elapses, or an
    /// ancestor's cancellation cascades down to it.
    pub async fn done(&self) {
        let ticket = {
            if self.err().is_some() {
                return;
            }
            self.inner.done_waiters.enqueue()
        };
        // No timeout: this future only ever completes via `cancel_internal`
        // draining `done_waiters`, which only happens once, ever, per node.
        let _ = crate::waitqueue::park(&self.inner.done_waiters, ticket, None).await;
    }

    /// Looks up `key` on this node, then walks ancestors, returning the
    /// nearest overlay. Returns `None` if no ancestor (inclusive) set it, or
    /// if the stored value's concrete type does not match `V`.
    pub fn value<V: 'static + Send + Sync>(&self, key: &str) -> Option<Arc<V>> {
        let mut node = Some(self.clone());
        while let Some(ctx) = node {
            if let Some((k, v)) = &ctx.inner.kv {
                if k == key {
                    return v.clone().downcast::<V>().ok();
                }
            }
            node = ctx.inner.parent.clone();
        }
        None
    }

    /// Explicit cancellation. Idempotent: a context already done is unaffected.
    fn cancel_internal(&self, err: CtxError) {
        let transitioned = {
            let mut state = self.inner.state.lock();
            if matches!(*state, CtxState::Done(_)) {
                false
            } else {
                *state = CtxState::Done(err);
                true
            }
        };
        if !transitioned {
            return;
        }
        if let Some(handle) = self.inner.timer.lock().take() {
            handle.abort();
        }
        self.inner.done_waiters.drain_all();

        // Cascade synchronously: every descendant's err() is set before this
        // call returns.
        let children = std::mem::take(&mut *self.inner.children.lock());
        for weak in children {
            if let Some(child_inner) = weak.upgrade() {
                Context { inner: child_inner }.cancel_internal(err);
            }
        }

        // Detach from the parent's child-set to avoid an unbounded build-up
        // of dead weak references.
        if let Some(parent) = &self.inner.parent {
            parent
                .inner
                .children
                .lock()
                .retain(|w| w.upgrade().map(|i| !Arc::ptr_eq(&i, &self.inner)).unwrap_or(false));
        }
    }

    /// Snapshot of the state a worker thread needs to reconstruct a proxy
    /// context: id, terminal error (if any), and remaining deadline. Value
    /// overlays do not cross the worker-thread boundary unless the caller
    /// arranges to forward them explicitly (see DESIGN.md: arbitrary `Any`
    /// values are not generically serializable without a user-provided
    /// `Serialize` impl, so the wire snapshot carries only scalar
    /// cancellation/deadline state).
    pub fn snapshot(&self) -> ContextSnapshot {
        ContextSnapshot {
            context_id: self.inner.id,
            err: self.err().map(|e| e.to_string()),
            deadline_remaining_ms: self.inner.deadline.map(|d| {
                d.saturating_duration_since(Instant::now()).as_millis() as u64
            }),
        }
    }
}

/// Wire representation of a context's cancellation/deadline state, forwarded
/// to worker threads as `WorkerMessage::Execute.context_state` / `ContextUpdate`.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct ContextSnapshot {
    pub context_id: u64,
    pub err: Option<String>,
    pub deadline_remaining_ms: Option<u64>,
}

impl ContextSnapshot {
    fn parse_err(&self) -> Option<Error> {
        match self.err.as_deref() {
            None => None,
            Some("cancelled") => Some(Error::Cancelled),
            Some("deadline exceeded") => Some(Error::DeadlineExceeded),
            Some(other) => Some(Error::invalid_state(other.to_string())),
        }
    }
}

/// A worker-thread-side proxy standing in for a [`Context`] that cannot
/// itself cross the thread boundary. `scheduler::worker` keeps one
/// `ContextSnapshot` per live `context_id` (refreshed by `ContextUpdate`
/// messages) and hands every registered task a `WorkerContext` over it, so
/// the task can poll `err()` exactly as it would poll a real `Context` on
/// the main scheduler.
///
/// `value()`/`done()` are not proxied: overlay values are never marshalled
/// across the worker boundary in the first place (see `Context::snapshot`),
/// and `done()` would need its own suspension point inside what is
/// otherwise a synchronous per-invocation call — recorded as an accepted
/// scope limit in DESIGN.md rather than guessed at.
#[derive(Clone)]
pub struct WorkerContext {
    context_id: u64,
    registry: Arc<dashmap::DashMap<u64, parking_lot::Mutex<ContextSnapshot>>>,
}

impl WorkerContext {
    pub fn new(context_id: u64, registry: Arc<dashmap::DashMap<u64, parking_lot::Mutex<ContextSnapshot>>>) -> Self {
        WorkerContext { context_id, registry }
    }

    pub fn context_id(&self) -> u64 {
        self.context_id
    }

    /// Mirrors [`Context::err`], reading whatever the latest `ContextUpdate`
    /// (or the initial `Execute` snapshot) left in the worker-local registry.
    pub fn err(&self) -> Option<Error> {
        self.registry.get(&self.context_id).and_then(|entry| entry.lock().parse_err())
    }
}

/// The never-cancelled tree root. A process-wide singleton — global mutable
/// state confined to this and the parallel scheduler.
pub fn background() -> Context {
    static ROOT: std::sync::OnceLock<Context> = std::sync::OnceLock::new();
    ROOT.get_or_init(|| Context::new(None, None, None)).clone()
}

/// A callable cancel handle returned by [`with_cancel`]. Calling it more than
/// once is a no-op after the first.
#[derive(Clone)]
pub struct CancelFn(Context);

impl CancelFn {
    pub fn cancel(&self) {
        self.0.cancel_internal(CtxError::Cancelled);
    }
}

/// Derives a cancelable child context. The returned [`CancelFn`] is the only
/// way to cancel it explicitly; dropping it has no effect — cancellation
/// must be an explicit act or a deadline/parent cascade.
pub fn with_cancel(parent: &Context) -> (Context, CancelFn) {
    let child = Context::new(Some(parent.clone()), None, None);
    (child.clone(), CancelFn(child))
}

/// Derives a child that cancels itself with [`Error::DeadlineExceeded`] no
/// later than `deadline`.
pub fn with_deadline(parent: &Context, deadline: Instant) -> Context {
    let child = Context::new(Some(parent.clone()), Some(deadline), None);
    let task_child = child.clone();
    let handle = tokio::spawn(async move {
        tokio::time::sleep_until(deadline.into()).await;
        task_child.cancel_internal(CtxError::DeadlineExceeded);
    });
    *child.inner.timer.lock() = Some(handle);
    child
}

/// `with_deadline(parent, Instant::now() + timeout)`.
pub fn with_timeout(parent: &Context, timeout: Duration) -> Context {
    with_deadline(parent, Instant::now() + timeout)
}

/// Derives a child overlaying a single `key -> value` binding, visible to
/// itself and its descendants via [`Context::value`].
pub fn with_value<V: 'static + Send + Sync>(parent: &Context, key: impl Into<String>, value: V) -> Context {
    Context::new(Some(parent.clone()), None, Some((key.into(), Arc::new(value))))
}

/// Collects every overlay visible from `ctx` as opaque JSON, for callers that
/// want a worker-side `HashMap<String, serde_json::Value>` view instead of
/// typed `Context::value` lookups. Only overlays whose value happens to be a
/// `serde_json::Value` are represented; see [`Context::snapshot`]'s doc for why
/// arbitrary `Any` overlays cannot be marshalled generically.
pub fn json_values(ctx: &Context) -> HashMap<String, serde_json::Value> {
    let mut out = HashMap::new();
    let mut node = Some(ctx.clone());
    while let Some(c) = node {
        if let Some((k, v)) = &c.inner.kv {
            if !out.contains_key(k) {
                if let Some(json) = v.clone().downcast::<serde_json::Value>().ok() {
                    out.insert(k.clone(), (*json).clone());
                }
            }
        }
        node = c.inner.parent.clone();
    }
    out
}
