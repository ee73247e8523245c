//! Cooperative task dispatcher: `go`/`go_all`/`go_race`/`go_with_retry`,
//! plus the worker-thread dispatch path.
//!
//! The cooperative case (the common case: a plain closure returning a
//! future) runs on the current thread's `tokio::task::LocalSet` via
//! `spawn_local` — no serialization, no registry, just an ordinary Rust
//! future. The worker-thread case needs a function the scheduler can name
//! from another OS thread, which Rust cannot do for an arbitrary closure;
//! that path goes through [`registry`] and [`go_on_worker`] instead.

pub mod registry;

use std::future::Future;
use std::pin::Pin;
use std::task::{Context as TaskContext, Poll};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::RetryOptions;
use crate::context::Context;
use crate::error::{Error, Result};

/// Per-call options for [`go`]/[`go_on_worker`]. `timeout` bounds the whole
/// call (cooperative: wraps the spawned future in `tokio::time::timeout`;
/// worker: forwarded as the invocation deadline).
#[derive(Clone, Debug, Default)]
pub struct TaskOptions {
    pub timeout: Option<std::time::Duration>,
}

/// A handle to a [`go`]-spawned task's eventual result, awaitable like any
/// future. Dropping it detaches the task rather than cancelling it (the task
/// keeps running to completion on its own), matching the `tokio::task::
/// JoinHandle` it wraps. [`go_on_worker`] has no analogous handle: it is
/// already `async` and returns its `Result<R>` directly, since the
/// worker-thread round trip has no meaningful "detach and keep running
/// independently of the caller" mode to preserve.
pub struct Deferred<R> {
    handle: tokio::task::JoinHandle<Result<R>>,
}

impl<R: 'static> Future for Deferred<R> {
    type Output = Result<R>;

    fn poll(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Result<R>> {
        Pin::new(&mut self.get_mut().handle).poll(cx).map(join_result)
    }
}

fn join_result<R>(joined: std::result::Result<Result<R>, tokio::task::JoinError>) -> Result<R> {
    match joined {
        Ok(result) => result,
        Err(join_err) if join_err.is_cancelled() => Err(Error::Cancelled),
        Err(join_err) => Err(Error::invalid_state(format!("task panicked: {join_err}"))),
    }
}

/// Spawns `f` on the current `LocalSet` — cooperative, runs to the next
/// suspension point without preemption. Must be called from within
/// a `LocalSet::run_until` (or an equivalent worker-thread context) — the
/// same requirement `tokio::task::spawn_local` itself has.
pub fn go<F, Fut, R>(f: F, opts: TaskOptions) -> Deferred<R>
where
    F: FnOnce() -> Fut + 'static,
    Fut: Future<Output = Result<R>> + 'static,
    R: 'static,
{
    match opts.timeout {
        None => Deferred { handle: tokio::task::spawn_local(async move { f().await }) },
        Some(d) => Deferred {
            handle: tokio::task::spawn_local(async move {
                match tokio::time::timeout(d, f()).await {
                    Ok(result) => result,
                    Err(_elapsed) => Err(Error::Timeout(d)),
                }
            }),
        },
    }
}

/// Dispatches `task_id` (previously [`registry::register`]ed) to the
/// process-wide parallel scheduler. Serializes `args` with `bincode` and
/// deserializes the reply the same way.
pub async fn go_on_worker<A, R>(task_id: &str, args: A, ctx: Option<&Context>, opts: TaskOptions) -> Result<R>
where
    A: Serialize,
    R: DeserializeOwned,
{
    let scheduler = crate::scheduler::get_parallel_scheduler()
        .ok_or_else(|| Error::invalid_state("no parallel scheduler initialized; call scheduler::initialize_parallel_scheduler first"))?;
    let bytes = bincode::serialize(&args).map_err(|e| Error::SerializationError(e.to_string()))?;
    scheduler.dispatch(task_id, bytes, ctx, opts.timeout).await
}

/// Runs every task to completion and resolves with their results in input
/// order; a first failure aborts every task still running and returns that
/// failure.
pub async fn go_all<F, Fut, R>(fns: Vec<F>) -> Result<Vec<R>>
where
    F: FnOnce() -> Fut + 'static,
    Fut: Future<Output = Result<R>> + 'static,
    R: 'static,
{
    let total = fns.len();
    let mut set = tokio::task::JoinSet::new();
    for (idx, f) in fns.into_iter().enumerate() {
        set.spawn_local(async move { (idx, f().await) });
    }

    let mut results: Vec<Option<R>> = (0..total).map(|_| None).collect();
    let mut first_err: Option<Error> = None;
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((idx, Ok(value))) => results[idx] = Some(value),
            Ok((_idx, Err(e))) => {
                first_err.get_or_insert(e);
                set.abort_all();
            }
            Err(join_err) => {
                first_err.get_or_insert(Error::invalid_state(format!("task panicked: {join_err}")));
                set.abort_all();
            }
        }
    }

    if let Some(e) = first_err {
        return Err(e);
    }
    Ok(results.into_iter().map(|r| r.expect("go_all: every task completed without error")).collect())
}

/// Resolves with the first task to succeed, aborting the rest; if every task
/// fails, resolves with the last failure observed.
pub async fn go_race<F, Fut, R>(fns: Vec<F>) -> Result<R>
where
    F: FnOnce() -> Fut + 'static,
    Fut: Future<Output = Result<R>> + 'static,
    R: 'static,
{
    let mut set = tokio::task::JoinSet::new();
    for f in fns {
        set.spawn_local(async move { f().await });
    }
    if set.is_empty() {
        return Err(Error::invalid_state("go_race called with no tasks"));
    }

    let mut last_err = None;
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(Ok(value)) => {
                set.abort_all();
                return Ok(value);
            }
            Ok(Err(e)) => last_err = Some(e),
            Err(join_err) => last_err = Some(Error::invalid_state(format!("task panicked: {join_err}"))),
        }
    }
    Err(last_err.expect("go_race: non-empty task set always observes at least one outcome"))
}

/// Retries `f` under `opts`'s backoff policy until it succeeds, a
/// non-retriable error surfaces, or `max_attempts` is exhausted (reuses
/// [`RetryOptions::next_delay`]).
pub async fn go_with_retry<F, Fut, R>(mut f: F, opts: RetryOptions) -> Result<R>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<R>>,
{
    opts.validate()?;
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt >= opts.max_attempts || !e.is_retriable() => return Err(e),
            Err(_retriable) => tokio::time::sleep(opts.next_delay(attempt)).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn go_runs_on_local_set() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let deferred = go(|| async { Ok(7) }, TaskOptions::default());
                assert_eq!(deferred.await.unwrap(), 7);
            })
            .await;
    }

    #[tokio::test]
    async fn go_timeout_elapses() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let deferred = go(
                    || async {
                        tokio::time::sleep(std::time::Duration::from_secs(10)).await;
                        Ok(())
                    },
                    TaskOptions { timeout: Some(std::time::Duration::from_millis(10)) },
                );
                assert!(matches!(deferred.await, Err(Error::Timeout(_))));
            })
            .await;
    }

    #[tokio::test]
    async fn go_all_preserves_order() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let fns: Vec<_> = (0..5).map(|i| move || async move { Ok::<_, Error>(i * i) }).collect();
                let results = go_all(fns).await.unwrap();
                assert_eq!(results, vec![0, 1, 4, 9, 16]);
            })
            .await;
    }

    #[tokio::test]
    async fn go_all_fails_fast_on_first_error() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let fns: Vec<Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = Result<u32>>>>>> = vec![
                    Box::new(|| Box::pin(async { Err(Error::invalid_state("boom")) }) as Pin<Box<dyn Future<Output = Result<u32>>>>),
                    Box::new(|| {
                        Box::pin(async {
                            tokio::time::sleep(std::time::Duration::from_secs(10)).await;
                            Ok(1)
                        }) as Pin<Box<dyn Future<Output = Result<u32>>>>
                    }),
                ];
                let result = go_all(fns).await;
                assert!(result.is_err());
            })
            .await;
    }

    #[tokio::test]
    async fn go_race_returns_first_success() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let fns: Vec<_> = vec![
                    || async {
                        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                        Ok::<_, Error>("slow")
                    },
                    || async { Ok::<_, Error>("fast") },
                ];
                assert_eq!(go_race(fns).await.unwrap(), "fast");
            })
            .await;
    }

    #[tokio::test]
    async fn go_race_all_failures_surfaces_last() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let fns: Vec<_> = vec![
                    || async { Err::<u32, _>(Error::invalid_state("a")) },
                    || async { Err::<u32, _>(Error::invalid_state("b")) },
                ];
                assert!(go_race(fns).await.is_err());
            })
            .await;
    }

    #[tokio::test]
    async fn retry_stops_on_non_retriable_error() {
        let attempts = Arc::new(AtomicU32::new(0));
        let a = attempts.clone();
        let result: Result<()> = go_with_retry(
            move || {
                let a = a.clone();
                async move {
                    a.fetch_add(1, Ordering::SeqCst);
                    Err(Error::invalid_state("not retriable"))
                }
            },
            RetryOptions { max_attempts: 5, ..Default::default() },
        )
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retry_succeeds_after_transient_timeouts() {
        let attempts = Arc::new(AtomicU32::new(0));
        let a = attempts.clone();
        let result = go_with_retry(
            move || {
                let a = a.clone();
                async move {
                    let n = a.fetch_add(1, Ordering::SeqCst);
                    if n < 2 {
                        Err(Error::Timeout(std::time::Duration::from_millis(1)))
                    } else {
                        Ok(42)
                    }
                }
            },
            RetryOptions {
                max_attempts: 5,
                initial_delay: std::time::Duration::from_millis(1),
                ..Default::default()
            },
        )
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }
}
