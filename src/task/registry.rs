//! Symbolic task registry for worker-thread dispatch.
//!
//! Rust has no runtime `eval`, so a function can only run on a worker thread
//! if it was compiled into the binary in the first place — this module is
//! where that constraint becomes an explicit API instead of a gap. A task
//! destined for worker-thread execution is [`register`]ed once, at startup,
//! under a `&'static str` id; [`task::go_on_worker`](crate::task::go_on_worker)
//! then dispatches by id, not by closure. A name-keyed `DashMap` of erased
//! callables, the same dispatch-table shape as a message-kind-keyed handler
//! table.

use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::context::WorkerContext;
use crate::error::{Error, Result};

type ErasedTask = Arc<dyn Fn(Vec<u8>, WorkerContext) -> Result<Vec<u8>> + Send + Sync>;

fn registry() -> &'static DashMap<String, ErasedTask> {
    static REGISTRY: OnceLock<DashMap<String, ErasedTask>> = OnceLock::new();
    REGISTRY.get_or_init(DashMap::new)
}

/// Registers `f` under `task_id`, so `task::go_on_worker(task_id, ...)` can
/// reach it from any worker thread. Overwrites any prior registration under
/// the same id — useful for tests, a no-op concern in a real binary where
/// registration happens once at startup.
///
/// Arguments and results cross the worker-thread boundary as `bincode`
/// bytes: whatever doesn't round-trip through `bincode` simply isn't
/// shippable to a worker.
pub fn register<A, R, F>(task_id: impl Into<String>, f: F)
where
    A: DeserializeOwned,
    R: Serialize,
    F: Fn(A, WorkerContext) -> Result<R> + Send + Sync + 'static,
{
    let erased: ErasedTask = Arc::new(move |bytes: Vec<u8>, ctx: WorkerContext| -> Result<Vec<u8>> {
        let args: A = bincode::deserialize(&bytes).map_err(|e| Error::SerializationError(e.to_string()))?;
        let result = f(args, ctx)?;
        bincode::serialize(&result).map_err(|e| Error::SerializationError(e.to_string()))
    });
    registry().insert(task_id.into(), erased);
}

/// Removes a registration, if one exists under `task_id`.
pub fn unregister(task_id: &str) {
    registry().remove(task_id);
}

/// Invokes the task registered under `task_id` with raw argument bytes,
/// called from a worker thread only. Fails with [`Error::SerializationError`]
/// if nothing was ever registered under that id.
pub(crate) fn invoke(task_id: &str, args: Vec<u8>, ctx: WorkerContext) -> Result<Vec<u8>> {
    let task = registry()
        .get(task_id)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| Error::SerializationError(format!("no task registered under id '{task_id}'")))?;
    task(args, ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dashmap::DashMap as TestMap;

    fn test_ctx() -> WorkerContext {
        WorkerContext::new(1, Arc::new(TestMap::new()))
    }

    #[test]
    fn register_and_invoke_roundtrip() {
        register::<u32, u32, _>("double", |n, _ctx| Ok(n * 2));
        let args = bincode::serialize(&21u32).unwrap();
        let out = invoke("double", args, test_ctx()).unwrap();
        let result: u32 = bincode::deserialize(&out).unwrap();
        assert_eq!(result, 42);
        unregister("double");
    }

    #[test]
    fn invoke_unknown_task_errors() {
        let err = invoke("does-not-exist", Vec::new(), test_ctx()).unwrap_err();
        assert!(matches!(err, Error::SerializationError(_)));
    }

    #[test]
    fn registration_can_observe_context() {
        register::<(), bool, _>("saw-cancel", |_args, ctx| Ok(ctx.err().is_some()));
        let args = bincode::serialize(&()).unwrap();
        let out = invoke("saw-cancel", args, test_ctx()).unwrap();
        let result: bool = bincode::deserialize(&out).unwrap();
        assert!(!result, "a freshly built WorkerContext with no stored snapshot reports no error");
        unregister("saw-cancel");
    }
}
