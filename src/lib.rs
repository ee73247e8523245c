//! Go-inspired concurrency primitives over a cooperative scheduler
//!
//! A single-process concurrency toolkit: `go`/`goAll`/`goRace`/
//! `goWithRetry` task dispatch, channels, the classical lock/semaphore/
//! once/wait-group/condition-variable family, a cancellation/deadline/value
//! context tree, `select`, tickers and timers, lock-free queues, a buffer
//! pool, and named shared-memory regions — plus an opt-in pool of worker
//! OS threads for tasks that need to leave the cooperative scheduler
//! entirely.
//!
//! # Architecture
//!
//! - **Cooperative scheduler**: `task::go` runs a closure on the calling
//!   thread's `tokio::task::LocalSet`, suspending only at explicit `.await`
//!   points (channel ops, lock acquisition, sleeps) — no preemption.
//! - **Parallel scheduler**: `scheduler::initialize_parallel_scheduler`
//!   starts a fixed pool of OS threads that run tasks pre-registered with
//!   `task::registry::register`, addressed by a symbolic id rather than a
//!   shipped closure (Rust has no runtime `eval`; see `task::registry`'s
//!   docs).
//! - **Wait-queue substrate**: every suspending primitive — mutex, channel,
//!   context, etc. — is built on one FIFO wait-queue type (`waitqueue`),
//!   so "a waiter's cleanup handle is cleared on any exit path" is one
//!   property proven once rather than once per primitive.

#![warn(missing_docs)]

pub mod bufferpool;
pub mod channel;
pub mod clock;
pub mod config;
pub mod context;
pub mod error;
pub mod lockfree;
pub mod scheduler;
pub mod select;
pub mod sharedmem;
pub mod sync;
pub mod task;
pub mod timer;
pub mod waitqueue;

pub use bufferpool::{BufferPool, PoolStats, PooledBuffer};
pub use channel::{channel, Channel, Receiver, Sender, TryReceiveError, TrySendError};
pub use clock::{DEFAULT, INFINITE};
pub use config::{Backoff, BufferPoolConfig, ChannelOptions, LoadBalancing, LockOptions, RetryOptions, SchedulerConfig};
pub use context::{background, with_cancel, with_deadline, with_timeout, with_value, CancelFn, Context};
pub use error::{Error, Result};
pub use lockfree::{MpmcQueue, PriorityQueue, SharedByteRing, SpscQueue};
pub use scheduler::{get_parallel_scheduler, initialize_parallel_scheduler, shutdown_parallel_scheduler, Scheduler};
pub use select::{select, SelectCase};
pub use sharedmem::{SharedMemoryManager, SharedRegion};
pub use sync::{Cond, Mutex, MutexGuard, Once, RwMutex, RwMutexReadGuard, RwMutexWriteGuard, Semaphore, WaitGroup};
pub use task::{go, go_all, go_on_worker, go_race, go_with_retry, Deferred, TaskOptions};
pub use timer::{sleep, Ticker, Timer};
