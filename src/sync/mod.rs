//! Classical synchronization primitives: mutex, reader/writer lock,
//! semaphore, once-latch, wait group, condition variable.
//!
//! Each submodule is self-contained and built directly on
//! [`crate::waitqueue`].

pub mod cond;
pub mod mutex;
pub mod once;
pub mod rwmutex;
pub mod semaphore;
pub mod waitgroup;

pub use cond::Cond;
pub use mutex::{Mutex, MutexGuard};
pub use once::Once;
pub use rwmutex::{RwMutex, RwMutexReadGuard, RwMutexWriteGuard};
pub use semaphore::Semaphore;
pub use waitgroup::WaitGroup;
