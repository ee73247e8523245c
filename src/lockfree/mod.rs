//! Shared lock-free data structures: SPSC ring, MPMC queue, priority queue.
//!
//! These are the only classical-primitive-shaped types this crate permits
//! to cross the worker-thread boundary — everything in [`crate::sync`] is
//! explicitly scoped to a single scheduler.

pub mod mpmc;
pub mod priority;
pub mod spsc;

pub use mpmc::MpmcQueue;
pub use priority::PriorityQueue;
pub use spsc::{SharedByteRing, SpscQueue};
