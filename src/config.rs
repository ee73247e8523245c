//! Per-primitive configuration structs.
//!
//! Each is a plain struct with a `Default` impl carrying sane defaults and a
//! `validate()` that rejects nonsensical combinations. No persisted state,
//! no CLI surface, no environment variables — every option here is set by
//! the caller in code.

use crate::error::{Error, Result};
use std::time::Duration;

/// Shared by mutex/rwmutex/semaphore/cond: the default wait timeout and a
/// debug label.
#[derive(Clone, Debug)]
pub struct LockOptions {
    /// Default wait in milliseconds; `-1` (== [`crate::clock::INFINITE`]) means
    /// wait forever.
    pub timeout_ms: i64,
    /// Debug label surfaced in `tracing` events and panics-as-errors.
    pub name: Option<String>,
}

impl Default for LockOptions {
    fn default() -> Self {
        LockOptions { timeout_ms: crate::clock::INFINITE, name: None }
    }
}

/// Channel construction options.
#[derive(Clone, Debug)]
pub struct ChannelOptions {
    /// `0` means unbuffered (synchronous rendezvous).
    pub buffer_size: usize,
    /// Default op timeout in milliseconds; `-1` means wait forever.
    pub timeout_ms: i64,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        ChannelOptions { buffer_size: 0, timeout_ms: crate::clock::INFINITE }
    }
}

/// Backoff policy for [`crate::task::go_with_retry`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Backoff {
    Fixed,
    Exponential,
    Linear,
}

#[derive(Clone, Debug)]
pub struct RetryOptions {
    pub max_attempts: u32,
    pub backoff: Backoff,
    pub initial_delay: Duration,
    pub max_delay: Option<Duration>,
    /// Multiplier applied per attempt for `Exponential`, or the per-attempt
    /// increment (in units of `initial_delay`) for `Linear`.
    pub factor: f64,
}

impl Default for RetryOptions {
    fn default() -> Self {
        RetryOptions {
            max_attempts: 1,
            backoff: Backoff::Fixed,
            initial_delay: Duration::from_millis(100),
            max_delay: None,
            factor: 2.0,
        }
    }
}

impl RetryOptions {
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::invalid_state("max_attempts must be >= 1"));
        }
        if self.factor <= 0.0 {
            return Err(Error::invalid_state("factor must be > 0"));
        }
        Ok(())
    }

    /// Delay before the given retry attempt (1-indexed: attempt 1 is the
    /// first retry after the initial try).
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let base = match self.backoff {
            Backoff::Fixed => self.initial_delay,
            Backoff::Exponential => {
                let scaled = self.initial_delay.as_secs_f64() * self.factor.powi(attempt as i32 - 1);
                Duration::from_secs_f64(scaled.max(0.0))
            }
            Backoff::Linear => {
                let scaled = self.initial_delay.as_secs_f64() * (1.0 + self.factor * (attempt as f64 - 1.0));
                Duration::from_secs_f64(scaled.max(0.0))
            }
        };
        match self.max_delay {
            Some(cap) if base > cap => cap,
            _ => base,
        }
    }
}

/// Load-balancing strategy for the parallel scheduler.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LoadBalancing {
    RoundRobin,
    LeastBusy,
}

/// Parallel scheduler configuration.
#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    pub use_worker_threads: bool,
    pub thread_count: usize,
    pub cpu_affinity: Option<Vec<usize>>,
    pub shared_memory: bool,
    pub load_balancing: LoadBalancing,
    /// Default per-invocation timeout.
    pub timeout: Duration,
    /// Consecutive missed heartbeats before a worker is replaced.
    pub max_missed_heartbeats: u32,
    pub heartbeat_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            use_worker_threads: false,
            thread_count: num_cpus::get().max(1),
            cpu_affinity: None,
            shared_memory: false,
            load_balancing: LoadBalancing::LeastBusy,
            timeout: Duration::from_secs(30),
            max_missed_heartbeats: 3,
            heartbeat_interval: Duration::from_secs(1),
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.thread_count == 0 {
            return Err(Error::invalid_state("thread_count must be >= 1"));
        }
        if self.max_missed_heartbeats == 0 {
            return Err(Error::invalid_state("max_missed_heartbeats must be >= 1"));
        }
        Ok(())
    }
}

/// Buffer pool configuration.
#[derive(Clone, Debug)]
pub struct BufferPoolConfig {
    pub max_pool_size: usize,
    pub cleanup_interval: Duration,
    pub max_buffer_age: Duration,
    pub enable_auto_cleanup: bool,
    /// Power-of-two size categories, smallest to largest.
    pub size_categories: Vec<usize>,
    pub growth_factor: f64,
    pub enable_monitoring: bool,
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        BufferPoolConfig {
            max_pool_size: 64,
            cleanup_interval: Duration::from_secs(30),
            max_buffer_age: Duration::from_secs(300),
            enable_auto_cleanup: true,
            size_categories: vec![256, 1024, 4096, 16384, 65536, 262144],
            growth_factor: 2.0,
            enable_monitoring: true,
        }
    }
}

impl BufferPoolConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_pool_size == 0 {
            return Err(Error::invalid_state("max_pool_size must be >= 1"));
        }
        if self.size_categories.is_empty() {
            return Err(Error::invalid_state("size_categories must not be empty"));
        }
        if self.size_categories.windows(2).any(|w| w[0] >= w[1]) {
            return Err(Error::invalid_state("size_categories must be strictly increasing"));
        }
        Ok(())
    }
}
