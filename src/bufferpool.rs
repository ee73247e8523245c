//! Size-categorized pool of byte buffers with age-based reclamation.
//!
//! One `parking_lot::Mutex`-guarded category per configured size class. A
//! checked-out buffer's bytes are *moved* out of the category's storage into
//! the returned [`PooledBuffer`] (an RAII guard in the same style as
//! [`crate::sync::mutex::MutexGuard`]) rather than borrowed under a lock
//! held for the checkout's whole lifetime — so using a buffer never
//! contends the pool's internal lock, only checkout and `Drop`-triggered
//! return do.
//!
//! Background cleanup evicts buffers older than the configured max age that
//! are not checked out and replenishes each category toward a baseline
//! proportional to current allocation. That's realized as one step: age out
//! a free slot by replacing it in place with a freshly zeroed buffer of the
//! same size, resetting its age — eviction and baseline replenishment
//! collapse together since the category's total slot count never needs to
//! shrink only to be refilled moments later.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex as RawMutex;

use crate::config::BufferPoolConfig;
use crate::error::{Error, Result};

struct SlotMeta {
    created_at: Instant,
    last_accessed: Instant,
    access_count: u64,
}

struct Category {
    size: usize,
    max: usize,
    meta: Vec<SlotMeta>,
    /// `Some(bytes)` for a free (available) slot; `None` while checked out.
    storage: Vec<Option<Vec<u8>>>,
}

impl Category {
    fn new(size: usize, max: usize) -> Self {
        Category { size, max, meta: Vec::new(), storage: Vec::new() }
    }

    fn allocated(&self) -> usize {
        self.storage.len()
    }

    fn in_use(&self) -> usize {
        self.storage.iter().filter(|s| s.is_none()).count()
    }
}

#[derive(Default)]
struct Stats {
    hits: AtomicU64,
    misses: AtomicU64,
    exhausted: AtomicU64,
}

struct Inner {
    config: BufferPoolConfig,
    categories: Vec<RawMutex<Category>>,
    stats: Stats,
    cleanup_task: RawMutex<Option<tokio::task::JoinHandle<()>>>,
}

/// A pool of reusable byte buffers, grouped into the configured size classes.
pub struct BufferPool {
    inner: Arc<Inner>,
}

impl BufferPool {
    pub fn new(config: BufferPoolConfig) -> Result<Self> {
        config.validate()?;
        let categories = config
            .size_categories
            .iter()
            .map(|&size| RawMutex::new(Category::new(size, config.max_pool_size)))
            .collect();
        let inner = Arc::new(Inner { config, categories, stats: Stats::default(), cleanup_task: RawMutex::new(None) });
        let pool = BufferPool { inner };
        if pool.inner.config.enable_auto_cleanup {
            pool.spawn_cleanup();
        }
        Ok(pool)
    }

    fn category_index_for(&self, size: usize) -> Result<usize> {
        self.inner
            .config
            .size_categories
            .iter()
            .position(|&cat| cat >= size)
            .ok_or_else(|| Error::invalid_state(format!("no size category large enough for {size} bytes")))
    }

    /// Checks out a buffer from the smallest size category `>= size`,
    /// reusing a free one if available, otherwise allocating fresh up to
    /// `max_pool_size` per category.
    pub fn get_buffer(&self, size: usize) -> Result<PooledBuffer> {
        let cat_idx = self.category_index_for(size)?;
        let mut category = self.inner.categories[cat_idx].lock();
        let cat_size = category.size;

        if let Some(slot_idx) = category.storage.iter().position(|s| s.is_some()) {
            let bytes = category.storage[slot_idx].take().unwrap();
            category.meta[slot_idx].last_accessed = Instant::now();
            category.meta[slot_idx].access_count += 1;
            self.inner.stats.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(PooledBuffer { pool: self.inner.clone(), category_idx: cat_idx, slot_idx, bytes: Some(bytes) });
        }

        if category.allocated() >= category.max {
            self.inner.stats.exhausted.fetch_add(1, Ordering::Relaxed);
            return Err(Error::PoolExhausted(cat_size));
        }

        let slot_idx = category.storage.len();
        category.storage.push(None);
        category.meta.push(SlotMeta { created_at: Instant::now(), last_accessed: Instant::now(), access_count: 1 });
        self.inner.stats.misses.fetch_add(1, Ordering::Relaxed);
        Ok(PooledBuffer {
            pool: self.inner.clone(),
            category_idx: cat_idx,
            slot_idx,
            bytes: Some(vec![0u8; cat_size]),
        })
    }

    fn return_buffer(inner: &Inner, category_idx: usize, slot_idx: usize, mut bytes: Vec<u8>) {
        let mut category = inner.categories[category_idx].lock();
        bytes.iter_mut().for_each(|b| *b = 0);
        category.storage[slot_idx] = Some(bytes);
        category.meta[slot_idx].last_accessed = Instant::now();
    }

    pub fn stats(&self) -> PoolStats {
        let hits = self.inner.stats.hits.load(Ordering::Relaxed);
        let misses = self.inner.stats.misses.load(Ordering::Relaxed);
        let exhausted = self.inner.stats.exhausted.load(Ordering::Relaxed);
        let mut allocated_bytes = 0u64;
        let mut in_use_bytes = 0u64;
        for cat in &self.inner.categories {
            let cat = cat.lock();
            allocated_bytes += (cat.allocated() * cat.size) as u64;
            in_use_bytes += (cat.in_use() * cat.size) as u64;
        }
        let total_ops = hits + misses;
        PoolStats {
            hits,
            misses,
            exhausted,
            hit_rate: if total_ops == 0 { 0.0 } else { hits as f64 / total_ops as f64 },
            miss_rate: if total_ops == 0 { 0.0 } else { misses as f64 / total_ops as f64 },
            reuse_rate: if total_ops == 0 { 0.0 } else { hits as f64 / total_ops as f64 },
            memory_utilization: if allocated_bytes == 0 { 0.0 } else { in_use_bytes as f64 / allocated_bytes as f64 },
            allocated_bytes,
            in_use_bytes,
        }
    }

    fn spawn_cleanup(&self) {
        let inner = self.inner.clone();
        let interval = inner.config.cleanup_interval;
        let max_age = inner.config.max_buffer_age;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                Self::run_cleanup_pass(&inner, max_age);
            }
        });
        *self.inner.cleanup_task.lock() = Some(handle);
    }

    fn run_cleanup_pass(inner: &Inner, max_age: std::time::Duration) {
        let now = Instant::now();
        for cat in &inner.categories {
            let mut cat = cat.lock();
            let size = cat.size;
            for idx in 0..cat.storage.len() {
                let is_free = cat.storage[idx].is_some();
                let aged_out = now.saturating_duration_since(cat.meta[idx].last_accessed) >= max_age;
                if is_free && aged_out {
                    cat.storage[idx] = Some(vec![0u8; size]);
                    cat.meta[idx] = SlotMeta { created_at: now, last_accessed: now, access_count: 0 };
                }
            }
        }
    }

    /// Runs one cleanup pass immediately, outside the background schedule —
    /// primarily for deterministic tests.
    pub fn force_cleanup(&self) {
        Self::run_cleanup_pass(&self.inner, self.inner.config.max_buffer_age);
    }
}

impl Drop for BufferPool {
    fn drop(&mut self) {
        if let Some(handle) = self.inner.cleanup_task.lock().take() {
            handle.abort();
        }
    }
}

/// RAII handle to a checked-out buffer; returns it to its pool on `Drop`.
pub struct PooledBuffer {
    pool: Arc<Inner>,
    category_idx: usize,
    slot_idx: usize,
    bytes: Option<Vec<u8>>,
}

impl std::ops::Deref for PooledBuffer {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        self.bytes.as_deref().expect("PooledBuffer read after return")
    }
}

impl std::ops::DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.bytes.as_deref_mut().expect("PooledBuffer write after return")
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(bytes) = self.bytes.take() {
            BufferPool::return_buffer(&self.pool, self.category_idx, self.slot_idx, bytes);
        }
    }
}

/// Point-in-time pool statistics.
#[derive(Clone, Copy, Debug)]
pub struct PoolStats {
    pub hits: u64,
    pub misses: u64,
    pub exhausted: u64,
    pub hit_rate: f64,
    pub miss_rate: f64,
    pub reuse_rate: f64,
    pub memory_utilization: f64,
    pub allocated_bytes: u64,
    pub in_use_bytes: u64,
}
