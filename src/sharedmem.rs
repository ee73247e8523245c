//! Named shared byte regions, the only raw cross-thread data substrate
//! besides the lock-free queues themselves.
//!
//! A `DashMap<String, Arc<SharedRegion>>` so any worker thread can look a
//! region up by the name it was told to bind at init. A region is a
//! fixed-size byte buffer behind a `parking_lot::Mutex`; callers copy bytes
//! in and out rather than holding a live reference across the thread
//! boundary — there is no aliasing to reason about.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex as RawMutex;

use crate::error::{Error, Result};

/// A fixed-size named byte region, shareable across threads via `Arc`.
pub struct SharedRegion {
    name: String,
    data: RawMutex<Vec<u8>>,
}

impl SharedRegion {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.data.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copies `bytes` into the region starting at `offset`.
    pub fn copy_in(&self, offset: usize, bytes: &[u8]) -> Result<()> {
        let mut data = self.data.lock();
        let end = offset.checked_add(bytes.len()).ok_or_else(|| Error::invalid_state("copy_in offset overflow"))?;
        if end > data.len() {
            return Err(Error::invalid_state(format!(
                "copy_in out of bounds: {end} > region size {}",
                data.len()
            )));
        }
        data[offset..end].copy_from_slice(bytes);
        Ok(())
    }

    /// Copies `len` bytes out of the region starting at `offset`.
    pub fn copy_out(&self, offset: usize, len: usize) -> Result<Vec<u8>> {
        let data = self.data.lock();
        let end = offset.checked_add(len).ok_or_else(|| Error::invalid_state("copy_out offset overflow"))?;
        if end > data.len() {
            return Err(Error::invalid_state(format!(
                "copy_out out of bounds: {end} > region size {}",
                data.len()
            )));
        }
        Ok(data[offset..end].to_vec())
    }
}

/// Registry of named [`SharedRegion`]s. One instance is typically shared
/// (via `Arc`) between the cooperative scheduler and every worker thread.
#[derive(Default)]
pub struct SharedMemoryManager {
    regions: DashMap<String, Arc<SharedRegion>>,
}

impl SharedMemoryManager {
    pub fn new() -> Self {
        SharedMemoryManager::default()
    }

    /// Creates a zero-filled region of `size` bytes under `name`. Errors if
    /// a region with that name already exists.
    pub fn create(&self, name: impl Into<String>, size: usize) -> Result<Arc<SharedRegion>> {
        let name = name.into();
        if self.regions.contains_key(&name) {
            return Err(Error::invalid_state(format!("shared region '{name}' already exists")));
        }
        let region = Arc::new(SharedRegion { name: name.clone(), data: RawMutex::new(vec![0u8; size]) });
        self.regions.insert(name, region.clone());
        Ok(region)
    }

    pub fn get(&self, name: &str) -> Option<Arc<SharedRegion>> {
        self.regions.get(name).map(|e| e.value().clone())
    }

    /// Releases a region's backing storage. Returns `false` if it did not exist.
    pub fn destroy(&self, name: &str) -> bool {
        self.regions.remove(name).is_some()
    }

    pub fn region_count(&self) -> usize {
        self.regions.len()
    }
}
