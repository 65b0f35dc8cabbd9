//! Cache Module
//!
//! Bounded local cache of durable blobs used by the storage client.
//!
//! ## Slots
//! - `Ready`: resolved bytes
//! - `Pending`: a prefetch for this address is in flight; readers block on
//!   the shared `Inflight` until the bulk get completes
//!
//! ## Concurrency
//! Backed by `quick_cache::sync::Cache`, which shards its map so lookups on
//! different keys never contend on one lock. `get_or_load` runs the loader
//! at most once per key while other callers for that key wait.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::{Condvar, Mutex};
use quick_cache::sync::{Cache, GuardResult};

use crate::address::Address;
use crate::error::Result;

// =============================================================================
// In-flight Bulk Fetch
// =============================================================================

enum InflightState {
    Waiting,
    Resolved(HashMap<Address, Bytes>),
    Failed,
}

/// One-shot completion shared by every address of a prefetch batch
pub struct Inflight {
    state: Mutex<InflightState>,
    done: Condvar,
}

impl Inflight {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(InflightState::Waiting),
            done: Condvar::new(),
        }
    }

    /// Publish the batch result and wake all waiters
    pub fn complete(&self, values: HashMap<Address, Bytes>) {
        *self.state.lock() = InflightState::Resolved(values);
        self.done.notify_all();
    }

    /// Mark the batch failed; waiters fall back to their own fetch
    pub fn fail(&self) {
        *self.state.lock() = InflightState::Failed;
        self.done.notify_all();
    }

    pub fn is_done(&self) -> bool {
        !matches!(*self.state.lock(), InflightState::Waiting)
    }

    /// Block until the batch settles; `None` if it failed or lacked `address`
    pub fn wait(&self, address: &Address) -> Option<Bytes> {
        let mut state = self.state.lock();
        while matches!(*state, InflightState::Waiting) {
            self.done.wait(&mut state);
        }
        match &*state {
            InflightState::Resolved(values) => values.get(address).cloned(),
            _ => None,
        }
    }
}

impl Default for Inflight {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Cache
// =============================================================================

/// Value held for one address
#[derive(Clone)]
pub enum CacheSlot {
    Ready(Bytes),
    Pending(Arc<Inflight>),
}

/// Snapshot of cache counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub loads: u64,
    pub len: usize,
    pub capacity: u64,
}

/// Bounded address → blob cache with stats
pub struct BlobCache {
    entries: Cache<Address, CacheSlot>,
    hits: AtomicU64,
    misses: AtomicU64,
    loads: AtomicU64,
}

impl BlobCache {
    /// Create a cache holding at most `capacity` entries
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Cache::new(capacity),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            loads: AtomicU64::new(0),
        }
    }

    /// Slot for `address`, counted as a hit or miss
    pub fn get(&self, address: &Address) -> Option<CacheSlot> {
        let slot = self.entries.get(address);
        match slot {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        slot
    }

    /// Whether any slot exists for `address` (no stats, no recency update)
    pub fn contains(&self, address: &Address) -> bool {
        self.entries.peek(address).is_some()
    }

    /// Whether resolved bytes are cached for `address`
    pub fn is_ready(&self, address: &Address) -> bool {
        matches!(self.entries.peek(address), Some(CacheSlot::Ready(_)))
    }

    pub fn insert(&self, address: Address, slot: CacheSlot) {
        self.entries.insert(address, slot);
    }

    /// Install `slot` only if nothing is cached or being loaded for
    /// `address`; never waits on another loader
    pub fn insert_if_absent(&self, address: Address, slot: CacheSlot) -> bool {
        match self.entries.get_value_or_guard(&address, Some(Duration::ZERO)) {
            GuardResult::Guard(guard) => guard.insert(slot).is_ok(),
            GuardResult::Value(_) | GuardResult::Timeout => false,
        }
    }

    pub fn invalidate(&self, address: &Address) {
        self.entries.remove(address);
    }

    /// Drop the placeholder for `address` if it still belongs to `inflight`
    pub fn invalidate_pending(&self, address: &Address, inflight: &Arc<Inflight>) {
        if let Some(CacheSlot::Pending(current)) = self.entries.peek(address) {
            if Arc::ptr_eq(&current, inflight) {
                self.entries.remove(address);
            }
        }
    }

    /// Cached slot, or the result of `load` stored as `Ready`
    pub fn get_or_load<F>(&self, address: Address, load: F) -> Result<CacheSlot>
    where
        F: FnOnce() -> Result<Bytes>,
    {
        let mut loaded = false;
        let slot = self.entries.get_or_insert_with(&address, || {
            loaded = true;
            self.loads.fetch_add(1, Ordering::Relaxed);
            load().map(CacheSlot::Ready)
        })?;

        if loaded {
            self.misses.fetch_add(1, Ordering::Relaxed);
        } else {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        Ok(slot)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            loads: self.loads.load(Ordering::Relaxed),
            len: self.entries.len(),
            capacity: self.entries.capacity(),
        }
    }
}
