//! Remote backend contract
//!
//! The tree only needs single-key get, bulk get and single-key set.
//! Timeouts and retries belong to implementations of this trait.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use bytes::Bytes;
use parking_lot::{Condvar, Mutex, RwLock};

use crate::error::{AirError, Result};

/// Overall status of a bulk get
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BulkStatus {
    Success,
    Failure(String),
}

/// Bulk get result; keys the backend could not serve are absent
#[derive(Debug, Clone)]
pub struct BulkGetResponse {
    pub status: BulkStatus,
    pub values: HashMap<String, Bytes>,
}

impl BulkGetResponse {
    pub fn success(values: HashMap<String, Bytes>) -> Self {
        Self {
            status: BulkStatus::Success,
            values,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            status: BulkStatus::Failure(message.into()),
            values: HashMap::new(),
        }
    }
}

/// One connection to the remote key-value tier
pub trait RemoteBackend: Send + Sync {
    /// Value for `key`, or `None` if the backend has none
    fn get(&self, key: &str) -> Result<Option<Bytes>>;

    /// Values for many keys in one request
    fn bulk_get(&self, keys: &[String]) -> Result<BulkGetResponse>;

    fn set(&self, key: &str, value: Bytes) -> Result<()>;
}

// =============================================================================
// In-memory Backend
// =============================================================================

/// Process-local backend with operation counters
///
/// Also carries switches for exercising failure and in-flight paths of the
/// storage client.
#[derive(Default)]
pub struct MemoryBackend {
    blobs: RwLock<HashMap<String, Bytes>>,

    gets: AtomicUsize,
    bulk_gets: AtomicUsize,
    sets: AtomicUsize,

    /// Bulk gets report `Failure` while set
    fail_bulk_gets: AtomicBool,

    /// Sets fail with `Backend` while set
    fail_sets: AtomicBool,

    /// Bulk gets block while the gate is held
    gate: Mutex<bool>,
    gate_opened: Condvar,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blobs
    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.blobs.read().contains_key(key)
    }

    /// Drop a blob, as premature garbage collection would
    pub fn remove(&self, key: &str) -> Option<Bytes> {
        self.blobs.write().remove(key)
    }

    pub fn get_count(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn bulk_get_count(&self) -> usize {
        self.bulk_gets.load(Ordering::SeqCst)
    }

    pub fn set_count(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }

    pub fn fail_bulk_gets(&self, fail: bool) {
        self.fail_bulk_gets.store(fail, Ordering::SeqCst);
    }

    pub fn fail_sets(&self, fail: bool) {
        self.fail_sets.store(fail, Ordering::SeqCst);
    }

    /// Hold every bulk get until `release_bulk_gets`
    pub fn hold_bulk_gets(&self) {
        *self.gate.lock() = true;
    }

    pub fn release_bulk_gets(&self) {
        *self.gate.lock() = false;
        self.gate_opened.notify_all();
    }

    fn wait_for_gate(&self) {
        let mut held = self.gate.lock();
        while *held {
            self.gate_opened.wait(&mut held);
        }
    }
}

impl RemoteBackend for MemoryBackend {
    fn get(&self, key: &str) -> Result<Option<Bytes>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        Ok(self.blobs.read().get(key).cloned())
    }

    fn bulk_get(&self, keys: &[String]) -> Result<BulkGetResponse> {
        self.bulk_gets.fetch_add(1, Ordering::SeqCst);
        self.wait_for_gate();

        if self.fail_bulk_gets.load(Ordering::SeqCst) {
            return Ok(BulkGetResponse::failure("bulk get disabled"));
        }

        let blobs = self.blobs.read();
        let values = keys
            .iter()
            .filter_map(|key| blobs.get(key).map(|value| (key.clone(), value.clone())))
            .collect();
        Ok(BulkGetResponse::success(values))
    }

    fn set(&self, key: &str, value: Bytes) -> Result<()> {
        if key.is_empty() {
            return Err(AirError::Backend("empty key".to_string()));
        }
        if self.fail_sets.load(Ordering::SeqCst) {
            return Err(AirError::Backend(format!("set {} rejected", key)));
        }
        self.sets.fetch_add(1, Ordering::SeqCst);
        self.blobs.write().insert(key.to_string(), value);
        Ok(())
    }
}
