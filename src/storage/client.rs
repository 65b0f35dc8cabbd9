//! Storage Client
//!
//! Mediates durable reads and writes against the remote backend.
//!
//! ## Responsibilities
//! - Cache-first point lookups (`lookup`)
//! - Strict all-or-nothing bulk reads (`bulk_lookup`)
//! - Fire-and-forget prefetch of the children of pages just read
//! - Packed, parallel writes of a tree's novelty (`bulk_store`)
//!
//! ## Concurrency:
//! - `cache`: sharded concurrent cache, the only shared mutable structure
//! - `next_connection`: relaxed atomic round-robin counter; lost updates only
//!   skew load balancing
//! - `prefetches`: set of page addresses with a prefetch in flight, bounded by
//!   `max_inflight_prefetches`
//! - All methods use `&self`; the client is shared behind an `Arc`

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use crossbeam::channel::Receiver;
use parking_lot::{Condvar, Mutex};

use crate::address::Address;
use crate::cache::{BlobCache, CacheSlot, CacheStats, Inflight};
use crate::config::Config;
use crate::error::{AirError, Result};
use crate::page::Page;
use crate::tree::{BTree, StorageConsumer};
use crate::novelty::Novelty;

use super::backend::{BulkGetResponse, BulkStatus, RemoteBackend};
use super::pool::IoPool;

// =============================================================================
// Prefetch Registry
// =============================================================================

/// Outcome of asking to start a prefetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Admitted,
    Saturated,
    Duplicate,
}

/// Pages whose children are being prefetched
#[derive(Default)]
struct PrefetchRegistry {
    pages: Mutex<HashSet<Address>>,
    idle: Condvar,
}

impl PrefetchRegistry {
    fn try_begin(&self, page: Address, ceiling: usize) -> Admission {
        let mut pages = self.pages.lock();
        if pages.len() >= ceiling {
            Admission::Saturated
        } else if !pages.insert(page) {
            Admission::Duplicate
        } else {
            Admission::Admitted
        }
    }

    fn finish(&self, page: &Address) {
        let mut pages = self.pages.lock();
        pages.remove(page);
        if pages.is_empty() {
            self.idle.notify_all();
        }
    }

    fn wait_idle(&self) {
        let mut pages = self.pages.lock();
        while !pages.is_empty() {
            self.idle.wait(&mut pages);
        }
    }

    fn len(&self) -> usize {
        self.pages.lock().len()
    }
}

/// State reachable from I/O worker threads
struct Shared {
    cache: BlobCache,
    prefetches: PrefetchRegistry,
}

/// One prefetch batch handed to a worker
struct PrefetchBatch {
    page: Address,
    addresses: Vec<Address>,
    keys: Vec<String>,
    inflight: Arc<Inflight>,
}

impl Shared {
    /// Replace placeholders with fetched bytes, or drop them on failure
    fn complete_prefetch(&self, batch: PrefetchBatch, result: Result<BulkGetResponse>) {
        let failure = match result {
            Ok(response) => match response.status {
                BulkStatus::Success => {
                    let mut resolved = HashMap::with_capacity(batch.addresses.len());
                    for (address, key) in batch.addresses.iter().zip(&batch.keys) {
                        match response.values.get(key) {
                            Some(value) => {
                                self.cache.insert(*address, CacheSlot::Ready(value.clone()));
                                resolved.insert(*address, value.clone());
                            }
                            None => self.cache.invalidate_pending(address, &batch.inflight),
                        }
                    }
                    tracing::trace!(
                        "Prefetch for {} resolved {}/{} blobs",
                        batch.page,
                        resolved.len(),
                        batch.addresses.len()
                    );
                    batch.inflight.complete(resolved);
                    None
                }
                BulkStatus::Failure(message) => Some(message),
            },
            Err(e) => Some(e.to_string()),
        };

        if let Some(message) = failure {
            tracing::warn!("Prefetch for {} failed: {}", batch.page, message);
            self.abandon_prefetch(&batch);
        }
        self.prefetches.finish(&batch.page);
    }

    fn abandon_prefetch(&self, batch: &PrefetchBatch) {
        for address in &batch.addresses {
            self.cache.invalidate_pending(address, &batch.inflight);
        }
        batch.inflight.fail();
    }
}

// =============================================================================
// Storage Client
// =============================================================================

/// Caching, prefetching client over N backend connections
pub struct StorageClient {
    connections: Vec<Arc<dyn RemoteBackend>>,
    next_connection: AtomicUsize,
    shared: Arc<Shared>,
    pool: IoPool,

    prefetch_enabled: bool,
    max_inflight_prefetches: usize,
    pack_size: usize,
}

impl StorageClient {
    /// Open `config.connections` connections through `connect`
    pub fn connect<F>(config: &Config, mut connect: F) -> Result<Self>
    where
        F: FnMut(usize) -> Result<Arc<dyn RemoteBackend>>,
    {
        config.validate()?;

        let connections = (0..config.connections)
            .map(&mut connect)
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(
            "Storage client: {} connections, {} I/O threads, cache capacity {}",
            connections.len(),
            config.io_threads,
            config.cache_capacity
        );

        Ok(Self {
            connections,
            next_connection: AtomicUsize::new(0),
            shared: Arc::new(Shared {
                cache: BlobCache::new(config.cache_capacity),
                prefetches: PrefetchRegistry::default(),
            }),
            pool: IoPool::new(config.io_threads)?,
            prefetch_enabled: config.prefetch,
            max_inflight_prefetches: config.max_inflight_prefetches,
            pack_size: config.bulk_store_pack_size,
        })
    }

    /// Use one shared backend for every connection slot
    pub fn with_backend(config: &Config, backend: Arc<dyn RemoteBackend>) -> Result<Self> {
        Self::connect(config, |_| Ok(Arc::clone(&backend)))
    }

    /// Round-robin connection choice
    fn next_connection(&self) -> Arc<dyn RemoteBackend> {
        let index = self.next_connection.fetch_add(1, Ordering::Relaxed) % self.connections.len();
        Arc::clone(&self.connections[index])
    }

    /// Synchronous single-key fetch on the fixed lookup connection
    fn fetch(&self, key: &str) -> Result<Bytes> {
        self.connections[0]
            .get(key)?
            .ok_or_else(|| AirError::NotFound {
                key: key.to_string(),
            })
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Bytes of the durable blob at `address`
    ///
    /// Blocks on the network on a cache miss, or on a pending prefetch that
    /// already covers `address`.
    pub fn lookup(&self, address: Address) -> Result<Bytes> {
        let key = address.backend_key()?;
        let slot = self
            .shared
            .cache
            .get_or_load(address, || self.fetch(&key))?;

        match slot {
            CacheSlot::Ready(bytes) => Ok(bytes),
            CacheSlot::Pending(inflight) => match inflight.wait(&address) {
                Some(bytes) => Ok(bytes),
                None => {
                    tracing::debug!("Prefetch did not deliver {}, fetching directly", address);
                    let bytes = self.fetch(&key)?;
                    self.shared
                        .cache
                        .insert(address, CacheSlot::Ready(bytes.clone()));
                    Ok(bytes)
                }
            },
        }
    }

    /// Fetch all `addresses` in one request and feed them to `consumer`
    ///
    /// Fails without calling `consumer` if the backend reports failure or
    /// omits any requested address.
    pub fn bulk_lookup<F>(&self, addresses: &[Address], mut consumer: F) -> Result<()>
    where
        F: FnMut(Address, Bytes),
    {
        if addresses.is_empty() {
            return Ok(());
        }

        let keys = addresses
            .iter()
            .map(Address::backend_key)
            .collect::<Result<Vec<_>>>()?;

        let response = self.next_connection().bulk_get(&keys)?;
        if let BulkStatus::Failure(message) = response.status {
            return Err(AirError::Backend(format!("Bulk get failed: {}", message)));
        }

        let mut resolved = Vec::with_capacity(addresses.len());
        for (address, key) in addresses.iter().zip(&keys) {
            let bytes = response
                .values
                .get(key)
                .cloned()
                .ok_or_else(|| AirError::NotFound { key: key.clone() })?;
            resolved.push((*address, bytes));
        }

        for (address, bytes) in resolved {
            self.shared
                .cache
                .insert(address, CacheSlot::Ready(bytes.clone()));
            consumer(address, bytes);
        }
        Ok(())
    }

    /// Warm the cache with the durable children of `page`
    ///
    /// Never blocks and never fails: skipped when disabled, when too many
    /// prefetches are in flight, when this page is already being prefetched,
    /// or when every child is already cached.
    pub fn prefetch(&self, page: &Page) {
        if !self.prefetch_enabled {
            return;
        }

        let mut seen = HashSet::new();
        let addresses: Vec<Address> = page
            .entries()
            .map(|(_, child)| child)
            .filter(|child| child.is_durable() && !self.shared.cache.contains(child))
            .filter(|child| seen.insert(*child))
            .collect();
        if addresses.is_empty() {
            return;
        }

        let page_address = page.address();
        match self
            .shared
            .prefetches
            .try_begin(page_address, self.max_inflight_prefetches)
        {
            Admission::Admitted => {}
            Admission::Saturated => {
                tracing::debug!("Prefetch for {} skipped: ceiling reached", page_address);
                return;
            }
            Admission::Duplicate => {
                tracing::debug!("Prefetch for {} already in flight", page_address);
                return;
            }
        }

        // A lookup may have filled a slot since the `contains` check above
        let inflight = Arc::new(Inflight::new());
        let addresses: Vec<Address> = addresses
            .into_iter()
            .filter(|address| {
                self.shared
                    .cache
                    .insert_if_absent(*address, CacheSlot::Pending(Arc::clone(&inflight)))
            })
            .collect();
        if addresses.is_empty() {
            self.shared.prefetches.finish(&page_address);
            return;
        }
        let keys: Vec<String> = addresses
            .iter()
            .filter_map(|address| address.backend_key().ok())
            .collect();

        tracing::trace!(
            "Prefetching {} children of {}",
            addresses.len(),
            page_address
        );

        let batch = PrefetchBatch {
            page: page_address,
            addresses,
            keys,
            inflight,
        };
        let connection = self.next_connection();
        let shared = Arc::clone(&self.shared);
        let fallback = PrefetchBatch {
            page: batch.page,
            addresses: batch.addresses.clone(),
            keys: Vec::new(),
            inflight: Arc::clone(&batch.inflight),
        };

        let submitted = self.pool.execute(move || {
            let result = connection.bulk_get(&batch.keys);
            shared.complete_prefetch(batch, result);
        });
        if let Err(e) = submitted {
            tracing::warn!("Prefetch for {} not submitted: {}", fallback.page, e);
            self.shared.abandon_prefetch(&fallback);
            self.shared.prefetches.finish(&fallback.page);
        }
    }

    /// Block until no prefetch is in flight
    pub fn wait_for_prefetches(&self) {
        self.shared.prefetches.wait_idle();
    }

    /// Number of pages with a prefetch in flight
    pub fn inflight_prefetches(&self) -> usize {
        self.shared.prefetches.len()
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Persist the novelty reachable from `tree` and return its durable root
    ///
    /// Blobs are packed `bulk_store_pack_size` at a time and written on
    /// round-robin connections in parallel; returns once every pack has
    /// landed, or with the first pack error.
    pub fn bulk_store(&self, tree: &BTree, novelty: &Novelty) -> Result<Address> {
        let mut writer = PackWriter::new(self);
        let root = tree.store(novelty, &mut writer)?;
        let summary = writer.finish()?;

        tracing::info!(
            "Stored root {}: {} blobs written in {} packs, {} already present",
            root,
            summary.written,
            summary.packs,
            summary.skipped
        );
        Ok(root)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn cache_stats(&self) -> CacheStats {
        self.shared.cache.stats()
    }

    /// Whether resolved bytes for `address` are cached
    pub fn is_cached(&self, address: &Address) -> bool {
        self.shared.cache.is_ready(address)
    }

    /// Drop any cached slot for `address`
    pub fn invalidate(&self, address: &Address) {
        self.shared.cache.invalidate(address);
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}

// =============================================================================
// Bulk Store Packing
// =============================================================================

/// Counters reported by a finished bulk store
struct PackSummary {
    written: usize,
    skipped: usize,
    packs: usize,
}

/// `StorageConsumer` that batches blobs into packs written on the pool
struct PackWriter<'a> {
    client: &'a StorageClient,
    pack: Vec<(Address, Bytes)>,
    pending: Vec<Receiver<Result<Vec<(Address, Bytes)>>>>,
    seen: HashSet<Address>,
    skipped: usize,
}

impl<'a> PackWriter<'a> {
    fn new(client: &'a StorageClient) -> Self {
        Self {
            client,
            pack: Vec::with_capacity(client.pack_size.min(1024)),
            pending: Vec::new(),
            seen: HashSet::new(),
            skipped: 0,
        }
    }

    fn dispatch(&mut self) -> Result<()> {
        if self.pack.is_empty() {
            return Ok(());
        }

        let pack = std::mem::take(&mut self.pack);
        let connection = self.client.next_connection();
        let receiver = self.client.pool.submit(move || {
            for (address, bytes) in &pack {
                connection.set(&address.backend_key()?, bytes.clone())?;
            }
            Ok(pack)
        })?;
        self.pending.push(receiver);
        Ok(())
    }

    /// Flush the last pack and wait for every pack to land
    fn finish(mut self) -> Result<PackSummary> {
        self.dispatch()?;

        let packs = self.pending.len();
        let mut written = 0;
        let mut first_error = None;
        for receiver in self.pending.drain(..) {
            let result = receiver
                .recv()
                .map_err(|_| AirError::Backend("bulk store worker vanished".to_string()))
                .and_then(|result| result);
            match result {
                Ok(pack) => {
                    written += pack.len();
                    for (address, bytes) in pack {
                        self.client
                            .shared
                            .cache
                            .insert(address, CacheSlot::Ready(bytes));
                    }
                }
                Err(e) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(PackSummary {
                written,
                skipped: self.skipped,
                packs,
            }),
        }
    }
}

impl StorageConsumer for PackWriter<'_> {
    fn consume(&mut self, address: Address, bytes: Bytes) -> Result<()> {
        if !self.seen.insert(address) {
            return Ok(());
        }
        if self.client.shared.cache.is_ready(&address) {
            self.skipped += 1;
            return Ok(());
        }

        self.pack.push((address, bytes));
        if self.pack.len() >= self.client.pack_size {
            self.dispatch()?;
        }
        Ok(())
    }
}
