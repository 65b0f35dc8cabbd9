//! Novelty Module
//!
//! Process-local staging area for blobs that have not been flushed yet.
//!
//! ## Responsibilities
//! - Hand out ephemeral addresses for new pages and values
//! - Resolve those addresses for the lifetime of the session
//! - Allow in-place rewrites of still-ephemeral pages
//!
//! A `Novelty` belongs to exactly one mutation session and is not
//! synchronized; it is dropped once the tree has been stored.

use std::collections::HashMap;

use bytes::Bytes;

use crate::address::Address;
use crate::error::{AirError, Result};

/// In-memory store for unflushed blobs
#[derive(Debug, Default)]
pub struct Novelty {
    /// Blob bytes by novelty key
    blobs: HashMap<u64, Bytes>,

    /// Next key to hand out
    next_key: u64,

    /// Total bytes currently staged
    size: usize,
}

impl Novelty {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a copy of `bytes` under a fresh key
    pub fn alloc(&mut self, bytes: &[u8]) -> Address {
        let key = self.next_key;
        self.next_key += 1;
        self.size += bytes.len();
        self.blobs.insert(key, Bytes::copy_from_slice(bytes));
        Address::Novelty(key)
    }

    /// Bytes stored under `key`
    pub fn lookup(&self, key: u64) -> Result<Bytes> {
        self.blobs
            .get(&key)
            .cloned()
            .ok_or(AirError::NoveltyNotFound(key))
    }

    /// Overwrite a blob that has not been observed outside this session
    pub fn update(&mut self, key: u64, bytes: &[u8]) -> Result<()> {
        let slot = self
            .blobs
            .get_mut(&key)
            .ok_or(AirError::NoveltyNotFound(key))?;
        self.size = self.size - slot.len() + bytes.len();
        *slot = Bytes::copy_from_slice(bytes);
        Ok(())
    }

    /// Resolve a novelty address; durable addresses are rejected
    pub fn resolve(&self, address: Address) -> Result<Bytes> {
        match address {
            Address::Novelty(key) => self.lookup(key),
            Address::Durable(_) => Err(AirError::InvalidAddress(format!(
                "{} is not a novelty address",
                address
            ))),
        }
    }

    /// Number of staged blobs
    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    /// Approximate staged size in bytes
    pub fn size(&self) -> usize {
        self.size
    }
}
