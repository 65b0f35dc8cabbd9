//! Session Module
//!
//! A single-writer mutation session over one tree version.
//!
//! ## Responsibilities
//! - Own the `Novelty` that stages every page the session writes
//! - Route reads and writes through the current `BTree`
//! - Commit: persist the novelty through the storage client, then switch
//!   to the durable root and discard the novelty

use std::sync::Arc;

use bytes::Bytes;

use crate::address::Address;
use crate::error::Result;
use crate::novelty::Novelty;
use crate::page::PageLayout;
use crate::storage::StorageClient;
use crate::tree::BTree;

/// Mutation session
///
/// ## Concurrency Model: Single Writer
///
/// Every mutating method takes `&mut self`, so the borrow checker enforces
/// the one-writer-per-novelty rule. Several sessions may share one
/// `StorageClient`; they only ever exchange durable roots.
pub struct Session {
    /// Shared durable tier
    storage: Arc<StorageClient>,

    /// Current tree version
    tree: BTree,

    /// Pages and values written since the last commit
    novelty: Novelty,
}

impl Session {
    /// Open a session on `root`, or on a new empty tree
    pub fn open(storage: Arc<StorageClient>, layout: PageLayout, root: Option<Address>) -> Self {
        let mut novelty = Novelty::new();
        let tree = match root {
            Some(root) => BTree::load(Arc::clone(&storage), layout, root),
            None => BTree::create(&mut novelty, Arc::clone(&storage), layout),
        };

        Self {
            storage,
            tree,
            novelty,
        }
    }

    /// Get a value by key
    pub fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        self.tree.get(&self.novelty, key)
    }

    /// Put a key-value pair, replacing any existing value
    ///
    /// Returns whether the tree changed.
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> Result<bool> {
        self.tree.put(&mut self.novelty, key, value, true)
    }

    /// Put a key-value pair only if the key is absent
    ///
    /// Returns `false` when the key already existed.
    pub fn insert(&mut self, key: &[u8], value: &[u8]) -> Result<bool> {
        self.tree.put(&mut self.novelty, key, value, false)
    }

    /// Persist everything written so far and return the durable root
    pub fn commit(&mut self) -> Result<Address> {
        if self.tree.root().is_durable() {
            self.novelty = Novelty::new();
            return Ok(self.tree.root());
        }

        let staged = self.novelty.len();
        let root = self.storage.bulk_store(&self.tree, &self.novelty)?;

        // Only discard the novelty once every pack has landed
        self.tree = BTree::load(Arc::clone(&self.storage), self.tree.layout(), root);
        self.novelty = Novelty::new();

        tracing::info!("Committed {} staged blobs, root {}", staged, root);
        Ok(root)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Current root (novelty until the next commit)
    pub fn root(&self) -> Address {
        self.tree.root()
    }

    /// Whether there are changes not yet committed
    pub fn is_dirty(&self) -> bool {
        self.tree.root().is_novelty()
    }

    pub fn tree(&self) -> &BTree {
        &self.tree
    }

    pub fn novelty(&self) -> &Novelty {
        &self.novelty
    }

    pub fn layout(&self) -> PageLayout {
        self.tree.layout()
    }
}
