//! BTree Module
//!
//! Copy-on-write B-tree over content-addressed pages.
//!
//! ## Lifecycle
//! - `create` allocates an empty Bottom root in the session's `Novelty`
//! - `load` wraps an existing root address (no I/O until first access)
//! - `put` copies every page on the root-to-leaf path into `Novelty`
//! - `store` hashes every novelty-reachable blob bottom-up and hands it to a
//!   `StorageConsumer`, producing a fully durable root

use std::sync::Arc;

use bytes::Bytes;

use crate::address::Address;
use crate::error::Result;
use crate::novelty::Novelty;
use crate::page::{Page, PageKind, PageLayout};
use crate::storage::StorageClient;

/// Sink for blobs produced by `BTree::store`
///
/// Children are always consumed before the pages that reference them.
pub trait StorageConsumer {
    fn consume(&mut self, address: Address, bytes: Bytes) -> Result<()>;
}

impl StorageConsumer for Vec<(Address, Bytes)> {
    fn consume(&mut self, address: Address, bytes: Bytes) -> Result<()> {
        self.push((address, bytes));
        Ok(())
    }
}

/// Handle on one version of the tree
///
/// Not safe for concurrent mutation: the copy-on-write protocol assumes a
/// single writer per `Novelty`.
#[derive(Clone)]
pub struct BTree {
    storage: Arc<StorageClient>,
    layout: PageLayout,
    root: Address,
}

impl BTree {
    /// Start a new tree with an empty Bottom root
    pub fn create(novelty: &mut Novelty, storage: Arc<StorageClient>, layout: PageLayout) -> Self {
        let root = Page::empty(PageKind::Bottom, layout, novelty).address();
        Self {
            storage,
            layout,
            root,
        }
    }

    /// Wrap an existing root
    pub fn load(storage: Arc<StorageClient>, layout: PageLayout, root: Address) -> Self {
        Self {
            storage,
            layout,
            root,
        }
    }

    pub fn root(&self) -> Address {
        self.root
    }

    pub fn layout(&self) -> PageLayout {
        self.layout
    }

    pub fn storage(&self) -> &Arc<StorageClient> {
        &self.storage
    }

    /// Resolve the current root page
    pub fn root_page(&self, novelty: &Novelty) -> Result<Page> {
        Page::load(self.root, self.layout, novelty, &self.storage)
    }

    /// Value stored under `key`, or `None` if absent
    pub fn get(&self, novelty: &Novelty, key: &[u8]) -> Result<Option<Bytes>> {
        self.layout.check_key(key)?;
        self.root_page(novelty)?.get(key, novelty, &self.storage)
    }

    /// Insert `key`, replacing an existing value only when `overwrite` is set
    ///
    /// Returns whether the tree changed.
    pub fn put(
        &mut self,
        novelty: &mut Novelty,
        key: &[u8],
        value: &[u8],
        overwrite: bool,
    ) -> Result<bool> {
        self.layout.check_key(key)?;

        let mut root = self.root_page(novelty)?.mutable_copy(novelty);
        let outcome = root.put(key, value, overwrite, novelty, &self.storage)?;
        if !outcome.changed {
            return Ok(false);
        }

        self.root = match outcome.sibling {
            Some(sibling) => {
                let mut new_root = Page::empty(PageKind::Internal, self.layout, novelty);
                new_root.insert_at(0, root.min_key(), root.address(), novelty);
                new_root.insert_at(1, sibling.min_key(), sibling.address(), novelty);
                new_root.commit(novelty)?;
                tracing::trace!("Root split, new root {}", new_root.address());
                new_root.address()
            }
            None => root.address(),
        };
        Ok(true)
    }

    /// Persist every novelty-reachable blob through `consumer`
    ///
    /// Durable subtrees are skipped. Returns the durable root address; the
    /// tree itself keeps pointing at the novelty root until reloaded.
    pub fn store(&self, novelty: &Novelty, consumer: &mut dyn StorageConsumer) -> Result<Address> {
        self.store_page(self.root, novelty, consumer)
    }

    fn store_page(
        &self,
        address: Address,
        novelty: &Novelty,
        consumer: &mut dyn StorageConsumer,
    ) -> Result<Address> {
        let key = match address {
            Address::Durable(_) => return Ok(address),
            Address::Novelty(key) => key,
        };

        let mut page = Page::from_bytes(address, self.layout, &novelty.lookup(key)?)?;
        for index in 0..page.size() {
            let child = page.child_address(index);
            if child.is_durable() {
                continue;
            }
            let durable = match page.kind() {
                PageKind::Internal => self.store_page(child, novelty, consumer)?,
                PageKind::Bottom => Self::store_value(child, novelty, consumer)?,
            };
            page.set_address(index, durable);
        }

        let bytes = Bytes::copy_from_slice(page.as_bytes());
        let durable = Address::from_content(&bytes);
        consumer.consume(durable, bytes)?;
        Ok(durable)
    }

    fn store_value(
        address: Address,
        novelty: &Novelty,
        consumer: &mut dyn StorageConsumer,
    ) -> Result<Address> {
        let bytes = novelty.resolve(address)?;
        let durable = Address::from_content(&bytes);
        consumer.consume(durable, bytes)?;
        Ok(durable)
    }
}
