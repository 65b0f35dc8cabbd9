//! Page Module
//!
//! Fixed-capacity sorted arrays of (key, address) entries forming one level
//! of the tree.
//!
//! ## Page Format
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │ Entry 0:        [Key (key_size)][Address (16, BE)]       │
//! │ Entry 1:        [Key (key_size)][Address (16, BE)]       │
//! │ ... `base` slots, slots >= size are zero-filled ...      │
//! ├──────────────────────────────────────────────────────────┤
//! │ Type (1): 4 = Bottom, 5 = Internal                       │
//! │ Size (1): current entry count                            │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Copy-on-Write
//! A page loaded from a durable address is never modified. Mutation goes
//! through `mutable_copy`, which re-allocates the bytes in the session's
//! `Novelty` unless the page is already ephemeral.

mod bottom;
mod internal;

use std::fmt;

use bytes::Bytes;

use crate::address::{Address, ADDRESS_SIZE};
use crate::error::{AirError, Result};
use crate::novelty::Novelty;
use crate::storage::StorageClient;

// =============================================================================
// Layout
// =============================================================================

/// Default page fan-out
pub const DEFAULT_BASE: usize = 32;

/// Smallest fan-out that still splits into two non-empty pages
pub const MIN_BASE: usize = 2;

/// Largest fan-out the one-byte entry count can hold
pub const MAX_BASE: usize = u8::MAX as usize;

/// Size of the trailing metadata: type (1) + size (1)
pub const METADATA_SIZE: usize = 2;

/// Geometry shared by every page of a tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLayout {
    key_size: usize,
    base: usize,
}

impl PageLayout {
    /// Fails with `Config` unless `key_size > 0` and `base` is within
    /// `MIN_BASE..=MAX_BASE`
    pub fn new(key_size: usize, base: usize) -> Result<Self> {
        if key_size == 0 {
            return Err(AirError::Config("key_size must be positive".to_string()));
        }
        if !(MIN_BASE..=MAX_BASE).contains(&base) {
            return Err(AirError::Config(format!(
                "base must be within {}..={}, got {}",
                MIN_BASE, MAX_BASE, base
            )));
        }
        Ok(Self { key_size, base })
    }

    /// Layout with the default fan-out
    pub fn with_key_size(key_size: usize) -> Result<Self> {
        Self::new(key_size, DEFAULT_BASE)
    }

    pub fn key_size(&self) -> usize {
        self.key_size
    }

    pub fn base(&self) -> usize {
        self.base
    }

    /// Bytes per entry: key + address
    pub fn entry_size(&self) -> usize {
        self.key_size + ADDRESS_SIZE
    }

    /// Total encoded page length
    pub fn page_len(&self) -> usize {
        self.entry_size() * self.base + METADATA_SIZE
    }

    fn type_offset(&self) -> usize {
        self.entry_size() * self.base
    }

    fn size_offset(&self) -> usize {
        self.type_offset() + 1
    }

    /// Combined size at or below which two neighbours could be merged
    pub fn merge_limit(&self) -> usize {
        (self.base * 7) >> 3
    }

    /// Reject keys of the wrong width before they reach a page
    pub fn check_key(&self, key: &[u8]) -> Result<()> {
        if key.len() != self.key_size {
            return Err(AirError::InvalidKeyLength {
                expected: self.key_size,
                actual: key.len(),
            });
        }
        Ok(())
    }
}

// =============================================================================
// Page Kind
// =============================================================================

/// Page type tag stored in the metadata byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PageKind {
    /// Leaf level: entry addresses point at value blobs
    Bottom = 4,

    /// Inner level: entry addresses point at child pages
    Internal = 5,
}

impl TryFrom<u8> for PageKind {
    type Error = AirError;

    fn try_from(tag: u8) -> Result<Self> {
        match tag {
            4 => Ok(PageKind::Bottom),
            5 => Ok(PageKind::Internal),
            other => Err(AirError::Corruption(format!(
                "Unknown page type tag: {}",
                other
            ))),
        }
    }
}

// =============================================================================
// Put Outcome
// =============================================================================

/// Result of a recursive put
#[derive(Debug)]
pub struct PutOutcome {
    /// Whether the tree below this page changed
    pub changed: bool,

    /// Upper half produced by a split of this page, if any
    pub sibling: Option<Page>,
}

impl PutOutcome {
    fn unchanged() -> Self {
        Self {
            changed: false,
            sibling: None,
        }
    }

    fn changed(sibling: Option<Page>) -> Self {
        Self {
            changed: true,
            sibling,
        }
    }
}

// =============================================================================
// Page
// =============================================================================

/// Typed view over one encoded page
#[derive(Clone)]
pub struct Page {
    address: Address,
    layout: PageLayout,
    data: Vec<u8>,
}

impl Page {
    /// Allocate an empty page in `novelty`
    pub fn empty(kind: PageKind, layout: PageLayout, novelty: &mut Novelty) -> Self {
        let mut data = vec![0u8; layout.page_len()];
        data[layout.type_offset()] = kind as u8;
        let address = novelty.alloc(&data);
        Self {
            address,
            layout,
            data,
        }
    }

    /// Wrap encoded bytes read from `address`
    ///
    /// Fails with `Corruption` on a wrong length, an unknown type tag or
    /// an entry count above `base`.
    pub fn from_bytes(address: Address, layout: PageLayout, bytes: &[u8]) -> Result<Self> {
        if bytes.len() != layout.page_len() {
            return Err(AirError::Corruption(format!(
                "Page {} has {} bytes, expected {}",
                address,
                bytes.len(),
                layout.page_len()
            )));
        }
        PageKind::try_from(bytes[layout.type_offset()])?;
        let size = bytes[layout.size_offset()] as usize;
        if size > layout.base() {
            return Err(AirError::Corruption(format!(
                "Page {} claims {} entries, base is {}",
                address,
                size,
                layout.base()
            )));
        }
        Ok(Self {
            address,
            layout,
            data: bytes.to_vec(),
        })
    }

    /// Resolve `address` through novelty or storage
    ///
    /// Durable pages must reference only durable children (`Corruption`
    /// otherwise) and hand themselves to the storage client for prefetch.
    pub fn load(
        address: Address,
        layout: PageLayout,
        novelty: &Novelty,
        storage: &StorageClient,
    ) -> Result<Self> {
        match address {
            Address::Novelty(key) => {
                let bytes = novelty.lookup(key)?;
                Self::from_bytes(address, layout, &bytes)
            }
            Address::Durable(_) => {
                let bytes = storage.lookup(address)?;
                let page = Self::from_bytes(address, layout, &bytes)?;
                page.check_durable_children()?;
                storage.prefetch(&page);
                Ok(page)
            }
        }
    }

    /// A persisted page can only reference persisted blobs
    fn check_durable_children(&self) -> Result<()> {
        match self.entries().position(|(_, child)| child.is_novelty()) {
            Some(index) => Err(AirError::Corruption(format!(
                "Durable page {} references {} at entry {}",
                self.address,
                self.child_address(index),
                index
            ))),
            None => Ok(()),
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn layout(&self) -> PageLayout {
        self.layout
    }

    pub fn kind(&self) -> PageKind {
        // Validated in every constructor
        if self.data[self.layout.type_offset()] == PageKind::Internal as u8 {
            PageKind::Internal
        } else {
            PageKind::Bottom
        }
    }

    pub fn size(&self) -> usize {
        self.data[self.layout.size_offset()] as usize
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Encoded bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn key(&self, index: usize) -> &[u8] {
        let start = self.layout.entry_size() * index;
        &self.data[start..start + self.layout.key_size()]
    }

    /// Key of the first entry; zeros for an empty page
    pub fn min_key(&self) -> &[u8] {
        self.key(0)
    }

    pub fn child_address(&self, index: usize) -> Address {
        let start = self.layout.entry_size() * index + self.layout.key_size();
        let mut raw = [0u8; ADDRESS_SIZE];
        raw.copy_from_slice(&self.data[start..start + ADDRESS_SIZE]);
        Address::from_bytes(raw)
    }

    /// Iterate (key, address) pairs in key order
    pub fn entries(&self) -> impl Iterator<Item = (&[u8], Address)> + '_ {
        (0..self.size()).map(move |i| (self.key(i), self.child_address(i)))
    }

    // =========================================================================
    // Mutators
    // =========================================================================

    pub fn set(&mut self, index: usize, key: &[u8], address: Address) {
        let start = self.layout.entry_size() * index;
        self.data[start..start + self.layout.key_size()].copy_from_slice(key);
        self.set_address(index, address);
    }

    pub fn set_address(&mut self, index: usize, address: Address) {
        let start = self.layout.entry_size() * index + self.layout.key_size();
        address.write_to(&mut self.data[start..start + ADDRESS_SIZE]);
    }

    fn set_size(&mut self, size: usize) {
        let offset = self.layout.size_offset();
        self.data[offset] = size as u8;
    }

    // =========================================================================
    // Search
    // =========================================================================

    /// `Ok(index)` on an exact hit, `Err(insertion_point)` otherwise
    pub fn binary_search(&self, key: &[u8]) -> std::result::Result<usize, usize> {
        let mut low = 0;
        let mut high = self.size();
        while low < high {
            let mid = (low + high) >> 1;
            match self.key(mid).cmp(key) {
                std::cmp::Ordering::Less => low = mid + 1,
                std::cmp::Ordering::Greater => high = mid,
                std::cmp::Ordering::Equal => return Ok(mid),
            }
        }
        Err(low)
    }

    /// Look up `key` below this page
    pub fn get(
        &self,
        key: &[u8],
        novelty: &Novelty,
        storage: &StorageClient,
    ) -> Result<Option<Bytes>> {
        match self.kind() {
            PageKind::Bottom => self.get_bottom(key, novelty, storage),
            PageKind::Internal => self.get_internal(key, novelty, storage),
        }
    }

    /// Insert or overwrite `key` below this page
    ///
    /// Must be called on a mutable copy. On return this page and any
    /// returned sibling have been written back to `novelty`.
    pub fn put(
        &mut self,
        key: &[u8],
        value: &[u8],
        overwrite: bool,
        novelty: &mut Novelty,
        storage: &StorageClient,
    ) -> Result<PutOutcome> {
        match self.kind() {
            PageKind::Bottom => self.put_bottom(key, value, overwrite, novelty),
            PageKind::Internal => self.put_internal(key, value, overwrite, novelty, storage),
        }
    }

    // =========================================================================
    // Insert / Split
    // =========================================================================

    pub fn need_split(&self) -> bool {
        self.size() >= self.layout.base()
    }

    /// Whether two neighbours are small enough to share one page
    pub fn need_merge(left: &Page, right: &Page) -> bool {
        left.is_empty()
            || right.is_empty()
            || left.size() + right.size() <= left.layout.merge_limit()
    }

    /// Split point when inserting at `pos` into a full page
    ///
    /// Appends keep 7/8 of the entries on the left so sequential loads
    /// leave mostly-full pages behind.
    pub fn split_pos(&self, pos: usize) -> usize {
        let size = self.size();
        if pos < size {
            size >> 1
        } else {
            (size * 7) >> 3
        }
    }

    /// Insert an entry at `pos`, splitting if the page is full
    pub fn insert_at(
        &mut self,
        pos: usize,
        key: &[u8],
        address: Address,
        novelty: &mut Novelty,
    ) -> Option<Page> {
        if !self.need_split() {
            self.insert_directly(pos, key, address);
            return None;
        }

        let split_pos = self.split_pos(pos);
        let moved = self.size() - split_pos;
        let mut sibling = self.split(split_pos, moved, novelty);
        if pos < split_pos {
            self.insert_directly(pos, key, address);
        } else {
            sibling.insert_directly(pos - split_pos, key, address);
        }
        Some(sibling)
    }

    fn insert_directly(&mut self, pos: usize, key: &[u8], address: Address) {
        let entry = self.layout.entry_size();
        let size = self.size();
        self.data
            .copy_within(pos * entry..size * entry, (pos + 1) * entry);
        self.set(pos, key, address);
        self.set_size(size + 1);
    }

    /// Move entries `[from, from + len)` into a new novelty page
    pub fn split(&mut self, from: usize, len: usize, novelty: &mut Novelty) -> Page {
        let entry = self.layout.entry_size();
        let start = from * entry;
        let end = (from + len) * entry;

        let mut data = vec![0u8; self.layout.page_len()];
        data[..end - start].copy_from_slice(&self.data[start..end]);
        data[self.layout.type_offset()] = self.kind() as u8;
        data[self.layout.size_offset()] = len as u8;

        self.data[start..end].fill(0);
        self.set_size(self.size() - len);

        let address = novelty.alloc(&data);
        Page {
            address,
            layout: self.layout,
            data,
        }
    }

    // =========================================================================
    // Copy-on-Write
    // =========================================================================

    /// A page that may be modified: `self` if still ephemeral, otherwise a
    /// fresh novelty copy
    pub fn mutable_copy(&self, novelty: &mut Novelty) -> Page {
        match self.address {
            Address::Novelty(_) => self.clone(),
            Address::Durable(_) => Page {
                address: novelty.alloc(&self.data),
                layout: self.layout,
                data: self.data.clone(),
            },
        }
    }

    /// Write the current bytes back to this page's novelty slot
    pub fn commit(&self, novelty: &mut Novelty) -> Result<()> {
        match self.address {
            Address::Novelty(key) => novelty.update(key, &self.data),
            Address::Durable(_) => Err(AirError::InvalidAddress(format!(
                "durable page {} is immutable",
                self.address
            ))),
        }
    }
}

impl fmt::Debug for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Page")
            .field("address", &self.address)
            .field("kind", &self.kind())
            .field("size", &self.size())
            .finish()
    }
}
