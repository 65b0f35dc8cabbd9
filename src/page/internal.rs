//! Internal pages
//!
//! Entry `i` holds the minimum key of the child page at `child_address(i)`.

use bytes::Bytes;

use crate::error::Result;
use crate::novelty::Novelty;
use crate::storage::StorageClient;

use super::{Page, PageKind, PutOutcome};

impl Page {
    /// Child whose minimum key is the largest one <= `key`
    pub fn descend_index(&self, key: &[u8]) -> usize {
        match self.binary_search(key) {
            Ok(index) => index,
            Err(insertion) => insertion.saturating_sub(1),
        }
    }

    pub(super) fn get_internal(
        &self,
        key: &[u8],
        novelty: &Novelty,
        storage: &StorageClient,
    ) -> Result<Option<Bytes>> {
        if self.is_empty() {
            return Ok(None);
        }

        let mut page = self.load_child(self.descend_index(key), novelty, storage)?;
        while page.kind() == PageKind::Internal {
            if page.is_empty() {
                return Ok(None);
            }
            page = page.load_child(page.descend_index(key), novelty, storage)?;
        }
        page.get_bottom(key, novelty, storage)
    }

    pub(super) fn put_internal(
        &mut self,
        key: &[u8],
        value: &[u8],
        overwrite: bool,
        novelty: &mut Novelty,
        storage: &StorageClient,
    ) -> Result<PutOutcome> {
        let pos = self.descend_index(key);
        let mut child = self
            .load_child(pos, novelty, storage)?
            .mutable_copy(novelty);

        let outcome = child.put(key, value, overwrite, novelty, storage)?;
        if !outcome.changed {
            return Ok(PutOutcome::unchanged());
        }

        self.set(pos, child.min_key(), child.address());
        let sibling = match outcome.sibling {
            Some(split) => self.insert_at(pos + 1, split.min_key(), split.address(), novelty),
            None => None,
        };

        self.commit(novelty)?;
        if let Some(sibling) = &sibling {
            sibling.commit(novelty)?;
        }
        Ok(PutOutcome::changed(sibling))
    }

    fn load_child(&self, index: usize, novelty: &Novelty, storage: &StorageClient) -> Result<Page> {
        Page::load(self.child_address(index), self.layout, novelty, storage)
    }
}
