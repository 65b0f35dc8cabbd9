//! Bottom (leaf) pages
//!
//! Entry addresses reference value blobs rather than child pages.

use bytes::Bytes;

use crate::address::Address;
use crate::error::Result;
use crate::novelty::Novelty;
use crate::storage::StorageClient;

use super::{Page, PutOutcome};

impl Page {
    pub(super) fn get_bottom(
        &self,
        key: &[u8],
        novelty: &Novelty,
        storage: &StorageClient,
    ) -> Result<Option<Bytes>> {
        let index = match self.binary_search(key) {
            Ok(index) => index,
            Err(_) => return Ok(None),
        };

        let value = match self.child_address(index) {
            Address::Novelty(slot) => novelty.lookup(slot)?,
            durable @ Address::Durable(_) => storage.lookup(durable)?,
        };
        Ok(Some(value))
    }

    pub(super) fn put_bottom(
        &mut self,
        key: &[u8],
        value: &[u8],
        overwrite: bool,
        novelty: &mut Novelty,
    ) -> Result<PutOutcome> {
        match self.binary_search(key) {
            Ok(_) if !overwrite => Ok(PutOutcome::unchanged()),
            Ok(index) => {
                let value_address = novelty.alloc(value);
                self.set_address(index, value_address);
                self.commit(novelty)?;
                Ok(PutOutcome::changed(None))
            }
            Err(pos) => {
                let value_address = novelty.alloc(value);
                let sibling = self.insert_at(pos, key, value_address, novelty);
                self.commit(novelty)?;
                if let Some(sibling) = &sibling {
                    sibling.commit(novelty)?;
                }
                Ok(PutOutcome::changed(sibling))
            }
        }
    }
}
