//! Manifest Module
//!
//! Names the current durable root of a tree kept in a data directory.
//!
//! ## File Format
//! ```text
//! ┌───────────┬──────────────┬───────────────────────────────┐
//! │ Magic (4) │ CRC32 (4,LE) │ Payload (bincode Manifest)    │
//! └───────────┴──────────────┴───────────────────────────────┘
//! ```
//! Saved through a temp file and rename, so a crash leaves either the old
//! or the new manifest.

use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::error::{AirError, Result};
use crate::page::PageLayout;

/// Magic bytes identifying an airtree manifest
const MAGIC: &[u8; 4] = b"AIRT";

/// Current manifest format version
pub const MANIFEST_VERSION: u16 = 1;

/// Magic (4) + CRC32 (4)
const HEADER_SIZE: usize = 8;

/// Manifest file name inside the data directory
pub const MANIFEST_FILENAME: &str = "MANIFEST";

/// Persisted description of a tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: u16,
    pub key_size: u32,
    pub base: u32,

    /// Durable root; `None` until the first commit
    pub root: Option<Address>,
}

impl Manifest {
    pub fn new(layout: PageLayout) -> Self {
        Self {
            version: MANIFEST_VERSION,
            key_size: layout.key_size() as u32,
            base: layout.base() as u32,
            root: None,
        }
    }

    /// Layout recorded in the manifest; `Corruption` if it is not a valid one
    pub fn layout(&self) -> Result<PageLayout> {
        PageLayout::new(self.key_size as usize, self.base as usize).map_err(|e| {
            AirError::Corruption(format!("Manifest records an invalid layout: {}", e))
        })
    }

    pub fn path(dir: &Path) -> PathBuf {
        dir.join(MANIFEST_FILENAME)
    }

    /// Load the manifest in `dir`, or `None` if there is none
    pub fn load(dir: &Path) -> Result<Option<Self>> {
        let data = match fs::read(Self::path(dir)) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if data.len() < HEADER_SIZE || &data[0..4] != MAGIC {
            return Err(AirError::Corruption(
                "Invalid manifest magic, expected AIRT".to_string(),
            ));
        }

        let mut crc = [0u8; 4];
        crc.copy_from_slice(&data[4..HEADER_SIZE]);
        let payload = &data[HEADER_SIZE..];
        if u32::from_le_bytes(crc) != crc32fast::hash(payload) {
            return Err(AirError::Corruption(
                "Manifest checksum mismatch".to_string(),
            ));
        }

        let manifest: Manifest = bincode::deserialize(payload)
            .map_err(|e| AirError::Serialization(e.to_string()))?;
        if manifest.version != MANIFEST_VERSION {
            return Err(AirError::Corruption(format!(
                "Unsupported manifest version: {}",
                manifest.version
            )));
        }
        if let Some(root) = manifest.root {
            if root.is_novelty() {
                return Err(AirError::Corruption(format!(
                    "Manifest names novelty root {}",
                    root
                )));
            }
        }
        manifest.layout()?;
        Ok(Some(manifest))
    }

    /// Atomically replace the manifest in `dir`
    pub fn save(&self, dir: &Path) -> Result<()> {
        if let Some(root) = self.root {
            if root.is_novelty() {
                return Err(AirError::InvalidAddress(format!(
                    "cannot record novelty root {}",
                    root
                )));
            }
        }

        let payload =
            bincode::serialize(self).map_err(|e| AirError::Serialization(e.to_string()))?;

        fs::create_dir_all(dir)?;
        let temp = dir.join(format!("{}.tmp", MANIFEST_FILENAME));
        {
            let mut file = File::create(&temp)?;
            file.write_all(MAGIC)?;
            file.write_all(&crc32fast::hash(&payload).to_le_bytes())?;
            file.write_all(&payload)?;
            file.sync_all()?;
        }
        fs::rename(&temp, Self::path(dir))?;
        Ok(())
    }
}
