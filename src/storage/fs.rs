//! Filesystem backend
//!
//! Stores each blob as its own file under a root directory.
//!
//! ## Blob File Format
//! ```text
//! ┌──────────────┬──────────────────────────────┐
//! │ CRC32 (4,LE) │           Payload            │
//! └──────────────┴──────────────────────────────┘
//! ```
//! Path: `{root}/{key[..2]}/{key}`. Files are written to a temp name, synced
//! and renamed into place, so readers never see a partial blob.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;

use crate::error::{AirError, Result};

use super::backend::{BulkGetResponse, RemoteBackend};

/// CRC32 (4)
const FRAME_HEADER_SIZE: usize = 4;

/// Directory-backed `RemoteBackend`
pub struct FsBackend {
    root: PathBuf,

    /// Suffix for temp files, unique per write
    next_temp: AtomicU64,
}

impl FsBackend {
    /// Open or create a blob directory
    pub fn open(path: &Path) -> Result<Self> {
        fs::create_dir_all(path)?;
        Ok(Self {
            root: path.to_path_buf(),
            next_temp: AtomicU64::new(0),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// "ab12..." → {root}/ab/ab12...
    fn blob_path(&self, key: &str) -> PathBuf {
        let shard = key.get(..2).unwrap_or("_");
        self.root.join(shard).join(key)
    }

    fn decode_frame(key: &str, data: Vec<u8>) -> Result<Bytes> {
        if data.len() < FRAME_HEADER_SIZE {
            return Err(AirError::Corruption(format!(
                "Blob {} truncated: {} bytes",
                key,
                data.len()
            )));
        }
        let mut crc = [0u8; FRAME_HEADER_SIZE];
        crc.copy_from_slice(&data[..FRAME_HEADER_SIZE]);
        let expected = u32::from_le_bytes(crc);
        let payload = &data[FRAME_HEADER_SIZE..];
        let actual = crc32fast::hash(payload);
        if expected != actual {
            return Err(AirError::Corruption(format!(
                "Blob {} checksum mismatch: expected {:08x}, got {:08x}",
                key, expected, actual
            )));
        }
        Ok(Bytes::copy_from_slice(payload))
    }

    fn read_blob(&self, key: &str) -> Result<Option<Bytes>> {
        match fs::read(self.blob_path(key)) {
            Ok(data) => Self::decode_frame(key, data).map(Some),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl RemoteBackend for FsBackend {
    fn get(&self, key: &str) -> Result<Option<Bytes>> {
        tracing::trace!("FsBackend get {}", key);
        self.read_blob(key)
    }

    fn bulk_get(&self, keys: &[String]) -> Result<BulkGetResponse> {
        let mut values = HashMap::with_capacity(keys.len());
        for key in keys {
            match self.read_blob(key) {
                Ok(Some(value)) => {
                    values.insert(key.clone(), value);
                }
                Ok(None) => {}
                Err(e) => return Ok(BulkGetResponse::failure(e.to_string())),
            }
        }
        Ok(BulkGetResponse::success(values))
    }

    fn set(&self, key: &str, value: Bytes) -> Result<()> {
        if key.is_empty() {
            return Err(AirError::Backend("empty key".to_string()));
        }

        let path = self.blob_path(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let temp_id = self.next_temp.fetch_add(1, Ordering::Relaxed);
        let temp = path.with_file_name(format!("{}.{}.tmp", key, temp_id));
        {
            let mut file = File::create(&temp)?;
            file.write_all(&crc32fast::hash(&value).to_le_bytes())?;
            file.write_all(&value)?;
            file.sync_all()?;
        }
        fs::rename(&temp, &path)?;

        tracing::trace!("FsBackend set {} ({} bytes)", key, value.len());
        Ok(())
    }
}
