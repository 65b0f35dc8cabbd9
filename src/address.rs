//! Address Module
//!
//! 128-bit page identifiers with two tiers:
//! - **Novelty**: ephemeral, resolvable only through the session's `Novelty`
//! - **Durable**: the content hash of a blob stored in the remote backend
//!
//! ## Wire Format (16 bytes, inside pages)
//! ```text
//! ┌──────────────────┬──────────────────┐
//! │  High (8, BE)    │   Low (8, BE)    │
//! └──────────────────┴──────────────────┘
//! ```
//! The lowest bit of `low` is the novelty tag. A novelty address stores its
//! key in `low >> 1` with `high == 0`; durable addresses always have the tag
//! cleared.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{AirError, Result};

/// Width of an encoded address
pub const ADDRESS_SIZE: usize = 16;

const NOVELTY_TAG: u64 = 1;

/// Identifier of a page or value blob
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Address {
    /// Key into the owning `Novelty`
    Novelty(u64),

    /// Content hash, tag bit cleared
    Durable(u128),
}

impl Address {
    /// Durable address for the given blob content
    pub fn from_content(bytes: &[u8]) -> Self {
        let digest = blake3::hash(bytes);
        let mut raw = [0u8; ADDRESS_SIZE];
        raw.copy_from_slice(&digest.as_bytes()[..ADDRESS_SIZE]);
        Self::durable(u128::from_be_bytes(raw))
    }

    /// Durable address from raw hash bits, normalizing the low bytes
    pub fn durable(hash: u128) -> Self {
        Address::Durable(hash & !(NOVELTY_TAG as u128))
    }

    pub fn is_novelty(&self) -> bool {
        matches!(self, Address::Novelty(_))
    }

    pub fn is_durable(&self) -> bool {
        matches!(self, Address::Durable(_))
    }

    /// Upper 64 bits of the wire form
    pub fn high_bytes(&self) -> u64 {
        match self {
            Address::Novelty(_) => 0,
            Address::Durable(hash) => (hash >> 64) as u64,
        }
    }

    /// Lower 64 bits of the wire form, tag included
    pub fn low_bytes(&self) -> u64 {
        match self {
            Address::Novelty(key) => (key << 1) | NOVELTY_TAG,
            Address::Durable(hash) => *hash as u64,
        }
    }

    /// Encode into the 16-byte big-endian wire form
    pub fn write_to(&self, out: &mut [u8]) {
        out[..8].copy_from_slice(&self.high_bytes().to_be_bytes());
        out[8..ADDRESS_SIZE].copy_from_slice(&self.low_bytes().to_be_bytes());
    }

    pub fn to_bytes(&self) -> [u8; ADDRESS_SIZE] {
        let mut out = [0u8; ADDRESS_SIZE];
        self.write_to(&mut out);
        out
    }

    /// Decode the 16-byte wire form
    pub fn read_from(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < ADDRESS_SIZE {
            return Err(AirError::Corruption(format!(
                "Address needs {} bytes, got {}",
                ADDRESS_SIZE,
                bytes.len()
            )));
        }
        let mut raw = [0u8; ADDRESS_SIZE];
        raw.copy_from_slice(&bytes[..ADDRESS_SIZE]);
        Ok(Self::from_bytes(raw))
    }

    /// Decode a full wire form
    pub fn from_bytes(raw: [u8; ADDRESS_SIZE]) -> Self {
        let wide = u128::from_be_bytes(raw);
        let low = wide as u64;
        if low & NOVELTY_TAG == NOVELTY_TAG {
            Address::Novelty(low >> 1)
        } else {
            Address::Durable(wide)
        }
    }

    /// Key under which a durable blob lives in the backend
    pub fn backend_key(&self) -> Result<String> {
        match self {
            Address::Durable(_) => Ok(hex::encode(self.to_bytes())),
            Address::Novelty(key) => Err(AirError::InvalidAddress(format!(
                "novelty:{} has no backend key",
                key
            ))),
        }
    }

    /// Inverse of `backend_key`
    pub fn from_backend_key(key: &str) -> Result<Self> {
        let bytes = hex::decode(key)
            .map_err(|e| AirError::InvalidAddress(format!("{}: {}", key, e)))?;
        if bytes.len() != ADDRESS_SIZE {
            return Err(AirError::InvalidAddress(format!(
                "{}: expected {} bytes, got {}",
                key,
                ADDRESS_SIZE,
                bytes.len()
            )));
        }
        match Self::read_from(&bytes)? {
            Address::Novelty(_) => Err(AirError::InvalidAddress(format!(
                "{}: novelty tag set on a backend key",
                key
            ))),
            durable => Ok(durable),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Novelty(key) => write!(f, "novelty:{}", key),
            Address::Durable(_) => f.write_str(&hex::encode(self.to_bytes())),
        }
    }
}
