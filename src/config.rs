//! Configuration for airtree
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::error::{AirError, Result};
use crate::page::PageLayout;

/// Main configuration for an airtree instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for the filesystem backend and the manifest
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── MANIFEST         (named root + layout)
    ///     └── blobs/           (one file per content-addressed blob)
    pub data_dir: PathBuf,

    // -------------------------------------------------------------------------
    // Page Layout
    // -------------------------------------------------------------------------
    /// Fixed key width in bytes
    pub key_size: usize,

    /// Maximum entries per page (fan-out), at most 255
    pub base: usize,

    // -------------------------------------------------------------------------
    // Storage Client Configuration
    // -------------------------------------------------------------------------
    /// Number of parallel backend connections
    pub connections: usize,

    /// Number of I/O worker threads (prefetch + bulk store packs)
    pub io_threads: usize,

    /// Local cache capacity (entries)
    pub cache_capacity: usize,

    /// Whether reads of durable pages prefetch their children
    pub prefetch: bool,

    /// Prefetches allowed in flight before new ones are skipped
    pub max_inflight_prefetches: usize,

    /// Entries per bulk store pack
    pub bulk_store_pack_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./airtree_data"),
            key_size: 8,
            base: 32,
            connections: 4,
            io_threads: 4,
            cache_capacity: 64 * 1024,
            prefetch: true,
            max_inflight_prefetches: 70,
            bulk_store_pack_size: 10_000,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Page layout derived from `key_size` and `base`
    pub fn layout(&self) -> Result<PageLayout> {
        PageLayout::new(self.key_size, self.base)
    }

    /// Check the settings that would otherwise break page encoding
    /// or leave the storage client without workers
    pub fn validate(&self) -> Result<()> {
        self.layout()?;
        if self.connections == 0 {
            return Err(AirError::Config("connections must be positive".to_string()));
        }
        if self.io_threads == 0 {
            return Err(AirError::Config("io_threads must be positive".to_string()));
        }
        if self.cache_capacity == 0 {
            return Err(AirError::Config("cache_capacity must be positive".to_string()));
        }
        if self.bulk_store_pack_size == 0 {
            return Err(AirError::Config(
                "bulk_store_pack_size must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for backend blobs and manifest)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the fixed key width
    pub fn key_size(mut self, size: usize) -> Self {
        self.config.key_size = size;
        self
    }

    /// Set the page fan-out
    pub fn base(mut self, base: usize) -> Self {
        self.config.base = base;
        self
    }

    /// Set the number of backend connections
    pub fn connections(mut self, count: usize) -> Self {
        self.config.connections = count;
        self
    }

    /// Set the number of I/O worker threads
    pub fn io_threads(mut self, count: usize) -> Self {
        self.config.io_threads = count;
        self
    }

    /// Set the cache capacity (entries)
    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.config.cache_capacity = capacity;
        self
    }

    /// Enable or disable read-triggered prefetch
    pub fn prefetch(mut self, enabled: bool) -> Self {
        self.config.prefetch = enabled;
        self
    }

    /// Set the in-flight prefetch ceiling
    pub fn max_inflight_prefetches(mut self, count: usize) -> Self {
        self.config.max_inflight_prefetches = count;
        self
    }

    /// Set the number of entries per bulk store pack
    pub fn bulk_store_pack_size(mut self, size: usize) -> Self {
        self.config.bulk_store_pack_size = size;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
