//! # airtree
//!
//! An on-air B-tree: an immutable, copy-on-write B-tree whose pages are
//! persisted as content-addressed blobs in a remote key-value tier, with:
//! - A local write buffer (novelty) for pages not yet flushed
//! - Two-tier addressing (ephemeral novelty vs durable content hash)
//! - A caching storage client with asynchronous prefetch
//! - Packed, parallel bulk writes
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Session / BTree                            │
//! │              (get / put / store, single writer)              │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌───────────────┐
//!   │   Novelty   │          │ StorageClient │
//!   │ (ephemeral) │          │ cache+prefetch│
//!   └─────────────┘          └──────┬────────┘
//!                                   │
//!                                   ▼
//!                           ┌───────────────┐
//!                           │ RemoteBackend │
//!                           │ (N conns)     │
//!                           └───────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod address;
pub mod novelty;
pub mod page;
pub mod tree;
pub mod cache;
pub mod storage;
pub mod session;
pub mod manifest;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use address::Address;
pub use config::Config;
pub use error::{AirError, Result};
pub use novelty::Novelty;
pub use page::{Page, PageKind, PageLayout};
pub use session::Session;
pub use storage::{FsBackend, MemoryBackend, RemoteBackend, StorageClient};
pub use tree::{BTree, StorageConsumer};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of airtree
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
