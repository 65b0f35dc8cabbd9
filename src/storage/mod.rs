//! Storage Module
//!
//! Durable tier of the tree: a remote key → bytes service reached through a
//! caching, prefetching client.
//!
//! ## Layers
//! ```text
//! ┌────────────────────────────────────────────┐
//! │ StorageClient                              │
//! │   lookup / bulk_lookup / prefetch /        │
//! │   bulk_store                               │
//! │ ┌──────────────┐   ┌─────────────────────┐ │
//! │ │  BlobCache   │   │ IoPool (workers)    │ │
//! │ └──────────────┘   └─────────────────────┘ │
//! ├────────────────────────────────────────────┤
//! │ N × RemoteBackend connections              │
//! │   (MemoryBackend, FsBackend, ...)          │
//! └────────────────────────────────────────────┘
//! ```

mod backend;
mod client;
mod fs;
mod pool;

pub use backend::{BulkGetResponse, BulkStatus, MemoryBackend, RemoteBackend};
pub use client::StorageClient;
pub use fs::FsBackend;
pub use pool::IoPool;
