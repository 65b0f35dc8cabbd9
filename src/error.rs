//! Error types for airtree
//!
//! Provides a unified error type for all operations. A key that is simply
//! absent from the tree is `Ok(None)`, never an error.

use thiserror::Error;

/// Result type alias using AirError
pub type Result<T> = std::result::Result<T, AirError>;

/// Unified error type for airtree operations
#[derive(Debug, Error)]
pub enum AirError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Data Integrity Errors (fatal, never retried)
    // -------------------------------------------------------------------------
    #[error("Corruption detected: {0}")]
    Corruption(String),

    #[error("Blob not found in backend: {key}")]
    NotFound { key: String },

    #[error("Novelty key {0} was never allocated")]
    NoveltyNotFound(u64),

    // -------------------------------------------------------------------------
    // Caller Contract Errors
    // -------------------------------------------------------------------------
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid key length: expected {expected} bytes, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    // -------------------------------------------------------------------------
    // Backend Errors
    // -------------------------------------------------------------------------
    #[error("Backend error: {0}")]
    Backend(String),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}
