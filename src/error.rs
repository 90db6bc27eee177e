//! Error types for gzipi
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using GzipiError
pub type Result<T> = std::result::Result<T, GzipiError>;

/// Unified error type for gzipi operations
#[derive(Debug, Error)]
pub enum GzipiError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Codec Errors
    // -------------------------------------------------------------------------
    #[error("codec error: {0}")]
    Codec(String),

    // -------------------------------------------------------------------------
    // Record Format Errors
    // -------------------------------------------------------------------------
    #[error("format error: {0}")]
    Format(String),

    // -------------------------------------------------------------------------
    // Lookup Errors
    // -------------------------------------------------------------------------
    #[error("key not found")]
    KeyNotFound,

    // -------------------------------------------------------------------------
    // Index Integrity Errors
    // -------------------------------------------------------------------------
    #[error("integrity error: {0}")]
    Integrity(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("configuration error: {0}")]
    Config(String),
}

impl GzipiError {
    /// Process exit code for this error kind.
    ///
    /// 1 = I/O, codec or format failure; 2 = bad configuration / usage;
    /// 3 = index integrity violation.
    pub fn exit_code(&self) -> i32 {
        match self {
            GzipiError::Config(_) => 2,
            GzipiError::Integrity(_) => 3,
            _ => 1,
        }
    }
}
