//! Error types for storage operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Another process holds the journal file.
    #[error("storage locked: {path} is in use by another process")]
    Locked {
        /// Path of the locked file.
        path: PathBuf,
    },

    /// The backend refuses writes.
    #[error("storage is read-only")]
    ReadOnly,
}
