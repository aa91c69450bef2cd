//! # Historial Storage
//!
//! Byte store backends for the record database journal.
//!
//! Backends are **opaque append-only byte stores**: they do not interpret
//! the data they hold. The database owns framing and replay.
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - For tests and ephemeral databases
//! - [`FileBackend`] - For persistent storage, exclusively locked
//!
//! ## Example
//!
//! ```rust
//! use historial_storage::{InMemoryBackend, StorageBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! backend.append(b"hello").unwrap();
//! assert_eq!(backend.read_all().unwrap(), b"hello");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
