//! Storage backend trait definition.

use crate::error::StorageResult;

/// An append-only byte store holding a database journal.
///
/// Backends are **opaque**: they never interpret the bytes they hold. The
/// record database frames and decodes its own journal.
///
/// # Invariants
///
/// - `append` returns the offset at which the data starts
/// - `read_all` returns every byte appended since the last `replace`
/// - `sync` makes all appended data durable
/// - `replace` atomically swaps the whole content (used for compaction)
pub trait StorageBackend: Send + Sync {
    /// Reads the full content of the store.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn read_all(&self) -> StorageResult<Vec<u8>>;

    /// Appends data to the end of the store, returning its offset.
    ///
    /// # Errors
    ///
    /// Returns an error if the data cannot be written.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Makes all appended data durable.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync operation fails.
    fn sync(&mut self) -> StorageResult<()>;

    /// Returns the current size in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn size(&self) -> StorageResult<u64>;

    /// Replaces the whole content with `data`.
    ///
    /// # Errors
    ///
    /// Returns an error if the rewrite fails; the previous content may be
    /// lost in that case for file-backed stores.
    fn replace(&mut self, data: &[u8]) -> StorageResult<()>;
}

impl<B: StorageBackend + ?Sized> StorageBackend for Box<B> {
    fn read_all(&self) -> StorageResult<Vec<u8>> {
        (**self).read_all()
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        (**self).append(data)
    }

    fn sync(&mut self) -> StorageResult<()> {
        (**self).sync()
    }

    fn size(&self) -> StorageResult<u64> {
        (**self).size()
    }

    fn replace(&mut self, data: &[u8]) -> StorageResult<()> {
        (**self).replace(data)
    }
}
