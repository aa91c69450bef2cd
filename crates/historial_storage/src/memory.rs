//! In-memory storage backend.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// An in-memory byte store.
///
/// Clones share the same buffer, which lets a test drop a database and
/// reopen it over the same "disk".
///
/// # Example
///
/// ```rust
/// use historial_storage::{InMemoryBackend, StorageBackend};
///
/// let mut backend = InMemoryBackend::new();
/// let reopened = backend.clone();
/// backend.append(b"frame").unwrap();
/// assert_eq!(reopened.read_all().unwrap(), b"frame");
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryBackend {
    data: Arc<RwLock<Vec<u8>>>,
    read_only: Arc<AtomicBool>,
}

impl InMemoryBackend {
    /// Creates a new empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend with pre-existing content.
    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        Self {
            data: Arc::new(RwLock::new(data)),
            read_only: Arc::default(),
        }
    }

    /// Returns a copy of the content.
    #[must_use]
    pub fn data(&self) -> Vec<u8> {
        self.data.read().clone()
    }

    /// Makes every subsequent write fail with [`StorageError::ReadOnly`].
    ///
    /// Shared by all clones.
    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::SeqCst);
    }

    fn ensure_writable(&self) -> StorageResult<()> {
        if self.read_only.load(Ordering::SeqCst) {
            return Err(StorageError::ReadOnly);
        }
        Ok(())
    }
}

impl StorageBackend for InMemoryBackend {
    fn read_all(&self) -> StorageResult<Vec<u8>> {
        Ok(self.data.read().clone())
    }

    fn append(&mut self, new_data: &[u8]) -> StorageResult<u64> {
        self.ensure_writable()?;
        let mut data = self.data.write();
        let offset = data.len() as u64;
        data.extend_from_slice(new_data);
        Ok(offset)
    }

    fn sync(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.data.read().len() as u64)
    }

    fn replace(&mut self, new_data: &[u8]) -> StorageResult<()> {
        self.ensure_writable()?;
        let mut data = self.data.write();
        data.clear();
        data.extend_from_slice(new_data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_new_is_empty() {
        let backend = InMemoryBackend::new();
        assert_eq!(backend.size().unwrap(), 0);
        assert!(backend.read_all().unwrap().is_empty());
    }

    #[test]
    fn memory_append_returns_offsets() {
        let mut backend = InMemoryBackend::new();
        assert_eq!(backend.append(b"hello").unwrap(), 0);
        assert_eq!(backend.append(b" world").unwrap(), 5);
        assert_eq!(backend.read_all().unwrap(), b"hello world");
    }

    #[test]
    fn memory_clones_share_content() {
        let mut backend = InMemoryBackend::new();
        let other = backend.clone();
        backend.append(b"abc").unwrap();
        assert_eq!(other.size().unwrap(), 3);
    }

    #[test]
    fn memory_replace_swaps_content() {
        let mut backend = InMemoryBackend::with_data(b"old content".to_vec());
        backend.replace(b"new").unwrap();
        assert_eq!(backend.data(), b"new");
    }

    #[test]
    fn memory_read_only_rejects_writes() {
        let mut backend = InMemoryBackend::new();
        backend.set_read_only(true);
        assert!(matches!(backend.append(b"x"), Err(StorageError::ReadOnly)));
        assert!(matches!(backend.replace(b"x"), Err(StorageError::ReadOnly)));

        backend.set_read_only(false);
        assert!(backend.append(b"x").is_ok());
    }
}
