//! File-based storage backend for persistent storage.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use fs2::FileExt;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// A journal file on disk.
///
/// The file is locked exclusively for the lifetime of the backend so two
/// processes cannot interleave journal frames.
///
/// # Durability
///
/// - `append` writes through to the OS
/// - `sync` calls `File::sync_all()`
///
/// # Example
///
/// ```no_run
/// use historial_storage::{FileBackend, StorageBackend};
/// use std::path::Path;
///
/// let mut backend = FileBackend::open(Path::new("records.journal")).unwrap();
/// backend.append(b"frame").unwrap();
/// backend.sync().unwrap();
/// ```
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileBackend {
    /// Opens or creates the journal at `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Locked`] if another process holds the file,
    /// or an I/O error if it cannot be opened.
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        file.try_lock_exclusive().map_err(|_| StorageError::Locked {
            path: path.to_path_buf(),
        })?;

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    /// Returns the path to the journal file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StorageBackend for FileBackend {
    fn read_all(&self) -> StorageResult<Vec<u8>> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(0))?;
        let mut buffer = Vec::new();
        file.read_to_end(&mut buffer)?;
        Ok(buffer)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        let mut file = self.file.lock();
        let offset = file.seek(SeekFrom::End(0))?;
        file.write_all(data)?;
        file.flush()?;
        Ok(offset)
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.file.lock().sync_all()?;
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.file.lock().metadata()?.len())
    }

    fn replace(&mut self, data: &[u8]) -> StorageResult<()> {
        let mut file = self.file.lock();
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(data)?;
        file.sync_all()?;
        Ok(())
    }
}

impl Drop for FileBackend {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&*self.file.lock());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn file_create_new() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("records.journal");

        let backend = FileBackend::open(&path).unwrap();
        assert_eq!(backend.size().unwrap(), 0);
        assert!(path.exists());
        assert_eq!(backend.path(), path);
    }

    #[test]
    fn file_create_with_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("records.journal");

        let backend = FileBackend::open(&path).unwrap();
        assert_eq!(backend.size().unwrap(), 0);
    }

    #[test]
    fn file_append_and_read() {
        let dir = tempdir().unwrap();
        let mut backend = FileBackend::open(&dir.path().join("j")).unwrap();

        assert_eq!(backend.append(b"hello").unwrap(), 0);
        assert_eq!(backend.append(b" world").unwrap(), 5);
        assert_eq!(backend.read_all().unwrap(), b"hello world");
        assert_eq!(backend.size().unwrap(), 11);
    }

    #[test]
    fn file_persistence() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("j");

        {
            let mut backend = FileBackend::open(&path).unwrap();
            backend.append(b"persistent data").unwrap();
            backend.sync().unwrap();
        }

        let backend = FileBackend::open(&path).unwrap();
        assert_eq!(backend.read_all().unwrap(), b"persistent data");
    }

    #[test]
    fn file_replace_truncates() {
        let dir = tempdir().unwrap();
        let mut backend = FileBackend::open(&dir.path().join("j")).unwrap();
        backend.append(b"a long journal").unwrap();

        backend.replace(b"short").unwrap();
        assert_eq!(backend.read_all().unwrap(), b"short");

        backend.append(b"!").unwrap();
        assert_eq!(backend.read_all().unwrap(), b"short!");
    }

    #[test]
    fn file_second_open_is_locked() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("j");

        let _first = FileBackend::open(&path).unwrap();
        let second = FileBackend::open(&path);
        assert!(matches!(second, Err(StorageError::Locked { .. })));
    }
}
