//! Typed access to the students collection.

use crate::config::RecordsConfig;
use crate::error::AcademicResult;
use crate::model::Student;
use crate::rehydrate::{flatten, rehydrate, rehydrate_all};
use historial_core::{
    ConnectionManager, CoreResult, Factory, Key, RecordStore, StatsSnapshot, TransactionMode,
};
use std::rc::Rc;

/// Integer key a student id may have been stored under by older writers.
///
/// Such records rehydrate with the id as text, so every write and delete
/// also removes the integer key to keep one record per id.
fn integer_key(id: &str) -> Option<Key> {
    id.parse::<i64>()
        .ok()
        .filter(|n| n.to_string() == id)
        .map(Key::Integer)
}

/// Loads and stores [`Student`]s through a [`RecordStore`].
///
/// Errors pass through unchanged except in [`load_all`](Self::load_all),
/// which logs them and returns no students.
#[derive(Debug, Clone)]
pub struct StudentRepository {
    store: RecordStore,
}

impl StudentRepository {
    /// Creates a repository over `factory` laid out as `config` says.
    ///
    /// Nothing is opened until the first operation.
    pub fn new(factory: Factory, config: &RecordsConfig) -> Self {
        let manager = ConnectionManager::for_collection(
            factory,
            config.database.as_str(),
            config.version,
            config.collection.as_str(),
            config.key_path.as_str(),
        )
        .with_blocked_observer(|change| {
            tracing::warn!(
                old = change.old_version,
                new = ?change.new_version,
                "student records are held open elsewhere; waiting"
            );
        });
        Self::from_store(RecordStore::new(Rc::new(manager), config.collection.as_str()))
    }

    /// Creates a repository over an existing record store.
    pub fn from_store(store: RecordStore) -> Self {
        Self { store }
    }

    /// The underlying record store.
    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    /// Engine counters of the backing factory.
    pub fn stats(&self) -> StatsSnapshot {
        self.store.manager().factory().stats()
    }

    /// Every student, in id order.
    ///
    /// Never fails: a storage error is logged and yields an empty list.
    /// Records that cannot be rehydrated are skipped.
    pub async fn load_all(&self) -> Vec<Student> {
        match self.store.get_all().await {
            Ok(records) => {
                let students = rehydrate_all(&records);
                tracing::debug!(
                    stored = records.len(),
                    loaded = students.len(),
                    "students loaded"
                );
                students
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to load students");
                Vec::new()
            }
        }
    }

    /// One student by id.
    pub async fn find(&self, id: &str) -> AcademicResult<Option<Student>> {
        let tx = self.store.begin(TransactionMode::ReadOnly).await?;
        let students = tx.store()?;
        let mut record = students.get(id).await?;
        if record.is_none() {
            if let Some(key) = integer_key(id) {
                record = students.get(key).await?;
            }
        }
        tx.done().await?;
        match record {
            Some(record) => Ok(Some(rehydrate(&record)?)),
            None => Ok(None),
        }
    }

    /// Inserts or replaces a student.
    pub async fn save(&self, student: &Student) -> AcademicResult<()> {
        if let Err(err) = self.write(std::slice::from_ref(student)).await {
            tracing::error!(id = %student.id, error = %err, "failed to save student");
            return Err(err.into());
        }
        tracing::debug!(id = %student.id, "student saved");
        Ok(())
    }

    /// Saves every student in one transaction.
    pub async fn save_all(&self, students: &[Student]) -> AcademicResult<()> {
        if let Err(err) = self.write(students).await {
            tracing::error!(count = students.len(), error = %err, "failed to save students");
            return Err(err.into());
        }
        Ok(())
    }

    async fn write(&self, students: &[Student]) -> CoreResult<()> {
        let tx = self.store.begin(TransactionMode::ReadWrite).await?;
        let records = tx.store()?;
        for student in students {
            if let Some(key) = integer_key(&student.id) {
                records.delete(key).await?;
            }
            records.put(flatten(student)).await?;
        }
        tx.done().await
    }

    /// Deletes a student. Deleting an unknown id succeeds.
    pub async fn delete(&self, id: &str) -> AcademicResult<()> {
        if let Err(err) = self.remove(id).await {
            tracing::error!(id, error = %err, "failed to delete student");
            return Err(err.into());
        }
        tracing::debug!(id, "student deleted");
        Ok(())
    }

    async fn remove(&self, id: &str) -> CoreResult<()> {
        let tx = self.store.begin(TransactionMode::ReadWrite).await?;
        let records = tx.store()?;
        records.delete(id).await?;
        if let Some(key) = integer_key(id) {
            records.delete(key).await?;
        }
        tx.done().await
    }

    /// Number of stored students.
    pub async fn count(&self) -> AcademicResult<u64> {
        Ok(self.store.count().await?)
    }
}
