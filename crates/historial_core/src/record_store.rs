//! Transactional access to one collection.

use crate::bridge::TransactionHandle;
use crate::connection::ConnectionManager;
use crate::error::CoreResult;
use crate::key::{Key, KeyRange};
use crate::native::TransactionMode;
use historial_codec::Value;
use std::rc::Rc;

/// Reads and writes records of a single collection.
///
/// [`begin`](Self::begin) hands out a transaction for multi-step work; the
/// other methods each run in a transaction of their own and resolve only
/// after it committed.
#[derive(Debug, Clone)]
pub struct RecordStore {
    manager: Rc<ConnectionManager>,
    collection: String,
}

impl RecordStore {
    /// Creates a store over `collection`.
    pub fn new(manager: Rc<ConnectionManager>, collection: impl Into<String>) -> Self {
        Self {
            manager,
            collection: collection.into(),
        }
    }

    /// Collection name.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// The connection manager in use.
    pub fn manager(&self) -> &Rc<ConnectionManager> {
        &self.manager
    }

    /// Starts a transaction scoped to the collection.
    ///
    /// Await each operation and then [`TransactionHandle::done`] before
    /// treating the work as durable.
    pub async fn begin(&self, mode: TransactionMode) -> CoreResult<TransactionHandle> {
        let connection = self.manager.connection().await?;
        connection.transaction(&[self.collection.as_str()], mode)
    }

    /// Every record, in key order.
    pub async fn get_all(&self) -> CoreResult<Vec<Value>> {
        let tx = self.begin(TransactionMode::ReadOnly).await?;
        let records = tx.store()?.get_all(None).await?;
        tx.done().await?;
        Ok(records)
    }

    /// One record by key.
    pub async fn get(&self, key: impl Into<Key>) -> CoreResult<Option<Value>> {
        let tx = self.begin(TransactionMode::ReadOnly).await?;
        let record = tx.store()?.get(key.into()).await?;
        tx.done().await?;
        Ok(record)
    }

    /// Inserts or overwrites one record.
    pub async fn put(&self, record: Value) -> CoreResult<Key> {
        let tx = self.begin(TransactionMode::ReadWrite).await?;
        let key = tx.store()?.put(record).await?;
        tx.done().await?;
        Ok(key)
    }

    /// Writes all records in one transaction: either all land or none.
    pub async fn put_all(&self, records: impl IntoIterator<Item = Value>) -> CoreResult<Vec<Key>> {
        let tx = self.begin(TransactionMode::ReadWrite).await?;
        let store = tx.store()?;
        let pending: Vec<_> = records.into_iter().map(|record| store.put(record)).collect();
        let mut keys = Vec::with_capacity(pending.len());
        for put in pending {
            keys.push(put.await?);
        }
        tx.done().await?;
        Ok(keys)
    }

    /// Deletes one record. Deleting an absent key succeeds.
    pub async fn delete(&self, key: impl Into<Key>) -> CoreResult<()> {
        let tx = self.begin(TransactionMode::ReadWrite).await?;
        tx.store()?.delete(KeyRange::only(key)).await?;
        tx.done().await
    }

    /// Number of records.
    pub async fn count(&self) -> CoreResult<u64> {
        let tx = self.begin(TransactionMode::ReadOnly).await?;
        let count = tx.store()?.count(None).await?;
        tx.done().await?;
        Ok(count)
    }

    /// Removes every record.
    pub async fn clear(&self) -> CoreResult<()> {
        let tx = self.begin(TransactionMode::ReadWrite).await?;
        tx.store()?.clear().await?;
        tx.done().await
    }

    /// Every key, walked with a cursor.
    pub async fn keys(&self) -> CoreResult<Vec<Key>> {
        let tx = self.begin(TransactionMode::ReadOnly).await?;
        let mut keys = Vec::new();
        let mut cursor = tx.store()?.open_cursor(None, Default::default()).await?;
        while let Some(position) = cursor {
            keys.push(position.primary_key().clone());
            cursor = position.next().await?;
        }
        tx.done().await?;
        Ok(keys)
    }
}
