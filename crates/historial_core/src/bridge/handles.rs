//! Awaitable wrappers over connections, transactions and collections.

use crate::bridge::deferred::{deferred, Settlement};
use crate::bridge::request::{promisify, settle};
use crate::error::{CoreError, CoreResult};
use crate::key::{Direction, Key, KeyRange};
use crate::native::{
    Connection, Cursor, EventLoop, Index, ObjectStore, Request, Transaction, TransactionMode,
    TransactionPhase,
};
use historial_codec::Value;
use std::fmt;
use std::future::Future;

/// A shared, open database connection.
#[derive(Clone)]
pub struct ConnectionHandle {
    connection: Connection,
    events: EventLoop,
}

impl ConnectionHandle {
    pub(crate) fn new(connection: Connection, events: EventLoop) -> Self {
        Self { connection, events }
    }

    /// Database name.
    pub fn name(&self) -> &str {
        self.connection.name()
    }

    /// Database version.
    pub fn version(&self) -> u64 {
        self.connection.version()
    }

    /// Collection names, sorted.
    pub fn collection_names(&self) -> Vec<String> {
        self.connection.object_store_names()
    }

    /// Starts a transaction over `scope`. The first name is the collection
    /// returned by [`TransactionHandle::store`].
    ///
    /// # Errors
    ///
    /// See [`Connection::transaction`].
    pub fn transaction(&self, scope: &[&str], mode: TransactionMode) -> CoreResult<TransactionHandle> {
        let txn = self.connection.transaction(scope, mode)?;
        Ok(TransactionHandle::new(txn, self.events.clone()))
    }

    /// Closes the connection.
    pub fn close(&self) {
        self.connection.close();
    }

    /// Whether the connection was closed.
    pub fn is_closed(&self) -> bool {
        self.connection.is_closed()
    }

    /// The native connection.
    pub fn raw(&self) -> &Connection {
        &self.connection
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ConnectionHandle").field(&self.connection).finish()
    }
}

/// A transaction plus its completion future.
///
/// The completion resolves on the commit event and rejects with the
/// transaction's error on an error or abort event. Work is durable only
/// once [`done`](Self::done) resolves. Dropping the handle while the
/// transaction is still active aborts it.
pub struct TransactionHandle {
    txn: Transaction,
    events: EventLoop,
    completion: Option<Settlement<()>>,
}

impl TransactionHandle {
    pub(crate) fn new(txn: Transaction, events: EventLoop) -> Self {
        let (on_complete, completion) = deferred(&events);
        let on_error = on_complete.clone();
        let on_abort = on_complete.clone();
        let id = txn.id();
        txn.set_on_complete(move || {
            on_complete.resolve(());
        });
        // Error fires before abort, so a request failure wins over the
        // generic abort reason.
        txn.set_on_error(move |err| {
            on_error.reject(err.clone());
        });
        txn.set_on_abort(move || {
            on_abort.reject(CoreError::aborted(format!("transaction {id} was aborted")));
        });
        Self {
            txn,
            events,
            completion: Some(completion),
        }
    }

    /// The collection named first in the scope.
    pub fn store(&self) -> CoreResult<CollectionHandle> {
        let name = self
            .txn
            .scope()
            .first()
            .cloned()
            .ok_or_else(|| CoreError::invalid_state("transaction scope is empty"))?;
        self.collection(&name)
    }

    /// A collection in scope by name.
    pub fn collection(&self, name: &str) -> CoreResult<CollectionHandle> {
        let store = self.txn.object_store(name)?;
        Ok(CollectionHandle::new(store, self.events.clone()))
    }

    /// Access mode.
    pub fn mode(&self) -> TransactionMode {
        self.txn.mode()
    }

    /// Current phase.
    pub fn phase(&self) -> TransactionPhase {
        self.txn.phase()
    }

    /// The error that aborted the transaction, if any.
    pub fn error(&self) -> Option<CoreError> {
        self.txn.error()
    }

    /// Aborts the transaction. [`done`](Self::done) then rejects.
    pub fn abort(&self) -> CoreResult<()> {
        self.txn.abort()
    }

    /// Commits if still active and waits for the outcome.
    ///
    /// # Errors
    ///
    /// Returns the transaction's error when it aborted, including a failed
    /// journal write at commit.
    pub async fn done(mut self) -> CoreResult<()> {
        if self.txn.phase() == TransactionPhase::Active {
            self.txn.commit()?;
        }
        let completion = self
            .completion
            .take()
            .ok_or_else(|| CoreError::invalid_state("completion already awaited"))?;
        completion.await
    }
}

impl Drop for TransactionHandle {
    fn drop(&mut self) {
        if self.txn.phase() == TransactionPhase::Active {
            tracing::debug!(txn = self.txn.id(), "dropping active transaction; aborting");
            if let Err(err) = self.txn.abort() {
                tracing::warn!(error = %err, "could not abort dropped transaction");
            }
        }
    }
}

impl fmt::Debug for TransactionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TransactionHandle").field(&self.txn).finish()
    }
}

/// Awaitable operations on one collection inside a transaction.
///
/// Each call issues its native request immediately, so requests run in
/// call order even when the returned futures are awaited later.
#[derive(Clone)]
pub struct CollectionHandle {
    store: ObjectStore,
    events: EventLoop,
}

impl CollectionHandle {
    pub(crate) fn new(store: ObjectStore, events: EventLoop) -> Self {
        Self { store, events }
    }

    /// Collection name.
    pub fn name(&self) -> &str {
        self.store.name()
    }

    /// In-line key path, if any.
    pub fn key_path(&self) -> CoreResult<Option<String>> {
        self.store.key_path()
    }

    /// First record in `range`.
    pub fn get(&self, range: impl Into<KeyRange>) -> Settlement<Option<Value>> {
        promisify(&self.events, self.store.get(range))
    }

    /// All records in `range`, or all records.
    pub fn get_all(&self, range: Option<KeyRange>) -> Settlement<Vec<Value>> {
        promisify(&self.events, self.store.get_all(range))
    }

    /// Keys in `range`, or all keys.
    pub fn get_all_keys(&self, range: Option<KeyRange>) -> Settlement<Vec<Key>> {
        promisify(&self.events, self.store.get_all_keys(range))
    }

    /// Inserts or overwrites a record keyed by its key path.
    pub fn put(&self, value: Value) -> Settlement<Key> {
        promisify(&self.events, self.store.put(value, None))
    }

    /// Inserts or overwrites a record under an explicit key.
    pub fn put_with_key(&self, value: Value, key: impl Into<Key>) -> Settlement<Key> {
        promisify(&self.events, self.store.put(value, Some(key.into())))
    }

    /// Deletes every record in `range`.
    pub fn delete(&self, range: impl Into<KeyRange>) -> Settlement<()> {
        promisify(&self.events, self.store.delete(range))
    }

    /// Removes every record.
    pub fn clear(&self) -> Settlement<()> {
        promisify(&self.events, self.store.clear())
    }

    /// Number of records in `range`, or of all records.
    pub fn count(&self, range: Option<KeyRange>) -> Settlement<u64> {
        promisify(&self.events, self.store.count(range))
    }

    /// Opens a cursor. Resolves to `None` when nothing matches.
    pub fn open_cursor(
        &self,
        range: Option<KeyRange>,
        direction: Direction,
    ) -> impl Future<Output = CoreResult<Option<CursorHandle>>> {
        open_cursor(&self.events, self.store.open_cursor(range, direction))
    }

    /// An index of this collection.
    pub fn index(&self, name: &str) -> CoreResult<IndexHandle> {
        Ok(IndexHandle {
            index: self.store.index(name)?,
            events: self.events.clone(),
        })
    }

    /// The native collection.
    pub fn raw(&self) -> &ObjectStore {
        &self.store
    }
}

impl fmt::Debug for CollectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CollectionHandle").field(&self.store).finish()
    }
}

/// Awaitable lookups through an index.
#[derive(Clone)]
pub struct IndexHandle {
    index: Index,
    events: EventLoop,
}

impl IndexHandle {
    /// Index name.
    pub fn name(&self) -> &str {
        self.index.name()
    }

    /// First record whose index key is in `range`.
    pub fn get(&self, range: impl Into<KeyRange>) -> Settlement<Option<Value>> {
        promisify(&self.events, self.index.get(range))
    }

    /// All records whose index key is in `range`, in index order.
    pub fn get_all(&self, range: Option<KeyRange>) -> Settlement<Vec<Value>> {
        promisify(&self.events, self.index.get_all(range))
    }

    /// Number of records whose index key is in `range`.
    pub fn count(&self, range: Option<KeyRange>) -> Settlement<u64> {
        promisify(&self.events, self.index.count(range))
    }

    /// Opens a cursor in index order.
    pub fn open_cursor(
        &self,
        range: Option<KeyRange>,
        direction: Direction,
    ) -> impl Future<Output = CoreResult<Option<CursorHandle>>> {
        open_cursor(&self.events, self.index.open_cursor(range, direction))
    }
}

impl fmt::Debug for IndexHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("IndexHandle").field(&self.index).finish()
    }
}

fn open_cursor(
    events: &EventLoop,
    issued: CoreResult<Request<Option<Cursor>>>,
) -> impl Future<Output = CoreResult<Option<CursorHandle>>> {
    let events = events.clone();
    let step = issued.map(|request| (settle(&events, &request), request));
    async move {
        let (settlement, request) = step?;
        let cursor = settlement.await?;
        Ok(cursor.map(|cursor| CursorHandle {
            cursor,
            request,
            events,
        }))
    }
}

/// A cursor positioned on a record.
///
/// Stepping consumes the handle and resolves to the next position, or
/// `None` at the end of the walk.
pub struct CursorHandle {
    cursor: Cursor,
    request: Request<Option<Cursor>>,
    events: EventLoop,
}

impl CursorHandle {
    /// Current key: the index key for index cursors.
    pub fn key(&self) -> &Key {
        self.cursor.key()
    }

    /// Current primary key.
    pub fn primary_key(&self) -> &Key {
        self.cursor.primary_key()
    }

    /// Current record.
    pub fn value(&self) -> &Value {
        self.cursor.value()
    }

    /// Moves to the next entry.
    pub async fn next(self) -> CoreResult<Option<CursorHandle>> {
        self.advance(1).await
    }

    /// Skips `count` entries.
    pub async fn advance(self, count: usize) -> CoreResult<Option<CursorHandle>> {
        let CursorHandle {
            cursor,
            request,
            events,
        } = self;
        let settlement = settle(&events, &request);
        cursor.advance(count)?;
        let next = settlement.await?;
        Ok(next.map(|cursor| CursorHandle {
            cursor,
            request,
            events,
        }))
    }
}

impl fmt::Debug for CursorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CursorHandle")
            .field("key", self.key())
            .field("primary_key", self.primary_key())
            .finish()
    }
}
