//! Collections, indexes and cursors inside a transaction.

use crate::error::{CoreError, CoreResult};
use crate::key::{Direction, Key, KeyRange};
use crate::native::request::{Request, WeakRequest};
use crate::native::state::{Entry, Mutation};
use crate::native::transaction::TxnInner;
use historial_codec::Value;
use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

/// A collection seen through one transaction.
///
/// Methods return a [`Request`] that succeeds or fails once the event loop
/// runs it. Problems detectable at call time (inactive transaction,
/// read-only mode, a missing key) are returned immediately instead.
#[derive(Clone)]
pub struct ObjectStore {
    txn: Rc<TxnInner>,
    name: String,
}

impl ObjectStore {
    pub(crate) fn new(txn: Rc<TxnInner>, name: &str) -> Self {
        Self {
            txn,
            name: name.to_string(),
        }
    }

    /// Collection name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Key path records are keyed by, if keys are in-line.
    pub fn key_path(&self) -> CoreResult<Option<String>> {
        let working = self.txn.working.borrow();
        let store = working.store(&self.name)?;
        Ok(store.key_path.as_ref().map(|p| p.as_str().to_string()))
    }

    /// Names of the collection's indexes.
    pub fn index_names(&self) -> CoreResult<Vec<String>> {
        let working = self.txn.working.borrow();
        Ok(working.store(&self.name)?.indexes.keys().cloned().collect())
    }

    /// First record in `range`.
    pub fn get(&self, range: impl Into<KeyRange>) -> CoreResult<Request<Option<Value>>> {
        let (name, range) = (self.name.clone(), range.into());
        self.txn.issue(move |txn| {
            txn.note_read(&name, &range);
            let working = txn.working.borrow();
            let store = working.store(&name)?;
            Ok(store
                .records
                .iter()
                .find(|(key, _)| range.contains(key))
                .map(|(_, value)| value.clone()))
        })
    }

    /// All records in `range` (every record when `None`), in key order.
    pub fn get_all(&self, range: Option<KeyRange>) -> CoreResult<Request<Vec<Value>>> {
        let (name, range) = (self.name.clone(), range.unwrap_or_default());
        self.txn.issue(move |txn| {
            txn.note_read(&name, &range);
            let working = txn.working.borrow();
            let store = working.store(&name)?;
            Ok(store
                .records
                .iter()
                .filter(|(key, _)| range.contains(key))
                .map(|(_, value)| value.clone())
                .collect())
        })
    }

    /// Keys of all records in `range`, ascending.
    pub fn get_all_keys(&self, range: Option<KeyRange>) -> CoreResult<Request<Vec<Key>>> {
        let (name, range) = (self.name.clone(), range.unwrap_or_default());
        self.txn.issue(move |txn| {
            txn.note_read(&name, &range);
            let working = txn.working.borrow();
            let store = working.store(&name)?;
            Ok(store
                .records
                .keys()
                .filter(|key| range.contains(key))
                .cloned()
                .collect())
        })
    }

    /// Inserts or overwrites a record. Resolves to its key.
    ///
    /// Collections with a key path take the key from the record and reject
    /// an explicit `key`; collections without one require it.
    pub fn put(&self, value: Value, key: Option<Key>) -> CoreResult<Request<Key>> {
        self.txn.ensure_active()?;
        self.txn.ensure_writable(&self.name)?;
        let key = {
            let working = self.txn.working.borrow();
            let store = working.store(&self.name)?;
            match (&store.key_path, key) {
                (Some(path), None) => path.extract(&value)?,
                (None, Some(key)) => key,
                (Some(path), Some(_)) => {
                    return Err(CoreError::data(format!(
                        "collection {:?} keys records by {path}; pass no explicit key",
                        self.name
                    )))
                }
                (None, None) => {
                    return Err(CoreError::data(format!(
                        "collection {:?} has no key path; a key is required",
                        self.name
                    )))
                }
            }
        };
        let name = self.name.clone();
        self.txn.issue(move |txn| {
            txn.stage(Mutation::Put {
                store: name,
                key: key.clone(),
                value,
            })?;
            Ok(key)
        })
    }

    /// Deletes every record in `range`. Deleting absent keys succeeds.
    pub fn delete(&self, range: impl Into<KeyRange>) -> CoreResult<Request<()>> {
        self.txn.ensure_active()?;
        self.txn.ensure_writable(&self.name)?;
        let (name, range) = (self.name.clone(), range.into());
        self.txn.issue(move |txn| {
            let keys: Vec<Key> = txn
                .working
                .borrow()
                .store(&name)?
                .records
                .keys()
                .filter(|key| range.contains(key))
                .cloned()
                .collect();
            for key in keys {
                txn.stage(Mutation::Delete {
                    store: name.clone(),
                    key,
                })?;
            }
            Ok(())
        })
    }

    /// Removes every record.
    pub fn clear(&self) -> CoreResult<Request<()>> {
        self.txn.ensure_active()?;
        self.txn.ensure_writable(&self.name)?;
        let name = self.name.clone();
        self.txn.issue(move |txn| txn.stage(Mutation::Clear { store: name }))
    }

    /// Number of records in `range`.
    pub fn count(&self, range: Option<KeyRange>) -> CoreResult<Request<u64>> {
        let (name, range) = (self.name.clone(), range.unwrap_or_default());
        self.txn.issue(move |txn| {
            txn.note_read(&name, &range);
            let working = txn.working.borrow();
            let store = working.store(&name)?;
            Ok(store.records.keys().filter(|key| range.contains(key)).count() as u64)
        })
    }

    /// Opens a cursor over records in `range`.
    ///
    /// Succeeds with `None` when nothing matches; otherwise the same request
    /// succeeds again after every [`Cursor::continue_`].
    pub fn open_cursor(
        &self,
        range: Option<KeyRange>,
        direction: Direction,
    ) -> CoreResult<Request<Option<Cursor>>> {
        let (name, range) = (self.name.clone(), range.unwrap_or_default());
        open_cursor(&self.txn, move |txn| {
            txn.note_read(&name, &range);
            Ok(txn.working.borrow().store(&name)?.scan(&range, direction))
        })
    }

    /// Returns a handle to an index of this collection.
    pub fn index(&self, name: &str) -> CoreResult<Index> {
        self.txn.ensure_active()?;
        self.txn.working.borrow().store(&self.name)?.index(&self.name, name)?;
        Ok(Index {
            txn: Rc::clone(&self.txn),
            store: self.name.clone(),
            name: name.to_string(),
        })
    }

    /// Creates an index. Only allowed during a version upgrade.
    ///
    /// # Errors
    ///
    /// Fails outside an upgrade, for a duplicate name, or when `unique`
    /// is requested and existing records already collide.
    pub fn create_index(&self, name: &str, key_path: &str, unique: bool) -> CoreResult<Index> {
        self.txn.ensure_version_change("creating an index")?;
        self.txn.ensure_active()?;
        self.txn.stage(Mutation::CreateIndex {
            store: self.name.clone(),
            name: name.to_string(),
            key_path: key_path.to_string(),
            unique,
        })?;
        Ok(Index {
            txn: Rc::clone(&self.txn),
            store: self.name.clone(),
            name: name.to_string(),
        })
    }

    /// Deletes an index. Only allowed during a version upgrade.
    pub fn delete_index(&self, name: &str) -> CoreResult<()> {
        self.txn.ensure_version_change("deleting an index")?;
        self.txn.ensure_active()?;
        self.txn.stage(Mutation::DeleteIndex {
            store: self.name.clone(),
            name: name.to_string(),
        })
    }
}

impl fmt::Debug for ObjectStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectStore")
            .field("name", &self.name)
            .field("txn", &self.txn.id)
            .finish()
    }
}

/// A secondary view of a collection, ordered by a key path inside each
/// record. Lookups scan the collection.
#[derive(Clone)]
pub struct Index {
    txn: Rc<TxnInner>,
    store: String,
    name: String,
}

impl Index {
    /// Index name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Key path the index reads.
    pub fn key_path(&self) -> CoreResult<String> {
        let working = self.txn.working.borrow();
        let spec = working.store(&self.store)?.index(&self.store, &self.name)?;
        Ok(spec.key_path.as_str().to_string())
    }

    /// Whether the index rejects duplicate keys.
    pub fn unique(&self) -> CoreResult<bool> {
        let working = self.txn.working.borrow();
        Ok(working.store(&self.store)?.index(&self.store, &self.name)?.unique)
    }

    fn entries(
        txn: &TxnInner,
        store: &str,
        name: &str,
        range: &KeyRange,
        direction: Direction,
    ) -> CoreResult<Vec<Entry>> {
        // Index keys say nothing about primary keys; the whole collection
        // counts as read.
        txn.note_read(store, &KeyRange::unbounded());
        let working = txn.working.borrow();
        let data = working.store(store)?;
        let spec = data.index(store, name)?;
        Ok(data.index_scan(spec, range, direction))
    }

    /// First record whose index key is in `range`.
    pub fn get(&self, range: impl Into<KeyRange>) -> CoreResult<Request<Option<Value>>> {
        let (store, name, range) = (self.store.clone(), self.name.clone(), range.into());
        self.txn.issue(move |txn| {
            let entries = Self::entries(txn, &store, &name, &range, Direction::Next)?;
            Ok(entries.into_iter().next().map(|e| e.value))
        })
    }

    /// All records whose index key is in `range`, in index order.
    pub fn get_all(&self, range: Option<KeyRange>) -> CoreResult<Request<Vec<Value>>> {
        let (store, name, range) = (
            self.store.clone(),
            self.name.clone(),
            range.unwrap_or_default(),
        );
        self.txn.issue(move |txn| {
            let entries = Self::entries(txn, &store, &name, &range, Direction::Next)?;
            Ok(entries.into_iter().map(|e| e.value).collect())
        })
    }

    /// Number of records whose index key is in `range`.
    pub fn count(&self, range: Option<KeyRange>) -> CoreResult<Request<u64>> {
        let (store, name, range) = (
            self.store.clone(),
            self.name.clone(),
            range.unwrap_or_default(),
        );
        self.txn.issue(move |txn| {
            Ok(Self::entries(txn, &store, &name, &range, Direction::Next)?.len() as u64)
        })
    }

    /// Opens a cursor in index order.
    pub fn open_cursor(
        &self,
        range: Option<KeyRange>,
        direction: Direction,
    ) -> CoreResult<Request<Option<Cursor>>> {
        let (store, name, range) = (
            self.store.clone(),
            self.name.clone(),
            range.unwrap_or_default(),
        );
        open_cursor(&self.txn, move |txn| {
            Self::entries(txn, &store, &name, &range, direction)
        })
    }
}

impl fmt::Debug for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Index")
            .field("store", &self.store)
            .field("name", &self.name)
            .finish()
    }
}

fn open_cursor(
    txn: &Rc<TxnInner>,
    collect: impl FnOnce(&TxnInner) -> CoreResult<Vec<Entry>> + 'static,
) -> CoreResult<Request<Option<Cursor>>> {
    let request = Request::new();
    let weak = request.downgrade();
    let owner = Rc::clone(txn);
    txn.issue_into(request.clone(), move |txn| {
        let entries = collect(txn)?;
        if entries.is_empty() {
            return Ok(None);
        }
        Ok(Some(Cursor {
            inner: Rc::new(CursorInner {
                txn: owner,
                request: weak,
                entries,
                position: Cell::new(0),
                stepping: Cell::new(false),
                exhausted: Cell::new(false),
            }),
        }))
    })?;
    Ok(request)
}

/// A position in an ordered walk over records.
///
/// The walk covers the records that matched when the cursor opened. Each
/// step re-fires the success event of the request that opened it, with
/// `None` once the walk is exhausted. After that the accessors keep
/// returning the last entry.
#[derive(Clone)]
pub struct Cursor {
    inner: Rc<CursorInner>,
}

struct CursorInner {
    txn: Rc<TxnInner>,
    request: WeakRequest<Option<Cursor>>,
    entries: Vec<Entry>,
    position: Cell<usize>,
    stepping: Cell<bool>,
    exhausted: Cell<bool>,
}

impl Cursor {
    fn entry(&self) -> &Entry {
        &self.inner.entries[self.inner.position.get()]
    }

    /// Key at the current position: the index key for index cursors.
    pub fn key(&self) -> &Key {
        &self.entry().key
    }

    /// Primary key of the current record.
    pub fn primary_key(&self) -> &Key {
        &self.entry().primary_key
    }

    /// Current record.
    pub fn value(&self) -> &Value {
        &self.entry().value
    }

    /// Moves to the next entry.
    ///
    /// # Errors
    ///
    /// Fails if the cursor is exhausted, already stepping, or its
    /// transaction is inactive.
    pub fn continue_(&self) -> CoreResult<()> {
        self.advance(1)
    }

    /// Skips `count` entries.
    pub fn advance(&self, count: usize) -> CoreResult<()> {
        if count == 0 {
            return Err(CoreError::data("advance count must be positive"));
        }
        if self.inner.exhausted.get() {
            return Err(CoreError::invalid_state("cursor is exhausted"));
        }
        if self.inner.stepping.get() {
            return Err(CoreError::invalid_state("cursor is already advancing"));
        }
        let request = self
            .inner
            .request
            .upgrade()
            .ok_or_else(|| CoreError::invalid_state("cursor request was dropped"))?;
        let cursor = self.clone();
        self.inner.txn.issue_into(request.clone(), move |_| {
            let inner = &cursor.inner;
            inner.stepping.set(false);
            let next = inner.position.get().saturating_add(count);
            if next >= inner.entries.len() {
                inner.exhausted.set(true);
                return Ok(None);
            }
            inner.position.set(next);
            Ok(Some(cursor.clone()))
        })?;
        self.inner.stepping.set(true);
        request.rearm();
        Ok(())
    }
}

impl fmt::Debug for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor")
            .field("position", &self.inner.position.get())
            .field("len", &self.inner.entries.len())
            .field("exhausted", &self.inner.exhausted.get())
            .finish()
    }
}
