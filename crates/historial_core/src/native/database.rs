//! Databases and connections.

use crate::error::{CoreError, CoreResult};
use crate::journal::{Frame, Journal};
use crate::key::{Key, KeyRange};
use crate::native::event_loop::EventLoop;
use crate::native::factory::FactoryInner;
use crate::native::listener::Slot;
use crate::native::state::{DatabaseState, Mutation};
use crate::native::store::ObjectStore;
use crate::native::transaction::{Transaction, TransactionMode, TransactionPhase, TxnInner};
use crate::stats::EngineStats;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::rc::{Rc, Weak};

/// Records written by one commit, kept while an older read-write
/// snapshot is still open.
struct CommitRecord {
    seq: u64,
    writes: Vec<(String, Option<Key>)>,
}

/// Live state of one named database, shared by its connections.
pub(crate) struct DatabaseShared {
    pub(crate) name: String,
    pub(crate) state: RefCell<DatabaseState>,
    journal: Rc<RefCell<Journal>>,
    pub(crate) stats: Rc<EngineStats>,
    commit_seq: Cell<u64>,
    history: RefCell<VecDeque<CommitRecord>>,
    snapshots: RefCell<BTreeMap<u64, usize>>,
}

impl DatabaseShared {
    pub(crate) fn new(
        name: &str,
        state: DatabaseState,
        journal: Rc<RefCell<Journal>>,
        stats: Rc<EngineStats>,
    ) -> Rc<Self> {
        Rc::new(Self {
            name: name.to_string(),
            state: RefCell::new(state),
            journal,
            stats,
            commit_seq: Cell::new(0),
            history: RefCell::new(VecDeque::new()),
            snapshots: RefCell::new(BTreeMap::new()),
        })
    }

    /// Registers a read-write snapshot of the current state. Returns the
    /// commit sequence it reflects.
    pub(crate) fn open_snapshot(&self) -> u64 {
        let seq = self.commit_seq.get();
        *self.snapshots.borrow_mut().entry(seq).or_insert(0) += 1;
        seq
    }

    /// Releases a snapshot and forgets commits no open snapshot predates.
    pub(crate) fn close_snapshot(&self, seq: u64) {
        let mut snapshots = self.snapshots.borrow_mut();
        if let Some(count) = snapshots.get_mut(&seq) {
            *count -= 1;
            if *count == 0 {
                snapshots.remove(&seq);
            }
        }
        let oldest = snapshots.keys().next().copied();
        let mut history = self.history.borrow_mut();
        match oldest {
            Some(oldest) => history.retain(|record| record.seq > oldest),
            None => history.clear(),
        }
    }

    /// Fails if a commit after `since` wrote a record matched by `reads`.
    pub(crate) fn check_conflicts(
        &self,
        since: u64,
        reads: &[(String, KeyRange)],
    ) -> CoreResult<()> {
        let history = self.history.borrow();
        for record in history.iter().filter(|record| record.seq > since) {
            for (collection, key) in &record.writes {
                let hit = reads.iter().any(|(store, range)| {
                    store == collection && key.as_ref().map_or(true, |key| range.contains(key))
                });
                if hit {
                    return Err(CoreError::TransactionConflict {
                        collection: collection.clone(),
                        key: key
                            .as_ref()
                            .map_or_else(|| "every record".to_string(), Key::to_string),
                    });
                }
            }
        }
        Ok(())
    }

    pub(crate) fn version(&self) -> u64 {
        self.state.borrow().version
    }

    /// Applies a transaction's log atomically: the live state changes only
    /// if every mutation applies and the journal frame is written.
    pub(crate) fn commit(&self, log: Vec<Mutation>) -> CoreResult<()> {
        if log.is_empty() {
            return Ok(());
        }
        let mut next = self.state.borrow().clone();
        for mutation in &log {
            next.apply(mutation)?;
        }
        let writes: Vec<(String, Option<Key>)> = if self.snapshots.borrow().is_empty() {
            Vec::new()
        } else {
            log.iter()
                .filter_map(Mutation::written)
                .map(|(store, key)| (store.to_string(), key.cloned()))
                .collect()
        };
        self.journal
            .borrow_mut()
            .append(&Frame::changes(&self.name, log))?;
        self.stats.record_journal_frame();
        *self.state.borrow_mut() = next;

        let seq = self.commit_seq.get() + 1;
        self.commit_seq.set(seq);
        if !writes.is_empty() {
            self.history.borrow_mut().push_back(CommitRecord { seq, writes });
        }
        Ok(())
    }
}

/// Notification that a database's version is about to change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionChange {
    /// Version currently stored.
    pub old_version: u64,
    /// Requested version; `None` when the database is being deleted.
    pub new_version: Option<u64>,
}

pub(crate) struct ConnInner {
    pub(crate) db: Rc<DatabaseShared>,
    events: EventLoop,
    factory: Weak<FactoryInner>,
    version: u64,
    closed: Cell<bool>,
    pub(crate) upgrade: RefCell<Option<Rc<TxnInner>>>,
    on_version_change: Slot<VersionChange>,
}

impl ConnInner {
    pub(crate) fn is_open(&self) -> bool {
        !self.closed.get()
    }

    pub(crate) fn fire_version_change(&self, change: &VersionChange) {
        self.on_version_change.fire(change);
    }

    fn close(&self) {
        if self.closed.replace(true) {
            return;
        }
        tracing::debug!(database = %self.db.name, version = self.version, "connection closed");
        let upgrade = self.upgrade.borrow_mut().take();
        if let Some(txn) = upgrade {
            if matches!(
                txn.phase(),
                TransactionPhase::Active | TransactionPhase::Committing
            ) {
                let reason = CoreError::aborted("connection closed during version upgrade");
                if let Err(err) = txn.abort(Some(reason)) {
                    tracing::warn!(error = %err, "could not abort version upgrade");
                }
            }
        }
        if let Some(factory) = self.factory.upgrade() {
            factory.connection_closed(&self.db.name);
        }
    }
}

impl Drop for ConnInner {
    fn drop(&mut self) {
        self.close();
    }
}

/// An open connection to one database at one version.
#[derive(Clone)]
pub struct Connection {
    pub(crate) inner: Rc<ConnInner>,
}

impl Connection {
    pub(crate) fn new(
        db: Rc<DatabaseShared>,
        events: EventLoop,
        factory: Weak<FactoryInner>,
        version: u64,
    ) -> Self {
        Self {
            inner: Rc::new(ConnInner {
                db,
                events,
                factory,
                version,
                closed: Cell::new(false),
                upgrade: RefCell::new(None),
                on_version_change: Slot::default(),
            }),
        }
    }

    /// Database name.
    pub fn name(&self) -> &str {
        &self.inner.db.name
    }

    /// Version this connection was opened at.
    pub fn version(&self) -> u64 {
        self.inner.version
    }

    /// Whether [`close`](Self::close) was called.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.get()
    }

    /// Collection names, sorted. During an upgrade this includes
    /// collections created so far.
    pub fn object_store_names(&self) -> Vec<String> {
        if let Some(txn) = self.inner.upgrade.borrow().as_ref() {
            return txn.working.borrow().stores.keys().cloned().collect();
        }
        self.inner.db.state.borrow().stores.keys().cloned().collect()
    }

    /// Starts a transaction over `scope`.
    ///
    /// # Errors
    ///
    /// Fails if the connection is closed or upgrading, the scope is empty,
    /// a collection does not exist, or `mode` is
    /// [`TransactionMode::VersionChange`].
    pub fn transaction(&self, scope: &[&str], mode: TransactionMode) -> CoreResult<Transaction> {
        if self.is_closed() {
            return Err(CoreError::invalid_state("connection is closed"));
        }
        if self.inner.upgrade.borrow().is_some() {
            return Err(CoreError::invalid_state("a version upgrade is in progress"));
        }
        if mode == TransactionMode::VersionChange {
            return Err(CoreError::invalid_state(
                "version change transactions are created by upgrades only",
            ));
        }
        if scope.is_empty() {
            return Err(CoreError::invalid_state("transaction scope is empty"));
        }
        {
            let state = self.inner.db.state.borrow();
            for name in scope {
                state.store(name)?;
            }
        }
        let txn = TxnInner::new(
            Rc::clone(&self.inner.db),
            self.inner.events.clone(),
            mode,
            scope.iter().map(|s| (*s).to_string()).collect(),
        );
        Ok(Transaction::from_inner(txn))
    }

    /// Closes the connection. Idempotent.
    ///
    /// Closing during an upgrade aborts it. Closing lets blocked opens and
    /// deletes of this database proceed.
    pub fn close(&self) {
        self.inner.close();
    }

    /// Sets the handler fired when another open or delete needs this
    /// connection to close.
    pub fn set_on_version_change(&self, handler: impl FnMut(&VersionChange) + 'static) {
        self.inner.on_version_change.set(handler);
    }

    fn upgrade_txn(&self, what: &str) -> CoreResult<Rc<TxnInner>> {
        let txn = self.inner.upgrade.borrow().clone().ok_or_else(|| {
            CoreError::invalid_state(format!("{what} is only allowed during a version upgrade"))
        })?;
        txn.ensure_active()?;
        Ok(txn)
    }

    /// Creates a collection. Only allowed during an upgrade.
    ///
    /// With a `key_path`, keys are read from records; without one, `put`
    /// requires an explicit key.
    pub fn create_object_store(&self, name: &str, key_path: Option<&str>) -> CoreResult<ObjectStore> {
        let txn = self.upgrade_txn("creating a collection")?;
        txn.stage(Mutation::CreateStore {
            name: name.to_string(),
            key_path: key_path.map(str::to_string),
        })?;
        tracing::debug!(database = %self.name(), collection = name, "collection created");
        Ok(ObjectStore::new(txn, name))
    }

    /// Deletes a collection and its records. Only allowed during an upgrade.
    pub fn delete_object_store(&self, name: &str) -> CoreResult<()> {
        let txn = self.upgrade_txn("deleting a collection")?;
        txn.stage(Mutation::DeleteStore {
            name: name.to_string(),
        })
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("name", &self.inner.db.name)
            .field("version", &self.inner.version)
            .field("closed", &self.inner.closed.get())
            .finish()
    }
}
