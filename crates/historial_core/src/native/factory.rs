//! Entry point of the engine: opening, upgrading and deleting databases.

use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::journal::{Frame, Journal};
use crate::native::database::{Connection, ConnInner, DatabaseShared, VersionChange};
use crate::native::event_loop::EventLoop;
use crate::native::listener::Slot;
use crate::native::request::{ReadyState, Request};
use crate::native::state::{DatabaseState, Mutation};
use crate::native::transaction::{Transaction, TransactionMode, TransactionPhase, TxnInner};
use crate::stats::{EngineStats, StatsSnapshot};
use historial_storage::{InMemoryBackend, StorageBackend};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};

type UpgradeHandler = Box<dyn FnMut(&UpgradeEvent) -> CoreResult<()>>;
type WaitingJob = Box<dyn FnOnce()>;

/// Opens databases stored in one backend.
///
/// All databases of a factory share a single journal. The factory and
/// everything it hands out are single-threaded.
///
/// # Example
///
/// ```rust
/// use historial_core::{Factory, TransactionMode};
///
/// let factory = Factory::in_memory();
/// let open = factory.open_database("school", 1);
/// open.set_on_upgrade_needed(|event| {
///     event.connection().create_object_store("students", Some("id"))?;
///     Ok(())
/// });
/// factory.events().run_pending();
///
/// let connection = open.take_result().unwrap();
/// assert_eq!(connection.object_store_names(), vec!["students".to_string()]);
/// ```
#[derive(Clone)]
pub struct Factory {
    inner: Rc<FactoryInner>,
}

pub(crate) struct FactoryInner {
    events: EventLoop,
    journal: Rc<RefCell<Journal>>,
    databases: RefCell<BTreeMap<String, Rc<DatabaseShared>>>,
    connections: RefCell<Vec<Weak<ConnInner>>>,
    waiting: RefCell<Vec<(String, WaitingJob)>>,
    stats: Rc<EngineStats>,
}

/// Name and version of a stored database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseInfo {
    /// Database name.
    pub name: String,
    /// Stored version.
    pub version: u64,
}

impl Factory {
    /// Opens a factory over `backend`, replaying its journal.
    ///
    /// # Errors
    ///
    /// Fails if the backend cannot be read or the journal is corrupt.
    pub fn open(backend: impl StorageBackend + 'static, config: Config) -> CoreResult<Self> {
        let (journal, states) = Journal::open(Box::new(backend), &config)?;
        tracing::info!(databases = states.len(), "record database opened");
        Ok(Self::from_parts(journal, states))
    }

    /// A factory over a fresh in-memory backend.
    pub fn in_memory() -> Self {
        let journal = Journal::new(Box::new(InMemoryBackend::new()), &Config::default());
        Self::from_parts(journal, BTreeMap::new())
    }

    fn from_parts(journal: Journal, states: BTreeMap<String, DatabaseState>) -> Self {
        let journal = Rc::new(RefCell::new(journal));
        let stats = Rc::new(EngineStats::default());
        let databases = states
            .into_iter()
            .map(|(name, state)| {
                let db = DatabaseShared::new(&name, state, Rc::clone(&journal), Rc::clone(&stats));
                (name, db)
            })
            .collect();
        Self {
            inner: Rc::new(FactoryInner {
                events: EventLoop::new(),
                journal,
                databases: RefCell::new(databases),
                connections: RefCell::new(Vec::new()),
                waiting: RefCell::new(Vec::new()),
                stats,
            }),
        }
    }

    /// The event loop that dispatches this factory's events.
    pub fn events(&self) -> &EventLoop {
        &self.inner.events
    }

    /// Requests a connection to `name` at `version`.
    ///
    /// Runs on the event loop: attach handlers before pumping it. When
    /// `version` is above the stored version (0 for a new database) the
    /// upgrade-needed handler runs first, inside a version change
    /// transaction.
    pub fn open_database(&self, name: &str, version: u64) -> OpenRequest {
        self.inner.stats.record_open();
        let open = OpenRequest::new(name, version);
        let factory = Rc::clone(&self.inner);
        let pending = open.clone();
        self.inner
            .events
            .post(move || factory.process_open(pending, false));
        open
    }

    /// Requests deletion of `name`. Deleting an unknown database succeeds.
    pub fn delete_database(&self, name: &str) -> DeleteRequest {
        let delete = DeleteRequest::new(name);
        let factory = Rc::clone(&self.inner);
        let pending = delete.clone();
        self.inner
            .events
            .post(move || factory.process_delete(pending, false));
        delete
    }

    /// Stored databases, by name.
    pub fn databases(&self) -> Vec<DatabaseInfo> {
        self.inner
            .databases
            .borrow()
            .iter()
            .map(|(name, db)| DatabaseInfo {
                name: name.clone(),
                version: db.version(),
            })
            .filter(|info| info.version > 0)
            .collect()
    }

    /// Rewrites the journal as one snapshot frame per database.
    ///
    /// # Errors
    ///
    /// Fails if the backend cannot be rewritten.
    pub fn compact(&self) -> CoreResult<()> {
        let frames: Vec<Frame> = self
            .inner
            .databases
            .borrow()
            .iter()
            .filter(|(_, db)| db.version() > 0)
            .map(|(name, db)| Frame::changes(name, db.state.borrow().snapshot()))
            .collect();
        self.inner.journal.borrow_mut().rewrite(&frames)
    }

    /// Journal size in bytes.
    pub fn journal_size(&self) -> CoreResult<u64> {
        self.inner.journal.borrow().size()
    }

    /// Engine counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats.snapshot()
    }
}

impl fmt::Debug for Factory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Factory")
            .field("databases", &self.databases())
            .field("events", &self.inner.events)
            .finish()
    }
}

impl FactoryInner {
    fn database(&self, name: &str) -> Rc<DatabaseShared> {
        let mut databases = self.databases.borrow_mut();
        let db = databases.entry(name.to_string()).or_insert_with(|| {
            DatabaseShared::new(
                name,
                DatabaseState::default(),
                Rc::clone(&self.journal),
                Rc::clone(&self.stats),
            )
        });
        Rc::clone(db)
    }

    fn open_connections(&self, name: &str) -> Vec<Connection> {
        self.connections
            .borrow()
            .iter()
            .filter_map(Weak::upgrade)
            .filter(|conn| conn.db.name == name && conn.is_open())
            .map(|inner| Connection { inner })
            .collect()
    }

    fn has_open_connections(&self, name: &str) -> bool {
        !self.open_connections(name).is_empty()
    }

    fn connect(self: &Rc<Self>, db: &Rc<DatabaseShared>, version: u64) -> Connection {
        let conn = Connection::new(
            Rc::clone(db),
            self.events.clone(),
            Rc::downgrade(self),
            version,
        );
        let mut connections = self.connections.borrow_mut();
        connections.retain(|weak| weak.strong_count() > 0);
        connections.push(Rc::downgrade(&conn.inner));
        conn
    }

    /// Asks every other connection to `name` to close. Returns whether any
    /// is still open afterwards.
    fn announce(&self, name: &str, change: VersionChange) -> bool {
        for conn in self.open_connections(name) {
            conn.inner.fire_version_change(&change);
        }
        self.has_open_connections(name)
    }

    fn park(self: &Rc<Self>, name: &str, resume: impl FnOnce(Rc<FactoryInner>) + 'static) {
        let weak = Rc::downgrade(self);
        self.waiting.borrow_mut().push((
            name.to_string(),
            Box::new(move || {
                if let Some(factory) = weak.upgrade() {
                    resume(factory);
                }
            }),
        ));
    }

    pub(crate) fn connection_closed(&self, name: &str) {
        if self.has_open_connections(name) {
            return;
        }
        let ready: Vec<WaitingJob> = {
            let mut waiting = self.waiting.borrow_mut();
            let (ready, rest): (Vec<_>, Vec<_>) =
                std::mem::take(&mut *waiting).into_iter().partition(|(n, _)| n == name);
            *waiting = rest;
            ready.into_iter().map(|(_, job)| job).collect()
        };
        for job in ready {
            self.events.post(job);
        }
    }

    fn process_open(self: &Rc<Self>, open: OpenRequest, announced: bool) {
        let (name, version) = (open.name.clone(), open.version);
        if version == 0 {
            open.request
                .fail(CoreError::data("database version must be positive"));
            return;
        }
        let db = self.database(&name);
        let stored = db.version();
        if version < stored {
            tracing::warn!(database = %name, requested = version, stored, "open rejected");
            open.request.fail(CoreError::Version {
                requested: version,
                stored,
            });
            return;
        }
        if version == stored {
            let conn = self.connect(&db, version);
            tracing::debug!(database = %name, version, "connection opened");
            open.request.succeed(conn);
            return;
        }

        let change = VersionChange {
            old_version: stored,
            new_version: Some(version),
        };
        let still_open = if announced {
            self.has_open_connections(&name)
        } else if self.announce(&name, change) {
            self.stats.record_blocked();
            tracing::info!(database = %name, old = stored, new = version, "upgrade blocked");
            open.handlers.blocked.fire(&change);
            self.has_open_connections(&name)
        } else {
            false
        };
        if still_open {
            self.park(&name, move |factory| factory.process_open(open, true));
            return;
        }
        self.run_upgrade(&db, open, stored, version);
    }

    fn run_upgrade(self: &Rc<Self>, db: &Rc<DatabaseShared>, open: OpenRequest, old: u64, new: u64) {
        self.stats.record_upgrade();
        tracing::info!(database = %db.name, old, new, "upgrading database");

        let conn = self.connect(db, new);
        let scope = db.state.borrow().stores.keys().cloned().collect();
        let txn = TxnInner::new(
            Rc::clone(db),
            self.events.clone(),
            TransactionMode::VersionChange,
            scope,
        );
        if let Err(err) = txn.stage(Mutation::SetVersion(new)) {
            open.request.fail(err);
            return;
        }
        *conn.inner.upgrade.borrow_mut() = Some(Rc::clone(&txn));

        let request = open.request.clone();
        let finished = conn.clone();
        txn.set_finish_hook(move |outcome| {
            finished.inner.upgrade.borrow_mut().take();
            match outcome {
                Ok(()) => request.succeed(finished),
                Err(err) => {
                    tracing::warn!(error = %err, "version upgrade aborted");
                    finished.close();
                    request.fail(err);
                }
            }
        });

        let event = UpgradeEvent {
            connection: conn,
            transaction: Transaction::from_inner(Rc::clone(&txn)),
            old_version: old,
            new_version: new,
        };
        match open.handlers.call_upgrade(&event) {
            Ok(()) => {
                if txn.phase() == TransactionPhase::Active {
                    if let Err(err) = txn.commit() {
                        txn.fail_with(err);
                    }
                }
            }
            Err(err) => txn.fail_with(err),
        }
    }

    fn process_delete(self: &Rc<Self>, delete: DeleteRequest, announced: bool) {
        let name = delete.name.clone();
        let stored = self
            .databases
            .borrow()
            .get(&name)
            .map_or(0, |db| db.version());
        let change = VersionChange {
            old_version: stored,
            new_version: None,
        };
        let still_open = if announced {
            self.has_open_connections(&name)
        } else if self.announce(&name, change) {
            self.stats.record_blocked();
            tracing::info!(database = %name, "delete blocked");
            delete.blocked.fire(&change);
            self.has_open_connections(&name)
        } else {
            false
        };
        if still_open {
            self.park(&name, move |factory| factory.process_delete(delete, true));
            return;
        }

        if stored > 0 {
            if let Err(err) = self.journal.borrow_mut().append(&Frame::drop_database(&name)) {
                delete.request.fail(err);
                return;
            }
            self.stats.record_journal_frame();
        }
        self.databases.borrow_mut().remove(&name);
        tracing::info!(database = %name, "database deleted");
        delete.request.succeed(());
    }
}

struct OpenHandlers {
    upgrade_needed: RefCell<Option<UpgradeHandler>>,
    blocked: Slot<VersionChange>,
}

impl OpenHandlers {
    fn call_upgrade(&self, event: &UpgradeEvent) -> CoreResult<()> {
        let taken = self.upgrade_needed.borrow_mut().take();
        let Some(mut handler) = taken else {
            return Ok(());
        };
        let result = handler(event);
        let mut slot = self.upgrade_needed.borrow_mut();
        if slot.is_none() {
            *slot = Some(handler);
        }
        result
    }
}

/// A pending open. Succeeds with a [`Connection`].
#[derive(Clone)]
pub struct OpenRequest {
    name: String,
    version: u64,
    request: Request<Connection>,
    handlers: Rc<OpenHandlers>,
}

impl OpenRequest {
    fn new(name: &str, version: u64) -> Self {
        Self {
            name: name.to_string(),
            version,
            request: Request::new(),
            handlers: Rc::new(OpenHandlers {
                upgrade_needed: RefCell::new(None),
                blocked: Slot::default(),
            }),
        }
    }

    /// Sets the schema handler. Returning an error aborts the upgrade,
    /// closes the new connection and fails the open with that error.
    pub fn set_on_upgrade_needed(
        &self,
        handler: impl FnMut(&UpgradeEvent) -> CoreResult<()> + 'static,
    ) {
        *self.handlers.upgrade_needed.borrow_mut() = Some(Box::new(handler));
    }

    /// Sets the handler fired when other connections keep the upgrade
    /// waiting.
    pub fn set_on_blocked(&self, handler: impl FnMut(&VersionChange) + 'static) {
        self.handlers.blocked.set(handler);
    }

    /// Sets the success handler.
    pub fn set_on_success(&self, handler: impl FnMut(&Request<Connection>) + 'static) {
        self.request.set_on_success(handler);
    }

    /// Sets the error handler.
    pub fn set_on_error(&self, handler: impl FnMut(&CoreError) + 'static) {
        self.request.set_on_error(handler);
    }

    /// The underlying request.
    pub fn request(&self) -> &Request<Connection> {
        &self.request
    }

    /// Current ready state.
    pub fn ready_state(&self) -> ReadyState {
        self.request.ready_state()
    }

    /// Moves the connection out once the open succeeded.
    pub fn take_result(&self) -> Option<Connection> {
        self.request.take_result()
    }

    /// The error, once the open failed.
    pub fn error(&self) -> Option<CoreError> {
        self.request.error()
    }
}

impl fmt::Debug for OpenRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenRequest")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("request", &self.request)
            .finish()
    }
}

/// A pending database deletion.
#[derive(Clone)]
pub struct DeleteRequest {
    name: String,
    request: Request<()>,
    blocked: Rc<Slot<VersionChange>>,
}

impl DeleteRequest {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            request: Request::new(),
            blocked: Rc::new(Slot::default()),
        }
    }

    /// Sets the handler fired when open connections keep the delete
    /// waiting.
    pub fn set_on_blocked(&self, handler: impl FnMut(&VersionChange) + 'static) {
        self.blocked.set(handler);
    }

    /// The underlying request.
    pub fn request(&self) -> &Request<()> {
        &self.request
    }
}

impl fmt::Debug for DeleteRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeleteRequest")
            .field("name", &self.name)
            .field("request", &self.request)
            .finish()
    }
}

/// Context handed to the upgrade-needed handler.
pub struct UpgradeEvent {
    connection: Connection,
    transaction: Transaction,
    old_version: u64,
    new_version: u64,
}

impl UpgradeEvent {
    /// The connection being opened. Schema calls go through it.
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// The version change transaction.
    pub fn transaction(&self) -> &Transaction {
        &self.transaction
    }

    /// Stored version before the upgrade (0 for a new database).
    pub fn old_version(&self) -> u64 {
        self.old_version
    }

    /// Version being opened.
    pub fn new_version(&self) -> u64 {
        self.new_version
    }
}

impl fmt::Debug for UpgradeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpgradeEvent")
            .field("database", &self.connection.name())
            .field("old_version", &self.old_version)
            .field("new_version", &self.new_version)
            .finish()
    }
}
