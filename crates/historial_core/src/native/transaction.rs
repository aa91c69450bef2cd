//! Native transactions.
//!
//! A transaction works on a private copy of the collections in its scope.
//! Requests run in issue order against that copy and record every change in
//! a mutation log. Committing replays the log onto the live database,
//! appends it to the journal as one frame, and only then swaps the result
//! in. Aborting, or dropping a transaction that was never committed,
//! discards the copy.
//!
//! Read-write transactions also remember what they read. If another
//! transaction committed a write to any of it after the copy was taken,
//! the commit fails with [`CoreError::TransactionConflict`] and the
//! transaction aborts, so a read-modify-write never loses an update.

use crate::error::{CoreError, CoreResult};
use crate::key::KeyRange;
use crate::native::database::DatabaseShared;
use crate::native::event_loop::EventLoop;
use crate::native::listener::Slot;
use crate::native::request::Request;
use crate::native::state::{DatabaseState, Mutation};
use crate::native::store::ObjectStore;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

/// Access mode of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionMode {
    /// Reads only.
    ReadOnly,
    /// Reads and writes records.
    ReadWrite,
    /// Schema changes; only created by a version upgrade.
    VersionChange,
}

/// Lifecycle of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionPhase {
    /// Accepting requests.
    Active,
    /// Commit requested; waiting for queued requests to drain.
    Committing,
    /// Changes are live and durable.
    Committed,
    /// Changes were discarded.
    Aborted,
}

type FinishHook = Box<dyn FnOnce(CoreResult<()>)>;

pub(crate) struct TxnInner {
    pub(crate) id: u64,
    pub(crate) mode: TransactionMode,
    pub(crate) scope: Vec<String>,
    pub(crate) db: Rc<DatabaseShared>,
    pub(crate) events: EventLoop,
    pub(crate) working: RefCell<DatabaseState>,
    snapshot: Cell<Option<u64>>,
    reads: RefCell<Vec<(String, KeyRange)>>,
    phase: Cell<TransactionPhase>,
    log: RefCell<Vec<Mutation>>,
    error: RefCell<Option<CoreError>>,
    on_complete: Slot<()>,
    on_error: Slot<CoreError>,
    on_abort: Slot<()>,
    finish_hook: RefCell<Option<FinishHook>>,
}

impl TxnInner {
    pub(crate) fn new(
        db: Rc<DatabaseShared>,
        events: EventLoop,
        mode: TransactionMode,
        scope: Vec<String>,
    ) -> Rc<Self> {
        let working = {
            let live = db.state.borrow();
            if mode == TransactionMode::VersionChange {
                live.clone()
            } else {
                DatabaseState {
                    version: live.version,
                    stores: scope
                        .iter()
                        .filter_map(|name| live.stores.get(name).map(|s| (name.clone(), s.clone())))
                        .collect(),
                }
            }
        };
        let snapshot = (mode == TransactionMode::ReadWrite).then(|| db.open_snapshot());
        let id = db.stats.record_transaction_start();
        tracing::trace!(txn = id, database = %db.name, ?mode, ?scope, "transaction started");
        Rc::new(Self {
            id,
            mode,
            scope,
            db,
            events,
            working: RefCell::new(working),
            snapshot: Cell::new(snapshot),
            reads: RefCell::new(Vec::new()),
            phase: Cell::new(TransactionPhase::Active),
            log: RefCell::new(Vec::new()),
            error: RefCell::new(None),
            on_complete: Slot::default(),
            on_error: Slot::default(),
            on_abort: Slot::default(),
            finish_hook: RefCell::new(None),
        })
    }

    pub(crate) fn phase(&self) -> TransactionPhase {
        self.phase.get()
    }

    pub(crate) fn ensure_active(&self) -> CoreResult<()> {
        match self.phase.get() {
            TransactionPhase::Active => Ok(()),
            phase => Err(CoreError::transaction_inactive(format!(
                "transaction {} is {phase:?}",
                self.id
            ))),
        }
    }

    pub(crate) fn ensure_writable(&self, collection: &str) -> CoreResult<()> {
        if self.mode == TransactionMode::ReadOnly {
            return Err(CoreError::ReadOnly {
                collection: collection.to_string(),
            });
        }
        Ok(())
    }

    pub(crate) fn ensure_version_change(&self, what: &str) -> CoreResult<()> {
        if self.mode != TransactionMode::VersionChange {
            return Err(CoreError::invalid_state(format!(
                "{what} is only allowed during a version upgrade"
            )));
        }
        Ok(())
    }

    /// Applies a change to the working copy and records it for commit.
    pub(crate) fn stage(&self, mutation: Mutation) -> CoreResult<()> {
        self.working.borrow_mut().apply(&mutation)?;
        self.log.borrow_mut().push(mutation);
        Ok(())
    }

    /// Remembers that `range` of `store` was read, for conflict checks at
    /// commit.
    pub(crate) fn note_read(&self, store: &str, range: &KeyRange) {
        if self.snapshot.get().is_some() {
            self.reads
                .borrow_mut()
                .push((store.to_string(), range.clone()));
        }
    }

    fn release_snapshot(&self) {
        if let Some(seq) = self.snapshot.take() {
            self.db.close_snapshot(seq);
        }
    }

    /// Queues `op`; its outcome settles `request`.
    ///
    /// A failing op fails the request, then fires the transaction's error
    /// event and aborts it.
    pub(crate) fn issue_into<T: 'static>(
        self: &Rc<Self>,
        request: Request<T>,
        op: impl FnOnce(&TxnInner) -> CoreResult<T> + 'static,
    ) -> CoreResult<()> {
        self.ensure_active()?;
        self.db.stats.record_request();
        let txn = Rc::clone(self);
        self.events.post(move || {
            if txn.phase() == TransactionPhase::Aborted {
                request.fail(CoreError::aborted(format!(
                    "transaction {} was aborted",
                    txn.id
                )));
                return;
            }
            match op(&txn) {
                Ok(value) => request.succeed(value),
                Err(err) => {
                    request.fail(err.clone());
                    txn.fail_with(err);
                }
            }
        });
        Ok(())
    }

    pub(crate) fn issue<T: 'static>(
        self: &Rc<Self>,
        op: impl FnOnce(&TxnInner) -> CoreResult<T> + 'static,
    ) -> CoreResult<Request<T>> {
        let request = Request::new();
        self.issue_into(request.clone(), op)?;
        Ok(request)
    }

    pub(crate) fn commit(self: &Rc<Self>) -> CoreResult<()> {
        self.ensure_active()?;
        self.phase.set(TransactionPhase::Committing);
        let txn = Rc::clone(self);
        self.events.post(move || txn.finish());
        Ok(())
    }

    fn finish(&self) {
        if self.phase.get() != TransactionPhase::Committing {
            return;
        }
        let log = std::mem::take(&mut *self.log.borrow_mut());
        let staged = log.len();
        let outcome = match self.snapshot.get() {
            Some(seq) if staged > 0 => self.db.check_conflicts(seq, &self.reads.borrow()),
            _ => Ok(()),
        }
        .and_then(|()| self.db.commit(log));
        self.release_snapshot();
        match outcome {
            Ok(()) => {
                self.phase.set(TransactionPhase::Committed);
                self.db.stats.record_commit();
                tracing::debug!(txn = self.id, mutations = staged, "transaction committed");
                self.on_complete.fire(&());
                self.run_finish_hook(Ok(()));
            }
            Err(err) => {
                tracing::error!(txn = self.id, error = %err, "commit failed");
                self.fail_with(err);
            }
        }
    }

    /// Aborts without a request failure. `reason` becomes the
    /// transaction's error when given.
    pub(crate) fn abort(self: &Rc<Self>, reason: Option<CoreError>) -> CoreResult<()> {
        match self.phase.get() {
            TransactionPhase::Committed | TransactionPhase::Aborted => {
                return Err(CoreError::invalid_state(format!(
                    "transaction {} already finished",
                    self.id
                )));
            }
            TransactionPhase::Active | TransactionPhase::Committing => {}
        }
        *self.error.borrow_mut() = reason;
        self.discard();
        let txn = Rc::clone(self);
        self.events.post(move || txn.fire_abort());
        Ok(())
    }

    /// Records `err`, fires the error event, then aborts.
    pub(crate) fn fail_with(&self, err: CoreError) {
        if matches!(
            self.phase.get(),
            TransactionPhase::Committed | TransactionPhase::Aborted
        ) {
            return;
        }
        *self.error.borrow_mut() = Some(err.clone());
        self.on_error.fire(&err);
        self.discard();
        self.fire_abort();
    }

    fn discard(&self) {
        self.phase.set(TransactionPhase::Aborted);
        self.log.borrow_mut().clear();
        self.release_snapshot();
        self.db.stats.record_abort();
        tracing::debug!(txn = self.id, "transaction aborted");
    }

    fn fire_abort(&self) {
        self.on_abort.fire(&());
        let error = self.error.borrow().clone().unwrap_or_else(|| {
            CoreError::aborted(format!("transaction {} was aborted", self.id))
        });
        self.run_finish_hook(Err(error));
    }

    fn run_finish_hook(&self, outcome: CoreResult<()>) {
        let hook = self.finish_hook.borrow_mut().take();
        if let Some(hook) = hook {
            hook(outcome);
        }
    }

    pub(crate) fn set_finish_hook(&self, hook: impl FnOnce(CoreResult<()>) + 'static) {
        *self.finish_hook.borrow_mut() = Some(Box::new(hook));
    }

    pub(crate) fn in_scope(&self, name: &str) -> bool {
        self.mode == TransactionMode::VersionChange || self.scope.iter().any(|s| s == name)
    }
}

impl Drop for TxnInner {
    fn drop(&mut self) {
        self.release_snapshot();
    }
}

/// A unit of atomic work over one or more collections.
///
/// Nothing becomes visible to other transactions or durable until
/// [`commit`](Self::commit) completes and the complete event fires.
#[derive(Clone)]
pub struct Transaction {
    pub(crate) inner: Rc<TxnInner>,
}

impl Transaction {
    pub(crate) fn from_inner(inner: Rc<TxnInner>) -> Self {
        Self { inner }
    }

    /// Engine-wide transaction id.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Access mode.
    pub fn mode(&self) -> TransactionMode {
        self.inner.mode
    }

    /// Collections named at creation, in the order given.
    pub fn scope(&self) -> &[String] {
        &self.inner.scope
    }

    /// Current phase.
    pub fn phase(&self) -> TransactionPhase {
        self.inner.phase()
    }

    /// The error that aborted the transaction, if any.
    pub fn error(&self) -> Option<CoreError> {
        self.inner.error.borrow().clone()
    }

    /// Returns a handle to a collection in scope.
    ///
    /// # Errors
    ///
    /// Fails if the transaction is finished or the collection is outside the
    /// scope or does not exist.
    pub fn object_store(&self, name: &str) -> CoreResult<ObjectStore> {
        self.inner.ensure_active()?;
        if !self.inner.in_scope(name) {
            return Err(CoreError::not_found(format!(
                "collection {name:?} is not in the transaction scope"
            )));
        }
        self.inner.working.borrow().store(name)?;
        Ok(ObjectStore::new(Rc::clone(&self.inner), name))
    }

    /// Requests a commit once all queued requests have run.
    ///
    /// # Errors
    ///
    /// Fails if the transaction is no longer active.
    pub fn commit(&self) -> CoreResult<()> {
        self.inner.commit()
    }

    /// Discards all changes and fires the abort event.
    ///
    /// # Errors
    ///
    /// Fails if the transaction already committed or aborted.
    pub fn abort(&self) -> CoreResult<()> {
        self.inner.abort(None)
    }

    /// Sets the handler fired once the commit is durable.
    pub fn set_on_complete(&self, mut handler: impl FnMut() + 'static) {
        self.inner.on_complete.set(move |_| handler());
    }

    /// Sets the handler fired when a request or the commit fails.
    pub fn set_on_error(&self, handler: impl FnMut(&CoreError) + 'static) {
        self.inner.on_error.set(handler);
    }

    /// Sets the handler fired when the transaction aborts.
    pub fn set_on_abort(&self, mut handler: impl FnMut() + 'static) {
        self.inner.on_abort.set(move |_| handler());
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.inner.id)
            .field("mode", &self.inner.mode)
            .field("scope", &self.inner.scope)
            .field("phase", &self.inner.phase())
            .finish()
    }
}
