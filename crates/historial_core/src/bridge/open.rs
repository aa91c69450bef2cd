//! Awaitable open and delete.

use crate::bridge::deferred::Settlement;
use crate::bridge::handles::{CollectionHandle, ConnectionHandle};
use crate::bridge::request::settle;
use crate::error::CoreResult;
use crate::native::{Connection, EventLoop, Factory, Transaction, UpgradeEvent, VersionChange};
use std::fmt;
use std::future::Future;

type UpgradeCallback = Box<dyn FnMut(&UpgradeScope<'_>) -> CoreResult<()>>;
type BlockedCallback = Box<dyn FnMut(&VersionChange)>;

/// Callbacks for [`open_database`].
#[derive(Default)]
pub struct OpenOptions {
    on_upgrade: Option<UpgradeCallback>,
    on_blocked: Option<BlockedCallback>,
}

impl OpenOptions {
    /// Creates options with no callbacks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `callback` when the stored version is below the requested one.
    /// It runs synchronously inside the upgrade event; an error closes the
    /// connection and rejects the open.
    #[must_use]
    pub fn on_upgrade(
        mut self,
        callback: impl FnMut(&UpgradeScope<'_>) -> CoreResult<()> + 'static,
    ) -> Self {
        self.on_upgrade = Some(Box::new(callback));
        self
    }

    /// Runs `callback` if other connections hold the upgrade back. The
    /// open keeps waiting; it is not rejected.
    #[must_use]
    pub fn on_blocked(mut self, callback: impl FnMut(&VersionChange) + 'static) -> Self {
        self.on_blocked = Some(Box::new(callback));
        self
    }
}

impl fmt::Debug for OpenOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenOptions")
            .field("on_upgrade", &self.on_upgrade.is_some())
            .field("on_blocked", &self.on_blocked.is_some())
            .finish()
    }
}

/// Schema operations available while an upgrade runs.
pub struct UpgradeScope<'a> {
    event: &'a UpgradeEvent,
    events: EventLoop,
}

impl UpgradeScope<'_> {
    /// Version stored before the upgrade; 0 for a new database.
    pub fn old_version(&self) -> u64 {
        self.event.old_version()
    }

    /// Version being opened.
    pub fn new_version(&self) -> u64 {
        self.event.new_version()
    }

    /// Whether a collection exists, including ones created in this upgrade.
    pub fn contains_collection(&self, name: &str) -> bool {
        self.collection_names().iter().any(|n| n == name)
    }

    /// Collection names, sorted.
    pub fn collection_names(&self) -> Vec<String> {
        self.event.connection().object_store_names()
    }

    /// Creates a collection keyed by `key_path`, or by explicit keys when
    /// `None`.
    pub fn create_collection(&self, name: &str, key_path: Option<&str>) -> CoreResult<()> {
        self.event.connection().create_object_store(name, key_path)?;
        Ok(())
    }

    /// Deletes a collection.
    pub fn delete_collection(&self, name: &str) -> CoreResult<()> {
        self.event.connection().delete_object_store(name)
    }

    /// Creates an index on a collection.
    pub fn create_index(
        &self,
        collection: &str,
        name: &str,
        key_path: &str,
        unique: bool,
    ) -> CoreResult<()> {
        self.transaction()
            .object_store(collection)?
            .create_index(name, key_path, unique)?;
        Ok(())
    }

    /// A collection for seeding records inside the upgrade.
    pub fn collection(&self, name: &str) -> CoreResult<CollectionHandle> {
        let store = self.transaction().object_store(name)?;
        Ok(CollectionHandle::new(store, self.events.clone()))
    }

    /// The version change transaction.
    pub fn transaction(&self) -> &Transaction {
        self.event.transaction()
    }

    /// The connection being opened.
    pub fn connection(&self) -> &Connection {
        self.event.connection()
    }
}

impl fmt::Debug for UpgradeScope<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpgradeScope")
            .field("old_version", &self.old_version())
            .field("new_version", &self.new_version())
            .finish()
    }
}

/// Opens `name` at `version` and resolves to a shared connection handle.
///
/// The native open request is issued before this returns.
pub fn open_database(
    factory: &Factory,
    name: &str,
    version: u64,
    options: OpenOptions,
) -> impl Future<Output = CoreResult<ConnectionHandle>> {
    let events = factory.events().clone();
    let open = factory.open_database(name, version);
    let OpenOptions {
        on_upgrade,
        on_blocked,
    } = options;

    if let Some(mut callback) = on_upgrade {
        let upgrade_events = events.clone();
        open.set_on_upgrade_needed(move |event| {
            let scope = UpgradeScope {
                event,
                events: upgrade_events.clone(),
            };
            // On error the engine aborts the upgrade and closes the
            // connection before rejecting the open with this error.
            let outcome = callback(&scope);
            if let Err(err) = &outcome {
                tracing::warn!(
                    database = %event.connection().name(),
                    error = %err,
                    "upgrade callback failed"
                );
            }
            outcome
        });
    }
    if let Some(callback) = on_blocked {
        open.set_on_blocked(callback);
    }

    let settlement = settle(&events, open.request());
    async move {
        let connection = settlement.await?;
        Ok(ConnectionHandle::new(connection, events))
    }
}

/// Deletes `name`, waiting for open connections to close first.
pub fn delete_database(factory: &Factory, name: &str) -> Settlement<()> {
    let delete = factory.delete_database(name);
    settle(factory.events(), delete.request())
}
