//! Memoized connection to one named, versioned database.

use crate::bridge::{open_database, ConnectionHandle, OpenOptions, UpgradeScope};
use crate::error::CoreResult;
use crate::native::{Factory, VersionChange};
use std::fmt;
use std::rc::Rc;
use tokio::sync::OnceCell;

type SchemaFn = Rc<dyn Fn(&UpgradeScope<'_>) -> CoreResult<()>>;
type BlockedFn = Rc<dyn Fn(&VersionChange)>;

/// Hands out one shared connection, opening it on first use.
///
/// Concurrent callers of [`connection`](Self::connection) wait on the same
/// open; none issues a second one. A failed open is not remembered, so the
/// next call tries again.
pub struct ConnectionManager {
    factory: Factory,
    name: String,
    version: u64,
    schema: SchemaFn,
    on_blocked: Option<BlockedFn>,
    cell: OnceCell<ConnectionHandle>,
}

impl ConnectionManager {
    /// Creates a manager whose upgrades run `schema`.
    pub fn new(
        factory: Factory,
        name: impl Into<String>,
        version: u64,
        schema: impl Fn(&UpgradeScope<'_>) -> CoreResult<()> + 'static,
    ) -> Self {
        Self {
            factory,
            name: name.into(),
            version,
            schema: Rc::new(schema),
            on_blocked: None,
            cell: OnceCell::new(),
        }
    }

    /// Creates a manager whose schema is one collection keyed by
    /// `key_path`, created if absent.
    pub fn for_collection(
        factory: Factory,
        name: impl Into<String>,
        version: u64,
        collection: impl Into<String>,
        key_path: impl Into<String>,
    ) -> Self {
        let (collection, key_path) = (collection.into(), key_path.into());
        Self::new(factory, name, version, move |scope| {
            if !scope.contains_collection(&collection) {
                scope.create_collection(&collection, Some(&key_path))?;
            }
            Ok(())
        })
    }

    /// Sets an observer for opens held back by other connections.
    #[must_use]
    pub fn with_blocked_observer(mut self, observer: impl Fn(&VersionChange) + 'static) -> Self {
        self.on_blocked = Some(Rc::new(observer));
        self
    }

    /// Database name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Requested version.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// The factory connections come from.
    pub fn factory(&self) -> &Factory {
        &self.factory
    }

    /// Whether a connection was opened.
    pub fn is_connected(&self) -> bool {
        self.cell.initialized()
    }

    /// Returns the shared connection, opening it if needed.
    ///
    /// # Errors
    ///
    /// Returns the open or upgrade error unchanged.
    pub async fn connection(&self) -> CoreResult<ConnectionHandle> {
        let handle = self.cell.get_or_try_init(|| self.open()).await?;
        Ok(handle.clone())
    }

    async fn open(&self) -> CoreResult<ConnectionHandle> {
        tracing::debug!(database = %self.name, version = self.version, "opening connection");
        let schema = Rc::clone(&self.schema);
        let mut options = OpenOptions::new().on_upgrade(move |scope| schema(scope));
        if let Some(observer) = &self.on_blocked {
            let observer = Rc::clone(observer);
            let database = self.name.clone();
            options = options.on_blocked(move |change| {
                tracing::warn!(
                    database = %database,
                    old = change.old_version,
                    new = ?change.new_version,
                    "open blocked by another connection"
                );
                observer(change);
            });
        }
        match open_database(&self.factory, &self.name, self.version, options).await {
            Ok(handle) => {
                tracing::info!(database = %self.name, version = handle.version(), "connection ready");
                Ok(handle)
            }
            Err(err) => {
                tracing::error!(database = %self.name, error = %err, "open failed");
                Err(err)
            }
        }
    }
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("connected", &self.is_connected())
            .finish()
    }
}
