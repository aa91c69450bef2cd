//! # Historial Core
//!
//! Embedded record database for Historial.
//!
//! This crate provides:
//! - An event-driven engine ([`native`]): factories, connections,
//!   transactions, collections, indexes and cursors that report through
//!   success, error, complete and abort events
//! - A journal of CBOR frames that makes committed transactions durable in
//!   any [`StorageBackend`](historial_storage::StorageBackend)
//! - An async bridge ([`bridge`]) turning every native request into a
//!   settle-once future
//! - [`ConnectionManager`]: one memoized connection per database
//! - [`RecordStore`]: transactional reads and writes on one collection
//!
//! ## Example
//!
//! ```rust
//! use historial_codec::Value;
//! use historial_core::{ConnectionManager, Factory, RecordStore};
//! use std::rc::Rc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> historial_core::CoreResult<()> {
//! let manager = ConnectionManager::for_collection(Factory::in_memory(), "school", 1, "students", "id");
//! let store = RecordStore::new(Rc::new(manager), "students");
//!
//! store.put(Value::map([("id", Value::from("123")), ("name", Value::from("Ana"))])).await?;
//! assert_eq!(store.count().await?, 1);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod bridge;
mod config;
mod connection;
mod error;
mod journal;
mod key;
pub mod native;
mod record_store;
mod stats;

pub use bridge::{
    CollectionHandle, ConnectionHandle, CursorHandle, IndexHandle, OpenOptions, Settlement,
    TransactionHandle, UpgradeScope,
};
pub use config::Config;
pub use connection::ConnectionManager;
pub use error::{CoreError, CoreResult};
pub use key::{Direction, Key, KeyPath, KeyRange};
pub use native::{
    Connection, EventLoop, Factory, Transaction, TransactionMode, TransactionPhase, VersionChange,
};
pub use record_store::RecordStore;
pub use stats::StatsSnapshot;
