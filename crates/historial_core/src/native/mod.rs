//! Event-driven database engine.
//!
//! Every operation answers through events rather than return values: a
//! [`Request`] fires success or error, a [`Transaction`] fires complete,
//! error and abort, and an [`OpenRequest`] additionally fires
//! upgrade-needed and blocked. Events are queued on the factory's
//! [`EventLoop`] and dispatched in order when the loop is pumped.
//!
//! ## Invariants
//!
//! - Requests within one transaction run in issue order
//! - A failed request fires its own error, then the transaction's error,
//!   then the transaction aborts
//! - Writes are staged per transaction and reach the live database and the
//!   journal together, at commit
//! - Transactions commit in the order their commits are processed; the last
//!   write to a key wins
//! - A read-write transaction whose reads were overwritten by a later commit
//!   fails to commit with a conflict instead of losing that update
//! - An upgrade runs only once no other connection to the database is open

mod database;
mod event_loop;
mod factory;
mod listener;
mod request;
pub(crate) mod state;
mod store;
mod transaction;

pub use database::{Connection, VersionChange};
pub use event_loop::EventLoop;
pub use factory::{DatabaseInfo, DeleteRequest, Factory, OpenRequest, UpgradeEvent};
pub use request::{ReadyState, Request};
pub use store::{Cursor, Index, ObjectStore};
pub use transaction::{Transaction, TransactionMode, TransactionPhase};
