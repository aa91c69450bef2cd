//! Async bridge over the event-driven engine.
//!
//! Each native request is wrapped in a [`Settlement`]: a future that
//! resolves on the request's success event and rejects, with the error
//! unchanged, on its error event. A settlement settles exactly once no
//! matter how many events fire. There are no retries.
//!
//! Settlements pump the engine's [`EventLoop`](crate::EventLoop) when
//! polled, so they work under any executor that polls on the current
//! thread (`#[tokio::test]`, a current-thread runtime, or a `LocalSet`).

mod deferred;
mod handles;
mod open;
mod request;

pub use deferred::{deferred, Deferred, Settlement};
pub use handles::{CollectionHandle, ConnectionHandle, CursorHandle, IndexHandle, TransactionHandle};
pub use open::{delete_database, open_database, OpenOptions, UpgradeScope};
pub use request::{promisify, settle};
