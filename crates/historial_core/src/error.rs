//! Error types for the record database.

use historial_codec::CodecError;
use historial_storage::StorageError;
use std::sync::Arc;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised by the engine and carried unchanged through the bridge.
///
/// `CoreError` is `Clone`: one failure is delivered to the failing request,
/// to its transaction and to every awaiting listener.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(Arc<StorageError>),

    /// CBOR codec error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// A collection or index does not exist.
    #[error("not found: {message}")]
    NotFound {
        /// What was looked up.
        message: String,
    },

    /// A uniqueness or schema constraint was violated.
    #[error("constraint violation: {message}")]
    Constraint {
        /// Description of the violation.
        message: String,
    },

    /// A key or key range is invalid.
    #[error("invalid key: {message}")]
    Data {
        /// Description of the problem.
        message: String,
    },

    /// The transaction no longer accepts requests.
    #[error("transaction inactive: {message}")]
    TransactionInactive {
        /// Why the transaction is inactive.
        message: String,
    },

    /// A write was attempted in a read-only transaction.
    #[error("read-only transaction cannot write to {collection}")]
    ReadOnly {
        /// Target collection.
        collection: String,
    },

    /// The call is not valid in the object's current state.
    #[error("invalid state: {message}")]
    InvalidState {
        /// Description of the state conflict.
        message: String,
    },

    /// The requested version is older than the stored one.
    #[error("requested version {requested} is lower than stored version {stored}")]
    Version {
        /// Version passed to open.
        requested: u64,
        /// Version on disk.
        stored: u64,
    },

    /// Another transaction committed a write to data this one read.
    #[error("transaction conflict on {key} in collection {collection}")]
    TransactionConflict {
        /// The collection where the conflict occurred.
        collection: String,
        /// The conflicting key, or a note that the whole collection changed.
        key: String,
    },

    /// The transaction was aborted.
    #[error("transaction aborted: {reason}")]
    Aborted {
        /// Reason for abort.
        reason: String,
    },

    /// A schema upgrade callback failed.
    #[error("upgrade failed: {message}")]
    UpgradeFailed {
        /// Description of the failure.
        message: String,
    },

    /// A pending operation was dropped without ever settling.
    #[error("operation dropped before it settled")]
    Abandoned,

    /// The journal could not be replayed.
    #[error("journal corruption: {message}")]
    JournalCorruption {
        /// Description of the corruption.
        message: String,
    },
}

impl From<StorageError> for CoreError {
    fn from(err: StorageError) -> Self {
        CoreError::Storage(Arc::new(err))
    }
}

impl CoreError {
    /// Creates a not found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Creates a constraint error.
    pub fn constraint(message: impl Into<String>) -> Self {
        Self::Constraint {
            message: message.into(),
        }
    }

    /// Creates an invalid key error.
    pub fn data(message: impl Into<String>) -> Self {
        Self::Data {
            message: message.into(),
        }
    }

    /// Creates a transaction inactive error.
    pub fn transaction_inactive(message: impl Into<String>) -> Self {
        Self::TransactionInactive {
            message: message.into(),
        }
    }

    /// Creates an invalid state error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Creates an aborted error.
    pub fn aborted(reason: impl Into<String>) -> Self {
        Self::Aborted {
            reason: reason.into(),
        }
    }

    /// Creates an upgrade failure.
    pub fn upgrade_failed(message: impl Into<String>) -> Self {
        Self::UpgradeFailed {
            message: message.into(),
        }
    }

    /// Creates a journal corruption error.
    pub fn journal_corruption(message: impl Into<String>) -> Self {
        Self::JournalCorruption {
            message: message.into(),
        }
    }
}
