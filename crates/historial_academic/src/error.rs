//! Error types for the academic layer.

use historial_core::CoreError;
use thiserror::Error;

/// Result type for academic operations.
pub type AcademicResult<T> = Result<T, AcademicError>;

/// Errors raised by the repository and the registry commands.
#[derive(Debug, Clone, Error)]
pub enum AcademicError {
    /// Error from the record database, unchanged.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A stored record could not be turned back into a student.
    #[error("malformed record: {message}")]
    Malformed {
        /// What was wrong with the record.
        message: String,
    },

    /// Another student already uses this id.
    #[error("student id {id:?} is already registered")]
    DuplicateId {
        /// The clashing id.
        id: String,
    },

    /// No student has this id.
    #[error("student {id:?} not found")]
    UnknownStudent {
        /// The id looked up.
        id: String,
    },

    /// The command needs a selected student.
    #[error("no student selected")]
    NoSelection,

    /// A subject record position is out of range.
    #[error("record {index} out of range for {len} records")]
    RecordIndex {
        /// Requested position.
        index: usize,
        /// Number of records held.
        len: usize,
    },

    /// A score is NaN or infinite.
    #[error("score must be a finite number, got {score}")]
    InvalidScore {
        /// The rejected score.
        score: f64,
    },
}

impl AcademicError {
    /// Creates a malformed record error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }

    /// Creates an unknown student error.
    pub fn unknown_student(id: impl Into<String>) -> Self {
        Self::UnknownStudent { id: id.into() }
    }
}
