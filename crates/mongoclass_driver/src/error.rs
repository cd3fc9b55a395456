//! Error types for driver operations.

use thiserror::Error;

/// Result type for driver operations.
pub type DriverResult<T> = Result<T, DriverError>;

/// Errors reported by a document-store driver.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DriverError {
    /// The filter document is malformed or uses an unknown operator.
    #[error("invalid filter: {message}")]
    InvalidFilter {
        /// Description of the problem.
        message: String,
    },

    /// The update document is malformed or uses an unknown operator.
    #[error("invalid update: {message}")]
    InvalidUpdate {
        /// Description of the problem.
        message: String,
    },

    /// A document with the same `_id` already exists.
    #[error("duplicate key in {namespace}: _id {id}")]
    DuplicateKey {
        /// `database.collection` of the write.
        namespace: String,
        /// Rendered identifier.
        id: String,
    },

    /// An update tried to change an immutable field.
    #[error("field '{field}' is immutable")]
    ImmutableField {
        /// Field name.
        field: String,
    },

    /// A bulk insert stopped or completed with failures.
    #[error("bulk write failed after {inserted} inserts: {source}")]
    BulkWrite {
        /// Number of documents written before or despite the failure.
        inserted: usize,
        /// First failure encountered.
        source: Box<DriverError>,
    },

    /// A cursor option was changed after iteration began.
    #[error("cannot modify cursor options after iteration has started")]
    CursorStarted,

    /// The backing store cannot serve the request.
    #[error("driver unavailable: {message}")]
    Unavailable {
        /// Description of the failure.
        message: String,
    },
}

impl DriverError {
    /// Creates an invalid filter error.
    pub fn invalid_filter(message: impl Into<String>) -> Self {
        Self::InvalidFilter {
            message: message.into(),
        }
    }

    /// Creates an invalid update error.
    pub fn invalid_update(message: impl Into<String>) -> Self {
        Self::InvalidUpdate {
            message: message.into(),
        }
    }

    /// Creates an unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }
}
