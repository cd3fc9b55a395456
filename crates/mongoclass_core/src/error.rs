//! Error types for mongoclass core.

use mongoclass_codec::CodecError;
use mongoclass_driver::DriverError;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Result type for mapping operations.
pub type MapResult<T> = Result<T, MappingError>;

/// Errors that can occur in core operations.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    /// Document-store driver error.
    #[error("driver error: {0}")]
    Driver(#[from] DriverError),

    /// CBOR codec error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Record/document mapping error.
    #[error("mapping error: {0}")]
    Mapping(#[from] MappingError),

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },
}

impl CoreError {
    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// The mapping error, if this is one.
    #[must_use]
    pub fn as_mapping(&self) -> Option<&MappingError> {
        match self {
            Self::Mapping(err) => Some(err),
            _ => None,
        }
    }
}

/// Errors raised while converting between records and wire documents.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MappingError {
    /// No record type is registered for the pair.
    #[error("no record type registered for {database}.{collection}")]
    UnregisteredCollection {
        /// Database name.
        database: String,
        /// Collection name.
        collection: String,
    },

    /// A required field is absent from the document.
    #[error("{record}: missing field '{field}'")]
    MissingField {
        /// Record type being decoded.
        record: String,
        /// Field name.
        field: String,
    },

    /// A field holds a value of the wrong kind.
    #[error("{record}: field '{field}' expected {expected}, found {found}")]
    InvalidField {
        /// Record type being decoded.
        record: String,
        /// Field name.
        field: String,
        /// Expected kind.
        expected: String,
        /// Kind actually found.
        found: String,
    },

    /// A decoded record is not of the requested type.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// Requested record type.
        expected: String,
        /// Registered record type.
        found: String,
    },

    /// A nested-reference wrapper is missing its tags or data.
    #[error("malformed nested reference in field '{field}': {message}")]
    MalformedNest {
        /// Field holding the wrapper.
        field: String,
        /// What is wrong with it.
        message: String,
    },

    /// A nested record was encoded with nesting turned off.
    #[error("field '{field}' holds a nested record but nesting is disabled")]
    NestingDisabled {
        /// Field holding the nested record.
        field: String,
    },

    /// Nested records go deeper than the configured limit.
    #[error("nested records exceed the depth limit of {limit}")]
    NestingTooDeep {
        /// Configured limit.
        limit: usize,
    },

    /// A record declares a field the mapper reserves.
    #[error("field name '{field}' is reserved")]
    ReservedField {
        /// Field name.
        field: String,
    },
}

impl MappingError {
    /// Creates a missing field error.
    pub fn missing_field(record: impl Into<String>, field: impl Into<String>) -> Self {
        Self::MissingField {
            record: record.into(),
            field: field.into(),
        }
    }

    /// Creates an invalid field error.
    pub fn invalid_field(
        record: impl Into<String>,
        field: impl Into<String>,
        expected: impl Into<String>,
        found: impl Into<String>,
    ) -> Self {
        Self::InvalidField {
            record: record.into(),
            field: field.into(),
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Creates a malformed nested reference error.
    pub fn malformed_nest(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedNest {
            field: field.into(),
            message: message.into(),
        }
    }
}
