//! Codec errors.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Why bytes could not be read as a value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The input ended inside a value.
    #[error("input truncated")]
    Truncated,

    /// The input holds more than one value.
    #[error("{count} bytes left after the value")]
    TrailingBytes {
        /// Unread bytes.
        count: usize,
    },

    /// Valid CBOR that breaks a canonical form rule.
    #[error("not canonical: {rule}")]
    NotCanonical {
        /// The rule that was broken.
        rule: &'static str,
    },

    /// Well-formed CBOR outside the value model (unknown tags, simple
    /// values, non-text map keys).
    #[error("unsupported item: {item}")]
    Unsupported {
        /// What was found.
        item: String,
    },

    /// Bytes that are not CBOR at all.
    #[error("malformed input: {message}")]
    Malformed {
        /// What is wrong.
        message: String,
    },

    /// An unsigned or negative integer outside the `i64` range.
    #[error("integer does not fit in 64 signed bits")]
    IntegerOverflow,

    /// A declared length is larger than the reader accepts.
    #[error("declared length {claimed} exceeds limit {limit}")]
    TooLarge {
        /// Declared length.
        claimed: u64,
        /// Accepted maximum.
        limit: u64,
    },

    /// A document was expected at the top level.
    #[error("expected a document, found {found}")]
    NotADocument {
        /// Kind actually decoded.
        found: &'static str,
    },
}

impl CodecError {
    /// Creates a malformed input error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }

    /// Creates an unsupported item error.
    pub fn unsupported(item: impl Into<String>) -> Self {
        Self::Unsupported { item: item.into() }
    }
}
