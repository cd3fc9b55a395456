//! Error types for the cache.

use mongoclass_codec::CodecError;
use mongoclass_core::CoreError;
use thiserror::Error;

/// Result type for list store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for lock operations.
pub type LockResult<T> = Result<T, LockError>;

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Errors raised by a [`ListStore`](crate::ListStore).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The store could not be reached.
    #[error("list store unavailable: {message}")]
    Unavailable {
        /// Error message.
        message: String,
    },
}

impl StoreError {
    /// Creates an unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }
}

/// Errors raised by a [`DistributedLock`](crate::DistributedLock).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LockError {
    /// The lock service could not be reached.
    #[error("lock service unavailable: {message}")]
    Unavailable {
        /// Error message.
        message: String,
    },

    /// Release of a lock that is not held.
    #[error("lock '{name}' is not held")]
    NotHeld {
        /// Lock name.
        name: String,
    },
}

impl LockError {
    /// Creates an unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }
}

/// Errors that can occur in cache operations.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    /// Primary store or mapping error.
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// Entry serialization error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// List store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Lock error.
    #[error("lock error: {0}")]
    Lock(#[from] LockError),

    /// Page size of zero.
    #[error("batch size must be at least 1")]
    InvalidBatchSize,

    /// Refresh interval of zero.
    #[error("refresh interval must be greater than zero")]
    InvalidInterval,

    /// A cached entry is not a serialized document.
    #[error("corrupt cache entry in '{key}': {message}")]
    CorruptEntry {
        /// List key.
        key: String,
        /// What is wrong with it.
        message: String,
    },

    /// The refresh thread could not be started.
    #[error("failed to start refresh: {message}")]
    Spawn {
        /// Error message.
        message: String,
    },
}

impl From<mongoclass_core::MappingError> for CacheError {
    fn from(err: mongoclass_core::MappingError) -> Self {
        Self::Core(err.into())
    }
}
