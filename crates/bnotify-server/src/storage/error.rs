//! Storage error types.
//!
//! - `NotFound`: no pending message under that sequence number
//! - `SequenceExhausted`: the counter reached `u64::MAX`
//! - `Serialization`: failed to encode/decode a stored record
//! - `Corrupt`: stored bytes violate an invariant (wrong length, etc.)
//! - `Io`: underlying database errors

use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Pending message not found
    #[error("pending message not found: seq {seq}")]
    NotFound {
        /// Sequence number that was not found
        seq: u64,
    },

    /// No sequence numbers left to allocate
    ///
    /// Allocating past `u64::MAX` would wrap and reuse a nonce, so the queue
    /// refuses instead.
    #[error("sequence space exhausted")]
    SequenceExhausted,

    /// Serialization or deserialization failed
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Stored data is inconsistent
    #[error("corrupt store: {0}")]
    Corrupt(String),

    /// I/O error (file system, database, etc.)
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err.to_string())
    }
}
