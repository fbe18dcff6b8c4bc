//! Error types for key derivation and envelope operations

use thiserror::Error;

/// Errors from bnotify cryptographic operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// Salt is too short to be a meaningful salt
    #[error("invalid salt length: need at least {min} bytes, got {actual}")]
    InvalidSalt {
        /// Minimum salt length
        min: usize,
        /// Actual salt length
        actual: usize,
    },

    /// Envelope failed authentication (tampered, wrong key, or malformed)
    #[error("authentication failed: {reason}")]
    AuthenticationFailed {
        /// What check failed
        reason: String,
    },

    /// Plaintext message could not be serialized
    #[error("serialization failed: {0}")]
    Serialization(String),
}

impl CryptoError {
    pub(crate) fn auth(reason: impl Into<String>) -> Self {
        Self::AuthenticationFailed { reason: reason.into() }
    }
}
