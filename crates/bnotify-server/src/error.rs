//! Daemon error types.

use std::fmt;

use bnotify_proto::ValidationError;
use thiserror::Error;

use crate::storage::StorageError;

/// Errors from [`crate::Sequencer::enqueue`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// Notification rejected before anything was persisted
    #[error("invalid notification: {0}")]
    Validation(#[from] ValidationError),

    /// Transaction aborted; nothing was persisted
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Errors from a single push gateway attempt.
///
/// All variants are transient from the dispatcher's point of view.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// Connection, TLS, or timeout failure
    #[error("transport error: {0}")]
    Transport(String),

    /// Gateway answered with a non-success status
    #[error("gateway returned HTTP {status}")]
    Status {
        /// HTTP status code
        status: u16,
    },

    /// Gateway accepted the request but reported an application error
    #[error("gateway rejected message: {0}")]
    Rejected(String),
}

/// Errors that prevent the daemon from starting or serving.
#[derive(Debug)]
pub enum ServerError {
    /// Configuration error (unreadable secret file, bad address, etc.).
    ///
    /// Fatal at startup. Fix configuration and restart.
    Config(String),

    /// Durable store could not be opened or is inconsistent.
    ///
    /// Fatal at startup: the daemon must not run on inconsistent state.
    Storage(StorageError),

    /// Key derivation failed (e.g. registration id too short to salt).
    Crypto(bnotify_crypto::CryptoError),

    /// Listener or socket error.
    Transport(String),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {msg}"),
            Self::Storage(err) => write!(f, "storage error: {err}"),
            Self::Crypto(err) => write!(f, "crypto error: {err}"),
            Self::Transport(msg) => write!(f, "transport error: {msg}"),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Storage(err) => Some(err),
            Self::Crypto(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StorageError> for ServerError {
    fn from(err: StorageError) -> Self {
        Self::Storage(err)
    }
}

impl From<bnotify_crypto::CryptoError> for ServerError {
    fn from(err: bnotify_crypto::CryptoError) -> Self {
        Self::Crypto(err)
    }
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}
