//! Protocol error types.

use thiserror::Error;

/// Result alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors raised while encoding or decoding wire objects.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// CBOR serialization failed
    #[error("CBOR encode error: {0}")]
    CborEncode(String),

    /// CBOR deserialization failed
    #[error("CBOR decode error: {0}")]
    CborDecode(String),

    /// Gateway payload was not valid standard base64
    #[error("base64 decode error: {0}")]
    Base64(String),

    /// Socket I/O failed while reading or writing a frame
    #[error("I/O error: {0}")]
    Io(String),

    /// Input exceeds the maximum accepted size
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge {
        /// Actual size
        size: usize,
        /// Maximum allowed size
        max: usize,
    },
}

/// A notification request that must be rejected before anything is persisted.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    /// Title is empty
    #[error("missing title")]
    MissingTitle,

    /// Text is empty
    #[error("missing text")]
    MissingText,

    /// Title and text together exceed the content limit
    #[error("notification too large: {size} bytes (max {max})")]
    TooLarge {
        /// Combined title and text length
        size: usize,
        /// Maximum allowed length
        max: usize,
    },
}
