//! Plaintext protocol objects.

use serde::{Deserialize, Serialize};

use crate::{ServerIdentity, ValidationError, cbor, errors::Result};

/// Largest accepted `title.len() + text.len()`, in bytes.
///
/// Leaves room for the message framing, the AEAD tag, and the envelope
/// framing under [`crate::cbor::MAX_DECODE_SIZE`], so any notification the
/// sender accepts is one the receiver can decode.
pub const MAX_CONTENT_SIZE: usize = 60 * 1024;

/// User-visible notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationContent {
    /// Notification title. Must be non-empty.
    pub title: String,
    /// Notification body. Must be non-empty.
    pub text: String,
}

impl NotificationContent {
    /// Build a notification, rejecting empty fields.
    pub fn new(
        title: impl Into<String>,
        text: impl Into<String>,
    ) -> std::result::Result<Self, ValidationError> {
        let content = Self { title: title.into(), text: text.into() };
        content.validate()?;
        Ok(content)
    }

    /// Check that both fields are present and fit [`MAX_CONTENT_SIZE`].
    /// Title is checked first.
    pub fn validate(&self) -> std::result::Result<(), ValidationError> {
        if self.title.is_empty() {
            return Err(ValidationError::MissingTitle);
        }
        if self.text.is_empty() {
            return Err(ValidationError::MissingText);
        }
        let size = self.title.len() + self.text.len();
        if size > MAX_CONTENT_SIZE {
            return Err(ValidationError::TooLarge { size, max: MAX_CONTENT_SIZE });
        }
        Ok(())
    }
}

/// Plaintext carried inside an [`crate::Envelope`].
///
/// `(server_id, seq)` is unique for the lifetime of a sender instance and
/// determines the envelope nonce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Sender instance that allocated `seq`
    pub server_id: ServerIdentity,
    /// Sequence number allocated by the sender
    pub seq: u64,
    /// Notification to surface
    pub notification: NotificationContent,
}

impl Message {
    /// Serialize to CBOR.
    pub fn encode(&self) -> Result<Vec<u8>> {
        cbor::encode(self)
    }

    /// Deserialize from CBOR.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        cbor::decode(bytes)
    }
}
