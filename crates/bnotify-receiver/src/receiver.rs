//! Receiving pipeline.
//!
//! ```text
//! gateway payload ─► Envelope ─► open(key) ─► Message ─► use_sequence ─► sink
//!   (base64/CBOR)                  │                        │
//!                                  └─ auth failure: drop    └─ replay: drop
//! ```
//!
//! The key is derived from the `password` and `registration_id` settings and
//! cached both in memory and in storage. The replay check commits before the
//! sink is called; a crash in between loses at most one display, never admits
//! a duplicate.

use bnotify_crypto::{CachedKey, CryptoError, KeyDeriver, SymmetricKey, open};
use bnotify_proto::{Envelope, NotificationContent, ProtocolError, ServerIdentity};
use thiserror::Error;

use crate::storage::{ReceiverStorage, Secret, StorageError};

/// Surface for accepted notifications (the device's notification tray).
pub trait NotificationSink: Send + Sync {
    /// Show one notification under a locally unique id.
    fn notify(&self, display_id: u32, notification: &NotificationContent);
}

/// Result of handling one accepted payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveOutcome {
    /// Fresh message, handed to the sink
    Displayed {
        /// Sender identity
        server_id: ServerIdentity,
        /// Sender sequence number
        seq: u64,
        /// Id passed to the sink
        display_id: u32,
    },
    /// Sequence number already seen; dropped
    Replayed {
        /// Sender identity
        server_id: ServerIdentity,
        /// Sender sequence number
        seq: u64,
    },
}

/// Reasons a payload was discarded.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReceiveError {
    /// A required setting is missing
    #[error("receiver not configured: {0} unset")]
    NotConfigured(&'static str),

    /// Payload is not a base64 CBOR envelope
    #[error("malformed payload: {0}")]
    Malformed(#[from] ProtocolError),

    /// Key derivation failed or envelope failed authentication
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// Storage failure
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Opens envelopes, filters replays, and surfaces notifications.
pub struct Receiver<S: ReceiverStorage, N: NotificationSink> {
    storage: S,
    sink: N,
    deriver: KeyDeriver,
}

impl<S: ReceiverStorage, N: NotificationSink> Receiver<S, N> {
    /// Receiver deriving keys with the default PBKDF2 round count.
    pub fn new(storage: S, sink: N) -> Self {
        Self::with_deriver(storage, sink, KeyDeriver::new())
    }

    /// Receiver with an explicit deriver (must match the sender's rounds).
    pub fn with_deriver(storage: S, sink: N, deriver: KeyDeriver) -> Self {
        Self { storage, sink, deriver }
    }

    /// Update the shared password. Returns whether it changed.
    ///
    /// A change drops the cached key.
    pub fn set_password(&self, password: &str) -> Result<bool, StorageError> {
        self.update(Secret::Password, password)
    }

    /// Update the registration id (the KDF salt). Returns whether it changed.
    ///
    /// A change drops the cached key.
    pub fn set_registration_id(&self, registration_id: &str) -> Result<bool, StorageError> {
        self.update(Secret::RegistrationId, registration_id)
    }

    fn update(&self, secret: Secret, value: &str) -> Result<bool, StorageError> {
        let changed = self.storage.set_secret(secret, value)?;
        if changed {
            self.deriver.invalidate();
            tracing::info!(setting = secret.key(), "setting changed, cached key dropped");
        }
        Ok(changed)
    }

    /// Handle one gateway payload.
    ///
    /// Errors mean the payload was discarded; they are logged here and never
    /// leave partial state behind.
    pub fn handle_payload(&self, payload: &str) -> Result<ReceiveOutcome, ReceiveError> {
        let result = self.process(payload);
        match &result {
            Ok(ReceiveOutcome::Displayed { server_id, seq, display_id }) => {
                tracing::info!(server_id = %server_id, seq, display_id, "notification displayed");
            },
            Ok(ReceiveOutcome::Replayed { server_id, seq }) => {
                tracing::debug!(server_id = %server_id, seq, "replayed message dropped");
            },
            Err(ReceiveError::Storage(e)) => {
                tracing::error!(error = %e, "storage failure, message dropped");
            },
            Err(e) => tracing::warn!(error = %e, "discarding message"),
        }
        result
    }

    fn process(&self, payload: &str) -> Result<ReceiveOutcome, ReceiveError> {
        let envelope = Envelope::from_gateway_payload(payload)?;
        let key = self.key()?;
        let message = open(&key, &envelope)?;

        let (server_id, seq) = (message.server_id, message.seq);
        if !self.storage.use_sequence(server_id, seq)? {
            return Ok(ReceiveOutcome::Replayed { server_id, seq });
        }

        let display_id = self.storage.next_display_id()?;
        self.sink.notify(display_id, &message.notification);

        Ok(ReceiveOutcome::Displayed { server_id, seq, display_id })
    }

    /// Current key: memory cache, then persisted cache, then PBKDF2.
    fn key(&self) -> Result<SymmetricKey, ReceiveError> {
        let password = self
            .storage
            .secret(Secret::Password)?
            .ok_or(ReceiveError::NotConfigured("password"))?;
        let registration_id = self
            .storage
            .secret(Secret::RegistrationId)?
            .ok_or(ReceiveError::NotConfigured("registration_id"))?;
        let salt = registration_id.as_bytes();

        if self.deriver.cached().is_none_or(|entry| entry.salt != salt)
            && let Some(persisted) = self.storage.cached_key()?
            && persisted.salt == salt
        {
            self.deriver.prime(persisted);
            tracing::debug!("loaded persisted key");
        }

        let hit = self.deriver.cached().is_some_and(|entry| entry.salt == salt);
        let key = self.deriver.derive(&password, salt)?;

        if !hit {
            let entry = CachedKey { salt: salt.to_vec(), key: key.clone() };
            if !self.storage.store_cached_key(&entry, &password)? {
                // Secrets changed while deriving; keep nothing derived from the old ones
                self.deriver.invalidate();
                tracing::debug!("settings changed during key derivation, key not cached");
            }
        }

        Ok(key)
    }

    /// Underlying storage.
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Notification sink.
    pub fn sink(&self) -> &N {
        &self.sink
    }
}
