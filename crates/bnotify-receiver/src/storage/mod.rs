//! Durable state for the receiving device.
//!
//! - per sender identity: the merged [`UsedRange`] list
//! - `password` and `registration_id` settings
//! - the cached derived key, tagged with its salt
//! - a display-id counter for surfaced notifications
//!
//! Each method is one transaction. In particular [`ReceiverStorage::use_sequence`]
//! commits the updated ranges before returning `true`, so an accepted
//! sequence number is never forgotten by a crash.

mod error;
mod memory;
mod redb;

use bnotify_crypto::{CachedKey, KEY_SIZE, SymmetricKey};
use bnotify_proto::ServerIdentity;
pub use error::StorageError;
pub use memory::MemoryStorage;
use serde::{Deserialize, Serialize};

pub use self::redb::RedbStorage;
use crate::replay::{ReplayGuard, UsedRange};

/// User-editable secrets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Secret {
    /// Shared password (KDF input)
    Password,
    /// Device registration id (KDF salt)
    RegistrationId,
}

impl Secret {
    pub(crate) const fn key(self) -> &'static str {
        match self {
            Self::Password => "password",
            Self::RegistrationId => "registration_id",
        }
    }
}

/// Storage abstraction for the receiver
///
/// Clone + Send + Sync; clones share the same underlying state.
pub trait ReceiverStorage: Clone + Send + Sync + 'static {
    /// Atomically check and record `seq` for `server_id`.
    ///
    /// Returns `true` if `seq` was fresh. The updated ranges are durable
    /// before this returns.
    fn use_sequence(&self, server_id: ServerIdentity, seq: u64) -> Result<bool, StorageError>;

    /// Ranges recorded for `server_id`, ascending.
    fn used_ranges(&self, server_id: ServerIdentity) -> Result<Vec<UsedRange>, StorageError>;

    /// Current value of a secret.
    fn secret(&self, secret: Secret) -> Result<Option<String>, StorageError>;

    /// Store a secret. Returns whether the value changed.
    ///
    /// A change also drops the cached key, in the same transaction.
    fn set_secret(&self, secret: Secret, value: &str) -> Result<bool, StorageError>;

    /// Persisted derived key, if any.
    fn cached_key(&self) -> Result<Option<CachedKey>, StorageError>;

    /// Persist a key derived from `password` and `entry.salt`.
    ///
    /// Stored only if both are still the current secrets, checked in the same
    /// transaction as the write. Returns whether the key was stored.
    fn store_cached_key(&self, entry: &CachedKey, password: &str) -> Result<bool, StorageError>;

    /// Next notification display id (wrapping).
    fn next_display_id(&self) -> Result<u32, StorageError>;
}

/// On-disk form of a [`CachedKey`].
#[derive(Serialize, Deserialize)]
struct StoredKey {
    #[serde(with = "serde_bytes")]
    salt: Vec<u8>,
    #[serde(with = "serde_bytes")]
    key: Vec<u8>,
}

pub(crate) fn encode_cached_key(entry: &CachedKey) -> Result<Vec<u8>, StorageError> {
    let stored = StoredKey { salt: entry.salt.clone(), key: entry.key.as_bytes().to_vec() };
    let mut bytes = Vec::new();
    ciborium::into_writer(&stored, &mut bytes)
        .map_err(|e| StorageError::Serialization(e.to_string()))?;
    Ok(bytes)
}

pub(crate) fn decode_cached_key(bytes: &[u8]) -> Result<CachedKey, StorageError> {
    let stored: StoredKey =
        ciborium::from_reader(bytes).map_err(|e| StorageError::Serialization(e.to_string()))?;
    let key: [u8; KEY_SIZE] = stored.key.as_slice().try_into().map_err(|_| {
        StorageError::Corrupt(format!("cached key is {} bytes", stored.key.len()))
    })?;
    Ok(CachedKey { salt: stored.salt, key: SymmetricKey::from_bytes(key) })
}

pub(crate) fn encode_ranges(ranges: &[UsedRange]) -> Result<Vec<u8>, StorageError> {
    let mut bytes = Vec::new();
    ciborium::into_writer(ranges, &mut bytes)
        .map_err(|e| StorageError::Serialization(e.to_string()))?;
    Ok(bytes)
}

/// Decode and validate a persisted range list.
pub(crate) fn decode_guard(bytes: &[u8]) -> Result<ReplayGuard, StorageError> {
    let ranges: Vec<UsedRange> =
        ciborium::from_reader(bytes).map_err(|e| StorageError::Serialization(e.to_string()))?;
    ReplayGuard::from_ranges(&ranges).map_err(|e| StorageError::Corrupt(e.to_string()))
}
