#![allow(clippy::disallowed_types, reason = "Synchronous in-memory operations only")]

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use bnotify_crypto::CachedKey;
use bnotify_proto::ServerIdentity;

use super::{ReceiverStorage, Secret, StorageError};
use crate::replay::{ReplayGuard, UsedRange};

/// In-memory receiver storage for tests.
///
/// Uses `lock().expect()` which will panic if the mutex is poisoned.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    guards: HashMap<ServerIdentity, ReplayGuard>,
    secrets: HashMap<Secret, String>,
    cached_key: Option<CachedKey>,
    next_display_id: u32,
}

impl MemoryStorage {
    /// Create a new empty `MemoryStorage`
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReceiverStorage for MemoryStorage {
    #[allow(clippy::expect_used)]
    fn use_sequence(&self, server_id: ServerIdentity, seq: u64) -> Result<bool, StorageError> {
        let mut inner = self.inner.lock().expect("Mutex poisoned");
        Ok(inner.guards.entry(server_id).or_default().use_seq(seq))
    }

    #[allow(clippy::expect_used)]
    fn used_ranges(&self, server_id: ServerIdentity) -> Result<Vec<UsedRange>, StorageError> {
        let inner = self.inner.lock().expect("Mutex poisoned");
        Ok(inner.guards.get(&server_id).map(ReplayGuard::ranges).unwrap_or_default())
    }

    #[allow(clippy::expect_used)]
    fn secret(&self, secret: Secret) -> Result<Option<String>, StorageError> {
        Ok(self.inner.lock().expect("Mutex poisoned").secrets.get(&secret).cloned())
    }

    #[allow(clippy::expect_used)]
    fn set_secret(&self, secret: Secret, value: &str) -> Result<bool, StorageError> {
        let mut inner = self.inner.lock().expect("Mutex poisoned");
        if inner.secrets.get(&secret).is_some_and(|current| current == value) {
            return Ok(false);
        }
        inner.secrets.insert(secret, value.to_string());
        inner.cached_key = None;
        Ok(true)
    }

    #[allow(clippy::expect_used)]
    fn cached_key(&self) -> Result<Option<CachedKey>, StorageError> {
        Ok(self.inner.lock().expect("Mutex poisoned").cached_key.clone())
    }

    #[allow(clippy::expect_used)]
    fn store_cached_key(&self, entry: &CachedKey, password: &str) -> Result<bool, StorageError> {
        let mut inner = self.inner.lock().expect("Mutex poisoned");
        let current = inner.secrets.get(&Secret::Password).is_some_and(|p| p == password)
            && inner
                .secrets
                .get(&Secret::RegistrationId)
                .is_some_and(|r| r.as_bytes() == entry.salt.as_slice());
        if current {
            inner.cached_key = Some(entry.clone());
        }
        Ok(current)
    }

    #[allow(clippy::expect_used)]
    fn next_display_id(&self) -> Result<u32, StorageError> {
        let mut inner = self.inner.lock().expect("Mutex poisoned");
        let id = inner.next_display_id;
        inner.next_display_id = id.wrapping_add(1);
        Ok(id)
    }
}
