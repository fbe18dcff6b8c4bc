#![allow(clippy::disallowed_types, reason = "Synchronous in-memory operations only")]

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
};

use bnotify_proto::{Envelope, ServerIdentity};

use super::{FIRST_SEQUENCE, PendingMessage, Storage, StorageError, StoredPending};

/// In-memory storage implementation for testing
///
/// All state is wrapped in Arc<Mutex<>> to allow Clone and concurrent access.
/// Uses `lock().expect()` which will panic if the mutex is poisoned, acceptable
/// for test code.
#[derive(Clone)]
pub struct MemoryStorage {
    inner: Arc<Mutex<MemoryStorageInner>>,
}

struct MemoryStorageInner {
    identity: Option<ServerIdentity>,
    next_seq: u64,
    pending: BTreeMap<u64, StoredPending>,
}

impl MemoryStorage {
    /// Create a new empty `MemoryStorage`
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MemoryStorageInner {
                identity: None,
                next_seq: FIRST_SEQUENCE,
                pending: BTreeMap::new(),
            })),
        }
    }

    /// Start the counter at `next_seq` (for exhaustion tests).
    #[allow(clippy::expect_used)]
    pub fn with_next_sequence(next_seq: u64) -> Self {
        let storage = Self::new();
        storage.inner.lock().expect("Mutex poisoned").next_seq = next_seq;
        storage
    }

    /// Number of queued messages.
    #[allow(clippy::expect_used)]
    pub fn pending_count(&self) -> usize {
        self.inner.lock().expect("Mutex poisoned").pending.len()
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage for MemoryStorage {
    #[allow(clippy::expect_used)]
    fn load_or_init_identity(
        &self,
        candidate: ServerIdentity,
    ) -> Result<ServerIdentity, StorageError> {
        let mut inner = self.inner.lock().expect("Mutex poisoned");
        Ok(*inner.identity.get_or_insert(candidate))
    }

    #[allow(clippy::expect_used)]
    fn server_identity(&self) -> Result<Option<ServerIdentity>, StorageError> {
        Ok(self.inner.lock().expect("Mutex poisoned").identity)
    }

    #[allow(clippy::expect_used)]
    fn next_sequence(&self) -> Result<u64, StorageError> {
        Ok(self.inner.lock().expect("Mutex poisoned").next_seq)
    }

    #[allow(clippy::expect_used)]
    fn enqueue<F>(&self, candidate: ServerIdentity, seal: F) -> Result<PendingMessage, StorageError>
    where
        F: FnOnce(ServerIdentity, u64) -> Result<Envelope, StorageError>,
    {
        let mut inner = self.inner.lock().expect("Mutex poisoned");

        // Nothing is written until seal succeeds
        let identity = inner.identity.unwrap_or(candidate);
        let seq = inner.next_seq;
        let next = seq.checked_add(1).ok_or(StorageError::SequenceExhausted)?;
        let envelope = seal(identity, seq)?;

        let record = StoredPending { envelope, attempts: 0 };
        inner.identity = Some(identity);
        inner.next_seq = next;
        inner.pending.insert(seq, record.clone());

        debug_assert!(inner.next_seq > seq);

        Ok(record.into_pending(seq))
    }

    #[allow(clippy::expect_used)]
    fn load_pending(&self, seq: u64) -> Result<Option<PendingMessage>, StorageError> {
        let inner = self.inner.lock().expect("Mutex poisoned");
        Ok(inner.pending.get(&seq).cloned().map(|record| record.into_pending(seq)))
    }

    #[allow(clippy::expect_used)]
    fn list_pending(&self) -> Result<Vec<u64>, StorageError> {
        Ok(self.inner.lock().expect("Mutex poisoned").pending.keys().copied().collect())
    }

    #[allow(clippy::expect_used)]
    fn record_attempt(&self, seq: u64) -> Result<u32, StorageError> {
        let mut inner = self.inner.lock().expect("Mutex poisoned");
        let record = inner.pending.get_mut(&seq).ok_or(StorageError::NotFound { seq })?;
        record.attempts = record.attempts.saturating_add(1);
        Ok(record.attempts)
    }

    #[allow(clippy::expect_used)]
    fn remove_pending(&self, seq: u64) -> Result<bool, StorageError> {
        Ok(self.inner.lock().expect("Mutex poisoned").pending.remove(&seq).is_some())
    }
}
