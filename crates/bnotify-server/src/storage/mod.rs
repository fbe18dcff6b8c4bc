//! Durable state for the sender daemon.
//!
//! Two namespaces:
//!
//! - `settings`: the [`ServerIdentity`] and the next sequence number
//! - `pending`: `seq -> PendingMessage` for every accepted but unconfirmed
//!   notification
//!
//! The store is the single source of truth shared by the RPC path and every
//! dispatcher task. The trait is synchronous; each method is one transaction.

mod chaotic;
mod error;
mod memory;
mod redb;

use bnotify_proto::{Envelope, ServerIdentity};
pub use chaotic::ChaoticStorage;
pub use error::StorageError;
pub use memory::MemoryStorage;
use serde::{Deserialize, Serialize};

pub use self::redb::RedbStorage;

/// First sequence number handed out by a fresh store.
pub const FIRST_SEQUENCE: u64 = 1;

/// A sealed notification waiting for confirmed delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMessage {
    /// Sequence number (key in the `pending` namespace)
    pub seq: u64,
    /// Sealed envelope, ready for the gateway
    pub envelope: Envelope,
    /// Delivery attempts started so far
    pub attempts: u32,
}

/// On-disk form of a [`PendingMessage`] (the key carries `seq`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct StoredPending {
    pub envelope: Envelope,
    pub attempts: u32,
}

impl StoredPending {
    pub(crate) fn encode(&self) -> Result<Vec<u8>, StorageError> {
        let mut bytes = Vec::new();
        ciborium::into_writer(self, &mut bytes)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        Ok(bytes)
    }

    pub(crate) fn decode(bytes: &[u8]) -> Result<Self, StorageError> {
        ciborium::from_reader(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
    }

    pub(crate) fn into_pending(self, seq: u64) -> PendingMessage {
        PendingMessage { seq, envelope: self.envelope, attempts: self.attempts }
    }
}

/// Storage abstraction for the sender's identity, counter, and queue
///
/// Must be Clone (shared by the RPC handler and every dispatcher task), Send +
/// Sync, and synchronous. Implementations share internal state via Arc, so
/// clones access the same underlying storage.
///
/// Implementations serialize mutations: no caller can observe a partially
/// applied method.
pub trait Storage: Clone + Send + Sync + 'static {
    /// Return the persisted identity, persisting `candidate` first if none
    /// exists yet.
    ///
    /// Idempotent: once an identity is stored it never changes.
    fn load_or_init_identity(
        &self,
        candidate: ServerIdentity,
    ) -> Result<ServerIdentity, StorageError>;

    /// Persisted identity, if any.
    fn server_identity(&self) -> Result<Option<ServerIdentity>, StorageError>;

    /// Next sequence number that will be allocated.
    fn next_sequence(&self) -> Result<u64, StorageError>;

    /// Allocate a sequence number and queue a sealed message, atomically.
    ///
    /// In one transaction: read (or create from `candidate`) the identity,
    /// take `seq` from the counter and advance it, call `seal(identity, seq)`,
    /// and persist `PendingMessage { seq, envelope, attempts: 0 }`.
    ///
    /// # Invariants
    ///
    /// - Post (Ok): counter advanced by exactly one and the pending entry exists
    /// - Post (Err): nothing changed, including when `seal` fails
    fn enqueue<F>(&self, candidate: ServerIdentity, seal: F) -> Result<PendingMessage, StorageError>
    where
        F: FnOnce(ServerIdentity, u64) -> Result<Envelope, StorageError>;

    /// Load one pending message.
    fn load_pending(&self, seq: u64) -> Result<Option<PendingMessage>, StorageError>;

    /// Sequence numbers of all pending messages, ascending.
    fn list_pending(&self) -> Result<Vec<u64>, StorageError>;

    /// Increment and persist the attempt counter. Returns the new count.
    ///
    /// Returns `StorageError::NotFound` if the message is gone.
    fn record_attempt(&self, seq: u64) -> Result<u32, StorageError>;

    /// Delete a pending message. Returns whether it existed.
    fn remove_pending(&self, seq: u64) -> Result<bool, StorageError>;
}
