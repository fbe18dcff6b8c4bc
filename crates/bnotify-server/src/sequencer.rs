//! Sequence allocation and write-ahead queuing.
//!
//! Turns a validated notification into a durably queued, sealed envelope in
//! one storage transaction:
//!
//! 1. read (or create) the `ServerIdentity`
//! 2. take `seq` from the counter and advance it
//! 3. seal `Message { server_id, seq, notification }`
//! 4. persist `PendingMessage { seq, envelope, attempts: 0 }`
//!
//! Network delivery happens later, in the dispatcher. Because the pending
//! entry is committed before `enqueue` returns, no attempt is ever made for a
//! message that a crash could lose.

use std::sync::Arc;

use bnotify_crypto::{SymmetricKey, seal};
use bnotify_proto::{Message, NotificationContent, ServerIdentity};

use crate::{
    env::Environment,
    error::QueueError,
    storage::{PendingMessage, Storage, StorageError},
};

/// Allocates sequence numbers and queues sealed messages.
///
/// Cheap to clone; clones share storage and key.
#[derive(Clone)]
pub struct Sequencer<S: Storage, E: Environment> {
    storage: S,
    env: E,
    key: Arc<SymmetricKey>,
}

impl<S: Storage, E: Environment> Sequencer<S, E> {
    /// Create a sequencer sealing with `key`.
    pub fn new(storage: S, env: E, key: Arc<SymmetricKey>) -> Self {
        Self { storage, env, key }
    }

    /// Persisted identity, creating a random one on first use.
    pub fn ensure_identity(&self) -> Result<ServerIdentity, StorageError> {
        self.storage.load_or_init_identity(self.candidate_identity())
    }

    /// Validate, allocate, seal and persist one notification.
    ///
    /// Returns the queued message; its `seq` is strictly greater than every
    /// previously returned one.
    ///
    /// # Errors
    ///
    /// - `QueueError::Validation` if title or text is empty (nothing persisted)
    /// - `QueueError::Storage` if the transaction aborted (nothing persisted)
    pub fn enqueue(&self, notification: NotificationContent) -> Result<PendingMessage, QueueError> {
        notification.validate()?;

        let key = Arc::clone(&self.key);
        let pending = self.storage.enqueue(self.candidate_identity(), move |server_id, seq| {
            let message = Message { server_id, seq, notification };
            seal(&key, &message).map_err(|e| StorageError::Serialization(e.to_string()))
        })?;

        tracing::info!(seq = pending.seq, "notification queued");

        Ok(pending)
    }

    /// Underlying storage.
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Fresh random identity, used only if none is persisted yet.
    fn candidate_identity(&self) -> ServerIdentity {
        let mut bytes = [0u8; ServerIdentity::SIZE];
        self.env.random_bytes(&mut bytes);
        ServerIdentity::from_bytes(bytes)
    }
}
