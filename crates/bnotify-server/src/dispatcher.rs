//! Retrying delivery of queued messages.
//!
//! One tokio task per [`PendingMessage`](crate::storage::PendingMessage),
//! coordinated only through storage:
//!
//! ```text
//! Queued ──► Attempting ──► Delivered   (gateway ok: entry removed)
//!              │  ▲
//!              │  └── gateway error: next schedule step
//!              ▼
//!           Exhausted                   (attempts >= K: entry removed)
//! ```
//!
//! Each pass through `Attempting` reloads the entry, persists `attempts + 1`
//! *before* sleeping `schedule[attempts]`, then calls the gateway. A crash at
//! any point resumes from the persisted count, so restarting never resets
//! the backoff. Startup recovery is the same code path: [`Dispatcher::resume_pending`]
//! spawns a task for every stored entry.

use std::{sync::Arc, time::Duration};

use tokio::task::JoinHandle;

use crate::{
    env::Environment,
    gateway::Gateway,
    storage::{Storage, StorageError},
};

/// Retry schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Delay before attempt `i` is `schedule[i]`; `schedule.len()` is the
    /// retry budget K.
    pub schedule: Vec<Duration>,
}

impl DispatcherConfig {
    /// Retry budget K.
    pub fn max_attempts(&self) -> u32 {
        u32::try_from(self.schedule.len()).unwrap_or(u32::MAX)
    }
}

impl Default for DispatcherConfig {
    /// 0s, 1s, 2s, 4s, 8s, 16s, 1m, 2m, 4m, 8m, 16m
    fn default() -> Self {
        let secs = [0, 1, 2, 4, 8, 16, 60, 120, 240, 480, 960];
        Self { schedule: secs.into_iter().map(Duration::from_secs).collect() }
    }
}

/// How a delivery task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Gateway accepted the message
    Delivered {
        /// Attempts used, including the successful one
        attempts: u32,
    },
    /// Retry budget ran out; message dropped
    Exhausted {
        /// Attempts made
        attempts: u32,
    },
    /// Entry was not (or no longer) in storage
    Missing,
    /// Storage failed; the entry stays queued for the next startup
    Stalled,
}

struct Inner<S, G, E> {
    storage: S,
    gateway: G,
    env: E,
    config: DispatcherConfig,
}

/// Spawns and runs per-message delivery state machines.
///
/// Cheap to clone (Arc).
pub struct Dispatcher<S, G, E> {
    inner: Arc<Inner<S, G, E>>,
}

impl<S, G, E> Clone for Dispatcher<S, G, E> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<S: Storage, G: Gateway, E: Environment> Dispatcher<S, G, E> {
    /// Create a dispatcher.
    pub fn new(storage: S, gateway: G, env: E, config: DispatcherConfig) -> Self {
        Self { inner: Arc::new(Inner { storage, gateway, env, config }) }
    }

    /// Retry configuration in use.
    pub fn config(&self) -> &DispatcherConfig {
        &self.inner.config
    }

    /// Run delivery of `seq` in its own task.
    ///
    /// Tasks are independent: one message's backoff never delays another.
    pub fn spawn(&self, seq: u64) -> JoinHandle<DeliveryOutcome> {
        let this = self.clone();
        tokio::spawn(async move { this.deliver(seq).await })
    }

    /// Spawn a task for every stored pending message.
    ///
    /// Each resumes from its persisted attempt count.
    pub fn resume_pending(&self) -> Result<Vec<JoinHandle<DeliveryOutcome>>, StorageError> {
        let pending = self.inner.storage.list_pending()?;
        if !pending.is_empty() {
            tracing::info!(count = pending.len(), "resuming pending notifications");
        }
        Ok(pending.into_iter().map(|seq| self.spawn(seq)).collect())
    }

    /// Drive one message to `Delivered` or `Exhausted`.
    pub async fn deliver(&self, seq: u64) -> DeliveryOutcome {
        let inner = &*self.inner;
        let max_attempts = inner.config.max_attempts();

        loop {
            let pending = match inner.storage.load_pending(seq) {
                Ok(Some(pending)) => pending,
                Ok(None) => {
                    tracing::debug!(seq, "pending message gone");
                    return DeliveryOutcome::Missing;
                },
                Err(e) => return stalled(seq, &e),
            };

            if pending.attempts >= max_attempts {
                if let Err(e) = inner.storage.remove_pending(seq) {
                    return stalled(seq, &e);
                }
                tracing::warn!(
                    seq,
                    attempts = pending.attempts,
                    "retry budget exhausted, dropping notification"
                );
                return DeliveryOutcome::Exhausted { attempts: pending.attempts };
            }

            let delay = inner.config.schedule[pending.attempts as usize];

            let attempt = match inner.storage.record_attempt(seq) {
                Ok(attempt) => attempt,
                Err(StorageError::NotFound { .. }) => return DeliveryOutcome::Missing,
                Err(e) => return stalled(seq, &e),
            };

            debug_assert_eq!(attempt, pending.attempts + 1);

            inner.env.sleep(delay).await;

            let payload = match pending.envelope.to_gateway_payload() {
                Ok(payload) => payload,
                Err(e) => return stalled(seq, &StorageError::Serialization(e.to_string())),
            };

            tracing::debug!(seq, attempt, ?delay, "pushing to gateway");

            match inner.gateway.push(&payload).await {
                Ok(()) => {
                    if let Err(e) = inner.storage.remove_pending(seq) {
                        // Delivered but still queued: resent after restart,
                        // deduplicated by the receiver.
                        tracing::error!(seq, error = %e, "failed to remove delivered message");
                    }
                    tracing::info!(seq, attempt, "notification delivered");
                    return DeliveryOutcome::Delivered { attempts: attempt };
                },
                Err(e) => {
                    tracing::warn!(seq, attempt, error = %e, "delivery attempt failed");
                },
            }
        }
    }
}

fn stalled(seq: u64, error: &StorageError) -> DeliveryOutcome {
    tracing::error!(seq, error = %error, "storage failure, delivery stalled until restart");
    DeliveryOutcome::Stalled
}
