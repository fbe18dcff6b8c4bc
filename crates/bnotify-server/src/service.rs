//! Request handling for the daemon.
//!
//! Glues the [`Sequencer`] (synchronous, durable) to the [`Dispatcher`]
//! (asynchronous, retrying). A `SendNotification` succeeds as soon as the
//! message is committed to storage; delivery continues in the background and
//! its failures are never reported to the caller.

use std::sync::Arc;

use bnotify_crypto::SymmetricKey;
use bnotify_proto::{NotificationContent, RpcErrorKind, RpcRequest, RpcResponse, ServerIdentity};
use tokio::task::JoinHandle;

use crate::{
    dispatcher::{DeliveryOutcome, Dispatcher, DispatcherConfig},
    env::Environment,
    error::QueueError,
    gateway::Gateway,
    sequencer::Sequencer,
    storage::{Storage, StorageError},
};

/// A message accepted into the queue.
#[derive(Debug)]
pub struct Enqueued {
    /// Allocated sequence number
    pub seq: u64,
    /// Background delivery task
    pub delivery: JoinHandle<DeliveryOutcome>,
}

/// Sender-side pipeline: allocate, queue, dispatch.
pub struct NotifyService<S: Storage, G, E: Environment> {
    sequencer: Sequencer<S, E>,
    dispatcher: Dispatcher<S, G, E>,
}

impl<S: Storage, G, E: Environment> Clone for NotifyService<S, G, E> {
    fn clone(&self) -> Self {
        Self { sequencer: self.sequencer.clone(), dispatcher: self.dispatcher.clone() }
    }
}

impl<S: Storage, G: Gateway, E: Environment> NotifyService<S, G, E> {
    /// Assemble the pipeline over one shared store.
    pub fn new(
        storage: S,
        gateway: G,
        env: E,
        key: Arc<SymmetricKey>,
        config: DispatcherConfig,
    ) -> Self {
        let sequencer = Sequencer::new(storage.clone(), env.clone(), key);
        let dispatcher = Dispatcher::new(storage, gateway, env, config);
        Self { sequencer, dispatcher }
    }

    /// Startup recovery: make sure an identity exists, then resume every
    /// pending message from its persisted attempt count.
    pub fn recover(
        &self,
    ) -> Result<(ServerIdentity, Vec<JoinHandle<DeliveryOutcome>>), StorageError> {
        let identity = self.sequencer.ensure_identity()?;
        tracing::info!(server_id = %identity, "server identity loaded");

        let resumed = self.dispatcher.resume_pending()?;
        Ok((identity, resumed))
    }

    /// Queue a notification and start delivering it.
    pub fn send(&self, notification: NotificationContent) -> Result<Enqueued, QueueError> {
        let pending = self.sequencer.enqueue(notification)?;
        let delivery = self.dispatcher.spawn(pending.seq);
        Ok(Enqueued { seq: pending.seq, delivery })
    }

    /// Answer one RPC.
    pub fn handle(&self, request: RpcRequest) -> RpcResponse {
        let notification = match request.notification() {
            Ok(notification) => notification,
            Err(e) => return RpcResponse::error(e.into(), e.to_string()),
        };

        match self.send(notification) {
            // Delivery outlives the request
            Ok(Enqueued { seq, .. }) => {
                tracing::debug!(seq, "send request accepted");
                RpcResponse::Sent
            },
            Err(QueueError::Validation(e)) => RpcResponse::error(e.into(), e.to_string()),
            Err(QueueError::Storage(e)) => {
                tracing::error!(error = %e, "failed to queue notification");
                RpcResponse::error(RpcErrorKind::Internal, "internal error")
            },
        }
    }

    /// Sequencer half, for inspection.
    pub fn sequencer(&self) -> &Sequencer<S, E> {
        &self.sequencer
    }

    /// Dispatcher half, for inspection.
    pub fn dispatcher(&self) -> &Dispatcher<S, G, E> {
        &self.dispatcher
    }
}
