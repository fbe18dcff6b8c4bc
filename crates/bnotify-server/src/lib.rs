//! Bnotify sender daemon.
//!
//! Accepts `SendNotification` requests over a local socket, queues each one
//! durably as a sealed envelope, and pushes it to the gateway with bounded
//! exponential backoff.
//!
//! # Architecture
//!
//! ```text
//! RPC ──► NotifyService ──► Sequencer ──► Storage (pending, settings)
//!                │                            ▲
//!                └──► Dispatcher (task/seq) ──┘──► Gateway
//! ```
//!
//! Storage is the only shared state. Restart recovery reuses the normal
//! dispatch path: every pending entry gets a task at startup.
//!
//! # Components
//!
//! - [`Storage`]: durable identity, counter, and queue ([`RedbStorage`] in
//!   production)
//! - [`Sequencer`]: atomic allocate + seal + enqueue
//! - [`Dispatcher`]: per-message retry state machine
//! - [`Gateway`]: push sink ([`HttpGateway`] in production)
//! - [`Environment`]: sleep and randomness ([`SystemEnv`] in production)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod dispatcher;
mod env;
mod error;
mod gateway;
pub mod rpc;
mod sequencer;
mod service;
pub mod storage;

use std::{future::Future, path::PathBuf, sync::Arc};

use bnotify_crypto::KeyDeriver;
use bnotify_proto::RpcAddr;
pub use dispatcher::{DeliveryOutcome, Dispatcher, DispatcherConfig};
pub use env::{Environment, SystemEnv};
pub use error::{GatewayError, QueueError, ServerError};
pub use gateway::{Gateway, HttpGateway, HttpGatewayConfig};
pub use rpc::RpcListener;
pub use sequencer::Sequencer;
pub use service::{Enqueued, NotifyService};
pub use storage::{
    ChaoticStorage, MemoryStorage, PendingMessage, RedbStorage, Storage, StorageError,
};

/// Everything the daemon needs to start.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// RPC listen address
    pub listen: RpcAddr,
    /// Redb database file
    pub database: PathBuf,
    /// Shared secret with the receiver
    pub password: String,
    /// Gateway settings; `registration_id` doubles as the KDF salt
    pub gateway: HttpGatewayConfig,
    /// Retry schedule
    pub dispatcher: DispatcherConfig,
    /// PBKDF2 rounds
    pub kdf_iterations: u32,
}

/// Run the daemon until `shutdown` resolves.
///
/// Startup order: open the store, derive the key, ensure an identity exists,
/// resume pending deliveries, then accept RPCs. Any startup failure is fatal.
pub async fn run_daemon(
    config: DaemonConfig,
    shutdown: impl Future<Output = ()>,
) -> Result<(), ServerError> {
    let storage = RedbStorage::open(&config.database)?;
    tracing::info!(database = %config.database.display(), "store opened");

    let deriver = KeyDeriver::with_iterations(config.kdf_iterations);
    let key = deriver.derive(&config.password, config.gateway.registration_id.as_bytes())?;

    let gateway =
        HttpGateway::new(config.gateway).map_err(|e| ServerError::Config(e.to_string()))?;

    let service =
        NotifyService::new(storage, gateway, SystemEnv::new(), Arc::new(key), config.dispatcher);

    // Delivery tasks run detached; their handles are not needed here
    let (_, resumed) = service.recover()?;
    drop(resumed);

    let listener = RpcListener::bind(&config.listen).await?;
    tracing::info!(addr = %config.listen, "listening for rpc");

    listener.serve(service, shutdown).await
}
