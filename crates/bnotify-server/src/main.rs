//! Bnotify sender daemon binary.
//!
//! # Usage
//!
//! ```bash
//! bnotifyd --listen /run/bnotify.sock --database bnotify.redb \
//!     --api-key-file api.key --registration-id-file reg.id --password-file password
//! ```

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use bnotify_crypto::KeyDeriver;
use bnotify_proto::RpcAddr;
use bnotify_server::{DaemonConfig, DispatcherConfig, HttpGatewayConfig, ServerError, run_daemon};
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Bnotify notification daemon
#[derive(Parser, Debug)]
#[command(name = "bnotifyd")]
#[command(about = "Queues notifications and pushes them to the paired device")]
#[command(version)]
struct Args {
    /// RPC address: unix socket path or tcp://host:port
    #[arg(long, default_value = "bnotify.sock")]
    listen: RpcAddr,

    /// Database file
    #[arg(long, default_value = "bnotify.redb")]
    database: PathBuf,

    /// File containing the gateway API key
    #[arg(long)]
    api_key_file: PathBuf,

    /// File containing the device registration id
    #[arg(long)]
    registration_id_file: PathBuf,

    /// File containing the shared password
    #[arg(long)]
    password_file: PathBuf,

    /// Gateway endpoint
    #[arg(long, default_value = HttpGatewayConfig::DEFAULT_URL)]
    gateway_url: String,

    /// Per-request gateway deadline in seconds
    #[arg(long, default_value = "30")]
    request_timeout_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn read_secret(path: &Path) -> Result<String, ServerError> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| ServerError::Config(format!("{}: {e}", path.display())))?;
    let secret = contents.trim();
    if secret.is_empty() {
        return Err(ServerError::Config(format!("{} is empty", path.display())));
    }
    Ok(secret.to_string())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "cannot install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
            },
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("bnotifyd starting");

    let mut gateway = HttpGatewayConfig::new(
        read_secret(&args.api_key_file)?,
        read_secret(&args.registration_id_file)?,
    );
    gateway.url = args.gateway_url;
    gateway.timeout = Duration::from_secs(args.request_timeout_secs);

    let config = DaemonConfig {
        listen: args.listen,
        database: args.database,
        password: read_secret(&args.password_file)?,
        gateway,
        dispatcher: DispatcherConfig::default(),
        kdf_iterations: KeyDeriver::DEFAULT_ITERATIONS,
    };

    run_daemon(config, shutdown_signal()).await?;

    tracing::info!("bnotifyd stopped");

    Ok(())
}
