//! `bnotify`: send one notification through the local daemon.
//!
//! Exits non-zero if the daemon cannot be reached or rejects the request.
//!
//! ```bash
//! bnotify --socket /run/bnotify.sock --title "Build" --text "finished"
//! ```

use bnotify_client::send_notification;
use bnotify_proto::RpcAddr;
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Send a notification to the paired device
#[derive(Parser, Debug)]
#[command(name = "bnotify")]
#[command(version)]
struct Args {
    /// Daemon RPC address: unix socket path or tcp://host:port
    #[arg(long, default_value = "bnotify.sock")]
    socket: RpcAddr,

    /// Notification title
    #[arg(long, default_value = "")]
    title: String,

    /// Notification text
    #[arg(long, default_value = "")]
    text: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    if let Err(e) = send_notification(&args.socket, &args.title, &args.text).await {
        tracing::error!(error = %e, "notification not sent");
        return Err(e.into());
    }

    tracing::debug!("notification queued");

    Ok(())
}
