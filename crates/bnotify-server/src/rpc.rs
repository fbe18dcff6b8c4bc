//! Local RPC listener.
//!
//! Accepts connections on a unix socket or loopback TCP address, reads one
//! framed [`RpcRequest`], answers with one [`RpcResponse`], and closes. Each
//! connection runs in its own task.

use std::{future::Future, io, path::PathBuf, time::Duration};

use bnotify_proto::{
    RpcAddr, RpcErrorKind, RpcRequest, RpcResponse,
    rpc::{read_frame, write_frame},
};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpListener,
};

use crate::{
    env::Environment, error::ServerError, gateway::Gateway, service::NotifyService,
    storage::Storage,
};

/// How long a client may take to send its request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Bound RPC listener.
pub enum RpcListener {
    /// Unix domain socket; the path is removed on drop
    #[cfg(unix)]
    Unix {
        /// Listening socket
        listener: tokio::net::UnixListener,
        /// Socket file
        path: PathBuf,
    },
    /// TCP socket
    Tcp(TcpListener),
}

impl RpcListener {
    /// Bind to `addr`.
    ///
    /// A leftover unix socket file from a previous run is replaced. A socket
    /// another daemon is still serving, or any other kind of file at that
    /// path, is an error.
    pub async fn bind(addr: &RpcAddr) -> Result<Self, ServerError> {
        match addr {
            RpcAddr::Tcp(addr) => Ok(Self::Tcp(TcpListener::bind(addr).await?)),
            #[cfg(unix)]
            RpcAddr::Unix(path) => {
                remove_stale_socket(path).await?;
                let listener = tokio::net::UnixListener::bind(path)?;
                Ok(Self::Unix { listener, path: path.clone() })
            },
            #[cfg(not(unix))]
            RpcAddr::Unix(path) => Err(ServerError::Config(format!(
                "unix sockets unsupported on this platform: {}",
                path.display()
            ))),
        }
    }

    /// Address clients should connect to.
    pub fn local_addr(&self) -> io::Result<RpcAddr> {
        match self {
            #[cfg(unix)]
            Self::Unix { path, .. } => Ok(RpcAddr::Unix(path.clone())),
            Self::Tcp(listener) => listener.local_addr().map(RpcAddr::Tcp),
        }
    }

    /// Serve until `shutdown` resolves.
    ///
    /// In-flight connections and delivery tasks are not awaited.
    pub async fn serve<S, G, E>(
        self,
        service: NotifyService<S, G, E>,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), ServerError>
    where
        S: Storage,
        G: Gateway,
        E: Environment,
    {
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                () = &mut shutdown => {
                    tracing::info!("shutting down RPC listener");
                    return Ok(());
                }
                accepted = self.accept_one(&service) => {
                    if let Err(e) = accepted {
                        tracing::warn!(error = %e, "accept failed");
                    }
                }
            }
        }
    }

    async fn accept_one<S, G, E>(&self, service: &NotifyService<S, G, E>) -> io::Result<()>
    where
        S: Storage,
        G: Gateway,
        E: Environment,
    {
        let service = service.clone();
        match self {
            #[cfg(unix)]
            Self::Unix { listener, .. } => {
                let (stream, _) = listener.accept().await?;
                tokio::spawn(handle_connection(service, stream));
            },
            Self::Tcp(listener) => {
                let (stream, peer) = listener.accept().await?;
                tracing::debug!(%peer, "rpc connection");
                tokio::spawn(handle_connection(service, stream));
            },
        }
        Ok(())
    }
}

impl Drop for RpcListener {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            if let Self::Unix { path, .. } = self
                && let Err(e) = std::fs::remove_file(&*path)
            {
                tracing::debug!(path = %path.display(), error = %e, "socket cleanup failed");
            }
        }
    }
}

/// Remove a socket file nobody is listening on.
///
/// A socket that still accepts connections belongs to a running daemon and
/// is left alone.
#[cfg(unix)]
async fn remove_stale_socket(path: &std::path::Path) -> Result<(), ServerError> {
    use std::os::unix::fs::FileTypeExt;

    match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_socket() => {
            match tokio::net::UnixStream::connect(path).await {
                Ok(_) => Err(ServerError::Config(format!(
                    "{} is in use by a running daemon",
                    path.display()
                ))),
                Err(e) if e.kind() == io::ErrorKind::ConnectionRefused => {
                    tracing::debug!(path = %path.display(), "removing stale socket");
                    std::fs::remove_file(path)?;
                    Ok(())
                },
                Err(e) => Err(e.into()),
            }
        },
        Ok(_) => Err(ServerError::Config(format!(
            "{} exists and is not a socket",
            path.display()
        ))),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Read one request, answer it, close.
async fn handle_connection<T, S, G, E>(service: NotifyService<S, G, E>, mut stream: T)
where
    T: AsyncRead + AsyncWrite + Unpin,
    S: Storage,
    G: Gateway,
    E: Environment,
{
    let request = tokio::time::timeout(REQUEST_TIMEOUT, read_frame::<_, RpcRequest>(&mut stream));

    let response = match request.await {
        Ok(Ok(request)) => service.handle(request),
        Ok(Err(e)) => {
            tracing::debug!(error = %e, "malformed rpc request");
            RpcResponse::error(RpcErrorKind::Internal, format!("malformed request: {e}"))
        },
        Err(_) => {
            tracing::debug!("rpc request timed out");
            return;
        },
    };

    if let Err(e) = write_frame(&mut stream, &response).await {
        tracing::debug!(error = %e, "failed to write rpc response");
    }
}
