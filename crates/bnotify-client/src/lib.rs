//! Client side of the bnotify local RPC.
//!
//! One connection per request: connect, send a framed
//! [`RpcRequest::SendNotification`], read the framed [`RpcResponse`], close.

#![forbid(unsafe_code)]

use std::time::Duration;

use bnotify_proto::{
    ProtocolError, RpcAddr, RpcErrorKind, RpcRequest, RpcResponse,
    rpc::{read_frame, write_frame},
};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};

/// Deadline for the whole exchange.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors from [`send_notification`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Could not reach the daemon
    #[error("cannot connect to {addr}: {reason}")]
    Connect {
        /// Daemon address
        addr: String,
        /// OS error
        reason: String,
    },

    /// Malformed or truncated exchange
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Daemon did not answer in time
    #[error("timed out waiting for daemon")]
    Timeout,

    /// Daemon refused the request
    #[error("daemon rejected request ({kind:?}): {message}")]
    Rejected {
        /// Error category
        kind: RpcErrorKind,
        /// Daemon's explanation
        message: String,
    },
}

/// Ask the daemon at `addr` to send a notification.
///
/// Returns once the daemon has durably queued it, not once it is delivered.
pub async fn send_notification(
    addr: &RpcAddr,
    title: &str,
    text: &str,
) -> Result<(), ClientError> {
    let request = RpcRequest::send_notification(title, text);
    let exchange = async {
        match addr {
            RpcAddr::Tcp(socket) => {
                let stream = tokio::net::TcpStream::connect(socket)
                    .await
                    .map_err(|e| connect_error(addr, &e))?;
                call(stream, &request).await
            },
            #[cfg(unix)]
            RpcAddr::Unix(path) => {
                let stream = tokio::net::UnixStream::connect(path)
                    .await
                    .map_err(|e| connect_error(addr, &e))?;
                call(stream, &request).await
            },
            #[cfg(not(unix))]
            RpcAddr::Unix(_) => Err(ClientError::Connect {
                addr: addr.to_string(),
                reason: "unix sockets unsupported on this platform".to_string(),
            }),
        }
    };

    let response =
        tokio::time::timeout(DEFAULT_TIMEOUT, exchange).await.map_err(|_| ClientError::Timeout)??;

    match response {
        RpcResponse::Sent => Ok(()),
        RpcResponse::Error { kind, message } => Err(ClientError::Rejected { kind, message }),
    }
}

fn connect_error(addr: &RpcAddr, err: &std::io::Error) -> ClientError {
    ClientError::Connect { addr: addr.to_string(), reason: err.to_string() }
}

async fn call<T>(mut stream: T, request: &RpcRequest) -> Result<RpcResponse, ClientError>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    write_frame(&mut stream, request).await?;
    Ok(read_frame(&mut stream).await?)
}

#[cfg(test)]
mod tests {
    use tokio::net::TcpListener;

    use super::*;

    async fn one_shot_daemon(
        response: RpcResponse,
    ) -> (RpcAddr, tokio::task::JoinHandle<RpcRequest>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = RpcAddr::Tcp(listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let request: RpcRequest = read_frame(&mut stream).await.unwrap();
            write_frame(&mut stream, &response).await.unwrap();
            request
        });
        (addr, handle)
    }

    #[tokio::test]
    async fn sent_is_success() {
        let (addr, daemon) = one_shot_daemon(RpcResponse::Sent).await;

        send_notification(&addr, "T", "X").await.unwrap();
        assert_eq!(daemon.await.unwrap(), RpcRequest::send_notification("T", "X"));
    }

    #[tokio::test]
    async fn error_response_is_rejection() {
        let response = RpcResponse::error(RpcErrorKind::Internal, "internal error");
        let (addr, daemon) = one_shot_daemon(response).await;

        let result = send_notification(&addr, "T", "X").await;
        assert_eq!(
            result,
            Err(ClientError::Rejected {
                kind: RpcErrorKind::Internal,
                message: "internal error".to_string()
            })
        );
        daemon.await.unwrap();
    }

    #[tokio::test]
    async fn unreachable_daemon_is_connect_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = RpcAddr::Tcp(listener.local_addr().unwrap());
        drop(listener);

        let result = send_notification(&addr, "T", "X").await;
        assert!(matches!(result, Err(ClientError::Connect { .. })));
    }

    #[tokio::test]
    async fn daemon_hanging_up_is_protocol_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = RpcAddr::Tcp(listener.local_addr().unwrap());
        let daemon = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            drop(stream);
        });

        let result = send_notification(&addr, "T", "X").await;
        assert!(matches!(result, Err(ClientError::Protocol(_))));
        daemon.await.unwrap();
    }
}
