//! Local RPC surface between the `bnotify` client and the daemon.
//!
//! One request and one response per connection. Each message is framed as a
//! 4-byte big-endian body length followed by a CBOR body:
//!
//! ```text
//! [len: u32 BE][CBOR body: len bytes]
//! ```

use std::{fmt, net::SocketAddr, path::PathBuf, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
    NotificationContent, ValidationError, cbor,
    errors::{ProtocolError, Result},
};

/// Size of the length prefix.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Largest accepted RPC body.
pub const MAX_RPC_BODY: usize = 64 * 1024;

/// Where the daemon listens for RPCs.
///
/// Parsed from either `tcp://host:port` or a filesystem path for a unix
/// socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RpcAddr {
    /// Unix domain socket path
    Unix(PathBuf),
    /// TCP socket address (intended for loopback)
    Tcp(SocketAddr),
}

impl FromStr for RpcAddr {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if let Some(addr) = s.strip_prefix("tcp://") {
            return addr
                .parse()
                .map(Self::Tcp)
                .map_err(|e| format!("invalid tcp address {addr}: {e}"));
        }
        if s.is_empty() {
            return Err("empty socket path".to_string());
        }
        Ok(Self::Unix(PathBuf::from(s.strip_prefix("unix://").unwrap_or(s))))
    }
}

impl fmt::Display for RpcAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unix(path) => write!(f, "{}", path.display()),
            Self::Tcp(addr) => write!(f, "tcp://{addr}"),
        }
    }
}

/// Request sent by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RpcRequest {
    /// Queue a notification for delivery
    SendNotification {
        /// Notification title
        title: String,
        /// Notification body
        text: String,
    },
}

impl RpcRequest {
    /// Convenience constructor.
    pub fn send_notification(title: impl Into<String>, text: impl Into<String>) -> Self {
        Self::SendNotification { title: title.into(), text: text.into() }
    }

    /// Notification carried by this request, validated.
    pub fn notification(&self) -> std::result::Result<NotificationContent, ValidationError> {
        match self {
            Self::SendNotification { title, text } => {
                NotificationContent::new(title.clone(), text.clone())
            },
        }
    }
}

/// Error categories reported back to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RpcErrorKind {
    /// Empty title
    MissingTitle,
    /// Empty text
    MissingText,
    /// Title and text exceed the content limit
    TooLarge,
    /// Daemon failed to queue the notification
    Internal,
}

impl From<ValidationError> for RpcErrorKind {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::MissingTitle => Self::MissingTitle,
            ValidationError::MissingText => Self::MissingText,
            ValidationError::TooLarge { .. } => Self::TooLarge,
        }
    }
}

/// Response returned by the daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RpcResponse {
    /// Notification accepted and durably queued
    Sent,
    /// Request failed
    Error {
        /// Error category
        kind: RpcErrorKind,
        /// Human-readable detail
        message: String,
    },
}

impl RpcResponse {
    /// Build an error response.
    pub fn error(kind: RpcErrorKind, message: impl Into<String>) -> Self {
        Self::Error { kind, message: message.into() }
    }
}

/// Encode a message with its length prefix.
pub fn encode_frame<T: Serialize>(message: &T) -> Result<Vec<u8>> {
    let body = cbor::encode(message)?;
    if body.len() > MAX_RPC_BODY {
        return Err(ProtocolError::PayloadTooLarge { size: body.len(), max: MAX_RPC_BODY });
    }

    let mut frame = Vec::with_capacity(LENGTH_PREFIX_SIZE + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Body length announced by a length prefix.
///
/// Checked against [`MAX_RPC_BODY`] before the caller allocates for the body.
pub fn body_len(prefix: [u8; LENGTH_PREFIX_SIZE]) -> Result<usize> {
    let len = u32::from_be_bytes(prefix) as usize;
    if len > MAX_RPC_BODY {
        return Err(ProtocolError::PayloadTooLarge { size: len, max: MAX_RPC_BODY });
    }
    Ok(len)
}

/// Decode a frame body (without the length prefix).
pub fn decode_body<T: serde::de::DeserializeOwned>(body: &[u8]) -> Result<T> {
    cbor::decode(body)
}

/// Write one length-prefixed message.
#[cfg(feature = "io")]
pub async fn write_frame<W, T>(writer: &mut W, message: &T) -> Result<()>
where
    W: tokio::io::AsyncWrite + Unpin,
    T: Serialize,
{
    use tokio::io::AsyncWriteExt;

    let frame = encode_frame(message)?;
    writer.write_all(&frame).await.map_err(|e| ProtocolError::Io(e.to_string()))?;
    writer.flush().await.map_err(|e| ProtocolError::Io(e.to_string()))
}

/// Read one length-prefixed message.
#[cfg(feature = "io")]
pub async fn read_frame<R, T>(reader: &mut R) -> Result<T>
where
    R: tokio::io::AsyncRead + Unpin,
    T: serde::de::DeserializeOwned,
{
    use tokio::io::AsyncReadExt;

    let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
    reader.read_exact(&mut prefix).await.map_err(|e| ProtocolError::Io(e.to_string()))?;

    let mut body = vec![0u8; body_len(prefix)?];
    reader.read_exact(&mut body).await.map_err(|e| ProtocolError::Io(e.to_string()))?;

    decode_body(&body)
}
