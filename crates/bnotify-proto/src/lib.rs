//! Bnotify wire protocol.
//!
//! Types shared by the sender daemon, the thin RPC client, and the receiving
//! device. Nothing here performs I/O or cryptography.
//!
//! # Layers
//!
//! ```text
//! NotificationContent { title, text }
//!        │
//!        ▼
//! Message { server_id, seq, notification }     (plaintext, CBOR)
//!        │  seal (bnotify-crypto)
//!        ▼
//! Envelope { ciphertext, nonce }               (CBOR)
//!        │  base64
//!        ▼
//! gateway payload field "payload"
//! ```
//!
//! The local RPC surface (`SendNotification`) is framed separately, see
//! [`rpc`].

#![forbid(unsafe_code)]

pub mod cbor;
pub mod envelope;
pub mod errors;
pub mod identity;
pub mod message;
pub mod rpc;

pub use envelope::{Envelope, PAYLOAD_KEY};
pub use errors::{ProtocolError, Result, ValidationError};
pub use identity::ServerIdentity;
pub use message::{MAX_CONTENT_SIZE, Message, NotificationContent};
pub use rpc::{RpcAddr, RpcErrorKind, RpcRequest, RpcResponse};
