//! Sender instance identity.

use std::fmt;

use serde::{Deserialize, Serialize};

/// 16 random bytes identifying one sender instance.
///
/// Generated once on first startup and persisted. Forms the first 16 bytes of
/// every nonce the instance produces and keys the receiver's replay state.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServerIdentity(#[serde(with = "serde_bytes")] [u8; 16]);

impl ServerIdentity {
    /// Identity length in bytes.
    pub const SIZE: usize = 16;

    /// Wrap raw identity bytes.
    pub const fn from_bytes(bytes: [u8; Self::SIZE]) -> Self {
        Self(bytes)
    }

    /// Parse an identity from a slice. `None` unless exactly 16 bytes.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        <[u8; Self::SIZE]>::try_from(bytes).ok().map(Self)
    }

    /// Raw identity bytes.
    pub const fn as_bytes(&self) -> &[u8; Self::SIZE] {
        &self.0
    }
}

impl fmt::Display for ServerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ServerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServerIdentity({self})")
    }
}
