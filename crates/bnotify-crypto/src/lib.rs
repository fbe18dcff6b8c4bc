//! Bnotify cryptography.
//!
//! Two pieces, both deterministic:
//!
//! - [`KeyDeriver`]: password + salt to a 32-byte key via PBKDF2-HMAC-SHA256.
//!   Deliberately slow, so the result is cached.
//! - [`seal`] / [`open`]: `XChaCha20-Poly1305` over a CBOR-encoded
//!   [`bnotify_proto::Message`].
//!
//! # Nonce construction
//!
//! ```text
//! nonce (24 bytes) = server_id (16 bytes) ‖ big-endian(seq) (8 bytes)
//! ```
//!
//! The sender allocates each `(server_id, seq)` pair at most once, so a nonce
//! never repeats under one key. Reusing a nonce with XChaCha20-Poly1305 leaks
//! the XOR of both plaintexts and lets an attacker forge tags; nothing else in
//! the system protects against that. The nonce travels in the clear next to
//! the ciphertext.
//!
//! # Security
//!
//! - Any tampering, wrong key, or malformed structure yields
//!   [`CryptoError::AuthenticationFailed`], never partial plaintext.
//! - `open` also checks that the nonce matches the decrypted message's
//!   `(server_id, seq)`, so a valid ciphertext cannot be replayed under a
//!   different sequence number.
//! - Key material is zeroized on drop.

#![forbid(unsafe_code)]

mod envelope;
mod error;
mod key;

pub use envelope::{NONCE_SIZE, TAG_SIZE, build_nonce, open, seal};
pub use error::CryptoError;
pub use key::{CachedKey, KEY_SIZE, KeyDeriver, SymmetricKey, derive_key};
