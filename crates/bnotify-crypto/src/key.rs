//! Password-based key derivation with a single-entry cache.
//!
//! Sender and receiver share a password out of band. The salt is the
//! receiving device's push registration id, so both sides can compute it and
//! a registration change forces a new key.

use std::{
    fmt,
    sync::{Mutex, PoisonError},
};

use sha2::Sha256;
use zeroize::Zeroize;

use crate::error::CryptoError;

/// Derived key length (`XChaCha20-Poly1305` key size).
pub const KEY_SIZE: usize = 32;

/// Symmetric key for envelope sealing. Zeroized on drop.
#[derive(Clone, PartialEq, Eq)]
pub struct SymmetricKey([u8; KEY_SIZE]);

impl SymmetricKey {
    /// Wrap raw key bytes.
    pub const fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Raw key bytes.
    pub const fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SymmetricKey(..)")
    }
}

impl Drop for SymmetricKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

/// Derived key tagged with the salt it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedKey {
    /// Salt used for derivation
    pub salt: Vec<u8>,
    /// Derived key
    pub key: SymmetricKey,
}

/// Derive a key with PBKDF2-HMAC-SHA256.
///
/// Deterministic: the same `(password, salt, iterations)` always yields the
/// same key.
pub fn derive_key(
    password: &str,
    salt: &[u8],
    iterations: u32,
) -> Result<SymmetricKey, CryptoError> {
    if salt.len() < KeyDeriver::MIN_SALT_LEN {
        return Err(CryptoError::InvalidSalt { min: KeyDeriver::MIN_SALT_LEN, actual: salt.len() });
    }

    let mut key = [0u8; KEY_SIZE];
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut key);

    let derived = SymmetricKey::from_bytes(key);
    key.zeroize();
    Ok(derived)
}

/// Caching front for [`derive_key`].
///
/// Holds at most one entry keyed by salt. A miss recomputes and overwrites the
/// entry. The cache cannot see password changes; whoever changes the password
/// must call [`KeyDeriver::invalidate`].
///
/// Thread-safe: the lock is held only to read or replace the entry, never
/// during derivation.
pub struct KeyDeriver {
    iterations: u32,
    cache: Mutex<Option<CachedKey>>,
}

impl KeyDeriver {
    /// PBKDF2 rounds used in production.
    pub const DEFAULT_ITERATIONS: u32 = 600_000;

    /// Shortest salt accepted.
    pub const MIN_SALT_LEN: usize = 8;

    /// Deriver with [`Self::DEFAULT_ITERATIONS`].
    pub fn new() -> Self {
        Self::with_iterations(Self::DEFAULT_ITERATIONS)
    }

    /// Deriver with an explicit round count.
    pub fn with_iterations(iterations: u32) -> Self {
        debug_assert!(iterations > 0);
        Self { iterations, cache: Mutex::new(None) }
    }

    /// Round count in use.
    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    /// Key for `(password, salt)`, from cache when the salt matches.
    pub fn derive(&self, password: &str, salt: &[u8]) -> Result<SymmetricKey, CryptoError> {
        if let Some(hit) = self.lookup(salt) {
            return Ok(hit);
        }

        tracing::debug!(iterations = self.iterations, "deriving key (cache miss)");
        let key = derive_key(password, salt, self.iterations)?;
        self.prime(CachedKey { salt: salt.to_vec(), key: key.clone() });
        Ok(key)
    }

    /// Seed the cache, e.g. from a key persisted by a previous run.
    pub fn prime(&self, entry: CachedKey) {
        *self.cache.lock().unwrap_or_else(PoisonError::into_inner) = Some(entry);
    }

    /// Current cache entry.
    pub fn cached(&self) -> Option<CachedKey> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Drop the cache entry. Call whenever the password or salt changes.
    pub fn invalidate(&self) {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner).take();
    }

    fn lookup(&self, salt: &[u8]) -> Option<SymmetricKey> {
        let cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache.as_ref().filter(|entry| entry.salt == salt).map(|entry| entry.key.clone())
    }
}

impl Default for KeyDeriver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_ITERATIONS: u32 = 1_000;

    fn hex(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }

    #[test]
    fn known_answer_pbkdf2_hmac_sha256() {
        let key = derive_key(
            "passwordPASSWORDpassword",
            b"saltSALTsaltSALTsaltSALTsaltSALTsalt",
            4096,
        )
        .unwrap();

        assert_eq!(
            hex(key.as_bytes()),
            "348c89dbcbd32b2f32d814b8116e84cf2b17347ebc1800181c4e2a1fb8dd53e1"
        );
    }

    #[test]
    fn derive_is_deterministic() {
        let a = derive_key("hunter2", b"registration-id", TEST_ITERATIONS).unwrap();
        let b = derive_key("hunter2", b"registration-id", TEST_ITERATIONS).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn different_inputs_produce_different_keys() {
        let base = derive_key("hunter2", b"registration-id", TEST_ITERATIONS).unwrap();
        let other_password = derive_key("hunter3", b"registration-id", TEST_ITERATIONS).unwrap();
        let other_salt = derive_key("hunter2", b"registration-id2", TEST_ITERATIONS).unwrap();

        assert_ne!(base, other_password);
        assert_ne!(base, other_salt);
    }

    #[test]
    fn short_salt_rejected() {
        let result = derive_key("hunter2", b"short", TEST_ITERATIONS);
        assert_eq!(result, Err(CryptoError::InvalidSalt { min: 8, actual: 5 }));

        let deriver = KeyDeriver::with_iterations(TEST_ITERATIONS);
        assert!(deriver.derive("hunter2", b"").is_err());
        assert!(deriver.cached().is_none());
    }

    #[test]
    fn cache_populated_on_miss() {
        let deriver = KeyDeriver::with_iterations(TEST_ITERATIONS);
        assert!(deriver.cached().is_none());

        let key = deriver.derive("hunter2", b"registration-id").unwrap();

        let cached = deriver.cached().unwrap();
        assert_eq!(cached.salt, b"registration-id");
        assert_eq!(cached.key, key);
    }

    #[test]
    fn cache_hit_ignores_password() {
        // Keyed by salt only: without invalidate() a password change is served
        // the stale key
        let deriver = KeyDeriver::with_iterations(TEST_ITERATIONS);
        let first = deriver.derive("hunter2", b"registration-id").unwrap();
        let second = deriver.derive("different", b"registration-id").unwrap();
        assert_eq!(first, second);

        deriver.invalidate();
        let third = deriver.derive("different", b"registration-id").unwrap();
        assert_ne!(first, third);
    }

    #[test]
    fn salt_change_overwrites_entry() {
        let deriver = KeyDeriver::with_iterations(TEST_ITERATIONS);
        deriver.derive("hunter2", b"registration-a").unwrap();
        let b = deriver.derive("hunter2", b"registration-b").unwrap();

        let cached = deriver.cached().unwrap();
        assert_eq!(cached.salt, b"registration-b");
        assert_eq!(cached.key, b);
    }

    #[test]
    fn primed_entry_is_served() {
        let deriver = KeyDeriver::with_iterations(TEST_ITERATIONS);
        let primed = SymmetricKey::from_bytes([0x42; KEY_SIZE]);
        deriver.prime(CachedKey { salt: b"registration-id".to_vec(), key: primed.clone() });

        assert_eq!(deriver.derive("hunter2", b"registration-id").unwrap(), primed);
    }

    #[test]
    fn debug_redacts_key() {
        let key = SymmetricKey::from_bytes([0x42; KEY_SIZE]);
        assert_eq!(format!("{key:?}"), "SymmetricKey(..)");
    }
}
