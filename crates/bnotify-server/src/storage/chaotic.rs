//! Chaotic storage wrapper for fault injection testing
//!
//! Storage wrapper that randomly fails operations to test error handling and
//! recovery of the queue and dispatcher.

#![allow(clippy::disallowed_types, reason = "Locking simple RNG state")]

use std::sync::{Arc, Mutex};

use bnotify_proto::{Envelope, ServerIdentity};

use super::{PendingMessage, Storage, StorageError};

/// Chaotic storage wrapper that randomly injects failures
///
/// Delegates to an underlying storage implementation but fails operations
/// with the configured probability. A failed operation never reaches the
/// inner storage, so it has no effect.
#[derive(Clone)]
pub struct ChaoticStorage<S: Storage> {
    inner: S,
    /// Failure rate (0.0 = never fail, 1.0 = always fail)
    failure_rate: f64,
    /// RNG state for deterministic chaos
    rng: Arc<Mutex<ChaoticRng>>,
}

/// Linear congruential generator; chaos runs are reproducible per seed.
struct ChaoticRng {
    state: u64,
}

impl ChaoticRng {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Generate next random value [0.0, 1.0)
    fn next(&mut self) -> f64 {
        // LCG constants from Numerical Recipes
        const A: u64 = 1_664_525;
        const C: u64 = 1_013_904_223;
        const M: u64 = 1u64 << 32;

        self.state = (A.wrapping_mul(self.state).wrapping_add(C)) % M;
        (self.state as f64) / (M as f64)
    }
}

impl<S: Storage> ChaoticStorage<S> {
    /// Create a new chaotic storage wrapper
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is not in [0.0, 1.0]
    pub fn new(inner: S, failure_rate: f64) -> Self {
        Self::with_seed(inner, failure_rate, 0x1234_5678_9ABC_DEF0)
    }

    /// Create with explicit seed for reproducible chaos
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is not in [0.0, 1.0]
    pub fn with_seed(inner: S, failure_rate: f64, seed: u64) -> Self {
        assert!(
            (0.0..=1.0).contains(&failure_rate),
            "failure_rate must be between 0.0 and 1.0, got {failure_rate}"
        );

        Self { inner, failure_rate, rng: Arc::new(Mutex::new(ChaoticRng::new(seed))) }
    }

    /// Underlying storage (for checking invariants after chaos).
    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn inject(&self) -> Result<(), StorageError> {
        #[allow(clippy::expect_used)]
        let roll = self.rng.lock().expect("ChaoticRng mutex poisoned").next();
        if roll < self.failure_rate {
            return Err(StorageError::Io("chaotic failure injection".to_string()));
        }
        Ok(())
    }
}

impl<S: Storage> Storage for ChaoticStorage<S> {
    fn load_or_init_identity(
        &self,
        candidate: ServerIdentity,
    ) -> Result<ServerIdentity, StorageError> {
        self.inject()?;
        self.inner.load_or_init_identity(candidate)
    }

    fn server_identity(&self) -> Result<Option<ServerIdentity>, StorageError> {
        self.inject()?;
        self.inner.server_identity()
    }

    fn next_sequence(&self) -> Result<u64, StorageError> {
        self.inject()?;
        self.inner.next_sequence()
    }

    fn enqueue<F>(&self, candidate: ServerIdentity, seal: F) -> Result<PendingMessage, StorageError>
    where
        F: FnOnce(ServerIdentity, u64) -> Result<Envelope, StorageError>,
    {
        self.inject()?;
        self.inner.enqueue(candidate, seal)
    }

    fn load_pending(&self, seq: u64) -> Result<Option<PendingMessage>, StorageError> {
        self.inject()?;
        self.inner.load_pending(seq)
    }

    fn list_pending(&self) -> Result<Vec<u64>, StorageError> {
        self.inject()?;
        self.inner.list_pending()
    }

    fn record_attempt(&self, seq: u64) -> Result<u32, StorageError> {
        self.inject()?;
        self.inner.record_attempt(seq)
    }

    fn remove_pending(&self, seq: u64) -> Result<bool, StorageError> {
        self.inject()?;
        self.inner.remove_pending(seq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn id() -> ServerIdentity {
        ServerIdentity::from_bytes([5; 16])
    }

    fn envelope_for(seq: u64) -> Envelope {
        Envelope { ciphertext: seq.to_be_bytes().to_vec(), nonce: vec![0; 24] }
    }

    #[test]
    fn test_chaotic_with_zero_failure_rate() {
        let chaotic = ChaoticStorage::new(MemoryStorage::new(), 0.0);

        for _ in 0..100 {
            chaotic
                .enqueue(id(), |_, seq| Ok(envelope_for(seq)))
                .expect("should not fail with 0% rate");
        }

        assert_eq!(chaotic.next_sequence().expect("query failed"), 101);
    }

    #[test]
    fn test_chaotic_with_100_failure_rate() {
        let chaotic = ChaoticStorage::new(MemoryStorage::new(), 1.0);

        assert!(chaotic.enqueue(id(), |_, seq| Ok(envelope_for(seq))).is_err());
        assert!(chaotic.list_pending().is_err());
        assert!(chaotic.record_attempt(1).is_err());

        // Nothing leaked through to the inner store
        assert_eq!(chaotic.inner().pending_count(), 0);
    }

    #[test]
    fn test_chaotic_deterministic_with_seed() {
        let chaotic1 = ChaoticStorage::with_seed(MemoryStorage::new(), 0.5, 42);
        let chaotic2 = ChaoticStorage::with_seed(MemoryStorage::new(), 0.5, 42);

        for i in 0..100 {
            let result1 = chaotic1.enqueue(id(), |_, seq| Ok(envelope_for(seq)));
            let result2 = chaotic2.enqueue(id(), |_, seq| Ok(envelope_for(seq)));

            assert_eq!(result1.is_ok(), result2.is_ok(), "determinism violated at iteration {i}");
        }
    }

    #[test]
    #[should_panic(expected = "failure_rate must be between 0.0 and 1.0")]
    fn test_chaotic_rejects_invalid_failure_rate() {
        let _chaotic = ChaoticStorage::new(MemoryStorage::new(), 1.5);
    }
}
