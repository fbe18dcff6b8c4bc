//! Side-effect boundary for the daemon.
//!
//! Everything the queue and dispatcher need from the outside world besides
//! storage and the gateway: waiting and randomness. Tests substitute an
//! environment that records sleeps instead of performing them.
//!
//! `SystemEnv` is the production implementation:
//!
//! - Tokio async sleep for actual wall-clock delays
//! - OS cryptographic RNG (getrandom). Truly random, not reproducible

use std::time::Duration;

/// Abstraction over time and randomness.
pub trait Environment: Clone + Send + Sync + 'static {
    /// Sleeps for the specified duration.
    ///
    /// A zero duration must still yield to the runtime.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;

    /// Fills the provided buffer with random bytes.
    ///
    /// # Invariants
    ///
    /// - Uses cryptographically secure RNG in production
    fn random_bytes(&self, buffer: &mut [u8]);
}

/// Production environment using tokio time and the OS RNG.
///
/// # Panics
///
/// Panics if the OS RNG fails. A daemon without functioning cryptographic
/// randomness cannot mint a server identity.
#[derive(Clone, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer).expect("invariant: OS RNG failure is unrecoverable");
    }
}
