//! Production Environment implementation using system time and RNG.
//!
//! `SystemEnv` backs guest ids and tokens with OS entropy. Its behavior is
//! not reproducible; tests that need to steer identifiers use the harness
//! environment instead.

use rtcs_core::Environment;

/// Production environment using the monotonic clock and getrandom.
///
/// # Panics
///
/// Panics if the OS RNG fails. Identifiers drawn from a broken RNG would be
/// guessable tokens, so there is no fallback.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    type Instant = std::time::Instant;

    fn now(&self) -> Self::Instant {
        std::time::Instant::now()
    }

    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer).expect("invariant: OS RNG failure is unrecoverable");
    }
}
