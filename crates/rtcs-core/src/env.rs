//! Environment abstraction for deterministic testing.
//!
//! Decouples the storage coordination logic from system resources (time,
//! randomness). Production code uses the wall clock and OS entropy; the
//! simulation harness substitutes a virtual clock, a seeded RNG and scripted
//! identifiers so collision and expiry paths can be driven on purpose.

use std::time::Duration;

use base64::{Engine, engine::general_purpose::URL_SAFE};

/// Number of random bytes behind a fresh identifier.
///
/// 15 bytes encode to exactly 20 base64 characters with no padding.
pub const ID_BYTES: usize = 15;

/// Abstract environment providing time and randomness.
///
/// # Safety
///
/// Implementations MUST guarantee:
///
/// - `now()` never goes backwards
/// - `random_bytes()` uses cryptographically secure entropy in production
pub trait Environment: Clone + Send + Sync + 'static {
    /// The specific instant type used by this environment.
    ///
    /// Production environments use `std::time::Instant`, while simulation
    /// environments use a virtual instant that only moves when told to.
    type Instant: Copy
        + Ord
        + Send
        + Sync
        + std::fmt::Debug
        + std::ops::Add<Duration, Output = Self::Instant>
        + std::ops::Sub<Output = Duration>;

    /// Current time (monotonic).
    fn now(&self) -> Self::Instant;

    /// Fills the provided buffer with random bytes.
    ///
    /// # Invariants
    ///
    /// - Given the same RNG seed, this produces the same sequence of bytes
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Generates a random `u64`.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }

    /// Generates a fresh random identifier.
    ///
    /// Used for guest ids and tokens. Uniqueness is NOT promised here; the
    /// allocator enforces it against the store with set-if-absent.
    fn fresh_id(&self) -> String {
        let mut bytes = [0u8; ID_BYTES];
        self.random_bytes(&mut bytes);
        encode_id(&bytes)
    }
}

/// Encode raw random bytes as an identifier (URL-safe base64).
pub fn encode_id(bytes: &[u8]) -> String {
    URL_SAFE.encode(bytes)
}
