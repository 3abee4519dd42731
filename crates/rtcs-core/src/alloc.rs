//! Collision-retry allocation of uniquely keyed records.
//!
//! Generate a candidate, try set-if-absent on its key, and on conflict throw
//! the candidate away and try a new one. Exactly one caller can win a key,
//! so uniqueness holds without locking the store.
//!
//! Retries are bounded by configuration. Collisions between honest 120-bit
//! identifiers are vanishingly rare, so hitting the bound means the
//! identifier source is broken (e.g. a generator stuck on one value).

use std::num::NonZeroU32;

use crate::{error::StoreError, kv::KeyValueStore};

/// One allocation attempt: the key to claim, the payload to store there and
/// the identifier handed back on success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate<V> {
    /// Fully prefixed key to claim
    pub key: String,
    /// Encoded payload
    pub value: String,
    /// Identifier returned to the caller when the claim wins
    pub id: V,
}

/// Set-if-absent retry loop over a store.
pub struct UniqueAllocator<'a, S> {
    kv: &'a S,
    max_attempts: Option<NonZeroU32>,
}

impl<'a, S: KeyValueStore> UniqueAllocator<'a, S> {
    /// Create an allocator. `None` retries without bound.
    pub fn new(kv: &'a S, max_attempts: Option<NonZeroU32>) -> Self {
        Self { kv, max_attempts }
    }

    /// Claim the first candidate whose key is free.
    ///
    /// `next` is called once per attempt and must produce a fresh candidate
    /// each time. Store failures abort the loop immediately.
    pub async fn allocate<V, F>(&self, mut next: F) -> Result<V, StoreError>
    where
        F: FnMut() -> Result<Candidate<V>, StoreError>,
    {
        let mut attempts: u32 = 0;

        loop {
            if self.max_attempts.is_some_and(|max| attempts >= max.get()) {
                tracing::warn!(attempts, "allocation exhausted, identifier source keeps colliding");
                return Err(StoreError::AllocationExhausted { attempts });
            }
            attempts = attempts.saturating_add(1);

            let candidate = next()?;
            if self.kv.set_if_absent(&candidate.key, &candidate.value).await? {
                tracing::debug!(key = %candidate.key, attempts, "allocated");
                return Ok(candidate.id);
            }

            tracing::debug!(key = %candidate.key, attempts, "allocation collided, retrying");
        }
    }
}
