//! Error types for store operations.
//!
//! Every store operation reports exactly one of these. Nothing here is
//! retried by the layer itself except allocation collisions, and nothing is
//! rolled back: a multi-key failure leaves whatever state the successful
//! branches produced.

use thiserror::Error;

use crate::kv::KvError;

/// Errors that can occur during a store operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A key-value verb failed.
    ///
    /// Propagated as-is. The caller decides whether to retry.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(#[from] KvError),

    /// A stored payload failed to decode.
    ///
    /// Fatal for that record. Never reported as "absent".
    #[error("corrupt record at {key}: {reason}")]
    CorruptRecord {
        /// Fully prefixed key holding the bad payload
        key: String,
        /// Decoder message
        reason: String,
    },

    /// A caller-supplied payload could not be encoded.
    #[error("cannot encode payload: {reason}")]
    Encode {
        /// Encoder message
        reason: String,
    },

    /// The unique-id retry loop hit its configured bound.
    ///
    /// Points at a broken identifier source rather than bad luck: with
    /// 120-bit identifiers a single honest collision is already improbable.
    #[error("allocation exhausted after {attempts} attempts")]
    AllocationExhausted {
        /// Attempts made before giving up
        attempts: u32,
    },

    /// Some branches of a fan-out failed.
    ///
    /// State may be inconsistent: `applied` branches completed and were not
    /// compensated.
    #[error("partial failure: {applied} of {total} operations applied, {} failed", .errors.len())]
    PartialFailure {
        /// Branches that completed
        applied: usize,
        /// Branches dispatched
        total: usize,
        /// Every branch error, in branch order
        errors: Vec<StoreError>,
    },
}

impl StoreError {
    /// Returns true if the caller may reasonably retry.
    ///
    /// Backend and partial failures can clear on their own. Corrupt records,
    /// encoding failures and exhausted allocators will fail the same way
    /// again.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::BackendUnavailable(KvError::Unavailable(_)) | Self::PartialFailure { .. }
        )
    }

    /// Returns true if store state may have changed despite the error.
    pub fn may_have_applied(&self) -> bool {
        matches!(self, Self::PartialFailure { applied, .. } if *applied > 0)
    }

    /// `CorruptRecord` for `key` from any decoder error.
    pub fn corrupt(key: &str, err: impl std::fmt::Display) -> Self {
        Self::CorruptRecord { key: key.to_string(), reason: err.to_string() }
    }
}

/// Configuration validation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Tokens must carry a finite, non-zero lifetime.
    #[error("token_expire_ms must be greater than zero")]
    ZeroTokenExpiry,

    /// A history limit of zero would drop every message.
    #[error("history_length must be greater than zero when set")]
    ZeroHistoryLength,

    /// A zero TTL would expire the log immediately.
    #[error("history_expire_ms must be greater than zero when set")]
    ZeroHistoryExpiry,

    /// An allocator that may not try even once.
    #[error("max_allocation_attempts must be greater than zero when set")]
    ZeroAllocationBound,

    /// Category prefixes must be distinct and non-empty or records collide.
    #[error("category prefix {prefix:?} is empty or shared by more than one category")]
    PrefixCollision {
        /// Offending prefix
        prefix: String,
    },
}
