//! Key-value store abstraction.
//!
//! The coordination layer never speaks a wire protocol. It consumes a store
//! through this verb set only: strings, counters, sets, lists and expiry.
//! Each verb completes independently; composing several of them into one
//! logical operation is the job of [`crate::join`] and the stores built on
//! top.
//!
//! List indices follow the usual convention: `0` is the head, negative
//! indices count from the tail (`-1` is the last element) and ranges are
//! inclusive on both ends.

use std::{future::Future, time::Duration};

use thiserror::Error;

/// Errors reported by a single key-value verb.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KvError {
    /// The store could not be reached or rejected the command.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The key holds a value of a different type (e.g. a set where a list
    /// was expected).
    #[error("wrong type for key {key}")]
    WrongType {
        /// Offending key
        key: String,
    },

    /// `increment` on a value that does not parse as an integer.
    #[error("value at {key} is not an integer")]
    NotAnInteger {
        /// Offending key
        key: String,
    },
}

/// Primitive verbs of the external key-value store.
///
/// Must be Clone (one handle is shared by every store and caller), Send +
/// Sync, and all verbs are async. Implementations share their connection or
/// state internally, so clones talk to the same underlying store.
pub trait KeyValueStore: Clone + Send + Sync + 'static {
    /// String value at `key`. `None` if absent or expired.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>, KvError>> + Send;

    /// Store a string value, replacing any value and clearing any expiry.
    fn set(&self, key: &str, value: &str) -> impl Future<Output = Result<(), KvError>> + Send;

    /// Remove a key of any type. Returns whether it existed.
    fn delete(&self, key: &str) -> impl Future<Output = Result<bool, KvError>> + Send;

    /// Atomically increment the integer at `key` (absent counts as 0).
    /// Returns the new value.
    fn increment(&self, key: &str) -> impl Future<Output = Result<i64, KvError>> + Send;

    /// Store `value` only if `key` is absent. Returns whether it was stored.
    ///
    /// This is the compare-and-swap primitive the allocator is built on.
    fn set_if_absent(
        &self,
        key: &str,
        value: &str,
    ) -> impl Future<Output = Result<bool, KvError>> + Send;

    /// Expire `key` after `ttl`. Returns whether the key exists.
    fn expire_after(
        &self,
        key: &str,
        ttl: Duration,
    ) -> impl Future<Output = Result<bool, KvError>> + Send;

    /// Add `member` to the set at `key`. Returns whether it was newly added.
    fn set_add(&self, key: &str, member: &str)
    -> impl Future<Output = Result<bool, KvError>> + Send;

    /// Remove `member` from the set at `key`. Returns whether it was present.
    fn set_remove(
        &self,
        key: &str,
        member: &str,
    ) -> impl Future<Output = Result<bool, KvError>> + Send;

    /// All members of the set at `key`. Order is not guaranteed.
    fn set_members(&self, key: &str) -> impl Future<Output = Result<Vec<String>, KvError>> + Send;

    /// An arbitrary member of the set at `key`, `None` if the set is empty.
    fn set_random_member(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<Option<String>, KvError>> + Send;

    /// Append `value` to the list at `key`. Returns the new length.
    fn list_append(
        &self,
        key: &str,
        value: &str,
    ) -> impl Future<Output = Result<u64, KvError>> + Send;

    /// Keep only the elements in `[start, stop]` (inclusive, negative
    /// indices from the tail). An empty window removes the key.
    fn list_trim(
        &self,
        key: &str,
        start: i64,
        stop: i64,
    ) -> impl Future<Output = Result<(), KvError>> + Send;

    /// Elements in `[start, stop]` (inclusive, negative indices from the
    /// tail).
    fn list_range(
        &self,
        key: &str,
        start: i64,
        stop: i64,
    ) -> impl Future<Output = Result<Vec<String>, KvError>> + Send;

    /// String values for every key, aligned with `keys`. Missing keys yield
    /// `None` in their slot.
    fn multi_get(
        &self,
        keys: &[String],
    ) -> impl Future<Output = Result<Vec<Option<String>>, KvError>> + Send;
}
