//! Chaotic store wrapper for fault injection testing
//!
//! Store wrapper that randomly fails verbs to exercise partial-failure paths:
//! a fan-out whose branches land on different keys can see one branch fail
//! while its sibling commits. Failures can be confined to one key category so
//! a test can break exactly one side of a membership pair.

#![allow(clippy::disallowed_types, reason = "Locking simple RNG state")]

use std::{
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use rtcs_core::{KeyValueStore, KvError};

/// Chaotic store wrapper that randomly injects failures
///
/// Delegates to an underlying store but fails verbs with a configured
/// probability, reported as [`KvError::Unavailable`]. A failed verb never
/// reaches the inner store. Clones share RNG state and counters.
#[derive(Clone)]
pub struct ChaoticStore<S: KeyValueStore> {
    inner: S,
    /// Failure rate (0.0 = never fail, 1.0 = always fail)
    failure_rate: f64,
    /// Only keys starting with this prefix are eligible for failure
    key_prefix: Option<Arc<str>>,
    /// Only these verbs are eligible for failure
    verbs: Option<&'static [&'static str]>,
    /// RNG state for deterministic chaos
    rng: Arc<Mutex<ChaoticRng>>,
    /// Verbs attempted, failed or not
    operation_count: Arc<AtomicUsize>,
    /// Verbs failed by injection
    failure_count: Arc<AtomicUsize>,
}

/// Simple deterministic RNG for chaos injection
///
/// Linear congruential generator: fast, and reproducible for a given seed.
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

    fn should_fail(&mut self, failure_rate: f64) -> bool {
        self.next() < failure_rate
    }
}

impl<S: KeyValueStore> ChaoticStore<S> {
    /// Create a new chaotic store wrapper
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
    #[allow(clippy::panic)]
    pub fn with_seed(inner: S, failure_rate: f64, seed: u64) -> Self {
        assert!(
            (0.0..=1.0).contains(&failure_rate),
            "failure_rate must be between 0.0 and 1.0, got {failure_rate}"
        );

        Self {
            inner,
            failure_rate,
            key_prefix: None,
            verbs: None,
            rng: Arc::new(Mutex::new(ChaoticRng::new(seed))),
            operation_count: Arc::new(AtomicUsize::new(0)),
            failure_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Restrict failures to keys starting with `prefix`.
    #[must_use]
    pub fn only_keys_with_prefix(mut self, prefix: impl Into<Arc<str>>) -> Self {
        self.key_prefix = Some(prefix.into());
        self
    }

    /// Restrict failures to the named verbs (`"delete"`, `"set_add"`, ...).
    #[must_use]
    pub fn only_verbs(mut self, verbs: &'static [&'static str]) -> Self {
        self.verbs = Some(verbs);
        self
    }

    /// Underlying store (for checking invariants after chaos).
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Total number of verbs attempted.
    pub fn operation_count(&self) -> usize {
        self.operation_count.load(Ordering::Relaxed)
    }

    /// Number of verbs failed by injection.
    pub fn failure_count(&self) -> usize {
        self.failure_count.load(Ordering::Relaxed)
    }

    /// Count the verb and decide whether it fails.
    fn gate<'k>(
        &self,
        verb: &str,
        mut keys: impl Iterator<Item = &'k str>,
    ) -> Result<(), KvError> {
        self.operation_count.fetch_add(1, Ordering::Relaxed);

        let verb_eligible = self.verbs.is_none_or(|verbs| verbs.iter().any(|v| *v == verb));
        let eligible = verb_eligible
            && match &self.key_prefix {
                Some(prefix) => keys.any(|key| key.starts_with(&**prefix)),
                None => true,
            };
        if !eligible {
            return Ok(());
        }

        let fail =
            self.rng.lock().unwrap_or_else(PoisonError::into_inner).should_fail(self.failure_rate);
        if fail {
            self.failure_count.fetch_add(1, Ordering::Relaxed);
            return Err(KvError::Unavailable("chaotic failure injection".to_string()));
        }
        Ok(())
    }

    fn gate_key(&self, verb: &str, key: &str) -> Result<(), KvError> {
        self.gate(verb, std::iter::once(key))
    }
}

impl<S: KeyValueStore> KeyValueStore for ChaoticStore<S> {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        self.gate_key("get", key)?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), KvError> {
        self.gate_key("set", key)?;
        self.inner.set(key, value).await
    }

    async fn delete(&self, key: &str) -> Result<bool, KvError> {
        self.gate_key("delete", key)?;
        self.inner.delete(key).await
    }

    async fn increment(&self, key: &str) -> Result<i64, KvError> {
        self.gate_key("increment", key)?;
        self.inner.increment(key).await
    }

    async fn set_if_absent(&self, key: &str, value: &str) -> Result<bool, KvError> {
        self.gate_key("set_if_absent", key)?;
        self.inner.set_if_absent(key, value).await
    }

    async fn expire_after(&self, key: &str, ttl: Duration) -> Result<bool, KvError> {
        self.gate_key("expire_after", key)?;
        self.inner.expire_after(key, ttl).await
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<bool, KvError> {
        self.gate_key("set_add", key)?;
        self.inner.set_add(key, member).await
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<bool, KvError> {
        self.gate_key("set_remove", key)?;
        self.inner.set_remove(key, member).await
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, KvError> {
        self.gate_key("set_members", key)?;
        self.inner.set_members(key).await
    }

    async fn set_random_member(&self, key: &str) -> Result<Option<String>, KvError> {
        self.gate_key("set_random_member", key)?;
        self.inner.set_random_member(key).await
    }

    async fn list_append(&self, key: &str, value: &str) -> Result<u64, KvError> {
        self.gate_key("list_append", key)?;
        self.inner.list_append(key, value).await
    }

    async fn list_trim(&self, key: &str, start: i64, stop: i64) -> Result<(), KvError> {
        self.gate_key("list_trim", key)?;
        self.inner.list_trim(key, start, stop).await
    }

    async fn list_range(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>, KvError> {
        self.gate_key("list_range", key)?;
        self.inner.list_range(key, start, stop).await
    }

    async fn multi_get(&self, keys: &[String]) -> Result<Vec<Option<String>>, KvError> {
        self.gate("multi_get", keys.iter().map(String::as_str))?;
        self.inner.multi_get(keys).await
    }
}
