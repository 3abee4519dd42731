//! In-memory key-value store.

#![allow(clippy::disallowed_types, reason = "Synchronous in-memory operations only")]

use std::{
    collections::{BTreeMap, BTreeSet, HashMap, VecDeque},
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use rtcs_core::{Environment, KeyValueStore, KvError};

/// Value held under one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredValue {
    /// Plain string (sessions, JSON records, counters)
    String(String),
    /// Unordered set of members
    Set(BTreeSet<String>),
    /// Ordered list
    List(VecDeque<String>),
}

struct Entry<I> {
    value: StoredValue,
    expires_at: Option<I>,
}

/// In-memory key-value store for tests, simulation and single-process
/// deployments.
///
/// Implements every verb with the semantics a Redis-style server gives them:
/// `set` clears any TTL, emptied sets and lists disappear, list indices may be
/// negative, and type mismatches are errors. Expiry is lazy and measured
/// against the environment's clock, so a virtual clock drives TTLs in tests.
///
/// All state sits behind one `Arc<Mutex<>>`; clones share it. Every verb
/// completes without yielding, so branches of a fan-out apply in the order
/// they are polled.
#[derive(Clone)]
pub struct MemoryStore<E: Environment> {
    env: E,
    inner: Arc<Mutex<HashMap<String, Entry<E::Instant>>>>,
}

type Entries<I> = HashMap<String, Entry<I>>;

impl<E: Environment> MemoryStore<E> {
    /// Create an empty store on the given clock.
    pub fn new(env: E) -> Self {
        Self { env, inner: Arc::new(Mutex::new(HashMap::new())) }
    }

    /// Live entries, expired ones excluded.
    ///
    /// Used by the harness to check invariants across the whole keyspace.
    pub fn dump(&self) -> Result<BTreeMap<String, StoredValue>, KvError> {
        let now = self.env.now();
        let inner = self.lock()?;

        Ok(inner
            .iter()
            .filter(|(_, entry)| entry.expires_at.is_none_or(|at| at > now))
            .map(|(key, entry)| (key.clone(), entry.value.clone()))
            .collect())
    }

    /// Number of live keys.
    pub fn key_count(&self) -> Result<usize, KvError> {
        self.dump().map(|entries| entries.len())
    }

    /// Remaining lifetime of `key`. `None` if absent or persistent.
    pub fn ttl(&self, key: &str) -> Result<Option<Duration>, KvError> {
        let now = self.env.now();
        let mut inner = self.lock()?;
        purge_expired(&mut *inner, key, now);

        Ok(inner.get(key).and_then(|entry| entry.expires_at).map(|at| at - now))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Entries<E::Instant>>, KvError> {
        self.inner.lock().map_err(|_| KvError::Unavailable("memory store lock poisoned".into()))
    }

    /// Run `op` on the live entry map with `key` already purged if expired.
    fn with_key<T>(
        &self,
        key: &str,
        op: impl FnOnce(&mut Entries<E::Instant>) -> Result<T, KvError>,
    ) -> Result<T, KvError> {
        let now = self.env.now();
        let mut inner = self.lock()?;
        purge_expired(&mut *inner, key, now);
        op(&mut *inner)
    }
}

fn purge_expired<I: Ord>(entries: &mut Entries<I>, key: &str, now: I) {
    if entries.get(key).is_some_and(|e| e.expires_at.as_ref().is_some_and(|at| *at <= now)) {
        entries.remove(key);
    }
}

fn wrong_type(key: &str) -> KvError {
    KvError::WrongType { key: key.to_string() }
}

/// Resolve an inclusive, possibly negative range against `len`.
///
/// `None` when the window selects nothing.
fn resolve_range(start: i64, stop: i64, len: usize) -> Option<(usize, usize)> {
    let len = len as i64;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };

    if start > stop || start >= len { None } else { Some((start as usize, stop as usize)) }
}

impl<E: Environment> KeyValueStore for MemoryStore<E> {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        self.with_key(key, |entries| match entries.get(key).map(|e| &e.value) {
            None => Ok(None),
            Some(StoredValue::String(value)) => Ok(Some(value.clone())),
            Some(_) => Err(wrong_type(key)),
        })
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), KvError> {
        self.with_key(key, |entries| {
            entries.insert(
                key.to_string(),
                Entry { value: StoredValue::String(value.to_string()), expires_at: None },
            );
            Ok(())
        })
    }

    async fn delete(&self, key: &str) -> Result<bool, KvError> {
        self.with_key(key, |entries| Ok(entries.remove(key).is_some()))
    }

    async fn increment(&self, key: &str) -> Result<i64, KvError> {
        self.with_key(key, |entries| {
            let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
                value: StoredValue::String("0".to_string()),
                expires_at: None,
            });
            let StoredValue::String(raw) = &mut entry.value else {
                return Err(wrong_type(key));
            };

            let next = raw
                .parse::<i64>()
                .ok()
                .and_then(|n| n.checked_add(1))
                .ok_or_else(|| KvError::NotAnInteger { key: key.to_string() })?;
            *raw = next.to_string();
            Ok(next)
        })
    }

    async fn set_if_absent(&self, key: &str, value: &str) -> Result<bool, KvError> {
        self.with_key(key, |entries| {
            if entries.contains_key(key) {
                return Ok(false);
            }
            entries.insert(
                key.to_string(),
                Entry { value: StoredValue::String(value.to_string()), expires_at: None },
            );
            Ok(true)
        })
    }

    async fn expire_after(&self, key: &str, ttl: Duration) -> Result<bool, KvError> {
        let deadline = self.env.now() + ttl;
        self.with_key(key, |entries| match entries.get_mut(key) {
            Some(entry) => {
                entry.expires_at = Some(deadline);
                Ok(true)
            },
            None => Ok(false),
        })
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<bool, KvError> {
        self.with_key(key, |entries| {
            let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
                value: StoredValue::Set(BTreeSet::new()),
                expires_at: None,
            });
            match &mut entry.value {
                StoredValue::Set(members) => Ok(members.insert(member.to_string())),
                _ => Err(wrong_type(key)),
            }
        })
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<bool, KvError> {
        self.with_key(key, |entries| {
            let Some(entry) = entries.get_mut(key) else {
                return Ok(false);
            };
            let StoredValue::Set(members) = &mut entry.value else {
                return Err(wrong_type(key));
            };

            let removed = members.remove(member);
            if members.is_empty() {
                entries.remove(key);
            }
            Ok(removed)
        })
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, KvError> {
        self.with_key(key, |entries| match entries.get(key).map(|e| &e.value) {
            None => Ok(Vec::new()),
            Some(StoredValue::Set(members)) => Ok(members.iter().cloned().collect()),
            Some(_) => Err(wrong_type(key)),
        })
    }

    async fn set_random_member(&self, key: &str) -> Result<Option<String>, KvError> {
        let pick = self.env.random_u64();
        self.with_key(key, |entries| match entries.get(key).map(|e| &e.value) {
            None => Ok(None),
            Some(StoredValue::Set(members)) if members.is_empty() => Ok(None),
            Some(StoredValue::Set(members)) => {
                let index = (pick % members.len() as u64) as usize;
                Ok(members.iter().nth(index).cloned())
            },
            Some(_) => Err(wrong_type(key)),
        })
    }

    async fn list_append(&self, key: &str, value: &str) -> Result<u64, KvError> {
        self.with_key(key, |entries| {
            let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
                value: StoredValue::List(VecDeque::new()),
                expires_at: None,
            });
            match &mut entry.value {
                StoredValue::List(items) => {
                    items.push_back(value.to_string());
                    Ok(items.len() as u64)
                },
                _ => Err(wrong_type(key)),
            }
        })
    }

    async fn list_trim(&self, key: &str, start: i64, stop: i64) -> Result<(), KvError> {
        self.with_key(key, |entries| {
            let Some(entry) = entries.get_mut(key) else {
                return Ok(());
            };
            let StoredValue::List(items) = &mut entry.value else {
                return Err(wrong_type(key));
            };

            match resolve_range(start, stop, items.len()) {
                Some((first, last)) => {
                    items.truncate(last + 1);
                    items.drain(..first);
                },
                None => {
                    entries.remove(key);
                },
            }
            Ok(())
        })
    }

    async fn list_range(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>, KvError> {
        self.with_key(key, |entries| match entries.get(key).map(|e| &e.value) {
            None => Ok(Vec::new()),
            Some(StoredValue::List(items)) => Ok(resolve_range(start, stop, items.len())
                .map(|(first, last)| items.range(first..=last).cloned().collect())
                .unwrap_or_default()),
            Some(_) => Err(wrong_type(key)),
        })
    }

    async fn multi_get(&self, keys: &[String]) -> Result<Vec<Option<String>>, KvError> {
        let now = self.env.now();
        let mut inner = self.lock()?;

        Ok(keys
            .iter()
            .map(|key| {
                purge_expired(&mut *inner, key, now);
                match inner.get(key).map(|e| &e.value) {
                    Some(StoredValue::String(value)) => Some(value.clone()),
                    _ => None,
                }
            })
            .collect())
    }
}
