//! Observable store state for invariant checking.
//!
//! A snapshot is taken from the live entries of a
//! [`MemoryStore`](rtcs_storage::MemoryStore) and split by key category, so
//! checks read plain maps instead of raw keys.

use std::collections::{BTreeMap, BTreeSet};

use rtcs_core::{Environment, KeySpace, KvError, StoreConfig};
use rtcs_storage::{MemoryStore, StoredValue};

/// Snapshot of the whole keyspace of one deployment prefix.
#[derive(Debug, Clone, Default)]
pub struct StoreSnapshot {
    /// `userRooms:<user>` sets, by user id
    pub user_rooms: BTreeMap<String, BTreeSet<String>>,
    /// `roomUsers:<room>` sets, by room id
    pub room_users: BTreeMap<String, BTreeSet<String>>,
    /// Raw chat log entries, by room id
    pub logs: BTreeMap<String, Vec<String>>,
    /// Raw user profiles, by user id
    pub users: BTreeMap<String, String>,
    /// Token ids that have no expiry
    pub tokens_without_ttl: BTreeSet<String>,
    /// Configured history window
    pub history_length: Option<usize>,
}

impl StoreSnapshot {
    /// Create an empty snapshot.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Capture the live state of `store` under the key layout of `config`.
    pub fn capture<E: Environment>(
        store: &MemoryStore<E>,
        config: &StoreConfig,
    ) -> Result<Self, KvError> {
        let keys = KeySpace::new(config);
        let user_rooms_prefix = keys.user_rooms("");
        let room_users_prefix = keys.room_users("");
        let log_prefix = keys.log("");
        let user_prefix = keys.user("");
        let token_prefix = keys.token("");

        let mut snapshot = Self { history_length: config.history_length, ..Self::default() };

        for (key, value) in store.dump()? {
            match value {
                StoredValue::Set(members) => {
                    if let Some(user) = key.strip_prefix(&user_rooms_prefix) {
                        snapshot.user_rooms.insert(user.to_string(), members);
                    } else if let Some(room) = key.strip_prefix(&room_users_prefix) {
                        snapshot.room_users.insert(room.to_string(), members);
                    }
                },
                StoredValue::List(entries) => {
                    if let Some(room) = key.strip_prefix(&log_prefix) {
                        snapshot.logs.insert(room.to_string(), entries.into_iter().collect());
                    }
                },
                StoredValue::String(raw) => {
                    if let Some(user) = key.strip_prefix(&user_prefix) {
                        snapshot.users.insert(user.to_string(), raw);
                    } else if let Some(token) = key.strip_prefix(&token_prefix) {
                        if store.ttl(&key)?.is_none() {
                            snapshot.tokens_without_ttl.insert(token.to_string());
                        }
                    }
                },
            }
        }

        Ok(snapshot)
    }

    /// Record a membership on both sides.
    pub fn with_member(mut self, user_id: &str, room_id: &str) -> Self {
        self.user_rooms.entry(user_id.to_string()).or_default().insert(room_id.to_string());
        self.room_users.entry(room_id.to_string()).or_default().insert(user_id.to_string());
        self
    }
}
