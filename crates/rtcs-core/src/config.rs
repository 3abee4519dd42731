//! Store configuration and key layout.
//!
//! [`StoreConfig`] is plain data (serde, with defaults for every field) so a
//! host can load it from whatever format it already uses. It is validated
//! once and turned into a [`KeySpace`] holding the fully prefixed category
//! prefixes. Neither is mutated after construction.
//!
//! Prefixes are deployment configuration, not protocol, but changing them
//! orphans every record already stored under the old ones.

use std::{collections::HashSet, num::NonZeroU32, time::Duration};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Deployment prefix used when none is configured.
pub const DEFAULT_PREFIX: &str = "rtcs.io:";

/// Default token lifetime.
pub const DEFAULT_TOKEN_EXPIRE_MS: u64 = 60_000;

/// Default bound on allocation attempts.
pub const DEFAULT_MAX_ALLOCATION_ATTEMPTS: u32 = 32;

/// Marker every guest user id starts with.
pub const GUEST_ID_PREFIX: &str = "guest:";

/// Per-category key prefixes, appended to the deployment prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyPrefixes {
    /// Session id to user id
    pub session: String,
    /// User profiles
    pub user: String,
    /// Room metadata
    pub room: String,
    /// Chat history lists
    pub log: String,
    /// Live sockets per user
    pub user_sockets: String,
    /// Rooms per user
    pub user_rooms: String,
    /// Users per room
    pub room_users: String,
    /// One-time tokens
    pub token: String,
}

impl Default for KeyPrefixes {
    fn default() -> Self {
        Self {
            session: "session:".to_string(),
            user: "user:".to_string(),
            room: "room:".to_string(),
            log: "log:".to_string(),
            user_sockets: "userSockets:".to_string(),
            user_rooms: "userRooms:".to_string(),
            room_users: "roomUsers:".to_string(),
            token: "token:".to_string(),
        }
    }
}

impl KeyPrefixes {
    fn all(&self) -> [&str; 8] {
        [
            self.session.as_str(),
            self.user.as_str(),
            self.room.as_str(),
            self.log.as_str(),
            self.user_sockets.as_str(),
            self.user_rooms.as_str(),
            self.room_users.as_str(),
            self.token.as_str(),
        ]
    }
}

/// Configuration shared by both stores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Deployment prefix in front of every key
    pub prefix: String,
    /// Category prefixes
    pub prefixes: KeyPrefixes,
    /// Keep at most this many chat messages per room
    pub history_length: Option<usize>,
    /// Chat log TTL, refreshed on every append
    pub history_expire_ms: Option<u64>,
    /// Token lifetime
    pub token_expire_ms: u64,
    /// Display-name prefix for guests
    pub guest_name: String,
    /// Rooms every new guest profile starts with
    pub guest_rooms: Vec<String>,
    /// Allocation attempts before giving up. `None` retries forever.
    pub max_allocation_attempts: Option<u32>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            prefixes: KeyPrefixes::default(),
            history_length: None,
            history_expire_ms: None,
            token_expire_ms: DEFAULT_TOKEN_EXPIRE_MS,
            guest_name: "Guest ".to_string(),
            guest_rooms: Vec::new(),
            max_allocation_attempts: Some(DEFAULT_MAX_ALLOCATION_ATTEMPTS),
        }
    }
}

impl StoreConfig {
    /// Check every field a store relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.token_expire_ms == 0 {
            return Err(ConfigError::ZeroTokenExpiry);
        }
        if self.history_length == Some(0) {
            return Err(ConfigError::ZeroHistoryLength);
        }
        if self.history_expire_ms == Some(0) {
            return Err(ConfigError::ZeroHistoryExpiry);
        }
        if self.max_allocation_attempts == Some(0) {
            return Err(ConfigError::ZeroAllocationBound);
        }

        let mut seen = HashSet::new();
        for prefix in self.prefixes.all() {
            if prefix.is_empty() || !seen.insert(prefix) {
                return Err(ConfigError::PrefixCollision { prefix: prefix.to_string() });
            }
        }

        Ok(())
    }

    /// Token lifetime.
    pub fn token_expire(&self) -> Duration {
        Duration::from_millis(self.token_expire_ms)
    }

    /// Chat log TTL, if configured.
    pub fn history_expire(&self) -> Option<Duration> {
        self.history_expire_ms.map(Duration::from_millis)
    }

    /// Allocation bound. `None` means unbounded.
    pub fn allocation_bound(&self) -> Option<NonZeroU32> {
        self.max_allocation_attempts.and_then(NonZeroU32::new)
    }

    /// List trim window applied before an append so that at most
    /// `history_length` entries remain afterwards.
    ///
    /// Keeps the last `n - 1` entries (`1 - n ..= -1`). For `n == 1` that
    /// window would read `0 ..= -1`, the whole list, so an empty window is
    /// returned instead.
    pub fn history_trim_window(&self) -> Option<(i64, i64)> {
        self.history_length.map(|n| if n <= 1 { (1, 0) } else { (1 - n as i64, -1) })
    }
}

/// Fully prefixed key builders, computed once from a [`StoreConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    session: String,
    user: String,
    room: String,
    log: String,
    user_sockets: String,
    user_rooms: String,
    room_users: String,
    token: String,
    guest_counter: String,
}

impl KeySpace {
    /// Join the deployment prefix with each category prefix.
    pub fn new(config: &StoreConfig) -> Self {
        let p = &config.prefix;
        let c = &config.prefixes;
        Self {
            session: format!("{p}{}", c.session),
            user: format!("{p}{}", c.user),
            room: format!("{p}{}", c.room),
            log: format!("{p}{}", c.log),
            user_sockets: format!("{p}{}", c.user_sockets),
            user_rooms: format!("{p}{}", c.user_rooms),
            room_users: format!("{p}{}", c.room_users),
            token: format!("{p}{}", c.token),
            guest_counter: format!("{p}guestNum"),
        }
    }

    /// `session:<id>`
    pub fn session(&self, session_id: &str) -> String {
        format!("{}{session_id}", self.session)
    }

    /// `user:<id>`
    pub fn user(&self, user_id: &str) -> String {
        format!("{}{user_id}", self.user)
    }

    /// `room:<id>`
    pub fn room(&self, room_id: &str) -> String {
        format!("{}{room_id}", self.room)
    }

    /// `log:<room id>`
    pub fn log(&self, room_id: &str) -> String {
        format!("{}{room_id}", self.log)
    }

    /// `userSockets:<user id>`
    pub fn user_sockets(&self, user_id: &str) -> String {
        format!("{}{user_id}", self.user_sockets)
    }

    /// `userRooms:<user id>`
    pub fn user_rooms(&self, user_id: &str) -> String {
        format!("{}{user_id}", self.user_rooms)
    }

    /// `roomUsers:<room id>`
    pub fn room_users(&self, room_id: &str) -> String {
        format!("{}{room_id}", self.room_users)
    }

    /// `token:<token>`
    pub fn token(&self, token: &str) -> String {
        format!("{}{token}", self.token)
    }

    /// Shared counter naming unnamed guests.
    pub fn guest_counter(&self) -> &str {
        &self.guest_counter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_key_layout() {
        let keys = KeySpace::new(&StoreConfig::default());

        assert_eq!(keys.session("s1"), "rtcs.io:session:s1");
        assert_eq!(keys.user("guest:abc"), "rtcs.io:user:guest:abc");
        assert_eq!(keys.room("r"), "rtcs.io:room:r");
        assert_eq!(keys.log("r"), "rtcs.io:log:r");
        assert_eq!(keys.user_sockets("u"), "rtcs.io:userSockets:u");
        assert_eq!(keys.user_rooms("u"), "rtcs.io:userRooms:u");
        assert_eq!(keys.room_users("r"), "rtcs.io:roomUsers:r");
        assert_eq!(keys.token("t"), "rtcs.io:token:t");
        assert_eq!(keys.guest_counter(), "rtcs.io:guestNum");
    }

    #[test]
    fn custom_prefixes_apply() {
        let config = StoreConfig {
            prefix: "staging:".to_string(),
            prefixes: KeyPrefixes { user: "u:".to_string(), ..KeyPrefixes::default() },
            ..StoreConfig::default()
        };
        let keys = KeySpace::new(&config);

        assert_eq!(keys.user("1"), "staging:u:1");
        assert_eq!(keys.session("1"), "staging:session:1");
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: StoreConfig =
            serde_json::from_str(r#"{"history_length": 50, "prefixes": {"token": "tk:"}}"#)
                .unwrap();

        assert_eq!(config.history_length, Some(50));
        assert_eq!(config.prefixes.token, "tk:");
        assert_eq!(config.prefixes.user, "user:");
        assert_eq!(config.token_expire_ms, DEFAULT_TOKEN_EXPIRE_MS);
        assert_eq!(config.max_allocation_attempts, Some(DEFAULT_MAX_ALLOCATION_ATTEMPTS));
    }

    #[test]
    fn explicit_null_bound_is_unbounded() {
        let config: StoreConfig =
            serde_json::from_str(r#"{"max_allocation_attempts": null}"#).unwrap();
        assert_eq!(config.allocation_bound(), None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_values() {
        let zero_token = StoreConfig { token_expire_ms: 0, ..StoreConfig::default() };
        assert_eq!(zero_token.validate(), Err(ConfigError::ZeroTokenExpiry));

        let zero_history = StoreConfig { history_length: Some(0), ..StoreConfig::default() };
        assert_eq!(zero_history.validate(), Err(ConfigError::ZeroHistoryLength));

        let zero_ttl = StoreConfig { history_expire_ms: Some(0), ..StoreConfig::default() };
        assert_eq!(zero_ttl.validate(), Err(ConfigError::ZeroHistoryExpiry));

        let zero_bound = StoreConfig { max_allocation_attempts: Some(0), ..StoreConfig::default() };
        assert_eq!(zero_bound.validate(), Err(ConfigError::ZeroAllocationBound));
    }

    #[test]
    fn validate_rejects_shared_prefix() {
        let config = StoreConfig {
            prefixes: KeyPrefixes { room: "user:".to_string(), ..KeyPrefixes::default() },
            ..StoreConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::PrefixCollision { prefix: "user:".to_string() })
        );
    }

    #[test]
    fn trim_window_keeps_room_for_the_append() {
        let window =
            |n| StoreConfig { history_length: n, ..StoreConfig::default() }.history_trim_window();

        assert_eq!(window(None), None);
        assert_eq!(window(Some(3)), Some((-2, -1)));
        assert_eq!(window(Some(100)), Some((-99, -1)));
        assert_eq!(window(Some(1)), Some((1, 0)));
    }
}
