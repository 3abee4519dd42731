//! Durable records: sessions, user profiles, rooms and chat history.

use std::{collections::HashMap, sync::Arc};

use futures::TryFutureExt;
use rtcs_core::{
    Candidate, ConfigError, Environment, FanOut, GUEST_ID_PREFIX, KeySpace, KeyValueStore, KvError,
    StoreConfig, StoreError, UniqueAllocator, join2,
};
use serde::{Serialize, de::DeserializeOwned};

use crate::{
    codec::{decode, encode},
    record::{ChatMessage, UserProfile},
};

/// Store for records that outlive a connection.
///
/// Cheap to clone: the backend handle shares its connection and the
/// configuration sits behind an `Arc`.
#[derive(Clone)]
pub struct PersistentStore<S, E> {
    kv: S,
    env: E,
    config: Arc<StoreConfig>,
    keys: Arc<KeySpace>,
}

impl<S: KeyValueStore, E: Environment> PersistentStore<S, E> {
    /// Create a store over `kv`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if `config` does not validate.
    pub fn new(kv: S, env: E, config: Arc<StoreConfig>) -> Result<Self, ConfigError> {
        config.validate()?;
        let keys = Arc::new(KeySpace::new(&config));
        Ok(Self { kv, env, config, keys })
    }

    /// Configuration in effect.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Key layout in effect.
    pub fn keys(&self) -> &KeySpace {
        &self.keys
    }

    /// Backend handle.
    pub fn kv(&self) -> &S {
        &self.kv
    }

    /// User id bound to a session.
    pub async fn get_session(&self, session_id: &str) -> Result<Option<String>, StoreError> {
        Ok(self.kv.get(&self.keys.session(session_id)).await?)
    }

    /// Bind a session to a user id.
    pub async fn set_session(&self, session_id: &str, user_id: &str) -> Result<(), StoreError> {
        Ok(self.kv.set(&self.keys.session(session_id), user_id).await?)
    }

    /// Drop a session. Returns whether it existed.
    pub async fn remove_session(&self, session_id: &str) -> Result<bool, StoreError> {
        Ok(self.kv.delete(&self.keys.session(session_id)).await?)
    }

    /// Load a user profile.
    ///
    /// # Errors
    ///
    /// - `StoreError::CorruptRecord` if the stored profile does not decode
    /// - `StoreError::BackendUnavailable` if the read fails
    pub async fn get_user(&self, user_id: &str) -> Result<Option<UserProfile>, StoreError> {
        let key = self.keys.user(user_id);
        match self.kv.get(&key).await? {
            Some(raw) => decode(&key, &raw).map(Some),
            None => Ok(None),
        }
    }

    /// Store a user profile under `user_id`, replacing any previous one.
    ///
    /// # Errors
    ///
    /// `StoreError::Encode` if `extra` repeats `id`, `public` or `rooms`.
    pub async fn set_user(&self, user_id: &str, profile: &UserProfile) -> Result<(), StoreError> {
        profile.check_fields()?;
        let value = encode(profile)?;
        Ok(self.kv.set(&self.keys.user(user_id), &value).await?)
    }

    /// Delete a user profile. Returns whether it existed.
    pub async fn remove_user(&self, user_id: &str) -> Result<bool, StoreError> {
        Ok(self.kv.delete(&self.keys.user(user_id)).await?)
    }

    /// Load several profiles with one round trip.
    ///
    /// Every requested id is present in the result; ids with no stored
    /// profile map to `None`. One corrupt profile fails the whole batch.
    pub async fn get_users<I: AsRef<str>>(
        &self,
        user_ids: &[I],
    ) -> Result<HashMap<String, Option<UserProfile>>, StoreError> {
        if user_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let keys: Vec<String> = user_ids.iter().map(|id| self.keys.user(id.as_ref())).collect();
        let values = self.kv.multi_get(&keys).await?;
        if values.len() != keys.len() {
            return Err(KvError::Unavailable(format!(
                "multi_get returned {} values for {} keys",
                values.len(),
                keys.len()
            ))
            .into());
        }

        let mut users = HashMap::with_capacity(user_ids.len());
        for ((id, key), raw) in user_ids.iter().zip(&keys).zip(values) {
            let profile = raw.map(|raw| decode(key, &raw)).transpose()?;
            users.insert(id.as_ref().to_string(), profile);
        }
        Ok(users)
    }

    /// Create a guest user with a unique `guest:` id.
    ///
    /// The display name is the configured guest prefix followed by `name`,
    /// or by the next value of the shared guest counter when `name` is
    /// absent or blank.
    ///
    /// # Errors
    ///
    /// - `StoreError::AllocationExhausted` if every candidate id collided
    /// - `StoreError::BackendUnavailable` if a verb fails
    pub async fn get_guest(&self, name: Option<&str>) -> Result<UserProfile, StoreError> {
        let suffix = match name.map(str::trim).filter(|name| !name.is_empty()) {
            Some(name) => name.to_string(),
            None => self.kv.increment(self.keys.guest_counter()).await?.to_string(),
        };
        let display_name = format!("{}{suffix}", self.config.guest_name);

        let allocator = UniqueAllocator::new(&self.kv, self.config.allocation_bound());
        let profile = allocator
            .allocate(|| {
                let id = format!("{GUEST_ID_PREFIX}{}", self.env.fresh_id());
                let profile = UserProfile::guest(
                    id.clone(),
                    display_name.clone(),
                    self.config.guest_rooms.clone(),
                );
                Ok(Candidate { key: self.keys.user(&id), value: encode(&profile)?, id: profile })
            })
            .await?;

        tracing::debug!(user_id = %profile.id, name = %display_name, "created guest");
        Ok(profile)
    }

    /// Delete a guest profile.
    ///
    /// Ids without the `guest:` marker are left alone and reported as
    /// nothing removed.
    pub async fn remove_guest(&self, user_id: &str) -> Result<bool, StoreError> {
        if !user_id.starts_with(GUEST_ID_PREFIX) {
            tracing::debug!(user_id, "refusing to remove non-guest user");
            return Ok(false);
        }
        self.remove_user(user_id).await
    }

    /// Load room metadata.
    pub async fn get_room<T: DeserializeOwned>(
        &self,
        room_id: &str,
    ) -> Result<Option<T>, StoreError> {
        let key = self.keys.room(room_id);
        match self.kv.get(&key).await? {
            Some(raw) => decode(&key, &raw).map(Some),
            None => Ok(None),
        }
    }

    /// Store room metadata, replacing any previous value.
    pub async fn set_room<T: Serialize + ?Sized>(
        &self,
        room_id: &str,
        room: &T,
    ) -> Result<(), StoreError> {
        let value = encode(room)?;
        Ok(self.kv.set(&self.keys.room(room_id), &value).await?)
    }

    /// Delete room metadata and its chat log together.
    ///
    /// Returns whether the metadata record existed.
    ///
    /// # Errors
    ///
    /// `StoreError::PartialFailure` if either delete fails; the other may
    /// have gone through.
    pub async fn remove_room(&self, room_id: &str) -> Result<bool, StoreError> {
        let room_key = self.keys.room(room_id);
        let log_key = self.keys.log(room_id);

        let (had_room, had_log) = join2(
            "remove_room",
            self.kv.delete(&room_key).map_err(StoreError::from),
            self.kv.delete(&log_key).map_err(StoreError::from),
        )
        .await?;

        tracing::debug!(room_id, had_room, had_log, "removed room");
        Ok(had_room)
    }

    /// Append a message to a room's chat log.
    ///
    /// Trim, append and TTL refresh are dispatched together. The trim leaves
    /// room for this message, so once the append lands the log holds at most
    /// `history_length` entries.
    ///
    /// # Errors
    ///
    /// - `StoreError::Encode` if the message cannot be encoded or its body
    ///   repeats `time`
    /// - `StoreError::PartialFailure` (or the lone error when only the append
    ///   runs) if any step fails
    pub async fn add_log(&self, room_id: &str, message: &ChatMessage) -> Result<(), StoreError> {
        message.check_fields()?;
        let value = encode(message)?;
        let key = self.keys.log(room_id);

        let mut fan_out = FanOut::new("add_log");
        if let Some((start, stop)) = self.config.history_trim_window() {
            fan_out.push(self.kv.list_trim(&key, start, stop).map_err(StoreError::from));
        }
        fan_out.push(self.kv.list_append(&key, &value).map_ok(|_| ()).map_err(StoreError::from));
        if let Some(ttl) = self.config.history_expire() {
            fan_out.push(self.kv.expire_after(&key, ttl).map_ok(|_| ()).map_err(StoreError::from));
        }

        let branches = fan_out.len();
        fan_out.join().await?;

        tracing::debug!(room_id, time = message.time, branches, "appended chat message");
        Ok(())
    }

    /// Chat history of a room, oldest first.
    ///
    /// With `since`, only messages whose `time` is strictly later are
    /// returned. A cursor of `0` counts as no cursor.
    ///
    /// # Errors
    ///
    /// `StoreError::CorruptRecord` if any entry does not decode.
    pub async fn get_log(
        &self,
        room_id: &str,
        since: Option<u64>,
    ) -> Result<Vec<ChatMessage>, StoreError> {
        let since = since.filter(|&since| since > 0);
        let key = self.keys.log(room_id);
        let entries = self.kv.list_range(&key, 0, -1).await?;

        let mut messages = Vec::with_capacity(entries.len());
        for raw in entries {
            let message: ChatMessage = decode(&key, &raw)?;
            if since.is_none_or(|since| message.time > since) {
                messages.push(message);
            }
        }
        Ok(messages)
    }
}
