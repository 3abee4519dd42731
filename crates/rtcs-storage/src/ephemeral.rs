//! Connection-scoped state: socket presence, room membership and one-time
//! tokens.
//!
//! Membership is kept as two mirrored sets (`userRooms:<user>` and
//! `roomUsers:<room>`). Both sides are written by one fan-out, so they agree
//! unless a branch fails, in which case the caller sees
//! [`StoreError::PartialFailure`] and the sets may disagree.

use std::sync::Arc;

use futures::TryFutureExt;
use rtcs_core::{
    Candidate, ConfigError, Environment, KeySpace, KeyValueStore, StoreConfig, StoreError,
    UniqueAllocator, join2,
};
use serde::{Serialize, de::DeserializeOwned};

use crate::codec::{decode, encode};

/// Outcome of removing a user from a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoomDeparture {
    /// The user was not in the room's member set
    pub already_absent: bool,
    /// The room still has at least one member
    pub room_has_members: bool,
}

/// Store for presence, membership and tokens.
#[derive(Clone)]
pub struct EphemeralStore<S, E> {
    kv: S,
    env: E,
    config: Arc<StoreConfig>,
    keys: Arc<KeySpace>,
}

impl<S: KeyValueStore, E: Environment> EphemeralStore<S, E> {
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

    /// Key layout in effect.
    pub fn keys(&self) -> &KeySpace {
        &self.keys
    }

    /// Backend handle.
    pub fn kv(&self) -> &S {
        &self.kv
    }

    /// Record a live socket for a user. Returns whether it was new.
    pub async fn add_socket(&self, socket_id: &str, user_id: &str) -> Result<bool, StoreError> {
        Ok(self.kv.set_add(&self.keys.user_sockets(user_id), socket_id).await?)
    }

    /// Live sockets of a user.
    pub async fn get_sockets(&self, user_id: &str) -> Result<Vec<String>, StoreError> {
        Ok(self.kv.set_members(&self.keys.user_sockets(user_id)).await?)
    }

    /// Forget a socket. Returns whether the user still has another one.
    ///
    /// The probe runs after the removal, so a `false` here means the user
    /// was offline at that moment.
    pub async fn remove_socket(&self, socket_id: &str, user_id: &str) -> Result<bool, StoreError> {
        let key = self.keys.user_sockets(user_id);
        let removed = self.kv.set_remove(&key, socket_id).await?;
        let still_connected = self.kv.set_random_member(&key).await?.is_some();

        tracing::debug!(user_id, socket_id, removed, still_connected, "removed socket");
        Ok(still_connected)
    }

    /// Add a user to a room on both membership sides.
    ///
    /// Returns whether the user was already a member.
    ///
    /// # Errors
    ///
    /// `StoreError::PartialFailure` if either side fails to update.
    pub async fn add_user_to_room(&self, user_id: &str, room_id: &str) -> Result<bool, StoreError> {
        let user_rooms = self.keys.user_rooms(user_id);
        let room_users = self.keys.room_users(room_id);

        let (added, _) = join2(
            "add_user_to_room",
            self.kv.set_add(&user_rooms, room_id).map_err(StoreError::from),
            self.kv.set_add(&room_users, user_id).map_err(StoreError::from),
        )
        .await?;

        Ok(!added)
    }

    /// Remove a user from a room on both membership sides.
    ///
    /// The room side probes for a remaining member right after its removal.
    ///
    /// # Errors
    ///
    /// `StoreError::PartialFailure` if either side fails to update.
    pub async fn remove_user_from_room(
        &self,
        user_id: &str,
        room_id: &str,
    ) -> Result<RoomDeparture, StoreError> {
        let user_rooms = self.keys.user_rooms(user_id);
        let room_users = self.keys.room_users(room_id);

        let room_side = async {
            let removed = self.kv.set_remove(&room_users, user_id).await?;
            let remaining = self.kv.set_random_member(&room_users).await?;
            Ok::<_, StoreError>((removed, remaining.is_some()))
        };

        let (_, (removed, room_has_members)) = join2(
            "remove_user_from_room",
            self.kv.set_remove(&user_rooms, room_id).map_err(StoreError::from),
            room_side,
        )
        .await?;

        let departure = RoomDeparture { already_absent: !removed, room_has_members };
        tracing::debug!(user_id, room_id, ?departure, "left room");
        Ok(departure)
    }

    /// Rooms a user belongs to.
    pub async fn get_user_rooms(&self, user_id: &str) -> Result<Vec<String>, StoreError> {
        Ok(self.kv.set_members(&self.keys.user_rooms(user_id)).await?)
    }

    /// Members of a room.
    pub async fn get_room_users(&self, room_id: &str) -> Result<Vec<String>, StoreError> {
        Ok(self.kv.set_members(&self.keys.room_users(room_id)).await?)
    }

    /// Store `payload` under a fresh token and return the token.
    ///
    /// The claim and the expiry are two steps. If the expiry fails the error
    /// is returned and the token stays stored without a lifetime.
    ///
    /// # Errors
    ///
    /// - `StoreError::Encode` if the payload cannot be encoded
    /// - `StoreError::AllocationExhausted` if every candidate collided
    /// - `StoreError::BackendUnavailable` if a verb fails
    pub async fn create_token<T: Serialize + ?Sized>(
        &self,
        payload: &T,
    ) -> Result<String, StoreError> {
        let value = encode(payload)?;

        let allocator = UniqueAllocator::new(&self.kv, self.config.allocation_bound());
        let token = allocator
            .allocate(|| {
                let token = self.env.fresh_id();
                Ok(Candidate { key: self.keys.token(&token), value: value.clone(), id: token })
            })
            .await?;

        let key = self.keys.token(&token);
        if let Err(err) = self.kv.expire_after(&key, self.config.token_expire()).await {
            tracing::warn!(%key, %err, "token stored without expiry");
            return Err(err.into());
        }

        Ok(token)
    }

    /// Consume a token and return its payload.
    ///
    /// At most one caller receives the payload: whoever's delete removes the
    /// key. Everyone else, and anyone arriving after expiry, gets `None`.
    /// A payload is only handed out once its removal has committed.
    ///
    /// # Errors
    ///
    /// - `StoreError::CorruptRecord` if the payload does not decode (the
    ///   token is consumed regardless)
    /// - `StoreError::BackendUnavailable` if the read or the delete fails;
    ///   after a failed delete the token stays live and can be retried
    pub async fn release_token<T: DeserializeOwned>(
        &self,
        token: &str,
    ) -> Result<Option<T>, StoreError> {
        let key = self.keys.token(token);
        let Some(raw) = self.kv.get(&key).await? else {
            return Ok(None);
        };

        match self.kv.delete(&key).await {
            Ok(true) => {},
            Ok(false) => {
                tracing::debug!(%key, "token consumed concurrently");
                return Ok(None);
            },
            Err(err) => {
                tracing::warn!(%key, %err, "failed to delete released token, payload withheld");
                return Err(err.into());
            },
        }

        decode(&key, &raw).map(Some)
    }
}
