//! Standard invariant checks.
//!
//! Each holds after any fault-free sequence of store operations. Under fault
//! injection a reported partial failure may break the first three.

use rtcs_core::GUEST_ID_PREFIX;
use rtcs_storage::UserProfile;

use super::{Invariant, InvariantResult, StoreSnapshot, Violation};

/// `userRooms` and `roomUsers` mirror each other.
///
/// A user lists a room if and only if the room lists the user.
pub struct MembershipSymmetry;

impl Invariant for MembershipSymmetry {
    fn name(&self) -> &'static str {
        "membership_symmetry"
    }

    fn check(&self, state: &StoreSnapshot) -> InvariantResult {
        for (user, rooms) in &state.user_rooms {
            for room in rooms {
                if !state.room_users.get(room).is_some_and(|users| users.contains(user)) {
                    return Err(Violation {
                        invariant: self.name(),
                        message: format!("user {user} lists room {room}, room does not list user"),
                    });
                }
            }
        }

        for (room, users) in &state.room_users {
            for user in users {
                if !state.user_rooms.get(user).is_some_and(|rooms| rooms.contains(room)) {
                    return Err(Violation {
                        invariant: self.name(),
                        message: format!("room {room} lists user {user}, user does not list room"),
                    });
                }
            }
        }
        Ok(())
    }
}

/// No chat log is longer than the configured window.
pub struct HistoryBound;

impl Invariant for HistoryBound {
    fn name(&self) -> &'static str {
        "history_bound"
    }

    fn check(&self, state: &StoreSnapshot) -> InvariantResult {
        let Some(limit) = state.history_length else {
            return Ok(());
        };

        match state.logs.iter().find(|(_, entries)| entries.len() > limit) {
            Some((room, entries)) => Err(Violation {
                invariant: self.name(),
                message: format!("room {room} holds {} messages, limit is {limit}", entries.len()),
            }),
            None => Ok(()),
        }
    }
}

/// Every live token carries an expiry.
pub struct TokensExpire;

impl Invariant for TokensExpire {
    fn name(&self) -> &'static str {
        "tokens_expire"
    }

    fn check(&self, state: &StoreSnapshot) -> InvariantResult {
        match state.tokens_without_ttl.first() {
            Some(token) => Err(Violation {
                invariant: self.name(),
                message: format!("token {token} has no expiry"),
            }),
            None => Ok(()),
        }
    }
}

/// Guest profiles decode, are stored under their own id and carry the guest
/// flag.
pub struct GuestProfilesWellFormed;

impl Invariant for GuestProfilesWellFormed {
    fn name(&self) -> &'static str {
        "guest_profiles_well_formed"
    }

    fn check(&self, state: &StoreSnapshot) -> InvariantResult {
        let violation = |message: String| Violation { invariant: self.name(), message };

        for (id, raw) in state.users.iter().filter(|(id, _)| id.starts_with(GUEST_ID_PREFIX)) {
            let profile: UserProfile = serde_json::from_str(raw)
                .map_err(|err| violation(format!("guest {id} does not decode: {err}")))?;

            if profile.id != *id {
                return Err(violation(format!("guest stored at {id} claims id {}", profile.id)));
            }
            if profile.public.get("guest").and_then(serde_json::Value::as_bool) != Some(true) {
                return Err(violation(format!("guest {id} lacks the guest flag")));
            }
        }
        Ok(())
    }
}
