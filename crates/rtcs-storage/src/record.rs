//! Stored record shapes.
//!
//! Only the fields the stores themselves read are typed. Everything else a
//! host puts into a profile or message rides along in a flattened map and
//! round-trips untouched.

use rtcs_core::{GUEST_ID_PREFIX, StoreError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Profile fields the flattened `extra` map may not repeat.
const PROFILE_FIELDS: &[&str] = &["id", "public", "rooms"];

/// Message fields the flattened body may not repeat.
const MESSAGE_FIELDS: &[&str] = &["time"];

/// A flattened map repeating a typed field would encode a duplicate key that
/// never decodes again.
fn check_flattened(map: &Map<String, Value>, typed: &[&str]) -> Result<(), StoreError> {
    match typed.iter().find(|field| map.contains_key(**field)) {
        Some(field) => Err(StoreError::Encode { reason: format!("field `{field}` is reserved") }),
        None => Ok(()),
    }
}

/// User profile stored under `user:<id>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    /// User id. Guests carry the `guest:` prefix.
    pub id: String,
    /// Fields visible to other users (display name, guest flag)
    #[serde(default)]
    pub public: Map<String, Value>,
    /// Rooms the user belongs to
    #[serde(default)]
    pub rooms: Vec<String>,
    /// Host-defined fields
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl UserProfile {
    /// Profile with no public fields and no rooms.
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), public: Map::new(), rooms: Vec::new(), extra: Map::new() }
    }

    /// Guest profile: `public` holds `guest: true` and the display name.
    pub fn guest(id: impl Into<String>, name: String, rooms: Vec<String>) -> Self {
        let mut public = Map::new();
        public.insert("guest".to_string(), Value::Bool(true));
        public.insert("name".to_string(), Value::String(name));

        Self { id: id.into(), public, rooms, extra: Map::new() }
    }

    /// Check if the id carries the guest marker.
    pub fn is_guest(&self) -> bool {
        self.id.starts_with(GUEST_ID_PREFIX)
    }

    /// Public display name, if one is set.
    pub fn display_name(&self) -> Option<&str> {
        self.public.get("name").and_then(Value::as_str)
    }

    /// Refuse an `extra` map that repeats `id`, `public` or `rooms`.
    pub(crate) fn check_fields(&self) -> Result<(), StoreError> {
        check_flattened(&self.extra, PROFILE_FIELDS)
    }
}

/// Chat message stored in a room log.
///
/// `time` is the cursor `get_log` filters on; the rest is opaque.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Timestamp (ms) assigned by the host
    pub time: u64,
    /// Message body
    #[serde(flatten)]
    pub body: Map<String, Value>,
}

impl ChatMessage {
    /// Message with an empty body.
    pub fn new(time: u64) -> Self {
        Self { time, body: Map::new() }
    }

    /// Add a body field.
    ///
    /// A `time` body field is refused when the message is stored.
    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.body.insert(key.to_string(), value.into());
        self
    }

    pub(crate) fn check_fields(&self) -> Result<(), StoreError> {
        check_flattened(&self.body, MESSAGE_FIELDS)
    }
}
