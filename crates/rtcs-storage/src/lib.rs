//! rtcs storage.
//!
//! The storage layer of a real-time chat server, built on any
//! [`KeyValueStore`](rtcs_core::KeyValueStore).
//!
//! # Components
//!
//! - [`PersistentStore`]: sessions, user profiles (including guests), room
//!   metadata and bounded chat history
//! - [`EphemeralStore`]: socket presence, mirrored room membership and
//!   one-time tokens
//! - [`MemoryStore`]: in-process backend with Redis-style semantics
//! - [`ChaoticStore`]: fault-injecting wrapper for tests
//! - [`SystemEnv`]: production clock and entropy
//!
//! Both stores take the same validated [`StoreConfig`](rtcs_core::StoreConfig)
//! and share one backend handle.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod backend;
mod codec;
mod ephemeral;
mod persistent;
mod record;
mod system_env;

pub use backend::{ChaoticStore, MemoryStore, StoredValue};
pub use ephemeral::{EphemeralStore, RoomDeparture};
pub use persistent::PersistentStore;
pub use record::{ChatMessage, UserProfile};
pub use system_env::SystemEnv;
