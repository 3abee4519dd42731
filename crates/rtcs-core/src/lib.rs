//! Coordination primitives for rtcs storage.
//!
//! The stores in `rtcs-storage` turn primitive key-value verbs into
//! multi-step operations. This crate holds the pieces they are built from,
//! with no store implementation of its own.
//!
//! # Components
//!
//! - [`KeyValueStore`]: the verb set consumed from the external store
//! - [`FanOut`] / [`join2`]: concurrent branches joined into one result
//! - [`UniqueAllocator`]: set-if-absent retry loop for unique keys
//! - [`StoreConfig`] / [`KeySpace`]: immutable configuration and key layout
//! - [`Environment`]: time and randomness, swappable for simulation
//!
//! # Consistency
//!
//! There are no transactions. Multi-key invariants (membership symmetry,
//! guest uniqueness, single-use tokens) hold only through compare-and-swap
//! and sequencing, and a partially failed fan-out is reported, never
//! compensated.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod alloc;
pub mod config;
pub mod env;
pub mod error;
pub mod join;
pub mod kv;

pub use alloc::{Candidate, UniqueAllocator};
pub use config::{GUEST_ID_PREFIX, KeyPrefixes, KeySpace, StoreConfig};
pub use env::Environment;
pub use error::{ConfigError, StoreError};
pub use join::{FanOut, join2};
pub use kv::{KeyValueStore, KvError};
