//! In-process [`KeyValueStore`](rtcs_core::KeyValueStore) implementations.
//!
//! Production deployments bring their own client for an external store. These
//! two cover tests, simulation and single-process use.

mod chaotic;
mod memory;

pub use chaotic::ChaoticStore;
pub use memory::{MemoryStore, StoredValue};
