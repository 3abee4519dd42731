//! Deterministic simulation harness for rtcs storage.
//!
//! [`SimEnv`] replaces the clock and entropy of the stores with a virtual
//! clock, a seeded RNG and scriptable identifiers. Together with a
//! [`MemoryStore`](rtcs_storage::MemoryStore), optionally wrapped in a
//! [`ChaoticStore`](rtcs_storage::ChaoticStore), every run is reproducible
//! from its seed.
//!
//! # Invariant Testing
//!
//! The `invariants` module checks properties of the stored data (membership
//! symmetry, bounded history, token expiry, guest records) against a
//! [`StoreSnapshot`]. Use [`InvariantRegistry::standard()`] after fault-free
//! runs and [`InvariantRegistry::fault_tolerant()`] under fault injection.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod invariants;
pub mod sim_env;
pub mod workload;

pub use invariants::{
    GuestProfilesWellFormed, HistoryBound, Invariant, InvariantRegistry, InvariantResult,
    MembershipSymmetry, StoreSnapshot, TokensExpire, Violation,
};
pub use sim_env::{SimEnv, SimInstant};
pub use workload::{WorkloadConfig, WorkloadStats};
