//! Soak workload runs against the in-memory backend.

use std::sync::Arc;

use proptest::prelude::*;
use rtcs_core::StoreConfig;
use rtcs_harness::{
    InvariantRegistry, SimEnv, StoreSnapshot, WorkloadConfig, WorkloadStats, workload,
};
use rtcs_storage::{ChaoticStore, EphemeralStore, MemoryStore, PersistentStore};

fn soak(seed: u64, failure_rate: f64, rounds: usize) -> (WorkloadStats, StoreSnapshot) {
    let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();

    runtime.block_on(async {
        let env = SimEnv::with_seed(seed);
        let memory = MemoryStore::new(env.clone());
        let kv = ChaoticStore::with_seed(memory.clone(), failure_rate, seed);
        let config = Arc::new(StoreConfig { history_length: Some(5), ..StoreConfig::default() });

        let persistent =
            PersistentStore::new(kv.clone(), env.clone(), Arc::clone(&config)).unwrap();
        let ephemeral = EphemeralStore::new(kv, env, Arc::clone(&config)).unwrap();

        let workload = WorkloadConfig { seed, users: 6, rooms: 3, rounds };
        let stats = workload::run(&persistent, &ephemeral, &workload).await.unwrap();
        (stats, StoreSnapshot::capture(&memory, &config).unwrap())
    })
}

#[test]
fn fault_free_soak_holds_every_invariant() {
    let (stats, snapshot) = soak(7, 0.0, 1_000);

    assert_eq!(stats.guests, 6);
    assert_eq!(stats.failures, 0);
    assert_eq!(stats.token_mismatches, 0);
    assert_eq!(stats.double_releases, 0);
    assert!(stats.joins > 0 && stats.messages > 0 && stats.tokens > 0);

    InvariantRegistry::standard().assert_all(&snapshot, "after fault-free soak");
}

#[test]
fn same_seed_replays_the_same_run() {
    let (first, first_snapshot) = soak(99, 0.1, 300);
    let (second, second_snapshot) = soak(99, 0.1, 300);

    assert_eq!(first, second);
    assert_eq!(first_snapshot.user_rooms, second_snapshot.user_rooms);
    assert_eq!(first_snapshot.logs, second_snapshot.logs);
    assert_eq!(first_snapshot.users, second_snapshot.users);
}

#[test]
fn faults_are_counted_not_fatal() {
    let (stats, snapshot) = soak(3, 0.2, 500);

    assert!(stats.saw_faults());
    assert_eq!(stats.token_mismatches, 0);
    assert_eq!(stats.double_releases, 0);
    InvariantRegistry::fault_tolerant().assert_all(&snapshot, "after chaotic soak");
}

#[test]
fn empty_workload_does_nothing() {
    let (stats, snapshot) = soak(1, 0.0, 0);

    assert_eq!(stats.operations, 6);
    assert!(snapshot.user_rooms.is_empty());
    assert!(snapshot.logs.is_empty());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Property: any fault-free seed leaves a consistent store
    #[test]
    fn prop_fault_free_soak_is_consistent(seed in any::<u64>()) {
        let (stats, snapshot) = soak(seed, 0.0, 200);

        prop_assert_eq!(stats.failures, 0);
        prop_assert!(InvariantRegistry::standard().check_all(&snapshot).is_ok());
    }
}
