//! Integration tests for EphemeralStore over the in-memory backend.

use std::{sync::Arc, time::Duration};

use rtcs_core::{KeyValueStore, StoreConfig, StoreError};
use rtcs_harness::SimEnv;
use rtcs_storage::{ChaoticStore, EphemeralStore, MemoryStore, RoomDeparture};
use serde::{Deserialize, Serialize};

type Store = EphemeralStore<MemoryStore<SimEnv>, SimEnv>;

fn store_with(config: StoreConfig) -> (Store, SimEnv) {
    let env = SimEnv::with_seed(7);
    let store = EphemeralStore::new(MemoryStore::new(env.clone()), env.clone(), Arc::new(config))
        .expect("valid config");
    (store, env)
}

fn store() -> Store {
    store_with(StoreConfig::default()).0
}

fn sorted(mut items: Vec<String>) -> Vec<String> {
    items.sort();
    items
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Invite {
    room: String,
    from: String,
}

#[tokio::test]
async fn sockets_track_presence() {
    let store = store();

    assert!(store.add_socket("s1", "u").await.unwrap());
    assert!(store.add_socket("s2", "u").await.unwrap());
    assert!(!store.add_socket("s2", "u").await.unwrap());
    assert_eq!(sorted(store.get_sockets("u").await.unwrap()), vec!["s1", "s2"]);

    assert!(store.remove_socket("s1", "u").await.unwrap(), "s2 is still connected");
    assert!(!store.remove_socket("s2", "u").await.unwrap(), "last socket gone");
    assert!(store.get_sockets("u").await.unwrap().is_empty());
}

#[tokio::test]
async fn removing_unknown_socket_reports_remaining() {
    let store = store();
    store.add_socket("s1", "u").await.unwrap();

    assert!(store.remove_socket("nope", "u").await.unwrap());
    assert!(!store.remove_socket("nope", "other").await.unwrap());
}

#[tokio::test]
async fn add_reports_existing_membership() {
    let store = store();

    assert!(!store.add_user_to_room("u", "r").await.unwrap());
    assert!(store.add_user_to_room("u", "r").await.unwrap());
}

#[tokio::test]
async fn membership_is_symmetric() {
    let store = store();
    store.add_user_to_room("u1", "r1").await.unwrap();
    store.add_user_to_room("u1", "r2").await.unwrap();
    store.add_user_to_room("u2", "r1").await.unwrap();

    assert_eq!(sorted(store.get_user_rooms("u1").await.unwrap()), vec!["r1", "r2"]);
    assert_eq!(sorted(store.get_room_users("r1").await.unwrap()), vec!["u1", "u2"]);
    assert_eq!(store.get_room_users("r2").await.unwrap(), vec!["u1"]);

    assert_eq!(
        store.remove_user_from_room("u1", "r1").await.unwrap(),
        RoomDeparture { already_absent: false, room_has_members: true }
    );
    assert_eq!(store.get_user_rooms("u1").await.unwrap(), vec!["r2"]);
    assert_eq!(store.get_room_users("r1").await.unwrap(), vec!["u2"]);
}

#[tokio::test]
async fn last_member_leaving_empties_the_room() {
    let store = store();
    store.add_user_to_room("u", "r").await.unwrap();

    assert_eq!(
        store.remove_user_from_room("u", "r").await.unwrap(),
        RoomDeparture { already_absent: false, room_has_members: false }
    );
    assert!(store.get_room_users("r").await.unwrap().is_empty());
    assert!(store.get_user_rooms("u").await.unwrap().is_empty());
}

#[tokio::test]
async fn leaving_twice_reports_already_absent() {
    let store = store();
    store.add_user_to_room("u", "r").await.unwrap();
    store.add_user_to_room("v", "r").await.unwrap();
    store.remove_user_from_room("u", "r").await.unwrap();

    assert_eq!(
        store.remove_user_from_room("u", "r").await.unwrap(),
        RoomDeparture { already_absent: true, room_has_members: true }
    );
}

#[tokio::test]
async fn token_is_released_once() {
    let store = store();
    let invite = Invite { room: "r".to_string(), from: "u".to_string() };

    let token = store.create_token(&invite).await.unwrap();
    assert_eq!(token.len(), 20);

    assert_eq!(store.release_token::<Invite>(&token).await.unwrap(), Some(invite));
    assert_eq!(store.release_token::<Invite>(&token).await.unwrap(), None);
}

#[tokio::test]
async fn failed_delete_withholds_the_payload() {
    let env = SimEnv::with_seed(7);
    let memory = MemoryStore::new(env.clone());
    let kv = ChaoticStore::new(memory.clone(), 1.0).only_verbs(&["delete"]);
    let store = EphemeralStore::new(kv, env, Arc::new(StoreConfig::default())).unwrap();

    let token = store.create_token(&"secret").await.unwrap();

    let first = store.release_token::<String>(&token).await;
    let second = store.release_token::<String>(&token).await;
    assert!(matches!(first, Err(StoreError::BackendUnavailable(_))));
    assert!(matches!(second, Err(StoreError::BackendUnavailable(_))));

    // Still live, so a healthy backend hands it out exactly once
    let config = Arc::new(StoreConfig::default());
    let healthy = EphemeralStore::new(memory, SimEnv::with_seed(7), config).unwrap();
    assert_eq!(healthy.release_token::<String>(&token).await.unwrap().as_deref(), Some("secret"));
    assert_eq!(healthy.release_token::<String>(&token).await.unwrap(), None);
}

#[tokio::test]
async fn unknown_token_releases_nothing() {
    let store = store();
    assert_eq!(store.release_token::<Invite>("never-issued").await.unwrap(), None);
}

#[tokio::test]
async fn tokens_are_distinct() {
    let store = store();

    let a = store.create_token(&1).await.unwrap();
    let b = store.create_token(&1).await.unwrap();
    assert_ne!(a, b);
}

#[tokio::test]
async fn token_expires_on_the_virtual_clock() {
    let (store, env) = store_with(StoreConfig { token_expire_ms: 5_000, ..StoreConfig::default() });

    let token = store.create_token(&"payload").await.unwrap();
    let key = store.keys().token(&token);
    assert_eq!(store.kv().ttl(&key).unwrap(), Some(Duration::from_secs(5)));

    env.advance(Duration::from_secs(5));
    assert_eq!(store.release_token::<String>(&token).await.unwrap(), None);
}

#[tokio::test]
async fn token_within_lifetime_is_released() {
    let (store, env) = store_with(StoreConfig { token_expire_ms: 5_000, ..StoreConfig::default() });

    let token = store.create_token(&"payload").await.unwrap();
    env.advance(Duration::from_millis(4_999));

    assert_eq!(store.release_token::<String>(&token).await.unwrap().as_deref(), Some("payload"));
}

#[tokio::test]
async fn corrupt_token_is_consumed_and_reported() {
    let store = store();
    store.kv().set("rtcs.io:token:bad", "{oops").await.unwrap();

    assert!(matches!(
        store.release_token::<Invite>("bad").await,
        Err(StoreError::CorruptRecord { .. })
    ));
    assert_eq!(store.kv().get("rtcs.io:token:bad").await.unwrap(), None);
}

#[tokio::test]
async fn token_of_wrong_shape_is_corrupt() {
    let store = store();
    let token = store.create_token(&42).await.unwrap();

    assert!(matches!(
        store.release_token::<Invite>(&token).await,
        Err(StoreError::CorruptRecord { .. })
    ));
}
