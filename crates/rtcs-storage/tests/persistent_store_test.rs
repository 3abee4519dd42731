//! Integration tests for PersistentStore over the in-memory backend.

use std::{sync::Arc, time::Duration};

use rtcs_core::{KeySpace, KeyValueStore, StoreConfig, StoreError};
use rtcs_harness::SimEnv;
use rtcs_storage::{ChatMessage, MemoryStore, PersistentStore, UserProfile};
use serde_json::json;

type Store = PersistentStore<MemoryStore<SimEnv>, SimEnv>;

fn store_with(config: StoreConfig) -> (Store, SimEnv) {
    let env = SimEnv::with_seed(42);
    let store = PersistentStore::new(MemoryStore::new(env.clone()), env.clone(), Arc::new(config))
        .expect("valid config");
    (store, env)
}

fn store() -> Store {
    store_with(StoreConfig::default()).0
}

fn texts(messages: &[ChatMessage]) -> Vec<String> {
    messages
        .iter()
        .map(|m| m.body.get("text").and_then(|t| t.as_str()).unwrap_or_default().to_string())
        .collect()
}

#[tokio::test]
async fn session_round_trip() {
    let store = store();

    assert_eq!(store.get_session("s1").await.unwrap(), None);
    store.set_session("s1", "42").await.unwrap();
    assert_eq!(store.get_session("s1").await.unwrap().as_deref(), Some("42"));

    assert!(store.remove_session("s1").await.unwrap());
    assert!(!store.remove_session("s1").await.unwrap());
    assert_eq!(store.get_session("s1").await.unwrap(), None);
}

#[tokio::test]
async fn sessions_live_under_the_prefixed_key() {
    let store = store();
    store.set_session("abc", "7").await.unwrap();

    assert_eq!(store.kv().get("rtcs.io:session:abc").await.unwrap().as_deref(), Some("7"));
}

#[tokio::test]
async fn user_round_trip() {
    let store = store();
    let mut profile = UserProfile::new("42");
    profile.public.insert("name".to_string(), json!("Ada"));
    profile.extra.insert("email".to_string(), json!("ada@example.com"));

    store.set_user("42", &profile).await.unwrap();
    assert_eq!(store.get_user("42").await.unwrap(), Some(profile));

    assert!(store.remove_user("42").await.unwrap());
    assert_eq!(store.get_user("42").await.unwrap(), None);
}

#[tokio::test]
async fn corrupt_user_is_an_error_not_absent() {
    let store = store();
    store.kv().set("rtcs.io:user:42", "{broken").await.unwrap();

    let err = store.get_user("42").await.unwrap_err();
    assert!(matches!(err, StoreError::CorruptRecord { ref key, .. } if key == "rtcs.io:user:42"));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn get_users_aligns_missing_ids() {
    let store = store();
    store.set_user("a", &UserProfile::new("a")).await.unwrap();
    store.set_user("c", &UserProfile::new("c")).await.unwrap();

    let users = store.get_users(&["a", "b", "c"]).await.unwrap();

    assert_eq!(users.len(), 3);
    assert_eq!(users["a"], Some(UserProfile::new("a")));
    assert_eq!(users["b"], None);
    assert_eq!(users["c"], Some(UserProfile::new("c")));
}

#[tokio::test]
async fn one_corrupt_profile_fails_the_batch() {
    let store = store();
    store.set_user("a", &UserProfile::new("a")).await.unwrap();
    store.kv().set("rtcs.io:user:b", "{broken").await.unwrap();

    let err = store.get_users(&["a", "b", "c"]).await.unwrap_err();
    assert!(matches!(err, StoreError::CorruptRecord { ref key, .. } if key == "rtcs.io:user:b"));
}

#[tokio::test]
async fn profile_extra_may_not_shadow_typed_fields() {
    let store = store();
    let mut profile = UserProfile::new("42");
    profile.extra.insert("id".to_string(), json!("43"));

    let err = store.set_user("42", &profile).await.unwrap_err();
    assert!(matches!(err, StoreError::Encode { .. }));
    assert_eq!(store.kv().get("rtcs.io:user:42").await.unwrap(), None);
}

#[tokio::test]
async fn get_users_with_no_ids_is_empty() {
    let store = store();
    let none: [&str; 0] = [];

    assert!(store.get_users(&none).await.unwrap().is_empty());
}

#[tokio::test]
async fn unnamed_guests_take_the_counter() {
    let store = store();

    let first = store.get_guest(None).await.unwrap();
    let second = store.get_guest(Some("   ")).await.unwrap();

    assert!(first.is_guest());
    assert_eq!(first.display_name(), Some("Guest 1"));
    assert_eq!(second.display_name(), Some("Guest 2"));
    assert_ne!(first.id, second.id);
    assert_eq!(store.kv().get("rtcs.io:guestNum").await.unwrap().as_deref(), Some("2"));
}

#[tokio::test]
async fn named_guest_is_trimmed_and_stored() {
    let (store, _) = store_with(StoreConfig {
        guest_name: "Visitor ".to_string(),
        guest_rooms: vec!["lobby".to_string()],
        ..StoreConfig::default()
    });

    let guest = store.get_guest(Some("  Ada ")).await.unwrap();

    assert_eq!(guest.display_name(), Some("Visitor Ada"));
    assert_eq!(guest.rooms, vec!["lobby".to_string()]);
    assert_eq!(store.get_user(&guest.id).await.unwrap(), Some(guest));
    assert_eq!(store.kv().get("rtcs.io:guestNum").await.unwrap(), None);
}

#[tokio::test]
async fn guest_record_shape() {
    let (store, _) = store_with(StoreConfig {
        guest_rooms: vec!["lobby".to_string()],
        ..StoreConfig::default()
    });
    let guest = store.get_guest(Some("Ada")).await.unwrap();

    let raw = store.kv().get(&store.keys().user(&guest.id)).await.unwrap().unwrap();
    let stored: serde_json::Value = serde_json::from_str(&raw).unwrap();

    insta::assert_json_snapshot!("guest_record", stored, { ".id" => "[guest id]" });
}

#[test]
fn default_key_layout() {
    let keys = KeySpace::new(&StoreConfig::default());

    insta::assert_json_snapshot!("key_layout", json!({
        "guest_counter": keys.guest_counter(),
        "log": keys.log("room-1"),
        "room": keys.room("room-1"),
        "room_users": keys.room_users("room-1"),
        "session": keys.session("sess-1"),
        "token": keys.token("tok-1"),
        "user": keys.user("guest:abc"),
        "user_rooms": keys.user_rooms("user-1"),
        "user_sockets": keys.user_sockets("user-1"),
    }));
}

#[tokio::test]
async fn remove_guest_ignores_registered_users() {
    let store = store();
    store.set_user("42", &UserProfile::new("42")).await.unwrap();
    let guest = store.get_guest(None).await.unwrap();

    assert!(!store.remove_guest("42").await.unwrap());
    assert!(store.get_user("42").await.unwrap().is_some());

    assert!(store.remove_guest(&guest.id).await.unwrap());
    assert_eq!(store.get_user(&guest.id).await.unwrap(), None);
    assert!(!store.remove_guest(&guest.id).await.unwrap());
}

#[tokio::test]
async fn room_round_trip_and_removal() {
    let store = store();
    let room = json!({"name": "general", "topic": "anything"});

    store.set_room("general", &room).await.unwrap();
    store.add_log("general", &ChatMessage::new(1).with("text", "hi")).await.unwrap();
    assert_eq!(store.get_room::<serde_json::Value>("general").await.unwrap(), Some(room));

    assert!(store.remove_room("general").await.unwrap());
    assert_eq!(store.get_room::<serde_json::Value>("general").await.unwrap(), None);
    assert!(store.get_log("general", None).await.unwrap().is_empty());

    assert!(!store.remove_room("general").await.unwrap());
}

#[tokio::test]
async fn history_keeps_the_last_messages() {
    let (store, _) = store_with(StoreConfig { history_length: Some(3), ..StoreConfig::default() });

    for i in 1..=5 {
        store.add_log("r", &ChatMessage::new(i).with("text", format!("m{i}"))).await.unwrap();
    }

    let log = store.get_log("r", None).await.unwrap();
    assert_eq!(texts(&log), vec!["m3", "m4", "m5"]);
}

#[tokio::test]
async fn history_of_one_keeps_only_the_latest() {
    let (store, _) = store_with(StoreConfig { history_length: Some(1), ..StoreConfig::default() });

    for i in 1..=3 {
        store.add_log("r", &ChatMessage::new(i).with("text", format!("m{i}"))).await.unwrap();
    }

    assert_eq!(texts(&store.get_log("r", None).await.unwrap()), vec!["m3"]);
}

#[tokio::test]
async fn unbounded_history_keeps_everything() {
    let store = store();

    for i in 1..=50 {
        store.add_log("r", &ChatMessage::new(i)).await.unwrap();
    }

    assert_eq!(store.get_log("r", None).await.unwrap().len(), 50);
}

#[tokio::test]
async fn cursor_filters_on_message_time() {
    let store = store();
    for (time, text) in [(10, "a"), (20, "b"), (30, "c")] {
        store.add_log("r", &ChatMessage::new(time).with("text", text)).await.unwrap();
    }

    assert_eq!(texts(&store.get_log("r", Some(20)).await.unwrap()), vec!["c"]);
    assert_eq!(texts(&store.get_log("r", Some(0)).await.unwrap()), vec!["a", "b", "c"]);
    assert!(store.get_log("r", Some(30)).await.unwrap().is_empty());
}

#[tokio::test]
async fn zero_cursor_returns_everything() {
    let store = store();
    for (time, text) in [(0, "a"), (1, "b")] {
        store.add_log("r", &ChatMessage::new(time).with("text", text)).await.unwrap();
    }

    assert_eq!(texts(&store.get_log("r", Some(0)).await.unwrap()), vec!["a", "b"]);
    assert_eq!(texts(&store.get_log("r", Some(1)).await.unwrap()), Vec::<String>::new());
    assert_eq!(
        texts(&store.get_log("r", Some(0)).await.unwrap()),
        texts(&store.get_log("r", None).await.unwrap())
    );
}

#[tokio::test]
async fn message_body_may_not_shadow_time() {
    let store = store();
    store.add_log("r", &ChatMessage::new(1).with("text", "ok")).await.unwrap();

    let err = store.add_log("r", &ChatMessage::new(2).with("time", 99)).await.unwrap_err();
    assert!(matches!(err, StoreError::Encode { .. }));

    // The refused write never reached the log
    assert_eq!(texts(&store.get_log("r", None).await.unwrap()), vec!["ok"]);
}

#[tokio::test]
async fn history_expires_on_the_virtual_clock() {
    let (store, env) =
        store_with(StoreConfig { history_expire_ms: Some(1_000), ..StoreConfig::default() });

    store.add_log("r", &ChatMessage::new(1)).await.unwrap();
    env.advance(Duration::from_millis(900));

    // Each append refreshes the lifetime
    store.add_log("r", &ChatMessage::new(2)).await.unwrap();
    env.advance(Duration::from_millis(900));
    assert_eq!(store.get_log("r", None).await.unwrap().len(), 2);

    env.advance(Duration::from_millis(200));
    assert!(store.get_log("r", None).await.unwrap().is_empty());
}

#[tokio::test]
async fn corrupt_log_entry_fails_the_read() {
    let store = store();
    store.add_log("r", &ChatMessage::new(1)).await.unwrap();
    store.kv().list_append("rtcs.io:log:r", "not json").await.unwrap();

    assert!(matches!(store.get_log("r", None).await, Err(StoreError::CorruptRecord { .. })));
}

#[tokio::test]
async fn invalid_config_is_rejected() {
    let env = SimEnv::with_seed(1);
    let config = Arc::new(StoreConfig { token_expire_ms: 0, ..StoreConfig::default() });

    assert!(PersistentStore::new(MemoryStore::new(env.clone()), env, config).is_err());
}
