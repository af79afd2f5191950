//! End-to-end scenarios over a fully wired bridge with in-memory collaborators.

use std::{sync::Arc, time::Duration};

use notnow_bridge::{
    Bridge, BridgeError, Collaborators, MemoryHistory, Navigator, WindowSize, reference_ports,
};
use notnow_cache::storage::MemoryCache;
use notnow_core::{
    AppInstance, BridgeConfig, ChangeType, CollectionPath, DocumentChange, PortError, Ports,
    ProviderUser, SessionState,
    protocol::{inbound, outbound},
    traits::{AuthError, RemoteError},
};
use notnow_router::RouterError;
use notnow_session::MemoryIdentityProvider;
use notnow_sync::MemoryRemoteStore;
use serde_json::{Value, json};
use tokio_test::{assert_err, assert_ok};

type TestBridge = Bridge<MemoryCache, MemoryRemoteStore, MemoryIdentityProvider>;

struct Harness {
    ports: Arc<Ports>,
    provider: Arc<MemoryIdentityProvider>,
    remote: Arc<MemoryRemoteStore>,
    history: Arc<MemoryHistory>,
    bridge: TestBridge,
}

impl Harness {
    fn new(provider: MemoryIdentityProvider) -> Self {
        let config = BridgeConfig::default();
        Self::with_ports(provider, reference_ports(&config), config)
    }

    fn with_ports(provider: MemoryIdentityProvider, ports: Ports, config: BridgeConfig) -> Self {
        let ports = Arc::new(ports);
        let provider = Arc::new(provider);
        let remote = Arc::new(MemoryRemoteStore::new());
        let history = Arc::new(MemoryHistory::default());
        let bridge = Bridge::attach(
            &AppInstance::new(Arc::clone(&ports)),
            Collaborators {
                cache: MemoryCache::new(),
                remote: Arc::clone(&remote),
                provider: Arc::clone(&provider),
                navigator: Arc::clone(&history) as Arc<dyn Navigator>,
            },
            config,
        )
        .unwrap();
        Self {
            ports,
            provider,
            remote,
            history,
            bridge,
        }
    }

    fn emit(&self, channel: &str, payload: Value) {
        assert_ok!(self.ports.emit(channel, payload));
    }

    fn fire_messages(&self) -> Vec<Value> {
        self.ports.inbound_history(inbound::FIRE_2_ELM)
    }

    /// Ids of every forwarded change, in delivery order.
    fn forwarded_ids(&self) -> Vec<String> {
        self.fire_messages()
            .iter()
            .filter(|m| m["msg"] == "GrainChanges")
            .flat_map(|m| m["payload"]["changes"].as_array().cloned().unwrap_or_default())
            .map(|c| c["document"]["id"].as_str().unwrap_or_default().to_string())
            .collect()
    }
}

fn user(uid: &str) -> ProviderUser {
    ProviderUser {
        uid: uid.into(),
        display_name: Some(format!("User {uid}")),
        email: Some(format!("{uid}@example.com")),
        ..ProviderUser::default()
    }
}

fn grains(uid: &str) -> CollectionPath {
    CollectionPath::for_user(uid, "grains")
}

fn change(kind: ChangeType, id: &str) -> DocumentChange {
    DocumentChange {
        kind,
        id: id.into(),
        data: serde_json::Map::new(),
    }
}

async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn test_cache_round_trip_through_channel() {
    let h = Harness::new(MemoryIdentityProvider::signed_out());
    assert_eq!(h.bridge.cache().get("grains", json!([])).await, json!([]));

    h.emit(outbound::CACHE_GRAIN_LIST, json!([{"id": "a"}]));
    settle().await;
    assert_eq!(
        h.bridge.cache().get("grains", json!([])).await,
        json!([{"id": "a"}])
    );

    let nested = json!({"a": [1, 2.5, null, {"b": "c"}], "d": true});
    h.emit(outbound::SET_GRAIN_CACHE, nested.clone());
    settle().await;
    assert_eq!(h.bridge.cache().get("grainCache", Value::Null).await, nested);
    assert_eq!(h.bridge.cache().get("untouched", json!("dflt")).await, json!("dflt"));
}

#[tokio::test]
async fn test_flags_read_cached_grains() {
    let h = Harness::new(MemoryIdentityProvider::signed_out());
    h.emit(outbound::CACHE_GRAIN_LIST, json!([{"id": "a"}]));
    settle().await;

    let size = WindowSize::new(800, 600);
    let flags = h.bridge.flags(std::time::SystemTime::now(), size).await;
    assert_eq!(flags.grains, r#"[{"id":"a"}]"#);
    assert_eq!(flags.labels, "[]");
    assert_eq!(flags.window_size, size);
}

#[tokio::test]
async fn test_unhandled_channel_is_reported_not_fatal() {
    let config = BridgeConfig::default();
    let ports = Ports::new(
        outbound::ALL.into_iter().chain(["focusId"]),
        inbound::ALL,
    );
    let h = Harness::with_ports(MemoryIdentityProvider::signed_out(), ports, config);

    let err = assert_err!(h.ports.emit("focusId", json!("title")));
    assert!(matches!(err, PortError::NoSubscriber(_)));
    let err = assert_err!(h.ports.emit("warn", json!("x")));
    assert!(matches!(err, PortError::UnknownOutbound(_)));

    // Other channels keep working.
    h.emit(outbound::CACHE_GRAIN_LIST, json!([]));
    settle().await;
    assert_eq!(h.bridge.cache().get("grains", json!(null)).await, json!([]));
}

#[tokio::test]
async fn test_missing_channels_are_skipped() {
    let ports = Ports::new([outbound::ERROR, outbound::PUSH_URL], inbound::ALL);
    let h = Harness::with_ports(
        MemoryIdentityProvider::signed_out(),
        ports,
        BridgeConfig::default(),
    );

    assert_eq!(h.bridge.router().bound(), [outbound::ERROR, outbound::PUSH_URL]);
    assert_eq!(h.bridge.router().skipped().len(), outbound::ALL.len() - 2);
}

#[tokio::test]
async fn test_host_without_ports_is_rejected() {
    let result: Result<TestBridge, _> = Bridge::attach(
        &AppInstance::without_ports(),
        Collaborators {
            cache: MemoryCache::new(),
            remote: Arc::new(MemoryRemoteStore::new()),
            provider: Arc::new(MemoryIdentityProvider::signed_out()),
            navigator: Arc::new(MemoryHistory::default()),
        },
        BridgeConfig::default(),
    );
    assert!(matches!(result, Err(BridgeError::Router(RouterError::NoPorts))));
}

#[tokio::test(start_paused = true)]
async fn test_persist_while_signed_out_never_commits() {
    let mut h = Harness::new(MemoryIdentityProvider::signed_out());
    settle().await;

    h.emit(outbound::PERSIST_SAVED_GRAIN_LIST, json!([{"id": "x"}]));
    settle().await;
    let failure = h.bridge.try_next_failure().unwrap();
    assert_eq!(failure.channel, outbound::PERSIST_SAVED_GRAIN_LIST);
    assert!(failure.error.contains("Not signed in"));

    // Signing in before the window would have elapsed does not revive it.
    h.provider.push(Some(user("a")));
    settle().await;
    tokio::time::advance(Duration::from_millis(2000)).await;
    settle().await;
    assert_eq!(h.remote.commit_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_two_persists_in_window_commit_last_snapshot_once() {
    let h = Harness::new(MemoryIdentityProvider::signed_in(user("a")));
    settle().await;

    let s1 = json!([{"id": "g1", "title": "draft"}]);
    let s2 = json!([{"id": "g1", "title": "final"}, {"id": "g2"}]);
    h.emit(outbound::PERSIST_SAVED_GRAIN_LIST, s1);
    settle().await;
    tokio::time::advance(Duration::from_millis(200)).await;
    h.emit(outbound::PERSIST_SAVED_GRAIN_LIST, s2.clone());
    settle().await;

    tokio::time::advance(Duration::from_millis(999)).await;
    settle().await;
    assert_eq!(h.remote.commit_count(), 0);

    tokio::time::advance(Duration::from_millis(1)).await;
    settle().await;
    let commits = h.remote.commits();
    assert_eq!(commits.len(), 1);
    assert_eq!(commits[0].path, grains("a"));
    assert_eq!(serde_json::to_value(&commits[0].documents).unwrap(), s2);
}

#[tokio::test(start_paused = true)]
async fn test_failed_batch_commit_is_observable() {
    let mut h = Harness::new(MemoryIdentityProvider::signed_in(user("a")));
    settle().await;
    h.remote.fail_next_commit(RemoteError::PermissionDenied("rules".into()));

    h.emit(outbound::PERSIST_SAVED_GRAIN_LIST, json!([{"id": "x"}]));
    settle().await;
    assert!(h.bridge.try_next_failure().is_none());

    tokio::time::advance(Duration::from_millis(1000)).await;
    settle().await;
    assert_eq!(h.remote.commit_count(), 1);
    let failure = h.bridge.try_next_failure().unwrap();
    assert_eq!(failure.channel, outbound::PERSIST_SAVED_GRAIN_LIST);
    assert!(failure.error.starts_with("Batch commit failed"));
    assert!(failure.error.contains("rules"));
    assert!(h.bridge.try_next_failure().is_none());

    // The channel keeps accepting snapshots after a failed commit.
    h.emit(outbound::PERSIST_SAVED_GRAIN_LIST, json!([{"id": "y"}]));
    settle().await;
    tokio::time::advance(Duration::from_millis(1000)).await;
    settle().await;
    assert_eq!(h.remote.commit_count(), 2);
    assert!(h.bridge.try_next_failure().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_write_discarded_by_sign_out_is_not_a_failure() {
    let mut h = Harness::new(MemoryIdentityProvider::signed_in(user("a")));
    settle().await;

    h.emit(outbound::PERSIST_SAVED_GRAIN_LIST, json!([{"id": "x"}]));
    settle().await;
    h.emit(outbound::SIGN_OUT, Value::Null);
    settle().await;
    tokio::time::advance(Duration::from_millis(2000)).await;
    settle().await;

    assert_eq!(h.remote.commit_count(), 0);
    assert!(h.bridge.try_next_failure().is_none());
}

#[tokio::test]
async fn test_change_batch_arrives_as_one_message() {
    let h = Harness::new(MemoryIdentityProvider::signed_in(user("a")));
    settle().await;

    h.remote.inject(
        &grains("a"),
        vec![change(ChangeType::Added, "1"), change(ChangeType::Modified, "1")],
    );
    settle().await;

    let batches: Vec<Value> = h
        .fire_messages()
        .into_iter()
        .filter(|m| m["msg"] == "GrainChanges")
        .collect();
    assert_eq!(
        batches,
        vec![json!({
            "msg": "GrainChanges",
            "payload": {"changes": [
                {"type": "added", "document": {"id": "1"}},
                {"type": "modified", "document": {"id": "1"}},
            ]}
        })]
    );
}

#[tokio::test]
async fn test_no_changes_from_previous_identity_after_switch() {
    let h = Harness::new(MemoryIdentityProvider::signed_in(user("a")));
    settle().await;

    h.remote.inject(&grains("a"), vec![change(ChangeType::Added, "stale")]);
    assert_ok!(h.bridge.session().sign_out().await);
    h.provider.queue_sign_in(Ok(user("b")));
    assert_ok!(h.bridge.session().sign_in().await);

    h.remote.inject(&grains("a"), vec![change(ChangeType::Added, "stale-2")]);
    h.remote.inject(&grains("b"), vec![change(ChangeType::Added, "fresh")]);
    settle().await;

    assert_eq!(h.forwarded_ids(), ["fresh"]);
    assert_eq!(h.remote.subscriber_count(&grains("a")), 0);
}

#[tokio::test]
async fn test_session_transitions_are_announced() {
    let h = Harness::new(MemoryIdentityProvider::signed_out());
    settle().await;
    h.provider.queue_sign_in(Ok(user("a")));
    h.emit(outbound::SIGN_IN, Value::Null);
    settle().await;
    h.emit(outbound::SIGN_OUT, Value::Null);
    settle().await;

    assert_eq!(
        h.fire_messages(),
        vec![
            json!({"msg": "UserNotLoggedIn", "payload": {}}),
            json!({"msg": "UserLoggedIn", "payload": {"user": {
                "displayName": "User a",
                "uid": "a",
                "email": "a@example.com",
            }}}),
            json!({"msg": "UserNotLoggedIn", "payload": {}}),
        ]
    );
}

#[tokio::test]
async fn test_failed_sign_in_is_observable() {
    let mut h = Harness::new(MemoryIdentityProvider::signed_out());
    settle().await;
    h.provider.queue_sign_in(Err(AuthError::Rejected("popup blocked".into())));

    h.emit(outbound::SIGN_IN, Value::Null);
    settle().await;

    let failure = h.bridge.try_next_failure().unwrap();
    assert_eq!(failure.channel, outbound::SIGN_IN);
    assert!(failure.error.contains("popup blocked"));
    assert_eq!(h.bridge.session().state(), Some(SessionState::SignedOut));
}

#[tokio::test]
async fn test_navigation_reports_url_changes() {
    let mut h = Harness::new(MemoryIdentityProvider::signed_out());

    // Channels are independent, so each step settles before the next.
    h.emit(outbound::PUSH_URL, json!("/grain/1"));
    settle().await;
    h.emit(outbound::REPLACE_STATE, json!("/grain/1?edit"));
    settle().await;
    assert_eq!(h.history.current(), "/grain/1?edit");

    h.emit(outbound::NAVIGATE_BACK, Value::Null);
    settle().await;
    h.emit(outbound::NAVIGATE_BACK, Value::Null);
    settle().await;
    h.emit(outbound::PUSH_URL, json!(42));
    settle().await;

    assert_eq!(
        h.ports.inbound_history(inbound::URL_CHANGED),
        vec![json!({"href": "/grain/1"}), json!({"href": "/"})]
    );
    assert_eq!(h.history.current(), "/");

    let failure = h.bridge.try_next_failure().unwrap();
    assert_eq!(failure.channel, outbound::PUSH_URL);
    assert!(failure.error.starts_with("Invalid payload"));
    assert!(h.bridge.try_next_failure().is_none());
}

#[tokio::test]
async fn test_replace_state_accepts_url_objects() {
    let mut h = Harness::new(MemoryIdentityProvider::signed_out());

    h.emit(outbound::REPLACE_STATE, json!({"url": "/grain/2"}));
    settle().await;
    assert_eq!(h.history.current(), "/grain/2");

    h.emit(outbound::REPLACE_STATE, json!({"href": "/grain/3", "scroll": 40}));
    settle().await;
    assert_eq!(h.history.current(), "/grain/3");

    h.emit(outbound::PUSH_URL, json!({"url": "/grain/4"}));
    settle().await;
    assert_eq!(h.history.current(), "/grain/4");
    assert_eq!(
        h.ports.inbound_history(inbound::URL_CHANGED),
        vec![json!({"href": "/grain/4"})]
    );

    h.emit(outbound::REPLACE_STATE, json!({"title": "no url"}));
    settle().await;
    assert_eq!(h.history.current(), "/grain/4");
    let failure = h.bridge.try_next_failure().unwrap();
    assert_eq!(failure.channel, outbound::REPLACE_STATE);
    assert!(failure.error.starts_with("Invalid payload"));
}

#[tokio::test]
async fn test_key_down_is_forwarded() {
    let h = Harness::new(MemoryIdentityProvider::signed_out());
    assert_ok!(h.bridge.key_down(json!({"key": "Escape"})));
    assert_eq!(
        h.ports.inbound_history(inbound::KEY_DOWN_ON_BODY),
        vec![json!({"key": "Escape"})]
    );
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_drops_pending_write() {
    let mut h = Harness::new(MemoryIdentityProvider::signed_in(user("a")));
    settle().await;
    h.emit(outbound::PERSIST_SAVED_GRAIN_LIST, json!([{"id": "x"}]));
    settle().await;

    h.bridge.shutdown();
    tokio::time::advance(Duration::from_millis(2000)).await;
    settle().await;

    assert_eq!(h.remote.commit_count(), 0);
    assert!(h.ports.emit(outbound::CACHE_GRAIN_LIST, json!([])).is_err());
}
