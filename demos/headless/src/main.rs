//! Headless bridge demo.
//!
//! Run with: cargo run -p headless-demo
//!
//! Wires the bridge to an in-process application instance backed by a
//! file cache, an in-memory remote store and a scripted identity provider,
//! then plays a short session: cache, sign in, edit, navigate, sign out.
//! Set `NOTNOW_CACHE_PATH` to choose the cache file.

use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};

use anyhow::Context as _;
use futures::StreamExt;
use notnow_bridge::{Bridge, Collaborators, MemoryHistory, WindowSize, reference_ports};
use notnow_cache::storage::FileCache;
use notnow_core::{
    AppInstance, BridgeConfig, CollectionPath, ProviderUser, SessionState,
    protocol::{inbound, outbound},
};
use notnow_session::MemoryIdentityProvider;
use notnow_sync::MemoryRemoteStore;
use serde_json::json;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = BridgeConfig::from_env().context("reading NOTNOW_* settings")?;
    let cache_path = config
        .cache_path
        .clone()
        .unwrap_or_else(FileCache::default_path);
    tracing::info!(path = %cache_path.display(), "using file cache");

    let ports = Arc::new(reference_ports(&config));
    let app = AppInstance::new(Arc::clone(&ports));
    let provider = Arc::new(MemoryIdentityProvider::signed_out());
    let remote = Arc::new(MemoryRemoteStore::new());

    let mut bridge = Bridge::attach(
        &app,
        Collaborators {
            cache: FileCache::new(cache_path),
            remote: Arc::clone(&remote),
            provider: Arc::clone(&provider),
            navigator: Arc::new(MemoryHistory::default()),
        },
        config.clone(),
    )?;

    let flags = bridge.flags(SystemTime::now(), WindowSize::new(1280, 800)).await;
    tracing::info!(flags = %serde_json::to_string(&flags)?, "boot flags");

    // Stand-in for the application core's inbound subscriptions.
    for channel in inbound::ALL {
        if let Some(mut stream) = ports.inbound_stream(channel) {
            tokio::spawn(async move {
                while let Some(msg) = stream.next().await {
                    tracing::info!(channel, %msg, "app received");
                }
            });
        }
    }

    let grains = json!([
        {"id": "g1", "title": "Water the plants"},
        {"id": "g2", "title": "Call the bank"},
    ]);
    ports.emit(outbound::CACHE_GRAIN_LIST, grains.clone())?;

    provider.queue_sign_in(Ok(ProviderUser {
        uid: "demo-user".into(),
        display_name: Some("Demo User".into()),
        email: Some("demo@example.com".into()),
        ..ProviderUser::default()
    }));
    ports.emit(outbound::SIGN_IN, json!(null))?;
    bridge
        .session()
        .subscribe()
        .wait_for(|state| matches!(state, Some(SessionState::SignedIn(_))))
        .await
        .context("session manager stopped")?;

    ports.emit(outbound::PERSIST_SAVED_GRAIN_LIST, grains)?;
    ports.emit(
        outbound::PERSIST_SAVED_GRAIN_LIST,
        json!([
            {"id": "g1", "title": "Water the plants", "done": true},
            {"id": "g2", "title": "Call the bank"},
        ]),
    )?;
    ports.emit(outbound::PUSH_URL, json!("/grain/g1"))?;
    ports.emit(outbound::NAVIGATE_BACK, json!(null))?;
    bridge.key_down(json!({"key": "Escape"}))?;

    tokio::time::sleep(config.debounce() * 2).await;
    let path = CollectionPath::for_user("demo-user", &config.collection);
    tracing::info!(
        commits = remote.commit_count(),
        documents = remote.documents(&path).len(),
        "remote state"
    );

    ports.emit(outbound::SIGN_OUT, json!(null))?;
    tokio::time::sleep(Duration::from_millis(50)).await;
    while let Some(failure) = bridge.try_next_failure() {
        tracing::warn!(channel = %failure.channel, error = %failure.error, "handler failed");
    }

    bridge.shutdown();
    Ok(())
}
