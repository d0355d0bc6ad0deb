//! Restart integration tests
//!
//! State written through the JSON file backend must come back unchanged when a
//! new engine opens the same file, without any orderly shutdown in between.

use std::path::Path;
use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;

use mock_completion::app::build_app_state;
use mock_completion::bypass::{BypassSettings, BypassUpdate};
use mock_completion::config::ServerConfig;
use mock_completion::engine::{Engine, EngineConfig};
use mock_completion::notifications::{EventHub, HubEvent, Publisher};
use mock_completion::queue::{ClientKey, JsonFileBackend, QueueError};

async fn open_engine(path: &Path) -> Result<Engine, QueueError> {
    Engine::initialize(&EngineConfig::default(), Arc::new(JsonFileBackend::new(path))).await
}

#[tokio::test]
async fn test_reload_after_abrupt_restart() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("preset_queues.json");
    let alice = ClientKey::from("10.0.0.1");
    let bob = ClientKey::from("10.0.0.2");

    let before = {
        let engine = open_engine(&path).await.unwrap();
        engine
            .store()
            .enqueue_batch(&alice, vec![json!({"n": 1}), json!({"n": 2})], 200)
            .await
            .unwrap();
        engine.store().enqueue(&alice, json!({"n": 3}), 503).await.unwrap();
        engine.store().enqueue(&bob, json!({"only": "bob"}), 200).await.unwrap();
        engine.store().snapshot_all().await
        // Dropped here without shutdown
    };

    let engine = open_engine(&path).await.unwrap();
    assert_eq!(engine.store().snapshot_all().await, before);

    let third = engine.store().snapshot(&alice).await.pop().unwrap();
    assert_eq!(third.status_code, 503);
    assert_eq!(third.body, json!({"n": 3}));
}

#[tokio::test]
async fn test_consumed_responses_stay_consumed() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("queues.json");
    let key = ClientKey::from("10.0.0.5");

    {
        let engine = open_engine(&path).await.unwrap();
        engine
            .store()
            .enqueue_batch(&key, vec![json!({"id": "first"}), json!({"id": "second"})], 200)
            .await
            .unwrap();
        let served = engine.broker().resolve(key.clone(), json!({})).await.unwrap();
        assert_eq!(served.body["id"], "first");
    }

    let engine = open_engine(&path).await.unwrap();
    let remaining = engine.store().snapshot(&key).await;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].body["id"], "second");
}

#[tokio::test]
async fn test_cleared_state_survives_restart() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("queues.json");

    {
        let engine = open_engine(&path).await.unwrap();
        for i in 0..4 {
            let key = ClientKey::new(format!("10.1.0.{}", i));
            engine.store().enqueue(&key, json!({"i": i}), 200).await.unwrap();
        }
        assert_eq!(engine.store().clear_all().await.unwrap(), 4);
    }

    let engine = open_engine(&path).await.unwrap();
    let table = engine.store().snapshot_all().await;
    assert!(table.values().all(Vec::is_empty));
}

#[tokio::test]
async fn test_corrupt_data_file_fails_startup() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("queues.json");
    std::fs::write(&path, "{\"10.0.0.1\": [ {\"response\": ").unwrap();

    let result = open_engine(&path).await;
    assert!(matches!(result, Err(QueueError::PersistenceFailure { .. })));

    // The broken file is left for inspection
    assert!(path.exists());
}

#[tokio::test]
async fn test_bypass_settings_survive_restart() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bypass_config.json");

    {
        let publisher: Arc<dyn Publisher<HubEvent>> = Arc::new(EventHub::new());
        let settings = BypassSettings::load(&path, publisher).await;
        settings
            .update(BypassUpdate {
                target_host: Some("llm.internal".to_string()),
                target_port: Some(8443),
                api_key: Some("sk-test".to_string()),
                use_https: Some(true),
                ..BypassUpdate::default()
            })
            .await
            .unwrap();
        settings.enable().await.unwrap();
    }

    let publisher: Arc<dyn Publisher<HubEvent>> = Arc::new(EventHub::new());
    let settings = BypassSettings::load(&path, publisher).await;
    let config = settings.current().await;
    assert!(config.enabled);
    assert_eq!(config.target_host, "llm.internal");
    assert_eq!(config.target_url(), "https://llm.internal:8443/v1/chat/completions");
    assert_eq!(config.api_key.as_deref(), Some("sk-test"));
}

#[tokio::test]
async fn test_application_state_reloads_from_configured_files() {
    let dir = TempDir::new().unwrap();
    let server = ServerConfig {
        data_file: dir.path().join("preset_queues.json"),
        bypass_file: dir.path().join("bypass_config.json"),
        ..ServerConfig::default()
    };
    let key = ClientKey::from("127.0.0.1");

    {
        let state = build_app_state(&server).await.unwrap();
        state.engine.store().enqueue(&key, json!({"kept": true}), 200).await.unwrap();
        state.engine.shutdown();
    }

    let state = build_app_state(&server).await.unwrap();
    assert_eq!(state.engine.store().len(&key).await, 1);
    assert_eq!(state.engine.store().peek(&key).await.unwrap().body, json!({"kept": true}));
}
