//! Resolution engine integration tests
//!
//! Exercise the store, broker and hub together through `Engine`, including
//! the concurrency guarantees callers rely on.

use std::collections::HashSet;
use std::time::Duration;

use serde_json::json;

use mock_completion::broker::{BrokerError, PendingState, ResolutionSource};
use mock_completion::engine::{Engine, EngineConfig};
use mock_completion::notifications::{EventFilter, HubEvent, NotificationEvent};
use mock_completion::queue::ClientKey;

async fn engine_with_timeout(timeout: Duration) -> Engine {
    let config = EngineConfig {
        resolution_timeout: timeout,
        ..EngineConfig::default()
    };
    Engine::in_memory(&config).await.unwrap()
}

#[tokio::test]
async fn test_batch_is_served_in_order() {
    let engine = engine_with_timeout(Duration::from_secs(1)).await;
    let key = ClientKey::from("192.168.1.10");

    engine
        .store()
        .enqueue_batch(&key, vec![json!({"n": "a"}), json!({"n": "b"}), json!({"n": "c"})], 200)
        .await
        .unwrap();

    let mut served = Vec::new();
    for _ in 0..3 {
        let resolution = engine.broker().resolve(key.clone(), json!({})).await.unwrap();
        assert_eq!(resolution.source, ResolutionSource::Automatic);
        served.push(resolution.body["n"].as_str().unwrap().to_string());
    }
    assert_eq!(served, ["a", "b", "c"]);
    assert!(engine.store().pop_front(&key).await.unwrap().is_none());
}

#[tokio::test]
async fn test_queues_are_isolated_per_client() {
    let engine = engine_with_timeout(Duration::from_millis(50)).await;
    let alice = ClientKey::from("10.0.0.1");
    let bob = ClientKey::from("10.0.0.2");

    engine.store().enqueue(&alice, json!({"for": "alice"}), 200).await.unwrap();

    let result = engine.broker().resolve(bob.clone(), json!({})).await;
    assert!(matches!(result, Err(BrokerError::ResolutionTimeout { .. })));

    let resolution = engine.broker().resolve(alice, json!({})).await.unwrap();
    assert_eq!(resolution.body["for"], "alice");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_parallel_resolves_deliver_each_entry_once() {
    const N: usize = 1000;
    let engine = engine_with_timeout(Duration::from_secs(5)).await;
    let key = ClientKey::from("172.16.0.1");

    let bodies = (0..N).map(|i| json!({"seq": i})).collect();
    engine.store().enqueue_batch(&key, bodies, 200).await.unwrap();

    let mut tasks = Vec::with_capacity(N);
    for _ in 0..N {
        let engine = engine.clone();
        let key = key.clone();
        tasks.push(tokio::spawn(async move {
            engine.broker().resolve(key, json!({})).await
        }));
    }

    let mut seen = HashSet::new();
    for task in tasks {
        let resolution = task.await.unwrap().unwrap();
        let seq = resolution.body["seq"].as_u64().unwrap();
        assert!(seen.insert(seq), "entry {} delivered twice", seq);
    }
    assert_eq!(seen.len(), N);
    assert_eq!(engine.store().len(&key).await, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_submission_racing_timeout_settles_once() {
    for round in 0..25 {
        let engine = engine_with_timeout(Duration::from_millis(20)).await;
        let mut events = engine.hub().subscribe(format!("race-{}", round), EventFilter::AcceptAll).unwrap();

        let broker = engine.broker().clone();
        let caller = tokio::spawn(async move {
            broker.resolve(ClientKey::from("10.9.9.9"), json!({"round": round})).await
        });

        let id = loop {
            match events.recv().await {
                Some(HubEvent::NewRequest { id, .. }) => break id,
                Some(_) => continue,
                None => panic!("hub closed"),
            }
        };

        tokio::time::sleep(Duration::from_millis(18 + (round % 5) as u64)).await;
        let submitted = engine.broker().submit_manual(id, json!({"manual": true}), 200);
        let answered = caller.await.unwrap();

        match (&submitted, &answered) {
            (Ok(_), Ok(resolution)) => {
                assert_eq!(resolution.source, ResolutionSource::Manual);
                assert_eq!(engine.broker().request_state(&id), Some(PendingState::Resolved));
            }
            (Err(BrokerError::AlreadyResolved { .. }), Err(BrokerError::ResolutionTimeout { .. })) => {
                assert_eq!(engine.broker().request_state(&id), Some(PendingState::TimedOut));
            }
            other => panic!("inconsistent outcome in round {}: {:?}", round, other),
        }
    }
}

#[tokio::test]
async fn test_observers_see_request_lifecycle() {
    let engine = engine_with_timeout(Duration::from_secs(5)).await;
    let key = ClientKey::from("10.2.2.2");
    let mut all = engine.hub().subscribe("all", EventFilter::AcceptAll).unwrap();
    let mut other = engine
        .hub()
        .subscribe("other", EventFilter::ClientKey(ClientKey::from("10.3.3.3")))
        .unwrap();

    let broker = engine.broker().clone();
    let waiting_key = key.clone();
    let caller = tokio::spawn(async move { broker.resolve(waiting_key, json!({"q": "?"})).await });

    let id = match all.recv().await {
        Some(HubEvent::NewRequest { id, client_key, .. }) => {
            assert_eq!(client_key, key);
            id
        }
        other => panic!("expected new_request, got {:?}", other),
    };

    engine.broker().submit_manual(id, json!({"a": "!"}), 200).unwrap();
    caller.await.unwrap().unwrap();

    match all.recv().await {
        Some(HubEvent::CompletedRequest { id: done, source, response, .. }) => {
            assert_eq!(done, id);
            assert_eq!(source, ResolutionSource::Manual);
            assert_eq!(response, json!({"a": "!"}));
        }
        other => panic!("expected completed_request, got {:?}", other),
    }

    engine.store().enqueue(&key, json!({"later": true}), 200).await.unwrap();
    let update = all.recv().await.unwrap();
    assert_eq!(update.event_type(), "queue_updated");
    assert_eq!(update.client_key(), Some(&key));

    assert!(other.try_recv().is_none());
}

#[tokio::test]
async fn test_shutdown_abandons_waiters() {
    let engine = engine_with_timeout(Duration::from_secs(30)).await;
    let mut events = engine.hub().subscribe("watch", EventFilter::AcceptAll).unwrap();

    let broker = engine.broker().clone();
    let caller = tokio::spawn(async move { broker.resolve(ClientKey::from("10.4.4.4"), json!({})).await });

    let id = match events.recv().await {
        Some(HubEvent::NewRequest { id, .. }) => id,
        other => panic!("expected new_request, got {:?}", other),
    };

    engine.shutdown();

    let result = tokio::time::timeout(Duration::from_secs(5), caller).await.unwrap().unwrap();
    assert_eq!(result, Err(BrokerError::Abandoned { id }));
    assert_eq!(engine.broker().request_state(&id), Some(PendingState::Abandoned));
    assert_eq!(
        engine.broker().submit_manual(id, json!({}), 200),
        Err(BrokerError::AlreadyResolved { id })
    );
}
