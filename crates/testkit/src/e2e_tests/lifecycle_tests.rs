//! Lifecycle tests: start, reset and stop as one unit.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tavern_shared::SessionMessageType;

use super::{settle, wait_until_idle, TestServer};
use crate::broker::{ClientEvent, ClientOptions};
use crate::http::{HttpMethod, MockResponse};
use crate::infrastructure::clock::FakeClock;
use crate::infrastructure::ports::{HttpError, LifecycleError, ProviderError};
use crate::orchestrator::{MockServer, MockServerConfig};
use crate::providers::{ProviderKind, ProviderRequest, Scenario, ScenarioConfig};

#[tokio::test]
async fn reset_restores_seeded_counts() {
    let mut test = TestServer::seeded();
    let db = Arc::clone(test.services.database().expect("database"));
    let seeded = db.table_counts();
    assert_eq!(seeded.get("campaigns"), Some(&1));
    assert_eq!(seeded.get("characters"), Some(&2));

    db.insert("campaigns", json!({"id": "camp-2", "name": "Second"}))
        .expect("insert");
    db.insert("characters", json!({"campaign_id": "camp-2", "name": "Extra"}))
        .expect("insert");
    assert_ne!(db.table_counts(), seeded);

    test.server.reset().expect("reset");
    assert_eq!(db.table_counts(), seeded);
    test.server.reset().expect("second reset");
    assert_eq!(db.table_counts(), seeded);
}

#[tokio::test]
async fn reset_then_seed_matches_seeded_start() {
    let seeded = TestServer::seeded();
    let expected = seeded
        .services
        .database()
        .expect("database")
        .table_counts();

    let mut unseeded = TestServer::start(MockServerConfig::minimal());
    let db = Arc::clone(unseeded.services.database().expect("database"));
    assert!(db.table_counts().values().all(|count| *count == 0));

    unseeded.server.reset().expect("reset");
    db.seed_test_data().expect("seed");
    assert_eq!(db.table_counts(), expected);
}

#[tokio::test]
async fn reset_then_seed_on_a_seeding_server_matches_seeded_start() {
    let mut test = TestServer::start(MockServerConfig::default());
    let db = Arc::clone(test.services.database().expect("database"));
    let expected = db.table_counts();
    db.insert("quests", json!({"campaign_id": "camp-1", "title": "Side job"}))
        .expect("insert");

    test.server.reset().expect("reset");
    db.seed_test_data().expect("seed after reseeding reset");
    assert_eq!(db.table_counts(), expected);
}

#[tokio::test]
async fn reset_reapplies_default_scenario_and_drops_clients() {
    let config = MockServerConfig::minimal().with_default_scenario(Scenario::RateLimit);
    let mut test = TestServer::start(config);
    let providers = Arc::clone(test.services.providers().expect("providers"));
    let broker = Arc::clone(test.services.broker().expect("broker"));

    let provider = providers.create(ProviderKind::Gemini, "k");
    assert_eq!(provider.scenario().scenario, Scenario::RateLimit);
    provider.set_scenario(ScenarioConfig::success());

    let client = broker.create_client(ClientOptions::new().auto_connect());
    client.join_session("s1", "p1").expect("join");
    let mut events = client.subscribe();

    test.server.reset().expect("reset");

    assert_eq!(provider.scenario().scenario, Scenario::RateLimit);
    assert!(Arc::ptr_eq(&provider, &providers.create(ProviderKind::Gemini, "k")));
    assert_eq!(broker.client_count(), 0);
    assert!(!client.is_connected());
    assert!(events
        .drain()
        .iter()
        .any(|event| matches!(event, ClientEvent::Disconnected)));
}

#[tokio::test]
async fn stop_cancels_in_flight_provider_calls() {
    let mut test = TestServer::start(MockServerConfig::minimal());
    let provider = test
        .services
        .providers()
        .expect("providers")
        .create(ProviderKind::OpenAi, "k");
    provider.set_scenario(ScenarioConfig::success().with_delay(Duration::from_secs(30)));

    let call = {
        let provider = Arc::clone(&provider);
        tokio::spawn(async move { provider.invoke(ProviderRequest::prompt("hi")).await })
    };
    test.clock.wait_for_timers(1).await;

    test.server.stop();
    let result = call.await.expect("join");
    assert_eq!(result, Err(ProviderError::Cancelled));
    assert_eq!(test.clock.pending_timers(), 0);
    assert!(provider.invocations().is_empty());
}

#[tokio::test]
async fn stop_leaves_no_delayed_delivery_behind() {
    let mut test = TestServer::with_broker_latency(20);
    let broker = Arc::clone(test.services.broker().expect("broker"));
    let client = broker.create_client(ClientOptions::new().auto_connect());
    let mut events = client.subscribe();

    client.join_session("s1", "p1").expect("join");
    broker
        .server()
        .broadcast_to_session("s1", SessionMessageType::SessionUpdate, json!({"round": 2}))
        .expect("broadcast");
    test.clock.wait_for_timers(1).await;

    test.server.stop();
    wait_until_idle(&test.clock).await;
    assert_eq!(test.clock.pending_timers(), 0);

    test.clock.advance(Duration::from_secs(1));
    settle().await;
    assert!(events.drain_messages().is_empty());
}

#[tokio::test]
async fn http_latency_is_cancelled_by_stop() {
    let mut config = MockServerConfig::minimal();
    config.http.simulate_latency = true;
    let mut test = TestServer::start(config);
    let http = Arc::clone(test.services.http().expect("http"));

    let call = {
        let http = Arc::clone(&http);
        tokio::spawn(async move { http.get(&http.url("/api/health")).await })
    };
    test.clock.wait_for_timers(1).await;

    test.server.stop();
    assert_eq!(call.await.expect("join"), Err(HttpError::Cancelled));
    assert_eq!(
        http.get(&http.url("/api/health")).await,
        Err(HttpError::NotInstalled)
    );
}

#[tokio::test]
async fn dropping_a_running_server_releases_waiters() {
    let clock = FakeClock::shared();
    let mut server = MockServer::new(MockServerConfig::minimal()).with_clock(clock.clone());
    let services = server.start().expect("start");
    let provider = services
        .providers()
        .expect("providers")
        .create(ProviderKind::Anthropic, "k");
    provider.set_scenario(ScenarioConfig::success().with_delay(Duration::from_secs(5)));

    let call = {
        let provider = Arc::clone(&provider);
        tokio::spawn(async move { provider.invoke(ProviderRequest::prompt("hi")).await })
    };
    clock.wait_for_timers(1).await;

    drop(server);
    assert_eq!(call.await.expect("join"), Err(ProviderError::Cancelled));
}

#[tokio::test]
async fn restart_builds_fresh_services() {
    let mut test = TestServer::seeded();
    let first = Arc::clone(test.services.database().expect("database"));
    first
        .insert("campaigns", json!({"id": "camp-9", "name": "Gone after restart"}))
        .expect("insert");

    test.server.stop();
    assert!(matches!(
        test.server.providers(),
        Err(LifecycleError::NotRunning { .. })
    ));

    let services = test.server.start().expect("restart");
    let second = services.database().expect("database");
    assert!(!Arc::ptr_eq(&first, second));
    assert!(second
        .get_by_id("campaigns", "camp-9")
        .expect("lookup")
        .is_none());
}

#[tokio::test]
async fn before_each_resets_only_when_configured() {
    let mut test = TestServer::start(MockServerConfig::minimal());
    let http = Arc::clone(test.services.http().expect("http"));
    http.use_handler(HttpMethod::Get, "/api/health", |_| {
        MockResponse::error(503, "maintenance")
    })
    .expect("route");

    test.server.before_each().expect("before each");
    let response = http.get(&http.url("/api/health")).await.expect("health");
    assert_eq!(response.status, 200);

    test.server.stop();
    let mut config = MockServerConfig::minimal();
    config.general.reset_between_tests = false;
    test.server.update_config(config).expect("stopped");
    let services = test.server.start().expect("start");
    let http = Arc::clone(services.http().expect("http"));
    http.use_handler(HttpMethod::Get, "/api/health", |_| {
        MockResponse::error(503, "maintenance")
    })
    .expect("route");

    test.server.before_each().expect("before each");
    let response = http.get(&http.url("/api/health")).await.expect("health");
    assert_eq!(response.status, 503);
}

#[tokio::test]
async fn seeded_fault_injection_is_reproducible() {
    async fn run() -> Vec<bool> {
        let mut config = MockServerConfig::minimal().with_seed(1234);
        config.websocket.simulate_errors = true;
        config.websocket.error_threshold = 2;
        config.websocket.error_probability = 0.5;
        let clock = FakeClock::shared();
        let mut server = MockServer::new(config).with_clock(clock);
        let services = server.start().expect("start");
        let broker = services.broker().expect("broker");

        let client = broker.create_client(ClientOptions::new().auto_connect());
        let mut events = client.subscribe();
        client.join_session("s1", "p1").expect("join");
        for round in 0..20 {
            let data = json!({ "round": round });
            broker
                .server()
                .broadcast_to_session("s1", SessionMessageType::GmResponse, data)
                .expect("broadcast");
        }
        events
            .drain()
            .into_iter()
            .map(|event| matches!(event, ClientEvent::Error(_)))
            .collect()
    }

    let first = run().await;
    let second = run().await;
    assert_eq!(first.len(), 21);
    assert_eq!(first, second);
    assert!(!first[..2].iter().any(|is_error| *is_error));
    assert!(first.iter().any(|is_error| *is_error));
}
