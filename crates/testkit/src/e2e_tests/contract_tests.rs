//! Contract tests: the shapes and guarantees code under test relies on.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tavern_shared::SessionMessageType;

use super::{settle, TestServer};
use crate::broker::ClientOptions;
use crate::http::{HttpMethod, MockResponse};
use crate::infrastructure::ports::{ClockPort, ProviderError, StoreError};
use crate::orchestrator::MockServerConfig;
use crate::providers::{ProviderKind, ProviderRequest, Scenario, ScenarioConfig};
use crate::store::fixtures::{CAMPAIGN_ID, SESSION_ID};

// =============================================================================
// Provider Simulator
// =============================================================================

#[tokio::test]
async fn provider_identity_is_memoized_until_cleared() {
    let test = TestServer::start(MockServerConfig::minimal());
    let providers = test.services.providers().expect("providers");

    let first = providers.create(ProviderKind::OpenAi, "k1");
    let again = providers.create(ProviderKind::OpenAi, "k1");
    let other = providers.create(ProviderKind::OpenAi, "k2");
    assert!(Arc::ptr_eq(&first, &again));
    assert!(!Arc::ptr_eq(&first, &other));

    providers.clear_registry();
    let fresh = providers.create(ProviderKind::OpenAi, "k1");
    assert!(!Arc::ptr_eq(&first, &fresh));
}

#[tokio::test]
async fn failure_scenarios_reject_with_their_name() {
    let test = TestServer::start(MockServerConfig::minimal());
    let providers = test.services.providers().expect("providers");

    for kind in ProviderKind::ALL {
        let provider = providers.create(kind, "sk-contract");
        for scenario in Scenario::ALL.into_iter().filter(Scenario::is_failure) {
            provider.set_scenario(ScenarioConfig::failing(scenario));
            let err = provider
                .invoke(ProviderRequest::prompt("Generate a character"))
                .await
                .expect_err("failure scenario never resolves");
            assert_eq!(err.scenario(), Some(scenario));
            assert!(err.to_string().contains(scenario.as_str()), "{err}");
        }
    }
}

#[tokio::test]
async fn custom_error_message_is_surfaced() {
    let test = TestServer::start(MockServerConfig::minimal());
    let provider = test
        .services
        .providers()
        .expect("providers")
        .create(ProviderKind::Anthropic, "sk-custom");
    provider.set_scenario(
        ScenarioConfig::failing(Scenario::ApiError).with_custom_error("upstream exploded"),
    );

    let err = provider
        .invoke(ProviderRequest::prompt("hello"))
        .await
        .expect_err("api error");
    assert_eq!(err.to_string(), "upstream exploded");
}

#[tokio::test]
async fn timeout_rejects_after_configured_delay() {
    let test = TestServer::start(MockServerConfig::minimal());
    let provider = test
        .services
        .providers()
        .expect("providers")
        .create(ProviderKind::OpenAi, "k1");
    provider.set_scenario(
        ScenarioConfig::failing(Scenario::Timeout).with_delay(Duration::from_millis(10)),
    );

    let call = {
        let provider = Arc::clone(&provider);
        tokio::spawn(async move { provider.invoke(ProviderRequest::prompt("roll")).await })
    };
    test.clock.wait_for_timers(1).await;
    assert!(!call.is_finished());

    test.clock.advance(Duration::from_millis(10));
    let err = call.await.expect("join").expect_err("timeout");
    assert_eq!(err.scenario(), Some(Scenario::Timeout));
    assert!(err.to_string().contains("timeout"));
    assert_eq!(test.clock.elapsed(), Duration::from_millis(10));
}

#[tokio::test]
async fn scenario_change_does_not_affect_calls_in_flight() {
    let test = TestServer::start(MockServerConfig::minimal());
    let provider = test
        .services
        .providers()
        .expect("providers")
        .create(ProviderKind::OpenAi, "k-concurrent");
    provider.set_scenario(ScenarioConfig::success().with_delay(Duration::from_millis(50)));

    let first = provider.invoke(ProviderRequest::prompt("quest hook"));
    let switch_then_call = async {
        test.clock.wait_for_timers(1).await;
        provider.set_scenario(
            ScenarioConfig::failing(Scenario::ApiError).with_delay(Duration::from_millis(50)),
        );
        let second = provider.invoke(ProviderRequest::prompt("quest hook"));
        let advance = async {
            test.clock.wait_for_timers(2).await;
            test.clock.advance(Duration::from_millis(50));
        };
        futures_util::future::join(second, advance).await.0
    };

    let (first, second) = futures_util::future::join(first, switch_then_call).await;
    assert!(first.is_ok());
    assert_eq!(
        second.expect_err("captured api_error").scenario(),
        Some(Scenario::ApiError)
    );
    assert_eq!(provider.call_count(), 2);
}

#[tokio::test]
async fn success_bodies_match_provider_wire_shapes() {
    let test = TestServer::start(MockServerConfig::minimal());
    let providers = test.services.providers().expect("providers");
    let request = || ProviderRequest::prompt("Create a character for my campaign");

    let chat = providers
        .create(ProviderKind::OpenAi, "k")
        .invoke(request())
        .await
        .expect("chat")
        .to_json();
    assert!(chat["choices"][0]["message"]["content"].is_string());
    assert!(chat["usage"]["total_tokens"].is_u64());
    assert!(chat["usage"]["prompt_tokens"].is_u64());
    assert!(chat["usage"]["completion_tokens"].is_u64());
    assert_eq!(chat["model"], ProviderKind::OpenAi.default_model());

    let messages = providers
        .create(ProviderKind::Anthropic, "k")
        .invoke(request())
        .await
        .expect("messages")
        .to_json();
    assert_eq!(messages["content"][0]["type"], "text");
    assert!(messages["content"][0]["text"].is_string());
    assert!(messages["usage"]["input_tokens"].is_u64());
    assert!(messages["usage"]["output_tokens"].is_u64());

    let generated = providers
        .create(ProviderKind::Gemini, "k")
        .invoke(request())
        .await
        .expect("generate");
    let character: serde_json::Value =
        serde_json::from_str(&generated.text()).expect("character JSON");
    assert_eq!(character["name"], "Elara Moonwhisper");
    assert!(generated.to_json()["response"]["text"].is_string());
}

#[tokio::test]
async fn same_keyword_always_yields_same_content() {
    let test = TestServer::start(MockServerConfig::minimal());
    let provider = test
        .services
        .providers()
        .expect("providers")
        .create(ProviderKind::OpenAi, "k");

    let first = provider
        .complete(ProviderRequest::prompt("Describe a random EVENT"))
        .await
        .expect("first");
    let second = provider
        .complete(ProviderRequest::prompt("another event please"))
        .await
        .expect("second");
    assert_eq!(first, second);

    let fallback = provider
        .complete(ProviderRequest::prompt("hello there"))
        .await
        .expect("fallback");
    assert_ne!(fallback, first);
}

#[tokio::test]
async fn errors_never_echo_the_credential() {
    let test = TestServer::start(MockServerConfig::minimal());
    let credential = "sk-live-very-secret-0123456789";
    let provider = test
        .services
        .providers()
        .expect("providers")
        .create(ProviderKind::OpenAi, credential);

    for scenario in Scenario::ALL.into_iter().filter(Scenario::is_failure) {
        provider.set_scenario(ScenarioConfig::failing(scenario));
        let err = provider
            .invoke(ProviderRequest::prompt("hi"))
            .await
            .expect_err("failure");
        assert!(!err.to_string().contains(credential));
        assert!(!format!("{err:?}").contains(credential));
    }
    assert!(!format!("{provider:?}").contains(credential));
}

// =============================================================================
// Data Store Simulator
// =============================================================================

#[tokio::test]
async fn insert_with_existing_parent_is_queryable() {
    let test = TestServer::seeded();
    let db = test.services.database().expect("database");

    db.insert(
        "characters",
        json!({"id": "char-new", "campaign_id": CAMPAIGN_ID, "name": "Tamsin Reed"}),
    )
    .expect("insert");

    let rows = db
        .prepare("SELECT * FROM characters WHERE campaign_id = ?")
        .expect("prepare")
        .all(&[json!(CAMPAIGN_ID)])
        .expect("all");
    assert!(rows.iter().any(|row| row["id"] == "char-new"));
    assert_eq!(rows.len(), 3);
}

#[tokio::test]
async fn foreign_key_violation_leaves_every_table_unchanged() {
    let test = TestServer::seeded();
    let db = test.services.database().expect("database");

    let cases = [
        ("characters", "campaign_id"),
        ("sessions", "campaign_id"),
        ("quests", "campaign_id"),
        ("locations", "campaign_id"),
        ("events", "session_id"),
    ];
    for (table, column) in cases {
        let before = db.table_counts();
        let err = db
            .insert(table, json!({ column: "missing", "name": "orphan" }))
            .expect_err("orphan insert");

        assert!(err.is_foreign_key_violation(), "{table}: {err}");
        assert!(err
            .to_string()
            .contains("Foreign key constraint violation"));
        assert!(matches!(err, StoreError::ForeignKeyViolation { .. }));
        assert_eq!(db.table_counts(), before, "{table} changed");
    }
}

#[tokio::test]
async fn statement_insert_goes_through_foreign_key_checks() {
    let test = TestServer::seeded();
    let db = test.services.database().expect("database");
    let insert = db
        .prepare("INSERT INTO events (id, session_id, title) VALUES (?, ?, ?)")
        .expect("prepare");

    insert
        .run(&[json!("event-2"), json!(SESSION_ID), json!("Storm")])
        .expect("valid parent");
    let err = insert
        .run(&[json!("event-3"), json!("sess-missing"), json!("Flood")])
        .expect_err("missing parent");
    assert!(err.is_foreign_key_violation());
    assert_eq!(db.count_records("events").expect("count"), 2);
}

// =============================================================================
// Session Broker Simulator
// =============================================================================

#[tokio::test]
async fn broadcast_reaches_listener_exactly_once() {
    let test = TestServer::start(MockServerConfig::minimal());
    let broker = test.services.broker().expect("broker");
    let client = broker.create_client(ClientOptions::new().auto_connect());
    let mut listener = client.subscribe();

    client.join_session("s1", "p1").expect("join");
    broker
        .server()
        .broadcast_to_session("s1", SessionMessageType::GmResponse, json!({"x": 1}))
        .expect("broadcast");

    let gm: Vec<_> = listener
        .drain_messages()
        .into_iter()
        .filter(|m| m.message_type == SessionMessageType::GmResponse)
        .collect();
    assert_eq!(gm.len(), 1);
    assert_eq!(gm[0].data, Some(json!({"x": 1})));
    assert_eq!(gm[0].session_id, "s1");
}

#[tokio::test]
async fn room_order_follows_send_order_under_latency() {
    let test = TestServer::with_broker_latency(10);
    let broker = test.services.broker().expect("broker");
    let a = broker.create_client(ClientOptions::new().auto_connect());
    let b = broker.create_client(ClientOptions::new().auto_connect());
    let observer = broker.create_client(ClientOptions::new().auto_connect());
    let mut events = observer.subscribe();

    observer.join_session("s1", "gm").expect("join");
    a.join_session("s1", "p1").expect("join");
    b.join_session("s1", "p2").expect("join");
    a.send_player_action("s1", "p1", json!({"seq": 1}))
        .expect("a sends");
    b.send_player_action("s1", "p2", json!({"seq": 2}))
        .expect("b sends");
    a.send_player_action("s1", "p1", json!({"seq": 3}))
        .expect("a sends again");

    settle().await;
    assert!(events.drain_messages().is_empty());

    test.advance(Duration::from_millis(10)).await;
    let actions: Vec<_> = events
        .drain_messages()
        .into_iter()
        .filter(|m| m.message_type == SessionMessageType::PlayerAction)
        .filter_map(|m| m.data)
        .collect();
    assert_eq!(
        actions,
        vec![json!({"seq": 1}), json!({"seq": 2}), json!({"seq": 3})]
    );
}

#[tokio::test]
async fn messages_serialize_to_the_session_envelope() {
    let test = TestServer::start(MockServerConfig::minimal());
    let broker = test.services.broker().expect("broker");
    let client = broker.create_client(ClientOptions::new().auto_connect());

    let message = client
        .send_player_action("s1", "p1", json!({"action": "attack"}))
        .expect("send");
    let wire = serde_json::to_value(&message).expect("serialize");
    assert_eq!(wire["type"], "player_action");
    assert_eq!(wire["sessionId"], "s1");
    assert_eq!(wire["playerId"], "p1");
    assert_eq!(wire["data"]["action"], "attack");
    assert!(wire["timestamp"].is_string());

    let update = client
        .send_gm_response("s1", json!({"text": "The door creaks."}))
        .expect("send");
    let wire = serde_json::to_value(&update).expect("serialize");
    assert_eq!(wire["type"], "gm_response");
    assert!(wire.get("playerId").is_none());
}

// =============================================================================
// HTTP Boundary Simulator
// =============================================================================

#[tokio::test]
async fn http_envelopes_match_rest_contract() {
    let test = TestServer::start(MockServerConfig::minimal());
    let http = test.services.http().expect("http");

    let response = http
        .post(
            &http.url("/api/ai/test-connection"),
            json!({"provider": "anthropic"}),
        )
        .await
        .expect("test-connection");
    assert!(response.ok());
    let envelope = response.envelope().expect("envelope");
    assert!(envelope.success);
    assert_eq!(envelope.data_as::<serde_json::Value>().expect("data")["connected"], true);
    assert_eq!(envelope.timestamp, "2024-01-01T00:00:00.000Z");

    let bad = http
        .post(
            &http.url("/api/ai/test-connection"),
            json!({"provider": "skynet"}),
        )
        .await
        .expect("bad provider");
    assert_eq!(bad.status, 400);
    assert_eq!(bad.body["success"], false);
    assert!(bad.body["error"].is_string());
}

#[tokio::test]
async fn http_override_applies_until_reset() {
    let mut test = TestServer::start(MockServerConfig::minimal());
    let http = Arc::clone(test.services.http().expect("http"));
    http.use_handler(HttpMethod::Post, "/api/ai/generate-character", |_| {
        MockResponse::error(429, "Too many requests")
    })
    .expect("route");

    let limited = http
        .post(&http.url("/api/ai/generate-character"), json!({}))
        .await
        .expect("override");
    assert_eq!(limited.status, 429);

    test.server.reset().expect("reset");
    let restored = http
        .post(&http.url("/api/ai/generate-character"), json!({}))
        .await
        .expect("default");
    assert_eq!(restored.status, 200);
    assert_eq!(http.requests().len(), 1);
}

#[tokio::test]
async fn provider_errors_are_not_transient_when_auth_fails() {
    let test = TestServer::start(MockServerConfig::minimal());
    let provider = test
        .services
        .providers()
        .expect("providers")
        .create(ProviderKind::OpenAi, "k");

    provider.set_scenario(ScenarioConfig::failing(Scenario::InvalidKey));
    let err = provider
        .invoke(ProviderRequest::prompt("hi"))
        .await
        .expect_err("invalid key");
    assert!(!err.is_transient());

    provider.set_scenario(ScenarioConfig::failing(Scenario::RateLimit));
    let err: ProviderError = provider
        .invoke(ProviderRequest::prompt("hi"))
        .await
        .expect_err("rate limit");
    assert!(err.is_transient());
}
