//! Provider registry and instances.
//!
//! The registry is owned by one orchestrator. Instances are memoized by
//! `(provider, credential)`; the credential itself is reduced to a SHA-256
//! fingerprint and never stored.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use dashmap::DashMap;
use sha2::{Digest, Sha256};

use super::content::CannedContent;
use super::kind::ProviderKind;
use super::request::ProviderRequest;
use super::response::ProviderResponse;
use super::scenario::{decide, InvocationContext, Outcome, Scenario, ScenarioConfig};
use crate::infrastructure::clock::Suspension;
use crate::infrastructure::ports::ProviderError;
use crate::infrastructure::sync::{lock, read, write};

/// Characters of the fingerprint shown in logs and `Debug` output.
const FINGERPRINT_PREFIX_LEN: usize = 8;

// =============================================================================
// Registry Key
// =============================================================================

/// Composite identity of a provider instance.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct RegistryKey {
    kind: ProviderKind,
    fingerprint: String,
}

impl RegistryKey {
    pub fn new(kind: ProviderKind, credential: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(kind.as_str().as_bytes());
        hasher.update(b":");
        hasher.update(credential.as_bytes());
        Self {
            kind,
            fingerprint: hex::encode(hasher.finalize()),
        }
    }

    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    /// Short fingerprint prefix, safe to log.
    pub fn short_fingerprint(&self) -> &str {
        &self.fingerprint[..FINGERPRINT_PREFIX_LEN.min(self.fingerprint.len())]
    }
}

impl std::fmt::Debug for RegistryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryKey")
            .field("kind", &self.kind)
            .field("fingerprint", &self.short_fingerprint())
            .finish()
    }
}

// =============================================================================
// Provider Instance
// =============================================================================

/// One recorded call on a provider instance.
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationRecord {
    pub sequence: u64,
    pub scenario: Scenario,
    pub model: String,
    /// Canned content selected (success calls only)
    pub content: Option<CannedContent>,
    pub succeeded: bool,
}

/// A simulated provider bound to one `(provider, credential)` identity.
pub struct ProviderInstance {
    key: RegistryKey,
    scenario: Mutex<ScenarioConfig>,
    sequence: AtomicU64,
    invocations: Mutex<Vec<InvocationRecord>>,
    suspension: Suspension,
}

impl ProviderInstance {
    fn new(key: RegistryKey, scenario: ScenarioConfig, suspension: Suspension) -> Self {
        Self {
            key,
            scenario: Mutex::new(scenario),
            sequence: AtomicU64::new(0),
            invocations: Mutex::new(Vec::new()),
            suspension,
        }
    }

    pub fn kind(&self) -> ProviderKind {
        self.key.kind
    }

    pub fn key(&self) -> &RegistryKey {
        &self.key
    }

    /// Replace the active scenario. Calls already in flight keep the
    /// scenario they captured.
    pub fn set_scenario(&self, config: ScenarioConfig) {
        tracing::debug!(
            provider = %self.key.kind,
            fingerprint = self.key.short_fingerprint(),
            scenario = %config.scenario,
            delay_ms = config.delay_ms,
            "Provider scenario set"
        );
        *lock(&self.scenario) = config;
    }

    pub fn scenario(&self) -> ScenarioConfig {
        lock(&self.scenario).clone()
    }

    /// Invoke the simulated provider.
    ///
    /// The scenario is captured once at the start of the call. After waiting
    /// the captured delay, resolves with the provider-shaped body or rejects
    /// with a scenario-induced error.
    pub async fn invoke(
        &self,
        request: ProviderRequest,
    ) -> Result<ProviderResponse, ProviderError> {
        let config = self.scenario();
        let ctx = InvocationContext {
            kind: self.key.kind,
            sequence: self.sequence.fetch_add(1, Ordering::SeqCst) + 1,
            created: self.suspension.clock().now(),
        };
        let outcome = decide(&config, &request, &ctx);

        tracing::debug!(
            provider = %ctx.kind,
            sequence = ctx.sequence,
            scenario = %config.scenario,
            delay_ms = config.delay_ms,
            "Simulated provider call started"
        );

        self.suspension.pause(config.delay()).await?;

        self.record(&config, &request, &ctx, &outcome);
        if let Outcome::Failure { scenario, .. } = &outcome {
            tracing::debug!(
                provider = %ctx.kind,
                sequence = ctx.sequence,
                scenario = %scenario,
                "Simulated provider call rejected"
            );
        }
        outcome.into_result()
    }

    /// Invoke and return only the generated text.
    pub async fn complete(&self, request: ProviderRequest) -> Result<String, ProviderError> {
        self.invoke(request).await.map(|body| body.text())
    }

    /// Number of calls started on this instance.
    pub fn call_count(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }

    /// Calls that ran to completion, in completion order.
    pub fn invocations(&self) -> Vec<InvocationRecord> {
        lock(&self.invocations).clone()
    }

    fn record(
        &self,
        config: &ScenarioConfig,
        request: &ProviderRequest,
        ctx: &InvocationContext,
        outcome: &Outcome,
    ) {
        let content = match outcome {
            Outcome::Success { content, .. } => Some(*content),
            Outcome::Failure { .. } => None,
        };
        lock(&self.invocations).push(InvocationRecord {
            sequence: ctx.sequence,
            scenario: config.scenario,
            model: request
                .model
                .clone()
                .unwrap_or_else(|| ctx.kind.default_model().to_string()),
            content,
            succeeded: outcome.is_success(),
        });
    }
}

impl std::fmt::Debug for ProviderInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderInstance")
            .field("key", &self.key)
            .field("scenario", &self.scenario().scenario)
            .field("calls", &self.call_count())
            .finish()
    }
}

// =============================================================================
// Provider Registry
// =============================================================================

/// Memoizing factory for provider instances.
pub struct ProviderRegistry {
    instances: DashMap<RegistryKey, Arc<ProviderInstance>>,
    default_scenario: RwLock<ScenarioConfig>,
    suspension: Suspension,
}

impl ProviderRegistry {
    pub fn new(default_scenario: ScenarioConfig, suspension: Suspension) -> Self {
        Self {
            instances: DashMap::new(),
            default_scenario: RwLock::new(default_scenario),
            suspension,
        }
    }

    /// Get or create the instance for `(kind, credential)`.
    ///
    /// Identical identities return the same `Arc` until `clear_registry`.
    pub fn create(&self, kind: ProviderKind, credential: &str) -> Arc<ProviderInstance> {
        let key = RegistryKey::new(kind, credential);
        let entry = self.instances.entry(key.clone()).or_insert_with(|| {
            tracing::debug!(
                provider = %kind,
                fingerprint = key.short_fingerprint(),
                "Provider instance created"
            );
            Arc::new(ProviderInstance::new(
                key,
                self.default_scenario(),
                self.suspension.clone(),
            ))
        });
        Arc::clone(entry.value())
    }

    /// Like `create`, with the provider given by name (`"openai"`, `"claude"`, ...).
    pub fn create_named(
        &self,
        provider_name: &str,
        credential: &str,
    ) -> Result<Arc<ProviderInstance>, ProviderError> {
        let kind = provider_name.parse::<ProviderKind>()?;
        Ok(self.create(kind, credential))
    }

    /// Drop every memoized instance. Handles held elsewhere stay usable but
    /// are no longer returned by `create`.
    pub fn clear_registry(&self) {
        let count = self.instances.len();
        self.instances.clear();
        tracing::debug!(count, "Provider registry cleared");
    }

    /// Re-apply the default scenario to every live instance.
    pub fn reset_scenarios(&self) {
        let default = self.default_scenario();
        for entry in self.instances.iter() {
            entry.value().set_scenario(default.clone());
        }
    }

    /// Scenario that newly created instances start with.
    pub fn set_default_scenario(&self, config: ScenarioConfig) {
        *write(&self.default_scenario) = config;
    }

    pub fn default_scenario(&self) -> ScenarioConfig {
        read(&self.default_scenario).clone()
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::infrastructure::clock::FakeClock;

    fn registry_with(clock: Arc<FakeClock>) -> (ProviderRegistry, CancellationToken) {
        let token = CancellationToken::new();
        let registry = ProviderRegistry::new(
            ScenarioConfig::success(),
            Suspension::new(clock, token.clone()),
        );
        (registry, token)
    }

    #[test]
    fn create_is_memoized_by_identity() {
        let (registry, _token) = registry_with(FakeClock::shared());

        let a = registry.create(ProviderKind::OpenAi, "k1");
        let b = registry.create(ProviderKind::OpenAi, "k1");
        let c = registry.create(ProviderKind::OpenAi, "k2");
        let d = registry.create(ProviderKind::Anthropic, "k1");

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert!(!Arc::ptr_eq(&a, &d));
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn clear_registry_yields_fresh_instances() {
        let (registry, _token) = registry_with(FakeClock::shared());
        let before = registry.create(ProviderKind::Gemini, "k1");

        registry.clear_registry();
        assert!(registry.is_empty());

        let after = registry.create(ProviderKind::Gemini, "k1");
        assert!(!Arc::ptr_eq(&before, &after));
    }

    #[test]
    fn debug_output_never_contains_credential() {
        let (registry, _token) = registry_with(FakeClock::shared());
        let secret = "sk-live-super-secret-value";
        let instance = registry.create(ProviderKind::OpenAi, secret);

        let debug = format!("{instance:?}");
        assert!(!debug.contains(secret));
        assert!(debug.contains("OpenAi"));
    }

    #[test]
    fn unknown_provider_name_is_rejected() {
        let (registry, _token) = registry_with(FakeClock::shared());
        let err = registry
            .create_named("cohere", "k1")
            .expect_err("unknown provider");
        assert_eq!(err, ProviderError::UnknownProvider("cohere".to_string()));
    }

    #[tokio::test]
    async fn success_shapes_per_provider() {
        let (registry, _token) = registry_with(FakeClock::shared());
        let request = ProviderRequest::prompt("Generate a character");

        let chat = registry
            .create(ProviderKind::OpenAi, "k")
            .invoke(request.clone())
            .await
            .expect("chat");
        let json = chat.to_json();
        assert!(json["choices"][0]["message"]["content"].is_string());
        assert!(json["usage"]["total_tokens"].is_number());
        assert_eq!(json["model"], "gpt-4o-mini");

        let messages = registry
            .create(ProviderKind::Anthropic, "k")
            .invoke(request.clone())
            .await
            .expect("messages");
        let json = messages.to_json();
        assert_eq!(json["content"][0]["type"], "text");
        assert!(json["usage"]["input_tokens"].is_number());
        assert!(json["usage"]["output_tokens"].is_number());

        let generate = registry
            .create(ProviderKind::Gemini, "k")
            .invoke(request)
            .await
            .expect("generate");
        let text = generate.as_generate().expect("generate shape").response.text();
        assert!(text.contains("Elara Moonwhisper"));
    }

    #[tokio::test]
    async fn timeout_rejects_after_delay() {
        let clock = FakeClock::shared();
        let (registry, _token) = registry_with(clock.clone());
        let instance = registry.create(ProviderKind::OpenAi, "k1");
        instance.set_scenario(
            ScenarioConfig::failing(Scenario::Timeout).with_delay(Duration::from_millis(10)),
        );

        let call = {
            let instance = Arc::clone(&instance);
            tokio::spawn(async move { instance.invoke(ProviderRequest::prompt("hi")).await })
        };
        clock.wait_for_timers(1).await;
        assert!(!call.is_finished());

        clock.advance(Duration::from_millis(10));
        let err = call.await.expect("join").expect_err("timeout scenario");
        assert_eq!(err.scenario(), Some(Scenario::Timeout));
        assert!(err.to_string().contains("timeout"));
    }

    #[tokio::test]
    async fn in_flight_call_keeps_captured_scenario() {
        let clock = FakeClock::shared();
        let (registry, _token) = registry_with(clock.clone());
        let instance = registry.create(ProviderKind::OpenAi, "k1");
        instance.set_scenario(ScenarioConfig::success().with_delay(Duration::from_millis(50)));

        let call = {
            let instance = Arc::clone(&instance);
            tokio::spawn(async move { instance.invoke(ProviderRequest::prompt("quest")).await })
        };
        clock.wait_for_timers(1).await;

        instance.set_scenario(ScenarioConfig::failing(Scenario::ApiError));
        clock.advance(Duration::from_millis(50));

        let body = call.await.expect("join").expect("captured success");
        assert!(body.text().contains("Lost Relic"));

        let err = instance
            .invoke(ProviderRequest::prompt("quest"))
            .await
            .expect_err("later call sees api_error");
        assert_eq!(err.scenario(), Some(Scenario::ApiError));
    }

    #[tokio::test]
    async fn shutdown_cancels_pending_calls() {
        let clock = FakeClock::shared();
        let (registry, token) = registry_with(clock.clone());
        let instance = registry.create(ProviderKind::Anthropic, "k1");
        instance.set_scenario(ScenarioConfig::success().with_delay(Duration::from_secs(5)));

        let call = {
            let instance = Arc::clone(&instance);
            tokio::spawn(async move { instance.invoke(ProviderRequest::prompt("hi")).await })
        };
        clock.wait_for_timers(1).await;

        token.cancel();
        let err = call.await.expect("join").expect_err("cancelled");
        assert_eq!(err, ProviderError::Cancelled);
        assert_eq!(clock.pending_timers(), 0);
        assert!(instance.invocations().is_empty());
    }

    #[tokio::test]
    async fn reset_scenarios_reapplies_default() {
        let (registry, _token) = registry_with(FakeClock::shared());
        let instance = registry.create(ProviderKind::OpenAi, "k1");
        instance.set_scenario(ScenarioConfig::failing(Scenario::InvalidKey));

        registry.reset_scenarios();
        assert_eq!(instance.scenario(), ScenarioConfig::success());

        registry.set_default_scenario(ScenarioConfig::failing(Scenario::RateLimit));
        let fresh = registry.create(ProviderKind::OpenAi, "k2");
        assert_eq!(fresh.scenario().scenario, Scenario::RateLimit);
    }

    #[tokio::test]
    async fn invocations_are_recorded() {
        let (registry, _token) = registry_with(FakeClock::shared());
        let instance = registry.create(ProviderKind::OpenAi, "k1");

        instance
            .invoke(ProviderRequest::prompt("event"))
            .await
            .expect("success");
        instance.set_scenario(ScenarioConfig::failing(Scenario::RateLimit));
        let _ = instance.invoke(ProviderRequest::prompt("event")).await;

        let log = instance.invocations();
        assert_eq!(instance.call_count(), 2);
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].content, Some(CannedContent::Event));
        assert!(log[0].succeeded);
        assert_eq!(log[1].scenario, Scenario::RateLimit);
        assert!(!log[1].succeeded);
    }
}
