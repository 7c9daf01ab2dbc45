//! Mock server configuration.
//!
//! Field names follow the JSON configuration surface (`aiProviders`,
//! `websocket`, `database`, `http`, `general`). Every section defaults
//! field by field, so a partial document or a partial environment overlay
//! is always complete.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::broker::BrokerSettings;
use crate::http::HttpSettings;
use crate::infrastructure::ports::ConfigurationError;
use crate::providers::{Scenario, ScenarioConfig};
use crate::store::StoreOptions;

/// Top-level configuration consumed by `MockServer::start`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MockServerConfig {
    pub ai_providers: AiProvidersConfig,
    pub websocket: WebsocketConfig,
    pub database: DatabaseConfig,
    pub http: HttpConfig,
    pub general: GeneralConfig,
}

/// Provider simulator section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AiProvidersConfig {
    pub enable_mocks: bool,
    pub default_scenario: Scenario,
    pub simulate_latency: bool,
    /// Delay applied to every call when `simulate_latency` is set
    pub latency_ms: u64,
}

impl Default for AiProvidersConfig {
    fn default() -> Self {
        Self {
            enable_mocks: true,
            default_scenario: Scenario::Success,
            simulate_latency: false,
            latency_ms: 100,
        }
    }
}

/// Session broker section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WebsocketConfig {
    pub enable_mocks: bool,
    pub simulate_latency: bool,
    pub latency_ms: u64,
    pub simulate_errors: bool,
    pub error_threshold: u64,
    pub error_probability: f64,
}

impl Default for WebsocketConfig {
    fn default() -> Self {
        Self {
            enable_mocks: true,
            simulate_latency: false,
            latency_ms: 10,
            simulate_errors: false,
            error_threshold: 5,
            error_probability: 0.1,
        }
    }
}

/// Data store section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DatabaseConfig {
    pub enable_mocks: bool,
    /// Only the in-memory store exists; `false` is rejected by `validate`
    pub in_memory: bool,
    pub seed_test_data: bool,
    pub enable_foreign_keys: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            enable_mocks: true,
            in_memory: true,
            seed_test_data: true,
            enable_foreign_keys: true,
        }
    }
}

/// HTTP boundary section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HttpConfig {
    pub enable_mocks: bool,
    #[serde(rename = "baseURL")]
    pub base_url: String,
    pub simulate_latency: bool,
    pub latency_ms: u64,
    pub simulate_errors: bool,
    pub error_probability: f64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enable_mocks: true,
            base_url: "http://localhost:3001".to_string(),
            simulate_latency: false,
            latency_ms: 50,
            simulate_errors: false,
            error_probability: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GeneralConfig {
    pub enable_logging: bool,
    pub reset_between_tests: bool,
    /// Seeds every random draw when set
    pub random_seed: Option<u64>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            enable_logging: false,
            reset_between_tests: true,
            random_seed: None,
        }
    }
}

impl MockServerConfig {
    /// Everything enabled, no latency, no injected errors, no seed data.
    pub fn minimal() -> Self {
        let mut config = Self::default();
        config.database.seed_test_data = false;
        config
    }

    pub fn with_default_scenario(mut self, scenario: Scenario) -> Self {
        self.ai_providers.default_scenario = scenario;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.general.random_seed = Some(seed);
        self
    }

    /// Load defaults overlaid with `TAVERN_MOCK_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigurationError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Like `from_env`, reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigurationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let overlay = Overlay { lookup: &lookup };

        let ai = &mut config.ai_providers;
        overlay.apply("TAVERN_MOCK_AI_ENABLED", &mut ai.enable_mocks)?;
        overlay.apply("TAVERN_MOCK_AI_SCENARIO", &mut ai.default_scenario)?;
        overlay.apply("TAVERN_MOCK_AI_LATENCY", &mut ai.simulate_latency)?;
        overlay.apply("TAVERN_MOCK_AI_LATENCY_MS", &mut ai.latency_ms)?;

        let ws = &mut config.websocket;
        overlay.apply("TAVERN_MOCK_WS_ENABLED", &mut ws.enable_mocks)?;
        overlay.apply("TAVERN_MOCK_WS_LATENCY", &mut ws.simulate_latency)?;
        overlay.apply("TAVERN_MOCK_WS_LATENCY_MS", &mut ws.latency_ms)?;
        overlay.apply("TAVERN_MOCK_WS_ERRORS", &mut ws.simulate_errors)?;
        overlay.apply("TAVERN_MOCK_WS_ERROR_THRESHOLD", &mut ws.error_threshold)?;
        overlay.apply("TAVERN_MOCK_WS_ERROR_PROBABILITY", &mut ws.error_probability)?;

        let db = &mut config.database;
        overlay.apply("TAVERN_MOCK_DB_ENABLED", &mut db.enable_mocks)?;
        overlay.apply("TAVERN_MOCK_DB_IN_MEMORY", &mut db.in_memory)?;
        overlay.apply("TAVERN_MOCK_DB_SEED", &mut db.seed_test_data)?;
        overlay.apply("TAVERN_MOCK_DB_FOREIGN_KEYS", &mut db.enable_foreign_keys)?;

        let http = &mut config.http;
        overlay.apply("TAVERN_MOCK_HTTP_ENABLED", &mut http.enable_mocks)?;
        overlay.apply("TAVERN_MOCK_HTTP_BASE_URL", &mut http.base_url)?;
        overlay.apply("TAVERN_MOCK_HTTP_LATENCY", &mut http.simulate_latency)?;
        overlay.apply("TAVERN_MOCK_HTTP_LATENCY_MS", &mut http.latency_ms)?;
        overlay.apply("TAVERN_MOCK_HTTP_ERRORS", &mut http.simulate_errors)?;
        overlay.apply("TAVERN_MOCK_HTTP_ERROR_PROBABILITY", &mut http.error_probability)?;

        let general = &mut config.general;
        overlay.apply("TAVERN_MOCK_LOGGING", &mut general.enable_logging)?;
        overlay.apply("TAVERN_MOCK_RESET_BETWEEN_TESTS", &mut general.reset_between_tests)?;
        if let Some(seed) = overlay.parse::<u64>("TAVERN_MOCK_SEED")? {
            general.random_seed = Some(seed);
        }

        Ok(config)
    }

    /// Reject options that contradict each other or cannot be honored.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        // seedTestData only applies to the mock database and is ignored without it.
        if self.database.enable_mocks && !self.database.in_memory {
            return Err(ConfigurationError::Conflict {
                first: "database.inMemory",
                second: "database.enableMocks",
                reason: "only the in-memory store is available".to_string(),
            });
        }
        check_probability(
            "websocket.errorProbability",
            self.websocket.error_probability,
        )?;
        check_probability("http.errorProbability", self.http.error_probability)?;

        let base_url = &self.http.base_url;
        let scheme_ok = base_url.starts_with("http://") || base_url.starts_with("https://");
        let host = base_url.split_once("://").map(|(_, rest)| rest).unwrap_or("");
        if !scheme_ok || host.is_empty() || host.starts_with('/') {
            return Err(ConfigurationError::InvalidValue {
                key: "http.baseURL".to_string(),
                value: base_url.clone(),
            });
        }
        Ok(())
    }

    pub(crate) fn scenario_config(&self) -> ScenarioConfig {
        let ai = &self.ai_providers;
        ScenarioConfig {
            scenario: ai.default_scenario,
            delay_ms: if ai.simulate_latency { ai.latency_ms } else { 0 },
            ..ScenarioConfig::default()
        }
    }

    pub(crate) fn broker_settings(&self) -> BrokerSettings {
        let ws = &self.websocket;
        BrokerSettings {
            latency: latency(ws.simulate_latency, ws.latency_ms),
            simulate_errors: ws.simulate_errors,
            error_threshold: ws.error_threshold,
            error_probability: ws.error_probability,
        }
    }

    pub(crate) fn store_options(&self) -> StoreOptions {
        StoreOptions {
            enable_foreign_keys: self.database.enable_foreign_keys,
            seed_test_data: self.database.seed_test_data,
        }
    }

    pub(crate) fn http_settings(&self) -> HttpSettings {
        let http = &self.http;
        HttpSettings {
            base_url: http.base_url.clone(),
            latency: latency(http.simulate_latency, http.latency_ms),
            simulate_errors: http.simulate_errors,
            error_probability: http.error_probability,
        }
    }
}

fn latency(enabled: bool, millis: u64) -> Duration {
    if enabled {
        Duration::from_millis(millis)
    } else {
        Duration::ZERO
    }
}

fn check_probability(key: &str, value: f64) -> Result<(), ConfigurationError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigurationError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        })
    }
}

/// Environment overlay.
struct Overlay<'a, F> {
    lookup: &'a F,
}

impl<F> Overlay<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn parse<T: ConfigValue>(&self, key: &str) -> Result<Option<T>, ConfigurationError> {
        let Some(raw) = (self.lookup)(key) else {
            return Ok(None);
        };
        T::parse_value(raw.trim())
            .map(Some)
            .ok_or_else(|| ConfigurationError::InvalidValue {
                key: key.to_string(),
                value: raw,
            })
    }

    fn apply<T: ConfigValue>(&self, key: &str, target: &mut T) -> Result<(), ConfigurationError> {
        if let Some(value) = self.parse(key)? {
            *target = value;
        }
        Ok(())
    }
}

/// Values that can be read from an environment variable.
trait ConfigValue: Sized {
    fn parse_value(raw: &str) -> Option<Self>;
}

impl ConfigValue for bool {
    fn parse_value(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        }
    }
}

impl ConfigValue for u64 {
    fn parse_value(raw: &str) -> Option<Self> {
        raw.parse().ok()
    }
}

impl ConfigValue for f64 {
    fn parse_value(raw: &str) -> Option<Self> {
        raw.parse().ok()
    }
}

impl ConfigValue for String {
    fn parse_value(raw: &str) -> Option<Self> {
        Some(raw.to_string())
    }
}

impl ConfigValue for Scenario {
    fn parse_value(raw: &str) -> Option<Self> {
        Scenario::from_str(raw).ok()
    }
}
