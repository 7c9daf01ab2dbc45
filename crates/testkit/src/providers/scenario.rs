//! Scenarios and the outcome decision.
//!
//! `decide` is a pure function of the captured scenario, the request and the
//! invocation context. The delay and dispatch mechanics live in the registry.

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::content::CannedContent;
use super::kind::ProviderKind;
use super::request::ProviderRequest;
use super::response::ProviderResponse;
use crate::infrastructure::ports::{ConfigurationError, ProviderError};

/// Outcome mode selected by the test author.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scenario {
    #[default]
    Success,
    ApiError,
    Timeout,
    RateLimit,
    InvalidKey,
    ModelNotFound,
}

impl Scenario {
    pub const ALL: [Scenario; 6] = [
        Scenario::Success,
        Scenario::ApiError,
        Scenario::Timeout,
        Scenario::RateLimit,
        Scenario::InvalidKey,
        Scenario::ModelNotFound,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Scenario::Success => "success",
            Scenario::ApiError => "api_error",
            Scenario::Timeout => "timeout",
            Scenario::RateLimit => "rate_limit",
            Scenario::InvalidKey => "invalid_key",
            Scenario::ModelNotFound => "model_not_found",
        }
    }

    pub fn is_failure(&self) -> bool {
        !matches!(self, Scenario::Success)
    }
}

impl std::fmt::Display for Scenario {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scenario {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Scenario::ALL
            .into_iter()
            .find(|scenario| scenario.as_str() == s.trim())
            .ok_or_else(|| ConfigurationError::InvalidValue {
                key: "scenario".to_string(),
                value: s.to_string(),
            })
    }
}

/// Active scenario of a provider instance. Replaced wholesale by
/// `set_scenario`, never merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScenarioConfig {
    pub scenario: Scenario,
    pub delay_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_response_body: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_error: Option<String>,
}

impl ScenarioConfig {
    pub fn success() -> Self {
        Self::default()
    }

    pub fn failing(scenario: Scenario) -> Self {
        Self {
            scenario,
            ..Self::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_custom_response_body(mut self, body: serde_json::Value) -> Self {
        self.custom_response_body = Some(body);
        self
    }

    pub fn with_custom_error(mut self, message: impl Into<String>) -> Self {
        self.custom_error = Some(message.into());
        self
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// Facts about one invocation that are not part of the request.
#[derive(Debug, Clone, Copy)]
pub struct InvocationContext {
    pub kind: ProviderKind,
    /// 1-based call number on the instance
    pub sequence: u64,
    pub created: DateTime<Utc>,
}

/// Result of a simulated call, before the delay is applied.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success {
        body: ProviderResponse,
        content: CannedContent,
    },
    Failure {
        scenario: Scenario,
        message: String,
    },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }

    pub fn into_result(self) -> Result<ProviderResponse, ProviderError> {
        match self {
            Outcome::Success { body, .. } => Ok(body),
            Outcome::Failure { scenario, message } => {
                Err(ProviderError::Scenario { scenario, message })
            }
        }
    }
}

/// Decide what a call produces under `config`.
pub fn decide(
    config: &ScenarioConfig,
    request: &ProviderRequest,
    ctx: &InvocationContext,
) -> Outcome {
    let model = request
        .model
        .as_deref()
        .unwrap_or_else(|| ctx.kind.default_model());

    if config.scenario.is_failure() {
        let message = config
            .custom_error
            .clone()
            .unwrap_or_else(|| failure_message(config, ctx.kind, model));
        return Outcome::Failure {
            scenario: config.scenario,
            message,
        };
    }

    let prompt = request.prompt_text();
    let content = CannedContent::for_prompt(&prompt);
    let text = match &config.custom_response_body {
        Some(serde_json::Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
        None => content.text(),
    };

    Outcome::Success {
        body: ProviderResponse::build(ctx.kind, model, &prompt, text, ctx.sequence, ctx.created),
        content,
    }
}

fn failure_message(config: &ScenarioConfig, kind: ProviderKind, model: &str) -> String {
    let scenario = config.scenario;
    match scenario {
        Scenario::ApiError => {
            format!("{scenario}: {kind} returned an internal server error (500)")
        }
        Scenario::Timeout => format!(
            "{scenario}: {kind} request timed out after {}ms",
            config.delay_ms
        ),
        Scenario::RateLimit => {
            format!("{scenario}: {kind} rate limit exceeded (429), retry later")
        }
        Scenario::InvalidKey => format!("{scenario}: {kind} rejected the API key (401)"),
        Scenario::ModelNotFound => {
            format!("{scenario}: {kind} model '{model}' does not exist (404)")
        }
        Scenario::Success => format!("{scenario}: no failure"),
    }
}
