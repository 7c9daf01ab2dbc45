//! Error types for simulator operations.
//!
//! None of these carry a credential: provider identities are reduced to a
//! fingerprint before anything is stored.

use crate::providers::Scenario;

/// Marker returned by a suspension point when the owning simulator shut down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("operation cancelled by simulator shutdown")]
pub struct Cancelled;

/// Errors surfaced by a simulated AI provider.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProviderError {
    /// Deliberate failure selected by the active scenario.
    #[error("{message}")]
    Scenario { scenario: Scenario, message: String },

    #[error("Unknown AI provider: {0}")]
    UnknownProvider(String),

    #[error("Provider call cancelled by simulator shutdown")]
    Cancelled,
}

impl ProviderError {
    /// Scenario that produced this error, if it was scenario-induced.
    pub fn scenario(&self) -> Option<Scenario> {
        match self {
            Self::Scenario { scenario, .. } => Some(*scenario),
            _ => None,
        }
    }

    /// Whether a real client would normally retry this failure.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.scenario(),
            Some(Scenario::ApiError | Scenario::Timeout | Scenario::RateLimit)
        )
    }
}

impl From<Cancelled> for ProviderError {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}

/// Data store errors with context for debugging.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    /// Insert referenced a parent row that does not exist.
    #[error(
        "Foreign key constraint violation: {table}.{column} = '{value}' has no matching row in {referenced_table}.{referenced_column}"
    )]
    ForeignKeyViolation {
        table: String,
        column: String,
        referenced_table: String,
        referenced_column: String,
        value: String,
    },

    /// Delete of a parent row that children still reference.
    #[error(
        "Foreign key constraint violation: {table} row '{id}' is still referenced by {child_table}.{child_column}"
    )]
    StillReferenced {
        table: String,
        id: String,
        child_table: String,
        child_column: String,
    },

    #[error("Unknown table: {0}")]
    UnknownTable(String),

    #[error("UNIQUE constraint failed: {table}.id = '{id}'")]
    DuplicateKey { table: String, id: String },

    #[error("Invalid row for {table}: {reason}")]
    InvalidRow { table: String, reason: String },

    #[error("Unsupported query: {0}")]
    UnsupportedQuery(String),

    #[error("Statement expects {expected} parameters, got {actual}")]
    ParameterCount { expected: usize, actual: usize },
}

impl StoreError {
    /// Check if this is a foreign key failure (insert or delete side).
    pub fn is_foreign_key_violation(&self) -> bool {
        matches!(
            self,
            Self::ForeignKeyViolation { .. } | Self::StillReferenced { .. }
        )
    }
}

/// Errors from the simulated realtime transport.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BrokerError {
    #[error("Client {client_id} is not connected")]
    NotConnected { client_id: String },

    #[error("Client {client_id} has not joined session {session_id}")]
    NotInSession {
        client_id: String,
        session_id: String,
    },

    #[error("Simulated transport error on client {client_id} after {emitted} events")]
    SimulatedTransport { client_id: String, emitted: u64 },

    #[error("Session broker shut down")]
    Cancelled,
}

impl From<Cancelled> for BrokerError {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}

/// Errors from the HTTP interception layer.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HttpError {
    #[error("HTTP interception is not installed")]
    NotInstalled,

    /// Strict interception: calls outside the base URL are refused.
    #[error("No interception for {method} {url}")]
    Unintercepted { method: String, url: String },

    #[error("Simulated network failure for {path}")]
    NetworkFailure { path: String },

    #[error("Invalid response body: {0}")]
    InvalidBody(String),

    #[error("Dispatch failed: {0}")]
    Dispatch(String),

    #[error("HTTP boundary shut down")]
    Cancelled,
}

impl From<Cancelled> for HttpError {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}

/// Misuse of the orchestrator's lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LifecycleError {
    #[error("Mock server is not running (called {operation})")]
    NotRunning { operation: &'static str },

    #[error("{subsystem} mocks are disabled in the current configuration")]
    SubsystemDisabled { subsystem: &'static str },
}

/// Invalid or conflicting configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("Configuration cannot be updated while the mock server is running")]
    UpdateWhileRunning,

    #[error("Conflicting options {first} and {second}: {reason}")]
    Conflict {
        first: &'static str,
        second: &'static str,
        reason: String,
    },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

/// Umbrella error for callers driving the whole bundle.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MockServerError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Broker(#[from] BrokerError),
    #[error(transparent)]
    Http(#[from] HttpError),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}
