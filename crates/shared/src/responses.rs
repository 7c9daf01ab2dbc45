//! REST response envelope
//!
//! Every production REST endpoint answers with the same envelope:
//!
//! ```json
//! { "success": true, "data": { ... }, "timestamp": "2024-01-01T00:00:00.000Z" }
//! { "success": false, "error": "Campaign not found", "timestamp": "..." }
//! ```

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// API Envelope
// =============================================================================

/// Response envelope returned by every REST endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiEnvelope {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// ISO-8601 timestamp (millisecond precision, `Z` suffix)
    pub timestamp: String,
}

impl ApiEnvelope {
    /// Create a success envelope with data
    pub fn success<T: Serialize>(data: T, at: DateTime<Utc>) -> Self {
        Self {
            success: true,
            data: Some(serde_json::to_value(data).unwrap_or_default()),
            error: None,
            timestamp: iso_timestamp(at),
        }
    }

    /// Create a success envelope without data
    pub fn success_empty(at: DateTime<Utc>) -> Self {
        Self {
            success: true,
            data: None,
            error: None,
            timestamp: iso_timestamp(at),
        }
    }

    /// Create an error envelope
    pub fn error(message: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
            timestamp: iso_timestamp(at),
        }
    }

    /// Check if this is a success envelope
    pub fn is_success(&self) -> bool {
        self.success
    }

    /// Deserialize the data payload into a concrete type.
    pub fn data_as<T: serde::de::DeserializeOwned>(&self) -> Option<T> {
        self.data
            .as_ref()
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }
}

/// Format a timestamp the way JavaScript's `Date#toISOString` does.
pub fn iso_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}
