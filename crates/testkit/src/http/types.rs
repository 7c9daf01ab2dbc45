//! Request and response types of the HTTP boundary.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use axum::http::{Method, StatusCode};
use chrono::{DateTime, Utc};
use tavern_shared::ApiEnvelope;

use crate::infrastructure::ports::{ConfigurationError, HttpError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }

    pub(crate) fn to_axum(self) -> Method {
        match self {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
            HttpMethod::Put => Method::PUT,
            HttpMethod::Patch => Method::PATCH,
            HttpMethod::Delete => Method::DELETE,
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "PATCH" => Ok(HttpMethod::Patch),
            "DELETE" => Ok(HttpMethod::Delete),
            _ => Err(ConfigurationError::InvalidValue {
                key: "method".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// What a route handler sees.
#[derive(Debug, Clone, PartialEq)]
pub struct MockRequest {
    pub method: HttpMethod,
    /// Path relative to the base URL, without the query string
    pub path: String,
    pub query: Option<String>,
    /// Values of `{param}` segments in the route pattern
    pub params: HashMap<String, String>,
    pub body: Option<serde_json::Value>,
}

impl MockRequest {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// String field of a JSON object body.
    pub fn body_str(&self, field: &str) -> Option<&str> {
        self.body.as_ref()?.get(field)?.as_str()
    }
}

/// Body produced by a handler.
#[derive(Debug, Clone, PartialEq)]
pub enum MockBody {
    /// Standard envelope; the timestamp is stamped at dispatch
    Envelope {
        success: bool,
        data: Option<serde_json::Value>,
        error: Option<String>,
    },
    /// Arbitrary JSON, sent as is
    Raw(serde_json::Value),
}

/// Response produced by a handler.
#[derive(Debug, Clone, PartialEq)]
pub struct MockResponse {
    pub status: u16,
    pub body: MockBody,
}

impl MockResponse {
    /// 200 with `{success: true, data}`.
    pub fn success(data: serde_json::Value) -> Self {
        Self::success_with_status(200, data)
    }

    pub fn success_with_status(status: u16, data: serde_json::Value) -> Self {
        Self {
            status,
            body: MockBody::Envelope {
                success: true,
                data: Some(data),
                error: None,
            },
        }
    }

    /// 200 with `{success: true}` and no data.
    pub fn success_empty() -> Self {
        Self {
            status: 200,
            body: MockBody::Envelope {
                success: true,
                data: None,
                error: None,
            },
        }
    }

    /// `{success: false, error}` with the given status.
    pub fn error(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            body: MockBody::Envelope {
                success: false,
                data: None,
                error: Some(message.into()),
            },
        }
    }

    pub fn raw(status: u16, body: serde_json::Value) -> Self {
        Self {
            status,
            body: MockBody::Raw(body),
        }
    }

    /// Wire JSON of the body, stamping envelopes with `at`.
    pub(crate) fn body_json(&self, at: DateTime<Utc>) -> serde_json::Value {
        match &self.body {
            MockBody::Envelope {
                success,
                data,
                error,
            } => {
                let envelope = match (success, error) {
                    (true, _) => match data {
                        Some(data) => ApiEnvelope::success(data, at),
                        None => ApiEnvelope::success_empty(at),
                    },
                    (false, error) => {
                        let mut envelope =
                            ApiEnvelope::error(error.clone().unwrap_or_default(), at);
                        envelope.data = data.clone();
                        envelope
                    }
                };
                serde_json::to_value(envelope).unwrap_or_default()
            }
            MockBody::Raw(value) => value.clone(),
        }
    }

    pub(crate) fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

/// A route handler.
pub type RouteHandler = Arc<dyn Fn(&MockRequest) -> MockResponse + Send + Sync>;

/// One registered route.
#[derive(Clone)]
pub struct Route {
    pub method: HttpMethod,
    pub pattern: String,
    pub handler: RouteHandler,
}

impl Route {
    pub fn new<F>(method: HttpMethod, pattern: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&MockRequest) -> MockResponse + Send + Sync + 'static,
    {
        Self {
            method,
            pattern: pattern.into(),
            handler: Arc::new(handler),
        }
    }
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Route({} {})", self.method, self.pattern)
    }
}

/// Response returned to the caller of `fetch`.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: serde_json::Value,
}

impl HttpResponse {
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Parse the body as the standard envelope.
    pub fn envelope(&self) -> Result<ApiEnvelope, HttpError> {
        serde_json::from_value(self.body.clone()).map_err(|e| HttpError::InvalidBody(e.to_string()))
    }

    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, HttpError> {
        serde_json::from_value(self.body.clone()).map_err(|e| HttpError::InvalidBody(e.to_string()))
    }
}

/// An intercepted call, as recorded for assertions.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub method: HttpMethod,
    pub url: String,
    pub path: String,
    pub body: Option<serde_json::Value>,
}
