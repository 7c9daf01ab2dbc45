//! HTTP Boundary Simulator.
//!
//! Intercepts outbound calls to one base URL and answers them in-process
//! through an axum router with canned envelopes shaped like the production
//! REST API. Calls outside the base URL are refused.

mod router;
mod routes;
mod types;

use std::collections::HashSet;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use tower::ServiceExt;

pub use routes::default_routes;
pub use types::{
    HttpMethod, HttpResponse, MockBody, MockRequest, MockResponse, RecordedRequest, Route,
    RouteHandler,
};

use crate::infrastructure::clock::Suspension;
use crate::infrastructure::ports::{HttpError, RandomPort};
use crate::infrastructure::sync::{lock, read, write};

/// Interception behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpSettings {
    pub base_url: String,
    /// Delay before each response (zero answers immediately)
    pub latency: Duration,
    /// Randomly answer 503
    pub simulate_errors: bool,
    pub error_probability: f64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3001".to_string(),
            latency: Duration::ZERO,
            simulate_errors: false,
            error_probability: 0.1,
        }
    }
}

#[derive(Default)]
struct Interception {
    installed: bool,
    overrides: Vec<Route>,
    server_errors: HashSet<String>,
    network_errors: HashSet<String>,
}

/// The HTTP boundary.
pub struct HttpBoundary {
    settings: HttpSettings,
    suspension: Suspension,
    random: Arc<dyn RandomPort>,
    defaults: Vec<Route>,
    interception: RwLock<Interception>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl HttpBoundary {
    /// Create the boundary with interception installed and default routes.
    pub fn setup(
        settings: HttpSettings,
        suspension: Suspension,
        random: Arc<dyn RandomPort>,
    ) -> Self {
        let base_url = settings.base_url.trim_end_matches('/').to_string();
        tracing::debug!(base_url = %base_url, "HTTP interception installed");
        Self {
            settings: HttpSettings {
                base_url,
                ..settings
            },
            suspension,
            random,
            defaults: default_routes(),
            interception: RwLock::new(Interception {
                installed: true,
                ..Interception::default()
            }),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn settings(&self) -> &HttpSettings {
        &self.settings
    }

    pub fn base_url(&self) -> &str {
        &self.settings.base_url
    }

    /// Absolute URL for a path under the base URL.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.settings.base_url, path)
    }

    pub fn is_installed(&self) -> bool {
        read(&self.interception).installed
    }

    /// Reinstall interception after a teardown.
    pub fn install(&self) {
        write(&self.interception).installed = true;
        tracing::debug!(base_url = %self.settings.base_url, "HTTP interception installed");
    }

    /// Remove interception entirely; later calls fail with `NotInstalled`.
    pub fn teardown(&self) {
        *write(&self.interception) = Interception::default();
        lock(&self.requests).clear();
        tracing::debug!("HTTP interception removed");
    }

    /// Add a route or override a default one until the next `reset_mocks`.
    pub fn use_route(&self, route: Route) -> Result<(), HttpError> {
        router::validate_pattern(&route.pattern)?;
        tracing::debug!(method = %route.method, pattern = %route.pattern, "HTTP route overridden");
        write(&self.interception).overrides.insert(0, route);
        Ok(())
    }

    /// Shorthand for `use_route(Route::new(..))`.
    pub fn use_handler<F>(
        &self,
        method: HttpMethod,
        pattern: &str,
        handler: F,
    ) -> Result<(), HttpError>
    where
        F: Fn(&MockRequest) -> MockResponse + Send + Sync + 'static,
    {
        self.use_route(Route::new(method, pattern, handler))
    }

    /// Answer every call to `path` with a 500 error envelope.
    pub fn simulate_server_error(&self, path: &str) {
        write(&self.interception)
            .server_errors
            .insert(path.to_string());
    }

    /// Fail every call to `path` before any response is produced.
    pub fn simulate_network_error(&self, path: &str) {
        write(&self.interception)
            .network_errors
            .insert(path.to_string());
    }

    /// Restore the default handler set and forget recorded requests.
    pub fn reset_mocks(&self) {
        {
            let mut interception = write(&self.interception);
            interception.overrides.clear();
            interception.server_errors.clear();
            interception.network_errors.clear();
        }
        lock(&self.requests).clear();
        tracing::debug!("HTTP mocks reset");
    }

    /// Every intercepted call since the last reset, in call order.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        lock(&self.requests).clone()
    }

    pub async fn get(&self, url: &str) -> Result<HttpResponse, HttpError> {
        self.fetch(HttpMethod::Get, url, None).await
    }

    pub async fn post(
        &self,
        url: &str,
        body: serde_json::Value,
    ) -> Result<HttpResponse, HttpError> {
        self.fetch(HttpMethod::Post, url, Some(body)).await
    }

    pub async fn put(&self, url: &str, body: serde_json::Value) -> Result<HttpResponse, HttpError> {
        self.fetch(HttpMethod::Put, url, Some(body)).await
    }

    pub async fn delete(&self, url: &str) -> Result<HttpResponse, HttpError> {
        self.fetch(HttpMethod::Delete, url, None).await
    }

    /// Issue an outbound call through the interception layer.
    pub async fn fetch(
        &self,
        method: HttpMethod,
        url: &str,
        body: Option<serde_json::Value>,
    ) -> Result<HttpResponse, HttpError> {
        let path_and_query = self.intercept(method, url)?;
        let path = path_and_query
            .split('?')
            .next()
            .unwrap_or_default()
            .to_string();

        lock(&self.requests).push(RecordedRequest {
            method,
            url: url.to_string(),
            path: path.clone(),
            body: body.clone(),
        });
        tracing::debug!(method = %method, path = %path, "Intercepted HTTP call");

        self.suspension.pause(self.settings.latency).await?;

        let (network_error, server_error, routes) = {
            let interception = read(&self.interception);
            let routes: Vec<Route> = interception
                .overrides
                .iter()
                .chain(self.defaults.iter())
                .cloned()
                .collect();
            (
                interception.network_errors.contains(&path),
                interception.server_errors.contains(&path),
                routes,
            )
        };

        if network_error {
            tracing::debug!(path = %path, "Simulated network failure");
            return Err(HttpError::NetworkFailure { path });
        }
        let now = self.suspension.clock().now();
        if server_error {
            return Ok(canned(&MockResponse::error(500, "Internal Server Error"), now));
        }
        if self.settings.simulate_errors && self.random.gen_unit() < self.settings.error_probability
        {
            tracing::debug!(path = %path, "Simulated 503");
            return Ok(canned(&MockResponse::error(503, "Service Unavailable"), now));
        }

        let router = router::build_router(&routes, self.suspension.clock());
        let request = router::to_axum_request(method, &path_and_query, body.as_ref())?;
        let response = router
            .oneshot(request)
            .await
            .map_err(|e| HttpError::Dispatch(e.to_string()))?;

        let status = response.status().as_u16();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .map_err(|e| HttpError::InvalidBody(e.to_string()))?;
        let body = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).map_err(|e| HttpError::InvalidBody(e.to_string()))?
        };
        Ok(HttpResponse { status, body })
    }

    /// Path (and query) under the base URL, or the reason the call is refused.
    fn intercept(&self, method: HttpMethod, url: &str) -> Result<String, HttpError> {
        if !self.is_installed() {
            return Err(HttpError::NotInstalled);
        }
        let unintercepted = || HttpError::Unintercepted {
            method: method.to_string(),
            url: url.to_string(),
        };
        let rest = url
            .strip_prefix(self.settings.base_url.as_str())
            .ok_or_else(unintercepted)?;
        match rest.chars().next() {
            None => Ok("/".to_string()),
            Some('/') => Ok(rest.to_string()),
            Some('?') => Ok(format!("/{rest}")),
            Some(_) => Err(unintercepted()),
        }
    }
}

fn canned(response: &MockResponse, at: chrono::DateTime<chrono::Utc>) -> HttpResponse {
    HttpResponse {
        status: response.status,
        body: response.body_json(at),
    }
}

impl std::fmt::Debug for HttpBoundary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBoundary")
            .field("settings", &self.settings)
            .field("installed", &self.is_installed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::infrastructure::clock::{FakeClock, FixedRandom};

    fn boundary(settings: HttpSettings) -> (HttpBoundary, Arc<FakeClock>) {
        let clock = FakeClock::shared();
        let boundary = HttpBoundary::setup(
            settings,
            Suspension::new(clock.clone(), CancellationToken::new()),
            Arc::new(FixedRandom(0.05)),
        );
        (boundary, clock)
    }

    #[tokio::test]
    async fn health_answers_with_envelope() {
        let (http, _clock) = boundary(HttpSettings::default());
        let response = http.get(&http.url("/api/health")).await.expect("health");

        assert_eq!(response.status, 200);
        let envelope = response.envelope().expect("envelope");
        assert!(envelope.success);
        assert_eq!(envelope.data, Some(json!({"status": "ok"})));
        assert_eq!(envelope.timestamp, "2024-01-01T00:00:00.000Z");
    }

    #[tokio::test]
    async fn campaign_crud_routes() {
        let (http, _clock) = boundary(HttpSettings::default());

        let created = http
            .post(&http.url("/api/campaigns"), json!({"name": "New Saga"}))
            .await
            .expect("create");
        assert_eq!(created.status, 201);
        assert_eq!(created.body["data"]["name"], "New Saga");

        let missing = http
            .get(&http.url("/api/campaigns/nope"))
            .await
            .expect("lookup");
        assert_eq!(missing.status, 404);
        assert_eq!(missing.body["success"], false);
        assert_eq!(missing.body["error"], "Campaign not found");

        let sessions = http
            .get(&http.url("/api/campaigns/camp-1/sessions"))
            .await
            .expect("sessions");
        assert_eq!(sessions.body["data"][0]["campaignId"], "camp-1");

        let deleted = http
            .delete(&http.url("/api/sessions/sess-1"))
            .await
            .expect("delete");
        assert!(deleted.ok());
        assert!(deleted.body.get("data").is_none());
    }

    #[tokio::test]
    async fn generate_character_returns_canned_record() {
        let (http, _clock) = boundary(HttpSettings::default());
        let response = http
            .post(&http.url("/api/ai/generate-character"), json!({"prompt": "a wizard"}))
            .await
            .expect("generate");
        assert_eq!(response.body["data"]["name"], "Elara Moonwhisper");
    }

    #[tokio::test]
    async fn custom_handler_overrides_until_reset() {
        let (http, _clock) = boundary(HttpSettings::default());
        http.use_handler(HttpMethod::Get, "/api/campaigns/{campaign}", |request| {
            MockResponse::success(json!({ "id": request.param("campaign"), "custom": true }))
        })
        .expect("valid route");

        let response = http
            .get(&http.url("/api/campaigns/camp-7"))
            .await
            .expect("custom");
        assert_eq!(response.body["data"], json!({"id": "camp-7", "custom": true}));

        http.reset_mocks();
        let response = http
            .get(&http.url("/api/campaigns/camp-7"))
            .await
            .expect("default");
        assert_eq!(response.status, 404);
    }

    #[tokio::test]
    async fn unmatched_routes_answer_404_envelope() {
        let (http, _clock) = boundary(HttpSettings::default());
        let response = http.get(&http.url("/api/unknown")).await.expect("404");
        assert_eq!(response.status, 404);
        let envelope = response.envelope().expect("envelope");
        assert!(!envelope.success);
        assert!(envelope.error.expect("error").contains("/api/unknown"));
    }

    #[tokio::test]
    async fn outside_base_url_is_refused() {
        let (http, _clock) = boundary(HttpSettings::default());
        let err = http
            .get("https://api.openai.com/v1/models")
            .await
            .expect_err("strict interception");
        assert!(matches!(err, HttpError::Unintercepted { .. }));
        assert!(http.requests().is_empty());
    }

    #[tokio::test]
    async fn fault_injection() {
        let (http, _clock) = boundary(HttpSettings::default());
        http.simulate_server_error("/api/campaigns");
        http.simulate_network_error("/api/health");

        let response = http.get(&http.url("/api/campaigns")).await.expect("500");
        assert_eq!(response.status, 500);
        assert_eq!(response.body["success"], false);

        let err = http
            .get(&http.url("/api/health"))
            .await
            .expect_err("network");
        assert_eq!(
            err,
            HttpError::NetworkFailure {
                path: "/api/health".to_string()
            }
        );
        assert_eq!(http.requests().len(), 2);
    }

    #[tokio::test]
    async fn random_service_unavailable() {
        let (http, _clock) = boundary(HttpSettings {
            simulate_errors: true,
            error_probability: 0.1,
            ..HttpSettings::default()
        });
        let response = http.get(&http.url("/api/health")).await.expect("503");
        assert_eq!(response.status, 503);
    }

    #[tokio::test]
    async fn latency_uses_injected_clock() {
        let (http, clock) = boundary(HttpSettings {
            latency: Duration::from_millis(50),
            ..HttpSettings::default()
        });
        let http = Arc::new(http);

        let call = {
            let http = Arc::clone(&http);
            tokio::spawn(async move { http.get(&http.url("/api/health")).await })
        };
        clock.wait_for_timers(1).await;
        assert!(!call.is_finished());

        clock.advance(Duration::from_millis(50));
        let response = call.await.expect("join").expect("health");
        assert_eq!(response.status, 200);
    }

    #[tokio::test]
    async fn teardown_removes_interception() {
        let (http, _clock) = boundary(HttpSettings::default());
        http.teardown();
        let err = http.get(&http.url("/api/health")).await.expect_err("removed");
        assert_eq!(err, HttpError::NotInstalled);

        http.install();
        assert!(http.get(&http.url("/api/health")).await.is_ok());
    }
}
