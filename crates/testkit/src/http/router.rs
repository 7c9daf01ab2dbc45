//! In-process dispatch through an axum `Router`.
//!
//! Routes are grouped by the shape of their pattern (parameter names
//! erased) so two routes that differ only in parameter naming land on the
//! same axum path instead of conflicting. Each handler extracts its own
//! parameters from its own pattern.

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::Request;
use axum::response::{IntoResponse, Response};
use axum::routing::{on, MethodFilter, MethodRouter};
use axum::{Json, Router};

use super::types::{HttpMethod, MockRequest, MockResponse, Route};
use crate::infrastructure::ports::{ClockPort, HttpError};

fn method_filter(method: HttpMethod) -> MethodFilter {
    match method {
        HttpMethod::Get => MethodFilter::GET,
        HttpMethod::Post => MethodFilter::POST,
        HttpMethod::Put => MethodFilter::PUT,
        HttpMethod::Patch => MethodFilter::PATCH,
        HttpMethod::Delete => MethodFilter::DELETE,
    }
}

/// Check that a pattern is `/literal/{param}/...`.
pub(crate) fn validate_pattern(pattern: &str) -> Result<(), HttpError> {
    let invalid =
        |reason: &str| HttpError::Dispatch(format!("invalid route `{pattern}`: {reason}"));
    let Some(rest) = pattern.strip_prefix('/') else {
        return Err(invalid("must start with '/'"));
    };
    if rest.is_empty() {
        return Ok(());
    }
    for segment in rest.split('/') {
        if segment.is_empty() {
            return Err(invalid("empty segment"));
        }
        if let Some(name) = segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
            if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(invalid("parameter names must be identifiers"));
            }
        } else if segment.contains(['{', '}', '*']) || segment.starts_with(':') {
            return Err(invalid("only `{name}` parameters are supported"));
        }
    }
    Ok(())
}

/// Pattern with parameter names erased, as registered with axum.
pub(crate) fn route_shape(pattern: &str) -> String {
    let mut index = 0;
    pattern
        .split('/')
        .map(|segment| {
            if segment.starts_with('{') {
                index += 1;
                format!("{{p{index}}}")
            } else {
                segment.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Match `path` against `pattern`, returning the parameter values.
pub(crate) fn match_pattern(pattern: &str, path: &str) -> Option<HashMap<String, String>> {
    let pattern_segments: Vec<&str> = pattern.trim_end_matches('/').split('/').collect();
    let path_segments: Vec<&str> = path.trim_end_matches('/').split('/').collect();
    if pattern_segments.len() != path_segments.len() {
        return None;
    }
    let mut params = HashMap::new();
    for (expected, actual) in pattern_segments.iter().zip(&path_segments) {
        match expected.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
            Some(name) => {
                params.insert(name.to_string(), (*actual).to_string());
            }
            None if expected == actual => {}
            None => return None,
        }
    }
    Some(params)
}

fn not_found(method: &str, path: &str, clock: &Arc<dyn ClockPort>) -> Response {
    let response = MockResponse::error(404, format!("Route not found: {method} {path}"));
    into_axum(&response, clock)
}

fn into_axum(response: &MockResponse, clock: &Arc<dyn ClockPort>) -> Response {
    (response.status_code(), Json(response.body_json(clock.now()))).into_response()
}

fn endpoint(route: &Route, clock: Arc<dyn ClockPort>) -> MethodRouter {
    let handler = Arc::clone(&route.handler);
    let pattern = route.pattern.clone();
    let method = route.method;

    on(method_filter(method), move |request: Request| {
        let handler = Arc::clone(&handler);
        let pattern = pattern.clone();
        let clock = Arc::clone(&clock);
        async move {
            let path = request.uri().path().to_string();
            let query = request.uri().query().map(str::to_string);
            let body = match axum::body::to_bytes(request.into_body(), usize::MAX).await {
                Ok(bytes) if bytes.is_empty() => None,
                Ok(bytes) => match serde_json::from_slice(&bytes) {
                    Ok(value) => Some(value),
                    Err(e) => {
                        let response = MockResponse::error(400, format!("Invalid JSON body: {e}"));
                        return into_axum(&response, &clock);
                    }
                },
                Err(e) => {
                    let response = MockResponse::error(400, format!("Unreadable body: {e}"));
                    return into_axum(&response, &clock);
                }
            };
            let params = match_pattern(&pattern, &path).unwrap_or_default();
            let request = MockRequest {
                method,
                path,
                query,
                params,
                body,
            };
            into_axum(&handler(&request), &clock)
        }
    })
}

/// Build the router for the active route table.
///
/// `routes` is in priority order: the first route for a given method and
/// shape wins.
pub(crate) fn build_router(routes: &[Route], clock: &Arc<dyn ClockPort>) -> Router {
    let mut shapes: Vec<String> = Vec::new();
    let mut grouped: HashMap<String, (MethodRouter, Vec<HttpMethod>)> = HashMap::new();

    for route in routes {
        let shape = route_shape(&route.pattern);
        if !grouped.contains_key(&shape) {
            shapes.push(shape.clone());
        }
        let (router, methods) = grouped
            .remove(&shape)
            .unwrap_or_else(|| (MethodRouter::new(), Vec::new()));
        let (router, methods) = if methods.contains(&route.method) {
            (router, methods)
        } else {
            let mut methods = methods;
            methods.push(route.method);
            let endpoint = endpoint(route, Arc::clone(clock));
            (router.merge(endpoint), methods)
        };
        grouped.insert(shape, (router, methods));
    }

    let mut router = Router::new();
    for shape in shapes {
        if let Some((method_router, _)) = grouped.remove(&shape) {
            let fallback_clock = Arc::clone(clock);
            let method_router = method_router.fallback(move |request: Request| {
                let clock = Arc::clone(&fallback_clock);
                async move { not_found(request.method().as_str(), request.uri().path(), &clock) }
            });
            router = router.route(&shape, method_router);
        }
    }

    let fallback_clock = Arc::clone(clock);
    router.fallback(move |request: Request| {
        let clock = Arc::clone(&fallback_clock);
        async move { not_found(request.method().as_str(), request.uri().path(), &clock) }
    })
}

/// Build the axum request for an intercepted call.
pub(crate) fn to_axum_request(
    method: HttpMethod,
    path_and_query: &str,
    body: Option<&serde_json::Value>,
) -> Result<Request, HttpError> {
    let builder = axum::http::Request::builder()
        .method(method.to_axum())
        .uri(path_and_query);
    let request = match body {
        Some(body) => {
            let bytes =
                serde_json::to_vec(body).map_err(|e| HttpError::InvalidBody(e.to_string()))?;
            builder
                .header(axum::http::header::CONTENT_TYPE, "application/json")
                .body(Body::from(bytes))
        }
        None => builder.body(Body::empty()),
    };
    request.map_err(|e| HttpError::Dispatch(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shapes_erase_parameter_names() {
        assert_eq!(route_shape("/api/campaigns/{id}"), "/api/campaigns/{p1}");
        assert_eq!(
            route_shape("/api/campaigns/{campaign_id}/sessions"),
            "/api/campaigns/{p1}/sessions"
        );
    }

    #[test]
    fn matches_parameters() {
        let params = match_pattern("/api/campaigns/{id}/sessions", "/api/campaigns/camp-1/sessions")
            .expect("match");
        assert_eq!(params.get("id").map(String::as_str), Some("camp-1"));
        assert!(match_pattern("/api/campaigns/{id}", "/api/sessions/s1").is_none());
    }

    #[test]
    fn rejects_unsupported_patterns() {
        assert!(validate_pattern("/api/campaigns/{id}").is_ok());
        assert!(validate_pattern("/").is_ok());
        assert!(validate_pattern("api/campaigns").is_err());
        assert!(validate_pattern("/api/campaigns/:id").is_err());
        assert!(validate_pattern("/api/{*rest}").is_err());
        assert!(validate_pattern("/api//x").is_err());
    }
}
