//! Default handlers mirroring the production REST API.

use serde_json::{json, Value};

use super::types::{HttpMethod, MockRequest, MockResponse, Route};
use crate::providers::{CannedContent, ProviderKind};
use crate::store::fixtures::{CAMPAIGN_ID, SESSION_ID};

const CREATED_CAMPAIGN_ID: &str = "camp-new";
const CREATED_SESSION_ID: &str = "sess-new";

fn campaign(id: &str) -> Value {
    json!({
        "id": id,
        "name": "Shadows over Thornhaven",
        "description": "A frontier village is beset by disappearances.",
        "setting": "Low fantasy frontier",
        "status": "active",
        "createdAt": "2024-01-01T00:00:00.000Z",
        "updatedAt": "2024-01-01T00:00:00.000Z"
    })
}

fn session(id: &str, campaign_id: &str) -> Value {
    json!({
        "id": id,
        "campaignId": campaign_id,
        "name": "Arrival at Thornhaven",
        "sessionNumber": 1,
        "status": "planned",
        "createdAt": "2024-01-01T00:00:00.000Z"
    })
}

/// Shallow merge of the request body's fields over `base`.
fn merged(mut base: Value, request: &MockRequest) -> Value {
    if let (Some(target), Some(Value::Object(fields))) = (base.as_object_mut(), &request.body) {
        for (key, value) in fields {
            if key != "id" {
                target.insert(key.clone(), value.clone());
            }
        }
    }
    base
}

fn canned(content: CannedContent) -> Value {
    serde_json::from_str(&content.text()).unwrap_or(Value::Null)
}

fn health(_: &MockRequest) -> MockResponse {
    MockResponse::success(json!({ "status": "ok" }))
}

fn test_connection(request: &MockRequest) -> MockResponse {
    let kind = match request.body_str("provider").map(str::parse::<ProviderKind>) {
        Some(Ok(kind)) => kind,
        Some(Err(e)) => return MockResponse::error(400, e.to_string()),
        None => ProviderKind::OpenAi,
    };
    let model = request
        .body_str("model")
        .unwrap_or_else(|| kind.default_model());
    MockResponse::success(json!({
        "connected": true,
        "provider": kind.as_str(),
        "model": model,
    }))
}

fn generate_character(_: &MockRequest) -> MockResponse {
    MockResponse::success(canned(CannedContent::Character))
}

fn generate_event(_: &MockRequest) -> MockResponse {
    MockResponse::success(canned(CannedContent::Event))
}

fn list_campaigns(_: &MockRequest) -> MockResponse {
    MockResponse::success(json!([campaign(CAMPAIGN_ID)]))
}

fn create_campaign(request: &MockRequest) -> MockResponse {
    if request.body_str("name").map_or(true, str::is_empty) {
        return MockResponse::error(400, "Campaign name is required");
    }
    MockResponse::success_with_status(201, merged(campaign(CREATED_CAMPAIGN_ID), request))
}

fn get_campaign(request: &MockRequest) -> MockResponse {
    match request.param("id") {
        Some(id) if id == CAMPAIGN_ID || id == CREATED_CAMPAIGN_ID => {
            MockResponse::success(campaign(id))
        }
        _ => MockResponse::error(404, "Campaign not found"),
    }
}

fn update_campaign(request: &MockRequest) -> MockResponse {
    let id = request.param("id").unwrap_or(CAMPAIGN_ID);
    MockResponse::success(merged(campaign(id), request))
}

fn delete_campaign(_: &MockRequest) -> MockResponse {
    MockResponse::success_empty()
}

fn campaign_sessions(request: &MockRequest) -> MockResponse {
    let campaign_id = request.param("id").unwrap_or(CAMPAIGN_ID);
    MockResponse::success(json!([session(SESSION_ID, campaign_id)]))
}

fn create_session(request: &MockRequest) -> MockResponse {
    let Some(campaign_id) = request.body_str("campaignId") else {
        return MockResponse::error(400, "campaignId is required");
    };
    MockResponse::success_with_status(
        201,
        merged(session(CREATED_SESSION_ID, campaign_id), request),
    )
}

fn get_session(request: &MockRequest) -> MockResponse {
    match request.param("id") {
        Some(id) if id == SESSION_ID || id == CREATED_SESSION_ID => {
            MockResponse::success(session(id, CAMPAIGN_ID))
        }
        _ => MockResponse::error(404, "Session not found"),
    }
}

fn update_session(request: &MockRequest) -> MockResponse {
    let id = request.param("id").unwrap_or(SESSION_ID);
    MockResponse::success(merged(session(id, CAMPAIGN_ID), request))
}

fn delete_session(_: &MockRequest) -> MockResponse {
    MockResponse::success_empty()
}

/// The default route table.
pub fn default_routes() -> Vec<Route> {
    use HttpMethod::{Delete, Get, Post, Put};

    vec![
        Route::new(Get, "/api/health", health),
        Route::new(Post, "/api/ai/test-connection", test_connection),
        Route::new(Post, "/api/ai/generate-character", generate_character),
        Route::new(Post, "/api/ai/generate-event", generate_event),
        Route::new(Get, "/api/campaigns", list_campaigns),
        Route::new(Post, "/api/campaigns", create_campaign),
        Route::new(Get, "/api/campaigns/{id}", get_campaign),
        Route::new(Put, "/api/campaigns/{id}", update_campaign),
        Route::new(Delete, "/api/campaigns/{id}", delete_campaign),
        Route::new(Get, "/api/campaigns/{id}/sessions", campaign_sessions),
        Route::new(Post, "/api/sessions", create_session),
        Route::new(Get, "/api/sessions/{id}", get_session),
        Route::new(Put, "/api/sessions/{id}", update_session),
        Route::new(Delete, "/api/sessions/{id}", delete_session),
    ]
}
