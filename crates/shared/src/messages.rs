//! Session broker message types
//!
//! A `SessionMessage` is the unit of broadcast inside a session room. The
//! envelope matches the realtime transport used by the production server:
//!
//! ```json
//! { "type": "gm_response", "sessionId": "s1", "data": { ... }, "timestamp": "..." }
//! ```
//!
//! ## Versioning Policy
//!
//! - New message types can be added at the end (forward compatible)
//! - Unknown types deserialize to `Unknown` so older listeners keep working

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of message flowing through a session room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMessageType {
    /// A participant joined the room
    JoinSession,
    /// A participant left the room
    LeaveSession,
    /// A player acted in the session
    PlayerAction,
    /// The game master (or GM agent) responded
    GmResponse,
    /// Session-wide state changed
    SessionUpdate,
    /// Unknown variant for forward compatibility
    #[serde(other)]
    Unknown,
}

impl SessionMessageType {
    /// Wire name of this message type.
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionMessageType::JoinSession => "join_session",
            SessionMessageType::LeaveSession => "leave_session",
            SessionMessageType::PlayerAction => "player_action",
            SessionMessageType::GmResponse => "gm_response",
            SessionMessageType::SessionUpdate => "session_update",
            SessionMessageType::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for SessionMessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message broadcast to every member of a session room.
///
/// Immutable once emitted: listeners receive clones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMessage {
    #[serde(rename = "type")]
    pub message_type: SessionMessageType,
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

impl SessionMessage {
    /// Create a message without player or payload.
    pub fn new(
        message_type: SessionMessageType,
        session_id: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            message_type,
            session_id: session_id.into(),
            player_id: None,
            data: None,
            timestamp,
        }
    }

    pub fn with_player(mut self, player_id: impl Into<String>) -> Self {
        self.player_id = Some(player_id.into());
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn serializes_with_wire_field_names() {
        let ts = Utc
            .timestamp_opt(1_700_000_000, 0)
            .single()
            .expect("valid timestamp");
        let message = SessionMessage::new(SessionMessageType::PlayerAction, "s1", ts)
            .with_player("p1")
            .with_data(serde_json::json!({"action": "search"}));

        let json = serde_json::to_value(&message).expect("serialize");
        assert_eq!(json["type"], "player_action");
        assert_eq!(json["sessionId"], "s1");
        assert_eq!(json["playerId"], "p1");
        assert_eq!(json["data"]["action"], "search");
        assert!(json["timestamp"].is_string());
    }

    #[test]
    fn omits_absent_optional_fields() {
        let message = SessionMessage::new(SessionMessageType::SessionUpdate, "s1", Utc::now());
        let json = serde_json::to_value(&message).expect("serialize");
        assert!(json.get("playerId").is_none());
        assert!(json.get("data").is_none());
    }

    #[test]
    fn unknown_type_falls_back() {
        let raw = r#"{"type":"dice_roll","sessionId":"s1","timestamp":"2024-01-01T00:00:00Z"}"#;
        let message: SessionMessage = serde_json::from_str(raw).expect("deserialize");
        assert_eq!(message.message_type, SessionMessageType::Unknown);
    }
}
