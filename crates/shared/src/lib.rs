//! Tavern Shared - wire shapes mirrored by the test doubles
//!
//! This crate contains the envelopes the simulators in `tavern-testkit` must
//! reproduce field for field:
//! - Session broker messages (`SessionMessage`)
//! - REST response envelopes (`ApiEnvelope`)
//! - Hosted AI provider response bodies (chat, messages, generate-content)
//!
//! # Design Principles
//!
//! 1. **Minimal dependencies** - Only serde, serde_json and chrono
//! 2. **No business logic** - Pure data types and serialization
//! 3. **Exact field names** - Field names and nesting match the real wire formats

pub mod messages;
pub mod providers;
pub mod responses;

// =============================================================================
// Session Broker Messages
// =============================================================================
pub use messages::{SessionMessage, SessionMessageType};

// =============================================================================
// REST Envelopes
// =============================================================================
pub use responses::ApiEnvelope;

// =============================================================================
// Provider Response Bodies
// =============================================================================
pub use providers::{
    ChatChoice, ChatCompletionMessage, ChatCompletionResponse, ChatUsage, ContentBlock,
    GenerateContentResponse, GeneratedContent, MessagesResponse, MessagesUsage,
};
