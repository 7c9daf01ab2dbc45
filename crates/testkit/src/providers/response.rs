//! Provider-shaped response bodies.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tavern_shared::{
    ChatChoice, ChatCompletionMessage, ChatCompletionResponse, ChatUsage, ContentBlock,
    GenerateContentResponse, GeneratedContent, MessagesResponse, MessagesUsage,
};

use super::content::estimate_tokens;
use super::kind::ProviderKind;

/// Body of a successful simulated call, in the shape of the provider family.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ProviderResponse {
    Chat(ChatCompletionResponse),
    Messages(MessagesResponse),
    Generate(GenerateContentResponse),
}

impl ProviderResponse {
    /// Build the body a provider of `kind` would return for `text`.
    pub(crate) fn build(
        kind: ProviderKind,
        model: &str,
        prompt: &str,
        text: String,
        sequence: u64,
        created: DateTime<Utc>,
    ) -> Self {
        let prompt_tokens = estimate_tokens(prompt);
        let completion_tokens = estimate_tokens(&text);

        match kind {
            ProviderKind::OpenAi => ProviderResponse::Chat(ChatCompletionResponse {
                id: format!("chatcmpl-sim-{sequence:06}"),
                object: "chat.completion".to_string(),
                created: created.timestamp(),
                model: model.to_string(),
                choices: vec![ChatChoice {
                    index: 0,
                    message: ChatCompletionMessage {
                        role: "assistant".to_string(),
                        content: text,
                    },
                    finish_reason: "stop".to_string(),
                }],
                usage: ChatUsage {
                    total_tokens: prompt_tokens + completion_tokens,
                    prompt_tokens,
                    completion_tokens,
                },
            }),
            ProviderKind::Anthropic => ProviderResponse::Messages(MessagesResponse {
                id: format!("msg_sim_{sequence:06}"),
                response_type: "message".to_string(),
                role: "assistant".to_string(),
                model: model.to_string(),
                content: vec![ContentBlock::text(text)],
                stop_reason: "end_turn".to_string(),
                usage: MessagesUsage {
                    input_tokens: prompt_tokens,
                    output_tokens: completion_tokens,
                },
            }),
            ProviderKind::Gemini => ProviderResponse::Generate(GenerateContentResponse {
                response: GeneratedContent::new(text),
            }),
        }
    }

    /// Generated text, regardless of shape.
    pub fn text(&self) -> String {
        match self {
            ProviderResponse::Chat(body) => body.first_content().unwrap_or_default().to_string(),
            ProviderResponse::Messages(body) => body.joined_text(),
            ProviderResponse::Generate(body) => body.response.text().to_string(),
        }
    }

    /// The wire JSON of this body.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }

    pub fn as_chat(&self) -> Option<&ChatCompletionResponse> {
        match self {
            ProviderResponse::Chat(body) => Some(body),
            _ => None,
        }
    }

    pub fn as_messages(&self) -> Option<&MessagesResponse> {
        match self {
            ProviderResponse::Messages(body) => Some(body),
            _ => None,
        }
    }

    pub fn as_generate(&self) -> Option<&GenerateContentResponse> {
        match self {
            ProviderResponse::Generate(body) => Some(body),
            _ => None,
        }
    }
}
