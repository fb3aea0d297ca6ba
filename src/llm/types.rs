//! Chat-completions API types
//!
//! Structs that mirror the chat-completions JSON request/response format.
//! Used to serialize requests and deserialize API responses into typed
//! Rust structs.

use serde::{Deserialize, Serialize};

/// Request structure for the chat-completions API
#[derive(Serialize, Debug)]
pub struct ChatApiRequest {
    /// Model name (e.g. "gpt-4.1")
    pub model: String,
    /// Conversation messages; the agent always sends a single user message
    pub messages: Vec<ChatMessage>,
    /// Upper bound on generated tokens
    pub max_tokens: u32,
    /// Sampling temperature
    pub temperature: f32,
    /// Optional response format (e.g. force JSON object output)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
}

/// A single chat message
#[derive(Serialize, Debug)]
pub struct ChatMessage {
    /// Role of the message author ("user", "system")
    pub role: String,
    /// Message text
    pub content: String,
}

/// Response format hint for structured output
#[derive(Serialize, Debug)]
pub struct ResponseFormat {
    /// Format type; "json_object" forces valid JSON output
    #[serde(rename = "type")]
    pub format_type: String,
}

/// Top-level chat-completions API response
#[derive(Deserialize, Debug)]
pub struct ChatApiResponse {
    /// List of candidate completions from the model
    pub choices: Vec<Choice>,
}

/// A single candidate completion
#[derive(Deserialize, Debug)]
pub struct Choice {
    /// The message of this candidate
    pub message: ResponseMessage,
    /// Why the model stopped generating (if applicable)
    #[serde(default)]
    #[allow(dead_code)] // Part of API response format, may be used in future
    pub finish_reason: Option<String>,
}

/// The message content of a candidate completion
#[derive(Deserialize, Debug)]
pub struct ResponseMessage {
    /// The text content of the completion
    pub content: String,
}
