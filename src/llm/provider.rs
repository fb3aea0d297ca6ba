//! Text-generation provider trait
//!
//! `TextGenerator` is the seam between the agent loop and the hosted model.
//! The loop treats generated text as untrusted and parses it defensively, so
//! the trait deliberately returns plain strings.

use crate::config::LlmConfig;
use crate::error::AppError;
use crate::llm::api_client;
use async_trait::async_trait;
use std::time::Duration;

/// Options for a single generation call
#[derive(Debug, Clone, Copy)]
pub struct GenerationOptions {
    /// Request JSON-object output from the model
    pub force_json: bool,
    /// Upper bound on generated tokens
    pub max_tokens: u32,
    /// Sampling temperature
    pub temperature: f32,
}

impl GenerationOptions {
    /// Options for plan generation (larger budget, low temperature, JSON)
    pub fn plan() -> Self {
        Self {
            force_json: true,
            max_tokens: 1000,
            temperature: 0.1,
        }
    }

    /// Options for per-step query generation (plain text, low temperature)
    pub fn step_query() -> Self {
        Self {
            force_json: false,
            max_tokens: 300,
            temperature: 0.1,
        }
    }

    /// Options for fallback query generation
    pub fn fallback_query() -> Self {
        Self {
            force_json: false,
            max_tokens: 200,
            temperature: 0.2,
        }
    }

    /// Options for final result synthesis (JSON, slightly warmer)
    pub fn synthesis() -> Self {
        Self {
            force_json: true,
            max_tokens: 800,
            temperature: 0.2,
        }
    }
}

/// Abstraction over the text-generation call
///
/// Output is untrusted text: callers must attempt a structured parse and fall
/// back to templated defaults on failure, never propagate a parse error to
/// the HTTP caller.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate text for a prompt
    async fn generate(&self, prompt: &str, opts: GenerationOptions) -> Result<String, AppError>;
}

/// Production `TextGenerator` backed by the chat-completions API
pub struct OpenAiGenerator {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiGenerator {
    /// Build a generator from configuration
    ///
    /// # Errors
    /// Returns `AppError::Internal` if the HTTP client cannot be constructed.
    pub fn from_config(config: &LlmConfig) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            base_url: config.base_url.clone(),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl TextGenerator for OpenAiGenerator {
    async fn generate(&self, prompt: &str, opts: GenerationOptions) -> Result<String, AppError> {
        api_client::call_chat_api(
            &self.client,
            &self.api_key,
            &self.base_url,
            &self.model,
            prompt,
            opts.force_json,
            opts.max_tokens,
            opts.temperature,
        )
        .await
    }
}
