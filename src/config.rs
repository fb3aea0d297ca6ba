//! Application configuration
//!
//! Centralized configuration management with environment variable support
//! and sensible defaults.

use std::env;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Text-generation API configuration
    pub llm: LlmConfig,
    /// Agent loop configuration
    pub agent: AgentConfig,
    /// Research notifier configuration
    pub research: ResearchConfig,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to bind the server to
    pub port: u16,
    /// Host address to bind to
    pub host: String,
}

/// Text-generation API configuration
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// API key for the chat-completions API
    pub api_key: String,
    /// Base URL of the chat-completions API
    pub base_url: String,
    /// Model name used for planning, query generation and synthesis
    pub model: String,
    /// Per-call timeout in seconds
    pub timeout_secs: u64,
}

/// Agent loop configuration
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Maximum generate-execute-repair attempts per plan step
    pub max_attempts_per_step: u32,
    /// Maximum accepted query length, inbound or generated, in characters
    pub max_query_length: usize,
}

/// Research notifier configuration
#[derive(Debug, Clone)]
pub struct ResearchConfig {
    /// Base URL of the research task API
    pub base_url: String,
    /// API key sent as `x-api-key` to the research task API
    pub api_key: String,
    /// Seconds between completion-status polls
    pub poll_interval_secs: u64,
    /// Hard ceiling on poll attempts (180 * 5s = 15 minutes)
    pub max_poll_attempts: u32,
}

impl Config {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self {
            server: ServerConfig {
                port: env::var("PORT")
                    .ok()
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(8080),
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            },
            llm: LlmConfig {
                api_key: env::var("LLM_API_KEY").unwrap_or_default(),
                base_url: env::var("LLM_BASE_URL")
                    .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
                model: env::var("LLM_MODEL").unwrap_or_else(|_| "gpt-4.1".to_string()),
                timeout_secs: env::var("LLM_TIMEOUT_SECS")
                    .ok()
                    .and_then(|t| t.parse().ok())
                    .unwrap_or(30),
            },
            agent: AgentConfig {
                max_attempts_per_step: env::var("AGENT_MAX_ATTEMPTS_PER_STEP")
                    .ok()
                    .and_then(|t| t.parse().ok())
                    .unwrap_or(5),
                max_query_length: env::var("AGENT_MAX_QUERY_LENGTH")
                    .ok()
                    .and_then(|t| t.parse().ok())
                    .unwrap_or(10_000),
            },
            research: ResearchConfig {
                base_url: env::var("RESEARCH_API_BASE_URL")
                    .unwrap_or_else(|_| "https://app.example.com/api".to_string()),
                api_key: env::var("RESEARCH_API_KEY").unwrap_or_default(),
                poll_interval_secs: env::var("RESEARCH_POLL_INTERVAL_SECS")
                    .ok()
                    .and_then(|t| t.parse().ok())
                    .unwrap_or(5),
                max_poll_attempts: env::var("RESEARCH_MAX_POLL_ATTEMPTS")
                    .ok()
                    .and_then(|t| t.parse().ok())
                    .unwrap_or(180),
            },
        }
    }

    /// Get the server address as a string
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_attempts_per_step: 5,
            max_query_length: 10_000,
        }
    }
}
