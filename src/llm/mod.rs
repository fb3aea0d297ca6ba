//! Text-generation module
//!
//! Contains the HTTP client for the chat-completions API and the
//! `TextGenerator` trait that the agent loop depends on. The trait is the
//! dependency-injection seam: production wires in `OpenAiGenerator`, tests
//! wire in deterministic stubs.

pub mod api_client;
pub mod provider;
pub mod types;

pub use provider::{GenerationOptions, OpenAiGenerator, TextGenerator};
