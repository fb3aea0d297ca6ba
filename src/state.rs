//! Shared application state
//!
//! Handlers receive an `Arc<AppState>`. The LLM and CRM sides sit behind
//! trait objects so tests can swap in scripted implementations without any
//! network access.

use crate::config::Config;
use crate::crm::client::CrmConnector;
use crate::crm::rest::RestCrmConnector;
use crate::error::AppError;
use crate::llm::{OpenAiGenerator, TextGenerator};
use std::sync::Arc;

pub struct AppState {
    pub config: Config,
    pub llm: Arc<dyn TextGenerator>,
    pub crm: Arc<dyn CrmConnector>,
    pub http: reqwest::Client,
}

impl AppState {
    /// Wire up production components from configuration
    pub fn from_config(config: Config) -> Result<Self, AppError> {
        let llm = OpenAiGenerator::from_config(&config.llm)?;
        let http = reqwest::Client::new();
        let crm = RestCrmConnector::new(http.clone());
        Ok(Self {
            config,
            llm: Arc::new(llm),
            crm: Arc::new(crm),
            http,
        })
    }

    /// Assemble state from explicit components, used by tests
    pub fn with_components(
        config: Config,
        llm: Arc<dyn TextGenerator>,
        crm: Arc<dyn CrmConnector>,
    ) -> Self {
        Self {
            config,
            llm,
            crm,
            http: reqwest::Client::new(),
        }
    }
}
