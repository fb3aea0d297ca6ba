//! Agentic CRM query endpoint
//!
//! One request runs one complete agentic loop: connect, plan, execute with
//! repair, synthesize. Domain failures (a step exhausting its attempts, the
//! connection being refused) are reported in a 200 body with `success`
//! reflecting whether any data was retrieved; only a malformed request body
//! produces a 4xx.

use crate::agent::{AgentRunner, ExecutionContext, FinalResult, Plan};
use crate::crm::error::ConnectionError;
use crate::crm::types::CrmCredentials;
use crate::error::AppError;
use crate::state::AppState;
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct AgenticRequest {
    /// Natural-language business question to answer from CRM data
    pub user_query: String,
    /// Credentials for the CRM org to query
    pub credentials: CrmCredentials,
}

#[derive(Debug, Serialize)]
pub struct AgenticResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_result: Option<FinalResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<Plan>,
    pub steps_completed: usize,
    pub total_steps: usize,
    pub step_results: serde_json::Map<String, serde_json::Value>,
    pub execution_context: ExecutionContext,
    pub queries_executed: Vec<String>,
    pub corrections_made: Vec<String>,
    pub errors_encountered: Vec<String>,
}

impl AgenticResponse {
    /// The body returned when the CRM connection itself fails. Nothing ran,
    /// so every collection is empty and success is false.
    fn connection_failed(error: &ConnectionError) -> Self {
        Self {
            success: false,
            message: error.message.clone(),
            final_result: None,
            plan: None,
            steps_completed: 0,
            total_steps: 0,
            step_results: serde_json::Map::new(),
            execution_context: ExecutionContext::new(),
            queries_executed: Vec::new(),
            corrections_made: Vec::new(),
            errors_encountered: vec![error.message.clone()],
        }
    }
}

/// Validate the request body; only this path can produce a 4xx
pub fn validate_request(request: &AgenticRequest, max_query_length: usize) -> Result<(), AppError> {
    if request.user_query.trim().is_empty() {
        return Err(AppError::InvalidRequest(
            "user_query must not be empty".to_string(),
        ));
    }
    if request.user_query.chars().count() > max_query_length {
        return Err(AppError::InvalidRequest(format!(
            "user_query exceeds {max_query_length} characters"
        )));
    }
    if request.credentials.username.trim().is_empty()
        || request.credentials.password.is_empty()
    {
        return Err(AppError::InvalidRequest(
            "credentials.username and credentials.password are required".to_string(),
        ));
    }
    Ok(())
}

/// POST /api/crm/agentic
pub async fn agentic_query(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AgenticRequest>,
) -> Result<Json<AgenticResponse>, AppError> {
    validate_request(&request, state.config.agent.max_query_length)?;
    info!(
        query_chars = request.user_query.chars().count(),
        username = %request.credentials.username,
        "Agentic query received"
    );

    let crm = match state.crm.connect(&request.credentials).await {
        Ok(client) => client,
        Err(e) => {
            tracing::warn!(error = %e, "CRM connection failed");
            return Ok(Json(AgenticResponse::connection_failed(&e)));
        }
    };

    let runner = AgentRunner::new(state.llm.clone(), state.config.agent.clone());
    let report = runner.run(crm.as_ref(), &request.user_query, None).await?;

    Ok(Json(report_to_response(report)))
}

/// Flatten a run report into the response body
pub fn report_to_response(report: crate::agent::RunReport) -> AgenticResponse {
    let success = !report.ledger.is_empty();
    let steps_completed = report.steps_completed();
    let total_steps = report.plan.steps.len();
    let message = if success {
        format!("Completed {steps_completed} of {total_steps} plan steps")
    } else {
        format!("No step produced data ({total_steps} steps attempted)")
    };

    AgenticResponse {
        success,
        message,
        final_result: Some(report.final_result),
        plan: Some(report.plan),
        steps_completed,
        total_steps,
        step_results: report.ledger.to_json(),
        execution_context: report.context,
        queries_executed: report.queries_executed,
        corrections_made: report.corrections,
        errors_encountered: report
            .errors
            .records()
            .iter()
            .map(|r| r.to_string())
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX_LEN: usize = 10_000;

    fn valid_request() -> AgenticRequest {
        AgenticRequest {
            user_query: "What are our biggest open opportunities?".to_string(),
            credentials: CrmCredentials {
                username: "u@example.com".to_string(),
                password: "secret".to_string(),
                security_token: "tok".to_string(),
                is_sandbox: false,
            },
        }
    }

    #[test]
    fn test_validate_accepts_well_formed_request() {
        assert!(validate_request(&valid_request(), MAX_LEN).is_ok());
    }

    #[test]
    fn test_validate_rejects_blank_query() {
        let mut request = valid_request();
        request.user_query = "   ".to_string();
        assert!(matches!(
            validate_request(&request, MAX_LEN),
            Err(AppError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_validate_rejects_oversized_query() {
        let mut request = valid_request();
        request.user_query = "x".repeat(MAX_LEN + 1);
        assert!(validate_request(&request, MAX_LEN).is_err());
    }

    #[test]
    fn test_validate_rejects_missing_credentials() {
        let mut request = valid_request();
        request.credentials.password = String::new();
        assert!(validate_request(&request, MAX_LEN).is_err());
    }

    #[test]
    fn test_connection_failed_body_is_empty_and_unsuccessful() {
        let response =
            AgenticResponse::connection_failed(&ConnectionError::from_raw("INVALID_LOGIN: nope"));
        assert!(!response.success);
        assert!(response.final_result.is_none());
        assert!(response.queries_executed.is_empty());
        assert_eq!(response.errors_encountered.len(), 1);
    }
}
