//! End-to-end scenarios for the agentic query loop, driven by scripted
//! LLM and CRM implementations so no network access is needed.

use async_trait::async_trait;
use axum::extract::State;
use axum::Json;
use crm_agent_backend::agent::synthesizer::synthesize;
use crm_agent_backend::agent::{
    AgentRunner, ExecutionContext, Plan, PlanStep, RunLedger, StepResult,
};
use crm_agent_backend::api::agentic::{agentic_query, AgenticRequest};
use crm_agent_backend::config::{
    AgentConfig, Config, LlmConfig, ResearchConfig, ServerConfig,
};
use crm_agent_backend::crm::client::{CrmClient, CrmConnector};
use crm_agent_backend::crm::error::{ConnectionError, QueryFailure};
use crm_agent_backend::crm::types::{CrmCredentials, QueryResult, Record};
use crm_agent_backend::error::AppError;
use crm_agent_backend::llm::{GenerationOptions, TextGenerator};
use crm_agent_backend::state::AppState;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Hands out canned responses strictly in order; errors when exhausted
struct QueueLlm {
    responses: Mutex<VecDeque<String>>,
}

impl QueueLlm {
    fn new(responses: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.iter().map(|s| s.to_string()).collect()),
        })
    }
}

#[async_trait]
impl TextGenerator for QueueLlm {
    async fn generate(&self, _prompt: &str, _opts: GenerationOptions) -> Result<String, AppError> {
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| AppError::Generation("scripted responses exhausted".to_string()))
    }
}

/// Routes each query through a scripted handler and logs what was executed
struct ScriptedCrm {
    handler: Box<dyn Fn(&str) -> Result<QueryResult, QueryFailure> + Send + Sync>,
    fields: Vec<String>,
    executed: Mutex<Vec<String>>,
}

impl ScriptedCrm {
    fn new(
        handler: impl Fn(&str) -> Result<QueryResult, QueryFailure> + Send + Sync + 'static,
    ) -> Self {
        Self {
            handler: Box::new(handler),
            fields: vec![
                "Id".to_string(),
                "Name".to_string(),
                "Amount".to_string(),
                "StageName".to_string(),
            ],
            executed: Mutex::new(Vec::new()),
        }
    }

    fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl CrmClient for ScriptedCrm {
    async fn execute(&self, query: &str) -> Result<QueryResult, QueryFailure> {
        self.executed.lock().unwrap().push(query.to_string());
        (self.handler)(query)
    }

    async fn describe_fields(&self, _entity: &str) -> Result<Vec<String>, QueryFailure> {
        Ok(self.fields.clone())
    }
}

fn record(pairs: &[(&str, &str)]) -> Record {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), serde_json::json!(v)))
        .collect()
}

fn one_record_result(pairs: &[(&str, &str)]) -> QueryResult {
    QueryResult {
        records: vec![record(pairs)],
        total_size: 1,
    }
}

const TWO_STEP_PLAN: &str = r#"{"steps": [
    {"step_number": 1, "description": "Find the Acme account"},
    {"step_number": 2, "description": "Fetch its open opportunities"}
]}"#;

const SYNTHESIS: &str = r#"{"answer": "Acme has one open opportunity worth 50000.",
    "insights": ["Single large deal in play"],
    "metrics": {"open_opportunities": 1},
    "recommendations": ["Prioritize the Acme renewal"]}"#;

#[tokio::test]
async fn test_happy_path_two_steps() {
    let llm = QueueLlm::new(&[
        TWO_STEP_PLAN,
        "SELECT Id, Name FROM Account WHERE Name = 'Acme' LIMIT 1",
        "SELECT Id, Amount FROM Opportunity WHERE AccountId = '001ABC000001' LIMIT 10",
        SYNTHESIS,
    ]);
    let crm = ScriptedCrm::new(|query| {
        if query.contains("FROM Account") {
            Ok(one_record_result(&[("Id", "001ABC000001"), ("Name", "Acme")]))
        } else {
            Ok(one_record_result(&[("Id", "006XYZ000001"), ("Amount", "50000")]))
        }
    });

    let runner = AgentRunner::new(llm, AgentConfig::default());
    let report = runner
        .run(&crm, "What are Acme's open opportunities?", None)
        .await
        .unwrap();

    assert!(!report.ledger.is_empty());
    assert_eq!(report.steps_completed(), 2);
    assert_eq!(report.queries_executed.len(), 2);
    assert!(report.errors.is_empty());
    assert!(report.corrections.is_empty());
    assert_eq!(
        report.final_result.answer,
        "Acme has one open opportunity worth 50000."
    );
    // Step 1's account id was absorbed into the context
    assert_eq!(report.context.get("account_id"), Some("001ABC000001"));
}

#[tokio::test]
async fn test_bind_variable_failure_is_repaired_inline() {
    let llm = QueueLlm::new(&[
        TWO_STEP_PLAN,
        "SELECT Id, Name FROM Account WHERE Name = 'Acme' LIMIT 1",
        "SELECT Id FROM Opportunity WHERE AccountId = :accountId LIMIT 10",
        SYNTHESIS,
    ]);
    let crm = ScriptedCrm::new(|query| {
        if query.contains(":accountId") {
            Err(QueryFailure::classify(
                "MALFORMED_QUERY: Bind variables only allowed in Apex code",
            ))
        } else if query.contains("FROM Account") {
            Ok(one_record_result(&[("Id", "001ABC000001"), ("Name", "Acme")]))
        } else {
            Ok(one_record_result(&[("Id", "006XYZ000001")]))
        }
    });

    let runner = AgentRunner::new(llm, AgentConfig::default());
    let report = runner
        .run(&crm, "What are Acme's open opportunities?", None)
        .await
        .unwrap();

    assert_eq!(report.steps_completed(), 2);
    assert_eq!(report.corrections.len(), 1);
    assert_eq!(report.errors.len(), 1);
    let correction = &report.corrections[0];
    assert!(correction.contains("step_2"));
    assert!(correction.contains("bind-variable substitution"));
    assert!(correction.contains("AccountId = '001ABC000001'"));
    // Only queries that actually ran successfully are recorded
    assert_eq!(report.queries_executed.len(), 2);
    assert!(report
        .queries_executed
        .iter()
        .all(|q| !q.contains(":accountId")));
}

#[tokio::test]
async fn test_invalid_field_is_repaired_via_schema() {
    let plan = r#"{"steps": [{"step_number": 1, "description": "Fetch opportunity amounts"}]}"#;
    let llm = QueueLlm::new(&[
        plan,
        "SELECT Id, Ammount FROM Opportunity LIMIT 5",
        SYNTHESIS,
    ]);
    let crm = ScriptedCrm::new(|query| {
        if query.contains("Ammount") {
            Err(QueryFailure::classify(
                "INVALID_FIELD: No such column 'Ammount' on entity 'Opportunity'",
            ))
        } else {
            Ok(one_record_result(&[("Id", "006XYZ000001"), ("Amount", "50000")]))
        }
    });

    let runner = AgentRunner::new(llm, AgentConfig::default());
    let report = runner.run(&crm, "Total pipeline value?", None).await.unwrap();

    assert_eq!(report.steps_completed(), 1);
    assert_eq!(report.corrections.len(), 1);
    assert!(report.corrections[0].contains("invalid-field substitution"));
    assert!(report.corrections[0].contains("SELECT Id, Amount FROM Opportunity LIMIT 5"));
}

#[tokio::test]
async fn test_failed_step_never_aborts_the_run() {
    let plan = r#"{"steps": [
        {"step_number": 1, "description": "Fetch leads"},
        {"step_number": 2, "description": "Fetch accounts"}
    ]}"#;
    let lead_query = "SELECT Id FROM Lead LIMIT 10";
    let llm = QueueLlm::new(&[
        plan,
        lead_query,
        lead_query,
        lead_query,
        lead_query,
        lead_query,
        "SELECT Id FROM Lead LIMIT 200",
        "SELECT Id, Name FROM Account LIMIT 10",
        SYNTHESIS,
    ]);
    let crm = ScriptedCrm::new(|query| {
        if query.contains("FROM Lead") {
            Err(QueryFailure::other("REQUEST_LIMIT_EXCEEDED: try later"))
        } else {
            Ok(one_record_result(&[("Id", "001ABC000001"), ("Name", "Acme")]))
        }
    });

    let runner = AgentRunner::new(llm, AgentConfig::default());
    let report = runner.run(&crm, "Summarize our pipeline", None).await.unwrap();

    // Step 1 exhausted its attempts plus one fallback, step 2 still ran
    assert!(report.ledger.has_result_for_step(2));
    assert!(!report.ledger.has_result_for_step(1));
    assert!(!report.ledger.is_empty());
    assert_eq!(report.errors.len(), 6);
    assert_eq!(report.queries_executed.len(), 1);
    assert_eq!(crm.executed().len(), 7);
}

/// Always returns the same canned response
struct ConstLlm(&'static str);

#[async_trait]
impl TextGenerator for ConstLlm {
    async fn generate(&self, _prompt: &str, _opts: GenerationOptions) -> Result<String, AppError> {
        Ok(self.0.to_string())
    }
}

#[tokio::test]
async fn test_synthesis_is_idempotent_over_the_same_run_data() {
    let llm = ConstLlm(SYNTHESIS);
    let plan = Plan {
        steps: vec![PlanStep {
            step_number: 1,
            description: "Find the Acme account".to_string(),
            purpose: String::new(),
            expected_outcome: String::new(),
            fallback_description: None,
        }],
    };
    let mut ledger = RunLedger::new();
    ledger.insert_primary(StepResult {
        step_number: 1,
        description: "Find the Acme account".to_string(),
        query: "SELECT Id, Name FROM Account WHERE Name = 'Acme' LIMIT 1".to_string(),
        records: vec![record(&[("Id", "001ABC000001"), ("Name", "Acme")])],
        total_size: 1,
    });
    let mut context = ExecutionContext::new();
    context.set_if_absent("account_id", "001ABC000001");

    let first = synthesize(&llm, "Acme overview", &plan, &ledger, &context, 1).await;
    let second = synthesize(&llm, "Acme overview", &plan, &ledger, &context, 1).await;

    assert_eq!(first, second);
    assert_eq!(first.answer, "Acme has one open opportunity worth 50000.");
}

// --- HTTP handler level ---

struct RefusingConnector;

#[async_trait]
impl CrmConnector for RefusingConnector {
    async fn connect(
        &self,
        _credentials: &CrmCredentials,
    ) -> Result<Box<dyn CrmClient>, ConnectionError> {
        Err(ConnectionError::from_raw(
            "INVALID_LOGIN: Invalid username, password, security token",
        ))
    }
}

fn test_config() -> Config {
    Config {
        server: ServerConfig {
            port: 0,
            host: "127.0.0.1".to_string(),
        },
        llm: LlmConfig {
            api_key: "test".to_string(),
            base_url: "http://localhost:1".to_string(),
            model: "test-model".to_string(),
            timeout_secs: 5,
        },
        agent: AgentConfig::default(),
        research: ResearchConfig {
            base_url: "http://localhost:1".to_string(),
            api_key: "test".to_string(),
            poll_interval_secs: 0,
            max_poll_attempts: 1,
        },
    }
}

fn credentials() -> CrmCredentials {
    CrmCredentials {
        username: "u@example.com".to_string(),
        password: "secret".to_string(),
        security_token: "tok".to_string(),
        is_sandbox: false,
    }
}

#[tokio::test]
async fn test_connection_failure_is_a_200_with_success_false() {
    let llm = QueueLlm::new(&[]);
    let state = Arc::new(AppState::with_components(
        test_config(),
        llm,
        Arc::new(RefusingConnector),
    ));

    let Json(response) = agentic_query(
        State(state),
        Json(AgenticRequest {
            user_query: "anything".to_string(),
            credentials: credentials(),
        }),
    )
    .await
    .unwrap();

    assert!(!response.success);
    assert!(response.message.contains("verify your username and password"));
    assert!(response.queries_executed.is_empty());
    assert_eq!(response.errors_encountered.len(), 1);
    assert!(response.final_result.is_none());
}

#[tokio::test]
async fn test_blank_objective_is_rejected_as_invalid_request() {
    let llm = QueueLlm::new(&[]);
    let state = Arc::new(AppState::with_components(
        test_config(),
        llm,
        Arc::new(RefusingConnector),
    ));

    let result = agentic_query(
        State(state),
        Json(AgenticRequest {
            user_query: "  ".to_string(),
            credentials: credentials(),
        }),
    )
    .await;

    assert!(matches!(result, Err(AppError::InvalidRequest(_))));
}
