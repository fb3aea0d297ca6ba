//! Final-answer synthesis over the run ledger
//!
//! After all steps have run, the accumulated results are handed to the model
//! once for a structured analysis. Synthesis never fails the run: an empty
//! ledger yields a templated no-data result, and a transport failure or an
//! unparseable model response degrades to a result built from ledger
//! statistics alone.

use crate::agent::context::ExecutionContext;
use crate::agent::generator::extract_json_object;
use crate::agent::ledger::RunLedger;
use crate::agent::plan::Plan;
use crate::agent::truncate::{
    truncate_for_prompt, CONTEXT_BUDGET, LEDGER_BUDGET, PLAN_BUDGET,
};
use crate::llm::{GenerationOptions, TextGenerator};
use serde::{Deserialize, Serialize};

/// Structured outcome of an agentic run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalResult {
    pub answer: String,
    #[serde(default)]
    pub insights: Vec<String>,
    #[serde(default)]
    pub metrics: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

impl FinalResult {
    /// The result reported when no step produced any data
    pub fn no_data(objective: &str, steps_attempted: usize, queries_executed: usize) -> Self {
        let mut metrics = serde_json::Map::new();
        metrics.insert("steps_attempted".to_string(), steps_attempted.into());
        metrics.insert("queries_executed".to_string(), queries_executed.into());
        metrics.insert("records_found".to_string(), 0.into());
        Self {
            answer: format!(
                "Executed {steps_attempted} planned steps and {queries_executed} queries \
                 but no data was found for '{objective}'."
            ),
            insights: vec![
                "The full plan was generated and executed".to_string(),
                "No matching records were found in the connected CRM org".to_string(),
            ],
            metrics,
            recommendations: vec![
                "Verify that the connected CRM org contains relevant records".to_string(),
                "Try rephrasing the objective with specific entity or record names".to_string(),
            ],
        }
    }

    /// Degraded result built from ledger statistics when the model's
    /// analysis could not be obtained or parsed
    fn from_ledger_statistics(plan: &Plan, ledger: &RunLedger) -> Self {
        let total_records = ledger.total_records();
        let steps_completed = plan
            .steps
            .iter()
            .filter(|s| ledger.has_result_for_step(s.step_number))
            .count();
        let mut metrics = serde_json::Map::new();
        metrics.insert("total_records".to_string(), total_records.into());
        metrics.insert("steps_completed".to_string(), steps_completed.into());
        Self {
            answer: format!(
                "Retrieved {total_records} total records across {steps_completed} completed \
                 steps, but the analysis response could not be formatted."
            ),
            insights: vec![
                "Data was retrieved successfully".to_string(),
                "The analysis response was unusable".to_string(),
            ],
            metrics,
            recommendations: vec!["Review the step results directly".to_string()],
        }
    }
}

/// Produce the final analysis from the run ledger
///
/// Never fails: any model problem degrades to a templated result so the
/// accumulated run data still reaches the caller. Deterministic over its
/// inputs apart from the model call itself.
pub async fn synthesize(
    llm: &dyn TextGenerator,
    objective: &str,
    plan: &Plan,
    ledger: &RunLedger,
    context: &ExecutionContext,
    queries_executed: usize,
) -> FinalResult {
    if ledger.is_empty() {
        return FinalResult::no_data(objective, plan.steps.len(), queries_executed);
    }

    let prompt = build_synthesis_prompt(objective, plan, ledger, context);
    let raw = match llm.generate(&prompt, GenerationOptions::synthesis()).await {
        Ok(raw) => raw,
        Err(e) => {
            tracing::warn!(error = %e, "Synthesis call failed, degrading to ledger statistics");
            return FinalResult::from_ledger_statistics(plan, ledger);
        }
    };

    match parse_final_result(&raw) {
        Some(result) => result,
        None => {
            tracing::warn!("Synthesis response was not valid JSON, degrading to ledger statistics");
            FinalResult::from_ledger_statistics(plan, ledger)
        }
    }
}

fn build_synthesis_prompt(
    objective: &str,
    plan: &Plan,
    ledger: &RunLedger,
    context: &ExecutionContext,
) -> String {
    let plan_text = plan
        .sorted_steps()
        .iter()
        .map(|s| format!("{}. {}", s.step_number, s.description))
        .collect::<Vec<_>>()
        .join("\n");
    let data = ledger.to_prompt_string();
    let mut prompt = format!(
        "You are a CRM data analyst. Answer the objective using only the \
         retrieved data below.\n\n\
         Objective: {objective}\n\n\
         Plan that was executed:\n{}\n\n\
         Retrieved data ({} records across {} queries):\n{}\n",
        truncate_for_prompt(&plan_text, PLAN_BUDGET),
        ledger.total_records(),
        ledger.len(),
        truncate_for_prompt(&data, LEDGER_BUDGET),
    );

    if !context.is_empty() {
        let ctx = context.to_prompt_string();
        prompt.push_str(&format!(
            "\nIdentifiers resolved during the run:\n{}\n",
            truncate_for_prompt(&ctx, CONTEXT_BUDGET)
        ));
    }

    prompt.push_str(
        "\nRespond with JSON only, in this exact shape:\n\
         {\"answer\": \"a direct answer to the objective\", \
         \"insights\": [\"notable observations\"], \
         \"metrics\": {\"metric_name\": value}, \
         \"recommendations\": [\"suggested next actions\"]}\n\
         Base every statement on the retrieved data. If the data is \
         insufficient, say so in the answer.",
    );
    prompt
}

fn parse_final_result(raw: &str) -> Option<FinalResult> {
    let json = extract_json_object(raw)?;
    serde_json::from_str(json).ok()
}
