//! Prompt construction and model-output parsing for the agentic run
//!
//! Every model interaction in the loop goes through here: planning, per-step
//! query generation, and fallback query generation. Parsing is deliberately
//! forgiving (models wrap output in code fences, prepend prose, append
//! semicolons) but degradation is always explicit: a plan that cannot be
//! parsed becomes the default single-step plan with a degraded flag, and a
//! response with no recognizable query statement is a hard error for that
//! attempt.

use crate::agent::context::ExecutionContext;
use crate::agent::ledger::{ErrorLog, RunLedger};
use crate::agent::plan::{Plan, PlanStep};
use crate::agent::truncate::{
    truncate_for_prompt, CONTEXT_BUDGET, PLAN_BUDGET, STEP_RESULTS_BUDGET,
};
use crate::error::AppError;
use crate::llm::{GenerationOptions, TextGenerator};

/// How many recent errors for the current step to feed back to the model
const ERROR_FEEDBACK_LIMIT: usize = 3;

/// Produce an execution plan for the objective
///
/// Returns the plan plus a degraded flag: when the model's output cannot be
/// parsed or validated, the default single-step plan is used instead and the
/// flag is set so the caller can surface the degradation.
pub async fn generate_plan(
    llm: &dyn TextGenerator,
    objective: &str,
) -> Result<(Plan, bool), AppError> {
    let prompt = build_plan_prompt(objective);
    let raw = llm.generate(&prompt, GenerationOptions::plan()).await?;

    match parse_plan(&raw) {
        Some(plan) => Ok((plan, false)),
        None => {
            tracing::warn!("Plan response was not parseable, using default plan");
            Ok((Plan::default_plan(), true))
        }
    }
}

fn build_plan_prompt(objective: &str) -> String {
    format!(
        "You are a CRM data analyst. Break the objective below into a short, \
         ordered plan of data-retrieval steps. Each step must be answerable by \
         a single SOQL query.\n\n\
         Objective: {objective}\n\n\
         Respond with JSON only, in this exact shape:\n\
         {{\"steps\": [{{\"step_number\": 1, \"description\": \"...\", \
         \"purpose\": \"...\", \"expected_outcome\": \"...\", \
         \"fallback_description\": \"a simpler alternative query, or null\"}}]}}\n\n\
         Keep the plan to at most 5 steps. Order steps so that identifiers \
         found in earlier steps can be used by later ones."
    )
}

/// Parse a plan from raw model output, tolerating code fences and prose
fn parse_plan(raw: &str) -> Option<Plan> {
    let json = extract_json_object(raw)?;
    let plan: Plan = serde_json::from_str(json).ok()?;
    plan.validate().ok()?;
    Some(plan)
}

/// Locate the outermost JSON object in possibly fenced or chatty output
pub(crate) fn extract_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(&raw[start..=end])
}

/// Generate the query for one plan step
///
/// The prompt carries the accumulated context, prior step results, and the
/// most recent errors for this step so the model can correct itself across
/// attempts. Fails if the response contains no recognizable statement.
pub async fn generate_step_query(
    llm: &dyn TextGenerator,
    step: &PlanStep,
    objective: &str,
    plan_text: &str,
    context: &ExecutionContext,
    ledger: &RunLedger,
    errors: &ErrorLog,
) -> Result<String, AppError> {
    let prompt = build_step_query_prompt(step, objective, plan_text, context, ledger, errors);
    let raw = llm.generate(&prompt, GenerationOptions::step_query()).await?;

    sanitize_query(&raw).ok_or_else(|| {
        AppError::Generation(format!(
            "Model response for step {} contained no SELECT statement",
            step.step_number
        ))
    })
}

fn build_step_query_prompt(
    step: &PlanStep,
    objective: &str,
    plan_text: &str,
    context: &ExecutionContext,
    ledger: &RunLedger,
    errors: &ErrorLog,
) -> String {
    let mut prompt = format!(
        "You are writing a single SOQL query for a CRM data-retrieval step.\n\n\
         Objective: {objective}\n\n\
         Overall plan:\n{}\n\n\
         Current step {}: {}\n",
        truncate_for_prompt(plan_text, PLAN_BUDGET),
        step.step_number,
        step.description,
    );

    if !step.purpose.is_empty() {
        prompt.push_str(&format!("Purpose: {}\n", step.purpose));
    }
    if !step.expected_outcome.is_empty() {
        prompt.push_str(&format!("Expected outcome: {}\n", step.expected_outcome));
    }

    if !context.is_empty() {
        let ctx = context.to_prompt_string();
        prompt.push_str(&format!(
            "\nKnown values from earlier steps (use these as literals):\n{}\n",
            truncate_for_prompt(&ctx, CONTEXT_BUDGET)
        ));
    }

    if !ledger.is_empty() {
        let results = ledger.to_prompt_string();
        prompt.push_str(&format!(
            "\nResults so far:\n{}\n",
            truncate_for_prompt(&results, STEP_RESULTS_BUDGET)
        ));
    }

    let recent = errors.recent_for_step(step.step_number, ERROR_FEEDBACK_LIMIT);
    if !recent.is_empty() {
        prompt.push_str("\nPrevious attempts for this step failed:\n");
        for record in recent {
            prompt.push_str(&format!("- {record}\n"));
        }
        prompt.push_str("Write a corrected query that avoids these errors.\n");
    }

    prompt.push_str(
        "\nRules:\n\
         - Respond with the SOQL query only, no explanation and no markdown.\n\
         - Never use bind variables (no :identifier placeholders); inline \
           concrete values as quoted literals.\n\
         - Always include a LIMIT clause.\n",
    );
    prompt
}

/// Generate a simpler fallback query after a step exhausted its attempts
pub async fn generate_fallback_query(
    llm: &dyn TextGenerator,
    step: &PlanStep,
    objective: &str,
    context: &ExecutionContext,
) -> Result<String, AppError> {
    let goal = step
        .fallback_description
        .as_deref()
        .unwrap_or("a broader, simpler query that retrieves any related records");

    let mut prompt = format!(
        "A CRM query for the step below kept failing. Write a much simpler \
         SOQL query as a fallback.\n\n\
         Objective: {objective}\n\
         Failed step: {}\n\
         Fallback goal: {goal}\n",
        step.description,
    );

    if !context.is_empty() {
        let ctx = context.to_prompt_string();
        prompt.push_str(&format!(
            "\nKnown values (use these as literals):\n{}\n",
            truncate_for_prompt(&ctx, CONTEXT_BUDGET)
        ));
    }

    prompt.push_str(
        "\nRules:\n\
         - Respond with the SOQL query only.\n\
         - Query standard fields only (Id, Name, CreatedDate).\n\
         - No bind variables. Always include a LIMIT clause.\n",
    );

    let raw = llm
        .generate(&prompt, GenerationOptions::fallback_query())
        .await?;

    sanitize_query(&raw).ok_or_else(|| {
        AppError::Generation(format!(
            "Fallback response for step {} contained no SELECT statement",
            step.step_number
        ))
    })
}

/// Extract the bare SELECT statement from raw model output
///
/// Strips code fences and surrounding prose, collapses the statement onto one
/// line, and drops trailing semicolons. Returns `None` when no SELECT keyword
/// is present; substitution of values happens later, in repair, never here.
pub fn sanitize_query(raw: &str) -> Option<String> {
    let stripped = raw.replace("```sql", "").replace("```", "");

    let lower = stripped.to_lowercase();
    let start = lower.find("select")?;

    let statement = stripped[start..]
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    let statement = statement.trim_end_matches(';').trim().to_string();

    if statement.is_empty() {
        None
    } else {
        Some(statement)
    }
}
