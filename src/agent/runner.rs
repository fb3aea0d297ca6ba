//! The agentic run loop
//!
//! Drives one objective end to end: plan, then per step a bounded
//! generate-execute-repair cycle, then a single fallback attempt for steps
//! that exhausted their attempts, then synthesis over whatever the ledger
//! holds. A step failing never aborts the run; the only fatal error before
//! this loop is the CRM connection itself, which the caller handles.

use crate::agent::context::ExecutionContext;
use crate::agent::generator::{
    generate_fallback_query, generate_plan, generate_step_query,
};
use crate::agent::ledger::{ErrorLog, RunLedger, StepResult};
use crate::agent::plan::{Plan, PlanStep};
use crate::agent::repair::{repair_invalid_field, substitute_bind_variables};
use crate::agent::synthesizer::{synthesize, FinalResult};
use crate::config::AgentConfig;
use crate::crm::client::CrmClient;
use crate::crm::error::QueryErrorKind;
use crate::error::AppError;
use crate::llm::TextGenerator;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Progress notifications emitted while a run is executing
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    PlanReady {
        steps: usize,
        degraded: bool,
    },
    StepStarted {
        step_number: u32,
        description: String,
    },
    QueryFailed {
        step_number: u32,
        attempt: u32,
        error: String,
    },
    QueryRepaired {
        step_number: u32,
        kind: QueryErrorKind,
    },
    StepCompleted {
        step_number: u32,
        records: usize,
        fallback: bool,
    },
    StepFailed {
        step_number: u32,
    },
    Synthesizing,
}

/// Everything a run produced, for response building and diagnostics
#[derive(Debug)]
pub struct RunReport {
    pub plan: Plan,
    pub plan_degraded: bool,
    pub ledger: RunLedger,
    pub context: ExecutionContext,
    pub queries_executed: Vec<String>,
    pub errors: ErrorLog,
    /// Free-text descriptions of repairs and degradations, append-only
    pub corrections: Vec<String>,
    pub final_result: FinalResult,
}

impl RunReport {
    /// Number of plan steps that produced a result, primary or fallback
    pub fn steps_completed(&self) -> usize {
        self.plan
            .steps
            .iter()
            .filter(|s| self.ledger.has_result_for_step(s.step_number))
            .count()
    }
}

/// Orchestrates agentic runs against an already-connected CRM client
pub struct AgentRunner {
    llm: Arc<dyn TextGenerator>,
    config: AgentConfig,
}

impl AgentRunner {
    pub fn new(llm: Arc<dyn TextGenerator>, config: AgentConfig) -> Self {
        Self { llm, config }
    }

    /// Execute one objective to completion
    ///
    /// Only plan transport errors surface as `Err`. Per-step generation and
    /// query failures are absorbed into the report, and synthesis problems
    /// degrade to a templated result.
    pub async fn run(
        &self,
        crm: &dyn CrmClient,
        objective: &str,
        progress: Option<mpsc::Sender<ProgressEvent>>,
    ) -> Result<RunReport, AppError> {
        let (plan, plan_degraded) = generate_plan(self.llm.as_ref(), objective).await?;
        emit(
            &progress,
            ProgressEvent::PlanReady {
                steps: plan.steps.len(),
                degraded: plan_degraded,
            },
        )
        .await;
        tracing::info!(
            steps = plan.steps.len(),
            degraded = plan_degraded,
            "Plan ready"
        );

        let plan_text = plan_as_text(&plan);
        let mut ledger = RunLedger::new();
        let mut context = ExecutionContext::new();
        let mut errors = ErrorLog::new();
        let mut queries_executed = Vec::new();
        let mut corrections: Vec<String> = Vec::new();
        if plan_degraded {
            corrections.push(
                "plan_generation: model output was not parseable; substituted the default \
                 single-step plan"
                    .to_string(),
            );
        }

        for step in plan.sorted_steps() {
            emit(
                &progress,
                ProgressEvent::StepStarted {
                    step_number: step.step_number,
                    description: step.description.clone(),
                },
            )
            .await;

            let completed = self
                .run_step(
                    crm,
                    step,
                    objective,
                    &plan_text,
                    &mut ledger,
                    &mut context,
                    &mut errors,
                    &mut queries_executed,
                    &mut corrections,
                    &progress,
                )
                .await;

            if !completed {
                emit(
                    &progress,
                    ProgressEvent::StepFailed {
                        step_number: step.step_number,
                    },
                )
                .await;
                tracing::warn!(step = step.step_number, "Step failed after all attempts");
            }
        }

        emit(&progress, ProgressEvent::Synthesizing).await;
        let final_result = synthesize(
            self.llm.as_ref(),
            objective,
            &plan,
            &ledger,
            &context,
            queries_executed.len(),
        )
        .await;

        Ok(RunReport {
            plan,
            plan_degraded,
            ledger,
            context,
            queries_executed,
            errors,
            corrections,
            final_result,
        })
    }

    /// One step: up to `max_attempts_per_step` generate-execute cycles with
    /// inline repair, then one fallback query. Returns whether the step
    /// produced a result.
    #[allow(clippy::too_many_arguments)]
    async fn run_step(
        &self,
        crm: &dyn CrmClient,
        step: &PlanStep,
        objective: &str,
        plan_text: &str,
        ledger: &mut RunLedger,
        context: &mut ExecutionContext,
        errors: &mut ErrorLog,
        queries_executed: &mut Vec<String>,
        corrections: &mut Vec<String>,
        progress: &Option<mpsc::Sender<ProgressEvent>>,
    ) -> bool {
        for attempt in 1..=self.config.max_attempts_per_step {
            let query = match generate_step_query(
                self.llm.as_ref(),
                step,
                objective,
                plan_text,
                context,
                ledger,
                errors,
            )
            .await
            {
                Ok(query) => query,
                Err(e) => {
                    errors.push(step.step_number, attempt, e.to_string());
                    continue;
                }
            };

            if query.chars().count() > self.config.max_query_length {
                errors.push(
                    step.step_number,
                    attempt,
                    format!("Generated query exceeds {} characters", self.config.max_query_length),
                );
                continue;
            }

            match crm.execute(&query).await {
                Ok(result) => {
                    queries_executed.push(query.clone());
                    context.absorb_records(&result.records);
                    let records = result.records.len();
                    ledger.insert_primary(StepResult {
                        step_number: step.step_number,
                        description: step.description.clone(),
                        query,
                        records: result.records,
                        total_size: result.total_size,
                    });
                    emit(
                        progress,
                        ProgressEvent::StepCompleted {
                            step_number: step.step_number,
                            records,
                            fallback: false,
                        },
                    )
                    .await;
                    return true;
                }
                Err(failure) => {
                    tracing::debug!(
                        step = step.step_number,
                        attempt,
                        kind = ?failure.kind,
                        error = %failure,
                        "Query failed"
                    );
                    errors.push(step.step_number, attempt, failure.message.clone());
                    emit(
                        progress,
                        ProgressEvent::QueryFailed {
                            step_number: step.step_number,
                            attempt,
                            error: failure.message.clone(),
                        },
                    )
                    .await;

                    let repaired = match failure.kind {
                        QueryErrorKind::MalformedQuery => {
                            let candidate = substitute_bind_variables(&query, context);
                            (candidate != query).then_some(candidate)
                        }
                        QueryErrorKind::InvalidField => {
                            repair_invalid_field(&query, &failure.message, crm).await
                        }
                        QueryErrorKind::Other => None,
                    };

                    let Some(repaired) = repaired else { continue };

                    match crm.execute(&repaired).await {
                        Ok(result) => {
                            corrections.push(format!(
                                "step_{}_attempt_{}: {} succeeded; reran as: {}",
                                step.step_number,
                                attempt,
                                repair_label(failure.kind),
                                repaired
                            ));
                            emit(
                                progress,
                                ProgressEvent::QueryRepaired {
                                    step_number: step.step_number,
                                    kind: failure.kind,
                                },
                            )
                            .await;
                            queries_executed.push(repaired.clone());
                            context.absorb_records(&result.records);
                            let records = result.records.len();
                            ledger.insert_primary(StepResult {
                                step_number: step.step_number,
                                description: step.description.clone(),
                                query: repaired,
                                records: result.records,
                                total_size: result.total_size,
                            });
                            emit(
                                progress,
                                ProgressEvent::StepCompleted {
                                    step_number: step.step_number,
                                    records,
                                    fallback: false,
                                },
                            )
                            .await;
                            return true;
                        }
                        Err(second) => {
                            errors.push(step.step_number, attempt, second.message);
                        }
                    }
                }
            }
        }

        self.run_fallback(
            crm,
            step,
            objective,
            ledger,
            context,
            errors,
            queries_executed,
            corrections,
            progress,
        )
        .await
    }

    /// Single fallback attempt after the primary attempts are exhausted
    #[allow(clippy::too_many_arguments)]
    async fn run_fallback(
        &self,
        crm: &dyn CrmClient,
        step: &PlanStep,
        objective: &str,
        ledger: &mut RunLedger,
        context: &mut ExecutionContext,
        errors: &mut ErrorLog,
        queries_executed: &mut Vec<String>,
        corrections: &mut Vec<String>,
        progress: &Option<mpsc::Sender<ProgressEvent>>,
    ) -> bool {
        let fallback_attempt = self.config.max_attempts_per_step + 1;

        let query =
            match generate_fallback_query(self.llm.as_ref(), step, objective, context).await {
                Ok(query) => query,
                Err(e) => {
                    errors.push(step.step_number, fallback_attempt, e.to_string());
                    return false;
                }
            };

        match crm.execute(&query).await {
            Ok(result) => {
                corrections.push(format!(
                    "step_{}: fallback strategy succeeded; ran: {}",
                    step.step_number, query
                ));
                queries_executed.push(query.clone());
                context.absorb_records(&result.records);
                let records = result.records.len();
                ledger.insert_fallback(StepResult {
                    step_number: step.step_number,
                    description: step.description.clone(),
                    query,
                    records: result.records,
                    total_size: result.total_size,
                });
                emit(
                    progress,
                    ProgressEvent::StepCompleted {
                        step_number: step.step_number,
                        records,
                        fallback: true,
                    },
                )
                .await;
                true
            }
            Err(failure) => {
                errors.push(step.step_number, fallback_attempt, failure.message);
                false
            }
        }
    }
}

fn repair_label(kind: QueryErrorKind) -> &'static str {
    match kind {
        QueryErrorKind::MalformedQuery => "bind-variable substitution",
        QueryErrorKind::InvalidField => "invalid-field substitution",
        QueryErrorKind::Other => "unclassified repair",
    }
}

/// Human-readable plan rendering for prompts
fn plan_as_text(plan: &Plan) -> String {
    plan.sorted_steps()
        .iter()
        .map(|s| format!("{}. {}", s.step_number, s.description))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Send a progress event, ignoring a disconnected receiver
async fn emit(progress: &Option<mpsc::Sender<ProgressEvent>>, event: ProgressEvent) {
    if let Some(tx) = progress {
        let _ = tx.send(event).await;
    }
}
