//! Plan types
//!
//! A `Plan` is the ordered schedule produced once per user request: each
//! `PlanStep` describes one query the runner must accomplish. Plans are
//! immutable after generation.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One step of a reasoning plan
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanStep {
    /// Positive, unique step number defining execution order
    pub step_number: u32,
    /// What this step does, free text
    pub description: String,
    /// Why this step's query is needed
    #[serde(default)]
    pub purpose: String,
    /// What data the step is expected to produce
    #[serde(default)]
    pub expected_outcome: String,
    /// Broader strategy to try if the step exhausts its attempt budget
    #[serde(default)]
    pub fallback_description: Option<String>,
}

/// An ordered sequence of plan steps
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Plan {
    /// The steps, in intended execution order
    pub steps: Vec<PlanStep>,
}

impl Plan {
    /// Validate the plan structure
    ///
    /// Rejects empty plans and duplicate or zero step numbers. Steps may
    /// arrive out of order from the model; `sorted_steps` handles ordering.
    pub fn validate(&self) -> Result<(), String> {
        if self.steps.is_empty() {
            return Err("plan has no steps".to_string());
        }
        let mut seen = HashSet::new();
        for step in &self.steps {
            if step.step_number == 0 {
                return Err(format!(
                    "step \"{}\" has step_number 0; step numbers start at 1",
                    step.description
                ));
            }
            if !seen.insert(step.step_number) {
                return Err(format!("duplicate step_number {}", step.step_number));
            }
        }
        Ok(())
    }

    /// Steps in strictly ascending step-number order
    pub fn sorted_steps(&self) -> Vec<&PlanStep> {
        let mut steps: Vec<&PlanStep> = self.steps.iter().collect();
        steps.sort_by_key(|s| s.step_number);
        steps
    }

    /// The single-step plan substituted when the model's plan output cannot
    /// be parsed. Substituting it is a correction-worthy event: the caller
    /// must append a correction record when it does so.
    pub fn default_plan() -> Self {
        Self {
            steps: vec![PlanStep {
                step_number: 1,
                description: "Find the most relevant entity for the user's question".to_string(),
                purpose: "Locate a record to anchor the answer on".to_string(),
                expected_outcome: "A record with an Id and Name".to_string(),
                fallback_description: Some("Try a broader partial-name search".to_string()),
            }],
        }
    }
}
