//! Run ledger and logs
//!
//! The `RunLedger` accumulates per-step query results for one run; the
//! error and correction logs are append-only sequences kept for the response
//! body and for steering repair prompts. All three are scoped to exactly one
//! run and discarded when it ends.

use crate::crm::types::Record;
use serde_json::json;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// Ledger key: primary result of a step, or the result of its fallback query
///
/// Ordered by step number first, with a step's primary result sorting before
/// its fallback result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKey {
    /// Result of the step's own (possibly repaired) query
    Primary(u32),
    /// Result of the step's one-shot fallback query
    Fallback(u32),
}

impl StepKey {
    fn rank(&self) -> (u32, u8) {
        match self {
            StepKey::Primary(n) => (*n, 0),
            StepKey::Fallback(n) => (*n, 1),
        }
    }

    /// The step number this key belongs to
    pub fn step_number(&self) -> u32 {
        self.rank().0
    }
}

impl Ord for StepKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl PartialOrd for StepKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for StepKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepKey::Primary(n) => write!(f, "step_{}_result", n),
            StepKey::Fallback(n) => write!(f, "step_{}_fallback_result", n),
        }
    }
}

/// The outcome of one successfully executed query
///
/// `query` is always the exact string that produced `records` — post-repair,
/// post-fallback — never the originally generated text.
#[derive(Debug, Clone)]
pub struct StepResult {
    /// Originating step number
    pub step_number: u32,
    /// The step description, for the synthesis prompt
    pub description: String,
    /// The query string actually run
    pub query: String,
    /// Returned rows
    pub records: Vec<Record>,
    /// Total row count reported by the store
    pub total_size: usize,
}

/// Accumulated per-step results for one run
#[derive(Debug, Clone, Default)]
pub struct RunLedger {
    results: BTreeMap<StepKey, StepResult>,
}

impl RunLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a step's primary result
    pub fn insert_primary(&mut self, result: StepResult) {
        self.results
            .insert(StepKey::Primary(result.step_number), result);
    }

    /// Record a step's fallback result
    pub fn insert_fallback(&mut self, result: StepResult) {
        self.results
            .insert(StepKey::Fallback(result.step_number), result);
    }

    /// True if no step has produced a result
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Number of recorded results
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Sum of reported row counts across all results
    pub fn total_records(&self) -> usize {
        self.results.values().map(|r| r.total_size).sum()
    }

    /// Iterate results in step order (primary before fallback per step)
    pub fn iter(&self) -> impl Iterator<Item = (&StepKey, &StepResult)> {
        self.results.iter()
    }

    /// Whether the given step contributed any result (primary or fallback)
    pub fn has_result_for_step(&self, step_number: u32) -> bool {
        self.results
            .keys()
            .any(|k| k.step_number() == step_number)
    }

    /// The ledger as a JSON object keyed by result name, used in both the
    /// synthesis prompt and the response body
    pub fn to_json(&self) -> serde_json::Map<String, serde_json::Value> {
        self.results
            .iter()
            .map(|(key, result)| {
                (
                    key.to_string(),
                    json!({
                        "description": result.description,
                        "query": result.query,
                        "records": result.records,
                        "total_size": result.total_size,
                    }),
                )
            })
            .collect()
    }

    /// Serialize the ledger for the synthesis prompt
    pub fn to_prompt_string(&self) -> String {
        serde_json::to_string(&self.to_json()).unwrap_or_else(|_| "{}".to_string())
    }
}

/// One recorded failure: step, attempt, raw error text
#[derive(Debug, Clone)]
pub struct ErrorRecord {
    /// Step the failure occurred in
    pub step_number: u32,
    /// Attempt number within the step (1-based)
    pub attempt: u32,
    /// Raw error text
    pub message: String,
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "step_{}_attempt_{}: {}",
            self.step_number, self.attempt, self.message
        )
    }
}

/// Append-only error log for one run
#[derive(Debug, Clone, Default)]
pub struct ErrorLog {
    records: Vec<ErrorRecord>,
}

impl ErrorLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a failure record
    pub fn push(&mut self, step_number: u32, attempt: u32, message: impl Into<String>) {
        self.records.push(ErrorRecord {
            step_number,
            attempt,
            message: message.into(),
        });
    }

    /// The most recent `limit` failures for one step, for repair prompts
    pub fn recent_for_step(&self, step_number: u32, limit: usize) -> Vec<&ErrorRecord> {
        let matching: Vec<&ErrorRecord> = self
            .records
            .iter()
            .filter(|r| r.step_number == step_number)
            .collect();
        let skip = matching.len().saturating_sub(limit);
        matching.into_iter().skip(skip).collect()
    }

    /// All records, in append order
    pub fn records(&self) -> &[ErrorRecord] {
        &self.records
    }

    /// Number of recorded failures
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True if nothing failed yet
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
