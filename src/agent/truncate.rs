//! Prompt truncation
//!
//! Serialized run state (ledger, plan, context) is included in generation
//! prompts; without a bound, prompts would grow with every step. Each
//! inclusion goes through `truncate_for_prompt` with a fixed character
//! budget so the boundary is explicit and testable.

/// Character budget for the serialized plan in the synthesis prompt
pub const PLAN_BUDGET: usize = 1000;
/// Character budget for the serialized ledger in the synthesis prompt
pub const LEDGER_BUDGET: usize = 2500;
/// Character budget for prior results in step-query prompts
pub const STEP_RESULTS_BUDGET: usize = 600;
/// Character budget for the serialized context in generation prompts
pub const CONTEXT_BUDGET: usize = 400;

/// Truncate a string to at most `budget` characters
///
/// The cut is exact: no ellipsis is appended, matching the fixed-slice
/// behavior downstream prompts are calibrated against. Operates on character
/// boundaries, so multi-byte content never produces an invalid slice.
pub fn truncate_for_prompt(s: &str, budget: usize) -> &str {
    match s.char_indices().nth(budget) {
        Some((byte_index, _)) => &s[..byte_index],
        None => s,
    }
}
