//! Agentic CRM query loop: planning, execution, repair, and synthesis

pub mod context;
pub mod generator;
pub mod ledger;
pub mod plan;
pub mod repair;
pub mod runner;
pub mod synthesizer;
pub mod truncate;

pub use context::ExecutionContext;
pub use ledger::{ErrorLog, RunLedger, StepResult};
pub use plan::{Plan, PlanStep};
pub use runner::{AgentRunner, ProgressEvent, RunReport};
pub use synthesizer::FinalResult;
