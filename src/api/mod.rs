//! API module
//!
//! HTTP request handlers for the agentic CRM endpoints

pub mod agentic;
pub mod research;
pub mod stream;
