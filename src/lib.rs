//! CRM Agent Backend Library
//!
//! This library exposes modules for testing and external use.
//! The main binary is in `src/main.rs`.

pub mod agent;
pub mod api;
pub mod config;
pub mod crm;
pub mod error;
pub mod llm;
pub mod state;
