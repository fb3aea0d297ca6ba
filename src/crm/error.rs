//! CRM error classification
//!
//! The remote CRM reports failures as human-readable text. Classification by
//! substring happens exactly once, here, when a failure crosses the boundary;
//! the agent loop switches on `QueryErrorKind` and never re-parses the text.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Closed set of query failure classes the repair engine understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryErrorKind {
    /// Malformed query, including bind-variable misuse; eligible for
    /// bind-variable substitution repair
    MalformedQuery,
    /// Reference to a field the target entity does not have; eligible for
    /// schema-guided repair
    InvalidField,
    /// Anything else; not auto-repaired, counts toward the attempt budget
    Other,
}

/// A classified query execution failure
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct QueryFailure {
    /// The failure class, decided once at the boundary
    pub kind: QueryErrorKind,
    /// Raw provider error text, kept for the error log and repair prompts
    pub message: String,
}

impl QueryFailure {
    /// Classify a raw provider error message
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let kind = if message.contains("MALFORMED_QUERY")
            || message.to_lowercase().contains("bind variables")
        {
            QueryErrorKind::MalformedQuery
        } else if message.contains("INVALID_FIELD") {
            QueryErrorKind::InvalidField
        } else {
            QueryErrorKind::Other
        };
        Self { kind, message }
    }

    /// Build an unclassified failure (transport errors, describe failures)
    pub fn other(message: impl Into<String>) -> Self {
        Self {
            kind: QueryErrorKind::Other,
            message: message.into(),
        }
    }
}

/// A connection/authentication failure; fatal for the whole run
#[derive(Debug, Clone)]
pub struct ConnectionError {
    /// Human-readable description, enriched with actionable hints
    pub message: String,
}

impl ConnectionError {
    /// Wrap a raw login error, adding context for the common failure modes
    pub fn from_raw(raw: &str) -> Self {
        let message = if raw.contains("API_CURRENTLY_DISABLED") {
            format!(
                "CRM API error: {} Please check your org status and API access.",
                raw
            )
        } else if raw.contains("INVALID_LOGIN") {
            format!(
                "CRM authentication error: {} Please verify your username and password.",
                raw
            )
        } else if raw.contains("LOGIN_MUST_USE_SECURITY_TOKEN") {
            format!(
                "CRM security error: {} You may need to append your security token to your password.",
                raw
            )
        } else {
            format!("CRM connection error: {}", raw)
        };
        Self { message }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ConnectionError {}
