//! Error types and error handling for the application
//!
//! This module defines custom error types that can be converted to HTTP responses.
//! All errors implement `IntoResponse` to provide consistent error formatting.
//!
//! In-domain query failures (a CRM query that could not be repaired, a step
//! that fell through to fallback) are NOT represented here: those are fully
//! recovered inside the agent loop and described in the 200 response body.
//! `AppError` covers malformed requests and infrastructure failures only.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Application-level error types
///
/// All errors that can surface at the HTTP boundary are represented by this
/// enum. Each variant implements automatic conversion to HTTP responses via
/// `IntoResponse`.
#[derive(Error, Debug)]
pub enum AppError {
    /// The request body failed validation (e.g. oversized query)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The text-generation API call failed (transport, auth, rate limit)
    #[error("Text generation failed: {0}")]
    Generation(String),

    /// An upstream service (research API, notification target) failed
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Internal server error (catch-all for unexpected errors)
    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::Generation(_) => (StatusCode::BAD_GATEWAY, self.to_string()),
            AppError::Upstream(_) => (StatusCode::BAD_GATEWAY, self.to_string()),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
        };

        let body = Json(json!({
            "error": error_message,
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}
