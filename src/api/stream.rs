//! Streaming variant of the agentic endpoint
//!
//! Emits progress events as Server-Sent Events while the run executes, then
//! the full response body as a final event, then the done signal. The run
//! itself executes on a spawned task; this handler only relays its progress
//! channel.

use crate::agent::AgentRunner;
use crate::api::agentic::{report_to_response, validate_request, AgenticRequest};
use crate::error::AppError;
use crate::state::AppState;
use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::Response,
    Json,
};
use futures_util::{stream::Stream, StreamExt};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Terminal SSE payload, mirroring the chat-completions convention
pub const SSE_DONE_SIGNAL: &str = "[DONE]";

/// POST /api/crm/agentic/stream
pub async fn agentic_query_stream(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AgenticRequest>,
) -> Result<Response, AppError> {
    validate_request(&request, state.config.agent.max_query_length)?;

    let stream = run_stream(state, request);
    let sse_stream =
        stream.map(|data| Ok::<_, std::io::Error>(format!("data: {}\n\n", data)));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .body(Body::from_stream(sse_stream))
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to build SSE response: {}", e)))
}

/// Connect, run, and relay progress; every item is one SSE data payload
fn run_stream(state: Arc<AppState>, request: AgenticRequest) -> impl Stream<Item = String> {
    async_stream::stream! {
        let crm = match state.crm.connect(&request.credentials).await {
            Ok(client) => client,
            Err(e) => {
                tracing::warn!(error = %e, "CRM connection failed");
                yield event_json(&json!({"event": "error", "message": e.message}));
                yield SSE_DONE_SIGNAL.to_string();
                return;
            }
        };

        let (tx, mut rx) = mpsc::channel(64);
        let llm = state.llm.clone();
        let agent_config = state.config.agent.clone();
        let objective = request.user_query;
        let handle = tokio::spawn(async move {
            let runner = AgentRunner::new(llm, agent_config);
            runner.run(crm.as_ref(), &objective, Some(tx)).await
        });

        while let Some(event) = rx.recv().await {
            yield event_json(&event);
        }

        match handle.await {
            Ok(Ok(report)) => {
                let response = report_to_response(report);
                yield event_json(&json!({"event": "final", "response": response}));
            }
            Ok(Err(e)) => {
                yield event_json(&json!({"event": "error", "message": e.to_string()}));
            }
            Err(e) => {
                yield event_json(&json!({"event": "error", "message": format!("Run task failed: {}", e)}));
            }
        }
        yield SSE_DONE_SIGNAL.to_string();
    }
}

fn event_json<T: serde::Serialize>(event: &T) -> String {
    serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string())
}
