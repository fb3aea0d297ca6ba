//! Background research tasks
//!
//! Starts a long-running research task on the external task API and returns
//! immediately; a spawned monitor polls for completion and posts the result
//! link to the caller's webhook. The monitor is fire-and-forget: its
//! failures are logged, never surfaced to the original request.

use crate::config::ResearchConfig;
use crate::error::AppError;
use crate::state::AppState;
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
pub struct ResearchRequest {
    pub user_email: String,
    pub topic: String,
    /// Bearer token forwarded to the task API
    pub token: String,
    /// Webhook that receives the completion notification
    pub notify_url: String,
}

#[derive(Debug, Serialize)]
pub struct ResearchResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub research_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StartResearchBody {
    success: bool,
    data: Option<StartResearchData>,
}

#[derive(Debug, Deserialize)]
struct StartResearchData {
    #[serde(rename = "requestId")]
    request_id: String,
}

#[derive(Debug, Deserialize)]
struct StatusBody {
    success: bool,
    data: Option<StatusData>,
}

#[derive(Debug, Deserialize)]
struct StatusData {
    status: Vec<String>,
    #[serde(rename = "downloadlink")]
    download_link: Option<String>,
}

/// POST /api/research/start
pub async fn start_research(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ResearchRequest>,
) -> Result<Json<ResearchResponse>, AppError> {
    if request.topic.trim().is_empty() {
        return Err(AppError::InvalidRequest(
            "topic must not be empty".to_string(),
        ));
    }

    let config = state.config.research.clone();
    let url = format!("{}/tasks/start-research", config.base_url);
    let response = state
        .http
        .post(&url)
        .header("Authorization", &request.token)
        .json(&json!({"topic": request.topic, "email": request.user_email}))
        .send()
        .await
        .map_err(|e| AppError::Upstream(format!("Failed to reach research API: {}", e)))?;

    if !response.status().is_success() {
        return Err(AppError::Upstream(format!(
            "Research API returned {}",
            response.status()
        )));
    }

    let body: StartResearchBody = response
        .json()
        .await
        .map_err(|e| AppError::Upstream(format!("Invalid research API response: {}", e)))?;

    let request_id = match (body.success, body.data) {
        (true, Some(data)) => data.request_id,
        _ => return Err(AppError::Upstream("Research start failed".to_string())),
    };

    info!(research_id = %request_id, "Research started, monitoring in background");
    tokio::spawn(monitor_research(
        state.http.clone(),
        config,
        request_id.clone(),
        request.user_email,
        request.token,
        request.notify_url,
    ));

    Ok(Json(ResearchResponse {
        success: true,
        message: "Research started successfully.".to_string(),
        research_id: Some(request_id),
    }))
}

/// Poll the task API until the research completes or the attempt budget runs
/// out, then notify the webhook. Poll errors are swallowed and retried.
pub async fn monitor_research(
    http: reqwest::Client,
    config: ResearchConfig,
    research_id: String,
    user_email: String,
    token: String,
    notify_url: String,
) {
    let status_url = format!("{}/tasks/get-research-status", config.base_url);
    let mut download_link = None;

    for _ in 0..config.max_poll_attempts {
        tokio::time::sleep(Duration::from_secs(config.poll_interval_secs)).await;

        let response = http
            .post(&status_url)
            .header("Authorization", &token)
            .json(&json!({"requestId": research_id, "email": user_email}))
            .send()
            .await;
        let Ok(response) = response else { continue };
        if !response.status().is_success() {
            continue;
        }
        let Ok(body) = response.json::<StatusBody>().await else {
            continue;
        };
        let Some(data) = body.data.filter(|_| body.success) else {
            continue;
        };
        if data.status.iter().any(|s| s == "COMPLETED") {
            download_link = data.download_link;
            break;
        }
    }

    let Some(link) = download_link else {
        warn!(research_id = %research_id, "Research did not complete within the poll budget");
        return;
    };

    let download_url = format!("{}{}", config.base_url, link);
    let result = http
        .post(&notify_url)
        .header("x-api-key", &config.api_key)
        .json(&json!({
            "message": format!("Research is complete. You can download the result here: {}", download_url),
            "download_url": download_url,
            "research_id": research_id,
        }))
        .send()
        .await;

    match result {
        Ok(r) if r.status().is_success() => {
            info!(research_id = %research_id, "Completion notification delivered")
        }
        Ok(r) => warn!(research_id = %research_id, status = %r.status(), "Webhook rejected notification"),
        Err(e) => warn!(research_id = %research_id, error = %e, "Failed to deliver notification"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn test_config(base_url: String) -> ResearchConfig {
        ResearchConfig {
            base_url,
            api_key: "test-key".to_string(),
            poll_interval_secs: 0,
            max_poll_attempts: 3,
        }
    }

    #[tokio::test]
    #[serial]
    async fn test_monitor_notifies_webhook_on_completion() {
        let mut server = mockito::Server::new_async().await;
        let status_mock = server
            .mock("POST", "/tasks/get-research-status")
            .with_status(200)
            .with_body(
                r#"{"success": true, "data": {"status": ["COMPLETED"], "downloadlink": "/files/r1.pdf"}}"#,
            )
            .create_async()
            .await;
        let notify_mock = server
            .mock("POST", "/hooks/research-done")
            .match_header("x-api-key", "test-key")
            .with_status(200)
            .create_async()
            .await;

        monitor_research(
            reqwest::Client::new(),
            test_config(server.url()),
            "r1".to_string(),
            "u@example.com".to_string(),
            "Bearer tok".to_string(),
            format!("{}/hooks/research-done", server.url()),
        )
        .await;

        status_mock.assert_async().await;
        notify_mock.assert_async().await;
    }

    #[tokio::test]
    #[serial]
    async fn test_monitor_gives_up_after_attempt_budget() {
        let mut server = mockito::Server::new_async().await;
        let status_mock = server
            .mock("POST", "/tasks/get-research-status")
            .with_status(200)
            .with_body(r#"{"success": true, "data": {"status": ["PENDING"]}}"#)
            .expect(3)
            .create_async()
            .await;
        let notify_mock = server
            .mock("POST", "/hooks/research-done")
            .expect(0)
            .create_async()
            .await;

        monitor_research(
            reqwest::Client::new(),
            test_config(server.url()),
            "r2".to_string(),
            "u@example.com".to_string(),
            "Bearer tok".to_string(),
            format!("{}/hooks/research-done", server.url()),
        )
        .await;

        status_mock.assert_async().await;
        notify_mock.assert_async().await;
    }
}
