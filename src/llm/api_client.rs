//! Chat-completions API client
//!
//! Direct HTTP client for calling the chat-completions API. This is used by
//! the planner, the per-step query generator and the result synthesizer to
//! get (optionally JSON-shaped) text responses.

use crate::error::AppError;
use crate::llm::types::{ChatApiRequest, ChatApiResponse, ChatMessage, ResponseFormat};

/// Call the chat-completions API with a single user prompt
///
/// # Arguments
/// * `client` - Shared reqwest client (connection pooling)
/// * `api_key` - Bearer token for the API
/// * `base_url` - API base URL (injectable so tests can point at a mock server)
/// * `model` - Model name
/// * `prompt` - The prompt to send
/// * `force_json` - If true, request JSON response format
/// * `max_tokens` - Upper bound on generated tokens
/// * `temperature` - Sampling temperature
///
/// # Returns
/// * `Ok(String)` - The text content of the first completion
/// * `Err(AppError)` - If the API key is missing, the HTTP request fails,
///   response parsing fails, or the response contains no completion.
#[allow(clippy::too_many_arguments)]
pub async fn call_chat_api(
    client: &reqwest::Client,
    api_key: &str,
    base_url: &str,
    model: &str,
    prompt: &str,
    force_json: bool,
    max_tokens: u32,
    temperature: f32,
) -> Result<String, AppError> {
    if api_key.is_empty() {
        return Err(AppError::Generation("API key is empty".to_string()));
    }

    let url = format!("{}/chat/completions", base_url);

    let response_format = force_json.then(|| ResponseFormat {
        format_type: "json_object".to_string(),
    });

    let request_body = ChatApiRequest {
        model: model.to_string(),
        messages: vec![ChatMessage {
            role: "user".to_string(),
            content: prompt.to_string(),
        }],
        max_tokens,
        temperature,
        response_format,
    };

    tracing::debug!(
        url = %url,
        model = %model,
        force_json = force_json,
        prompt_len = prompt.len(),
        "Calling chat-completions API"
    );

    let response = client
        .post(&url)
        .bearer_auth(api_key)
        .json(&request_body)
        .send()
        .await
        .map_err(|e| AppError::Generation(format!("Failed to send HTTP request: {}", e)))?;

    let status = response.status();
    if !status.is_success() {
        let status_code = status.as_u16();
        let error_body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read error body".to_string());

        tracing::error!(
            status_code = status_code,
            error_body = %error_body,
            "Chat-completions API returned error status"
        );

        if status_code == 429 {
            return Err(AppError::Generation(format!(
                "rate limit exceeded (HTTP {}): {}",
                status_code, error_body
            )));
        }

        return Err(AppError::Generation(format!(
            "HTTP {}: {}",
            status_code, error_body
        )));
    }

    let response_body = response
        .text()
        .await
        .map_err(|e| AppError::Generation(format!("Failed to read response body: {}", e)))?;

    let parsed: ChatApiResponse = serde_json::from_str(&response_body).map_err(|e| {
        AppError::Generation(format!(
            "Failed to parse JSON response: {} - Response body: {}",
            e, response_body
        ))
    })?;

    let choice = parsed
        .choices
        .first()
        .ok_or_else(|| AppError::Generation("response contains no choices".to_string()))?;

    let text = choice.message.content.trim();
    if text.is_empty() {
        return Err(AppError::Generation("response text is empty".to_string()));
    }

    tracing::debug!(
        response_len = text.len(),
        "Successfully received response from chat-completions API"
    );

    Ok(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;
    use serial_test::serial;

    #[tokio::test]
    async fn test_call_chat_api_empty_api_key() {
        let client = reqwest::Client::new();
        let result = call_chat_api(
            &client,
            "",
            "http://localhost:1",
            "gpt-4.1",
            "test prompt",
            false,
            300,
            0.1,
        )
        .await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("API key is empty"));
    }

    #[tokio::test]
    #[serial]
    async fn test_call_chat_api_success() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer test-key")
            .match_header("content-type", "application/json")
            .with_status(200)
            .with_body(
                r#"{
                    "choices": [{
                        "message": {
                            "content": "This is a test response"
                        },
                        "finish_reason": "stop"
                    }]
                }"#,
            )
            .create_async()
            .await;

        let client = reqwest::Client::new();
        let result = call_chat_api(
            &client,
            "test-key",
            &server.url(),
            "gpt-4.1",
            "test prompt",
            false,
            300,
            0.1,
        )
        .await;

        mock.assert_async().await;
        assert!(result.is_ok());
        assert_eq!(result.unwrap(), "This is a test response");
    }

    #[tokio::test]
    #[serial]
    async fn test_call_chat_api_json_mode() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_body(mockito::Matcher::PartialJsonString(
                r#"{"response_format": {"type": "json_object"}}"#.to_string(),
            ))
            .with_status(200)
            .with_body(
                r#"{
                    "choices": [{
                        "message": {
                            "content": "{\"step\": 1, \"action\": \"test\"}"
                        }
                    }]
                }"#,
            )
            .create_async()
            .await;

        let client = reqwest::Client::new();
        let result = call_chat_api(
            &client,
            "test-key",
            &server.url(),
            "gpt-4.1",
            "test prompt",
            true,
            300,
            0.1,
        )
        .await;

        mock.assert_async().await;
        assert!(result.is_ok());
        let response = result.unwrap();
        assert!(response.contains("\"step\""));
        assert!(response.contains("\"action\""));
    }

    #[tokio::test]
    #[serial]
    async fn test_call_chat_api_empty_choices() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(r#"{"choices": []}"#)
            .create_async()
            .await;

        let client = reqwest::Client::new();
        let result = call_chat_api(
            &client,
            "test-key",
            &server.url(),
            "gpt-4.1",
            "test prompt",
            false,
            300,
            0.1,
        )
        .await;

        mock.assert_async().await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("no choices"));
    }

    #[tokio::test]
    #[serial]
    async fn test_call_chat_api_rate_limit() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .with_status(429)
            .with_body(r#"{"error": "Rate limit exceeded"}"#)
            .create_async()
            .await;

        let client = reqwest::Client::new();
        let result = call_chat_api(
            &client,
            "test-key",
            &server.url(),
            "gpt-4.1",
            "test prompt",
            false,
            300,
            0.1,
        )
        .await;

        mock.assert_async().await;
        assert!(result.is_err());
        let error_msg = result.unwrap_err().to_string();
        assert!(error_msg.contains("rate limit") || error_msg.contains("429"));
    }

    #[tokio::test]
    #[serial]
    async fn test_call_chat_api_invalid_json() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(r#"This is not JSON"#)
            .create_async()
            .await;

        let client = reqwest::Client::new();
        let result = call_chat_api(
            &client,
            "test-key",
            &server.url(),
            "gpt-4.1",
            "test prompt",
            false,
            300,
            0.1,
        )
        .await;

        mock.assert_async().await;
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Failed to parse JSON"));
    }
}
