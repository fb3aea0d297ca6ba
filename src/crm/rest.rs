//! REST implementation of the CRM boundary
//!
//! Authenticates via the password grant against the provider's login host
//! (sandbox or production), then issues read-only query and describe calls
//! against the instance URL returned at login. The login host is injectable
//! so tests can stand up a mock server.

use crate::crm::client::{CrmClient, CrmConnector};
use crate::crm::error::{ConnectionError, QueryFailure};
use crate::crm::types::{CrmCredentials, QueryResult, Record};
use async_trait::async_trait;
use serde::Deserialize;

const API_VERSION: &str = "v59.0";
const PRODUCTION_LOGIN_URL: &str = "https://login.salesforce.com";
const SANDBOX_LOGIN_URL: &str = "https://test.salesforce.com";

/// Token endpoint response
#[derive(Deserialize, Debug)]
struct TokenResponse {
    access_token: String,
    instance_url: String,
}

/// Token endpoint error body
#[derive(Deserialize, Debug)]
struct TokenError {
    #[serde(default)]
    error: String,
    #[serde(default)]
    error_description: String,
}

/// Query/describe error body entry (the API returns an array of these)
#[derive(Deserialize, Debug)]
struct ApiError {
    #[serde(default)]
    message: String,
    #[serde(rename = "errorCode", default)]
    error_code: String,
}

/// Raw query response
#[derive(Deserialize, Debug)]
struct RawQueryResponse {
    records: Vec<Record>,
    #[serde(rename = "totalSize")]
    total_size: usize,
}

/// Describe response, reduced to field names
#[derive(Deserialize, Debug)]
struct DescribeResponse {
    fields: Vec<DescribedField>,
}

#[derive(Deserialize, Debug)]
struct DescribedField {
    name: String,
}

/// Connector that logs in against the provider's REST token endpoint
pub struct RestCrmConnector {
    client: reqwest::Client,
    login_base_override: Option<String>,
}

impl RestCrmConnector {
    /// Build a connector using a shared HTTP client
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            login_base_override: None,
        }
    }

    /// Override the login host (for testing against a mock server)
    #[allow(dead_code)] // Used in tests
    pub fn with_login_base(mut self, base: impl Into<String>) -> Self {
        self.login_base_override = Some(base.into());
        self
    }

    fn login_base(&self, credentials: &CrmCredentials) -> String {
        if let Some(ref base) = self.login_base_override {
            return base.clone();
        }
        if credentials.is_sandbox {
            SANDBOX_LOGIN_URL.to_string()
        } else {
            PRODUCTION_LOGIN_URL.to_string()
        }
    }
}

#[async_trait]
impl CrmConnector for RestCrmConnector {
    async fn connect(
        &self,
        credentials: &CrmCredentials,
    ) -> Result<Box<dyn CrmClient>, ConnectionError> {
        let url = format!("{}/services/oauth2/token", self.login_base(credentials));

        // Security token is appended to the password, per provider convention
        let password = format!("{}{}", credentials.password, credentials.security_token);
        let params = [
            ("grant_type", "password"),
            ("username", credentials.username.as_str()),
            ("password", password.as_str()),
        ];

        tracing::debug!(
            username = %credentials.username,
            sandbox = credentials.is_sandbox,
            "Authenticating against CRM"
        );

        let response = self
            .client
            .post(&url)
            .form(&params)
            .send()
            .await
            .map_err(|e| ConnectionError::from_raw(&e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ConnectionError::from_raw(&e.to_string()))?;

        if !status.is_success() {
            let raw = match serde_json::from_str::<TokenError>(&body) {
                Ok(err) => format!("{}: {}", err.error, err.error_description),
                Err(_) => body,
            };
            return Err(ConnectionError::from_raw(&raw));
        }

        let token: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| ConnectionError::from_raw(&format!("unexpected login response: {}", e)))?;

        Ok(Box::new(RestCrmClient {
            client: self.client.clone(),
            instance_url: token.instance_url,
            access_token: token.access_token,
        }))
    }
}

/// Session-bound REST client
pub struct RestCrmClient {
    client: reqwest::Client,
    instance_url: String,
    access_token: String,
}

impl RestCrmClient {
    /// Turn a non-success response body into a classified failure
    fn failure_from_body(status: u16, body: &str) -> QueryFailure {
        match serde_json::from_str::<Vec<ApiError>>(body) {
            Ok(errors) if !errors.is_empty() => {
                let first = &errors[0];
                QueryFailure::classify(format!("{}: {}", first.error_code, first.message))
            }
            _ => QueryFailure::other(format!("HTTP {}: {}", status, body)),
        }
    }
}

#[async_trait]
impl CrmClient for RestCrmClient {
    async fn execute(&self, query: &str) -> Result<QueryResult, QueryFailure> {
        let url = format!("{}/services/data/{}/query", self.instance_url, API_VERSION);

        tracing::debug!(query_len = query.len(), "Executing CRM query");

        let response = self
            .client
            .get(&url)
            .query(&[("q", query)])
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| QueryFailure::other(format!("request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| QueryFailure::other(format!("failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(Self::failure_from_body(status.as_u16(), &body));
        }

        let parsed: RawQueryResponse = serde_json::from_str(&body)
            .map_err(|e| QueryFailure::other(format!("unexpected query response: {}", e)))?;

        Ok(QueryResult {
            records: parsed.records,
            total_size: parsed.total_size,
        })
    }

    async fn describe_fields(&self, entity: &str) -> Result<Vec<String>, QueryFailure> {
        let url = format!(
            "{}/services/data/{}/sobjects/{}/describe",
            self.instance_url, API_VERSION, entity
        );

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| QueryFailure::other(format!("describe request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| QueryFailure::other(format!("failed to read describe response: {}", e)))?;

        if !status.is_success() {
            return Err(Self::failure_from_body(status.as_u16(), &body));
        }

        let parsed: DescribeResponse = serde_json::from_str(&body)
            .map_err(|e| QueryFailure::other(format!("unexpected describe response: {}", e)))?;

        Ok(parsed.fields.into_iter().map(|f| f.name).collect())
    }
}
