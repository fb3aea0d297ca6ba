//! CRM data types

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single CRM record: a free-form field-name to value mapping
pub type Record = serde_json::Map<String, Value>;

/// Credentials for the remote CRM
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrmCredentials {
    /// Login username
    pub username: String,
    /// Login password
    pub password: String,
    /// Security token appended to the password during login
    pub security_token: String,
    /// Use the sandbox login host instead of production
    #[serde(default)]
    pub is_sandbox: bool,
}

/// Result of a successful query execution
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    /// Returned rows
    pub records: Vec<Record>,
    /// Total row count reported by the CRM
    pub total_size: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_sandbox_defaults_to_false() {
        let creds: CrmCredentials = serde_json::from_str(
            r#"{"username": "u@example.com", "password": "p", "security_token": "t"}"#,
        )
        .unwrap();
        assert!(!creds.is_sandbox);
    }
}
