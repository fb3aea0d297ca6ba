//! CRM client traits
//!
//! `CrmConnector` authenticates a set of credentials and hands back a
//! `CrmClient` bound to that session. Both are trait objects so the agent
//! loop can be exercised with scripted stubs in tests.

use crate::crm::error::{ConnectionError, QueryFailure};
use crate::crm::types::{CrmCredentials, QueryResult};
use async_trait::async_trait;

/// A connected, read-only CRM session
///
/// Performs no retries itself; retries are the plan runner's responsibility.
#[async_trait]
pub trait CrmClient: Send + Sync {
    /// Execute a structured query and return rows plus the total row count
    async fn execute(&self, query: &str) -> Result<QueryResult, QueryFailure>;

    /// Return the valid field names of an entity type, for invalid-field repair
    async fn describe_fields(&self, entity: &str) -> Result<Vec<String>, QueryFailure>;
}

/// Factory turning credentials into a connected `CrmClient`
#[async_trait]
pub trait CrmConnector: Send + Sync {
    /// Authenticate and return a session-bound client
    async fn connect(
        &self,
        credentials: &CrmCredentials,
    ) -> Result<Box<dyn CrmClient>, ConnectionError>;
}
