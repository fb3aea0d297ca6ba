//! Execution context
//!
//! Key-value bindings (entity identifiers, names) accumulated across plan
//! steps. The context grows monotonically and is first-writer-wins: a binding
//! extracted by an early step is never overwritten by a later one, so later
//! query generations always see the earliest known-good value.

use crate::crm::types::Record;
use serde::Serialize;
use std::collections::BTreeMap;

/// Identifier key prefixes, per the CRM's record-id convention
const ID_PREFIXES: &[(&str, &str)] = &[
    ("001", "account_id"),
    ("003", "contact_id"),
    ("006", "opportunity_id"),
    ("00Q", "lead_id"),
];

/// Accumulated bindings for one run
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct ExecutionContext {
    values: BTreeMap<String, String>,
}

impl ExecutionContext {
    /// Create an empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a binding only if the key is not already set
    pub fn set_if_absent(&mut self, key: &str, value: impl Into<String>) {
        if !self.values.contains_key(key) {
            self.values.insert(key.to_string(), value.into());
        }
    }

    /// Look up a binding
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// True if no binding has been extracted yet
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Serialize the bindings for inclusion in a generation prompt
    pub fn to_prompt_string(&self) -> String {
        serde_json::to_string(&self.values).unwrap_or_else(|_| "{}".to_string())
    }

    /// Scan returned rows for identifier-shaped fields and a name field,
    /// binding the first discovered value of each kind
    pub fn absorb_records(&mut self, records: &[Record]) {
        for record in records {
            if let Some(id) = record.get("Id").and_then(|v| v.as_str()) {
                if let Some(key) = context_key_for_id(id) {
                    self.set_if_absent(key, id);
                }
            }
            if let Some(account_id) = record.get("AccountId").and_then(|v| v.as_str()) {
                self.set_if_absent("account_id", account_id);
            }
            if let Some(name) = record.get("Name").and_then(|v| v.as_str()) {
                self.set_if_absent("account_name", name);
            }
        }
    }
}

/// Map a record id to its context key by prefix, if the prefix is known
fn context_key_for_id(id: &str) -> Option<&'static str> {
    ID_PREFIXES
        .iter()
        .find(|(prefix, _)| id.starts_with(prefix))
        .map(|(_, key)| *key)
}
