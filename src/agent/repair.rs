//! Query repair engine
//!
//! Best-effort corrective rewrites for failed queries. Two failure classes
//! are repairable: bind-variable misuse (the query language forbids
//! placeholders, so any `:identifier` token is substituted with a concrete
//! value from the execution context) and invalid field references (the
//! offending field is swapped for the nearest valid field of the target
//! entity, found via schema introspection). Neither rewrite is verified:
//! the runner simply re-executes and classifies again.

use crate::agent::context::ExecutionContext;
use crate::crm::client::CrmClient;
use once_cell::sync::Lazy;
use regex::Regex;

/// Bind-variable placeholder: a colon followed by an identifier
static BIND_VAR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r":([A-Za-z_][A-Za-z0-9_]*)").expect("bind-variable regex"));

/// Quoted token in a provider error message, e.g. `No such column 'Ammount'`
static QUOTED_TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"'([A-Za-z0-9_.]+)'").expect("quoted-token regex"));

/// Minimum name similarity for an invalid-field substitution
const FIELD_SIMILARITY_THRESHOLD: f64 = 0.8;

/// Replace every bind-variable placeholder in `query`
///
/// A placeholder whose snake_cased name maps to a context binding becomes a
/// quoted literal of that binding's value; any other placeholder becomes an
/// empty literal. Afterwards, dangling-operator artifacts the model sometimes
/// emits are dropped. The result is guaranteed to contain no placeholder
/// pattern, but is otherwise unverified.
pub fn substitute_bind_variables(query: &str, context: &ExecutionContext) -> String {
    let substituted = BIND_VAR_RE.replace_all(query, |caps: &regex::Captures<'_>| {
        let key = context_key_for_placeholder(&caps[1]);
        match context.get(&key) {
            Some(value) => format!("'{}'", value),
            None => "''".to_string(),
        }
    });

    substituted
        .replace("WHERE AND", "WHERE")
        .replace("= AND", "AND")
}

/// Map a placeholder name to its context key (`accountId` -> `account_id`)
fn context_key_for_placeholder(name: &str) -> String {
    let mut key = String::with_capacity(name.len() + 2);
    for c in name.chars() {
        if c.is_ascii_uppercase() {
            key.push('_');
            key.push(c.to_ascii_lowercase());
        } else {
            key.push(c);
        }
    }
    key
}

/// Attempt to repair an invalid-field failure via schema introspection
///
/// Extracts the target entity from the query's FROM clause and the offending
/// field from the error message, then substitutes the most similar valid
/// field when the similarity clears the threshold. Intentionally
/// conservative: if the entity cannot be determined, introspection fails, or
/// no confident match exists, returns `None` and the step stays failed.
pub async fn repair_invalid_field(
    query: &str,
    error_message: &str,
    crm: &dyn CrmClient,
) -> Option<String> {
    let entity = extract_entity(query)?;
    let offending = extract_offending_field(error_message)?;

    let valid_fields = match crm.describe_fields(&entity).await {
        Ok(fields) => fields,
        Err(failure) => {
            tracing::debug!(
                entity = %entity,
                error = %failure,
                "Schema introspection failed; leaving query unchanged"
            );
            return None;
        }
    };

    // Already a valid field: the error blames something else, don't touch it
    if valid_fields.iter().any(|f| f == &offending) {
        return None;
    }

    let (best, score) = valid_fields
        .iter()
        .map(|f| (f, strsim::jaro_winkler(&f.to_lowercase(), &offending.to_lowercase())))
        .max_by(|a, b| a.1.total_cmp(&b.1))?;

    if score < FIELD_SIMILARITY_THRESHOLD {
        tracing::debug!(
            offending = %offending,
            best_candidate = %best,
            score = score,
            "No confident field match; leaving query unchanged"
        );
        return None;
    }

    let repaired = query.replacen(&offending, best, 1);
    if repaired == query {
        return None;
    }

    tracing::debug!(
        offending = %offending,
        replacement = %best,
        score = score,
        "Substituted invalid field"
    );
    Some(repaired)
}

/// The entity name following the query's FROM keyword
fn extract_entity(query: &str) -> Option<String> {
    let mut tokens = query.split_whitespace();
    while let Some(token) = tokens.next() {
        if token.eq_ignore_ascii_case("FROM") {
            return tokens
                .next()
                .map(|t| t.trim_matches(|c: char| !c.is_ascii_alphanumeric() && c != '_'))
                .filter(|t| !t.is_empty())
                .map(str::to_string);
        }
    }
    None
}

/// The first quoted token in a provider error message
fn extract_offending_field(message: &str) -> Option<String> {
    QUOTED_TOKEN_RE
        .captures(message)
        .map(|caps| caps[1].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crm::error::QueryFailure;
    use crate::crm::types::QueryResult;
    use async_trait::async_trait;

    struct FixedSchemaCrm {
        fields: Vec<String>,
    }

    #[async_trait]
    impl CrmClient for FixedSchemaCrm {
        async fn execute(&self, _query: &str) -> Result<QueryResult, QueryFailure> {
            unreachable!("repair tests never execute")
        }

        async fn describe_fields(&self, _entity: &str) -> Result<Vec<String>, QueryFailure> {
            Ok(self.fields.clone())
        }
    }

    fn context_with(key: &str, value: &str) -> ExecutionContext {
        let mut ctx = ExecutionContext::new();
        ctx.set_if_absent(key, value);
        ctx
    }

    #[test]
    fn test_substitute_known_placeholder_with_context_value() {
        let ctx = context_with("account_id", "001AAA");
        let repaired = substitute_bind_variables(
            "SELECT Id FROM Opportunity WHERE AccountId = :accountId",
            &ctx,
        );
        assert_eq!(
            repaired,
            "SELECT Id FROM Opportunity WHERE AccountId = '001AAA'"
        );
    }

    #[test]
    fn test_substitute_unknown_placeholder_with_empty_literal() {
        let ctx = ExecutionContext::new();
        let repaired =
            substitute_bind_variables("SELECT Id FROM Contact WHERE Email = :email", &ctx);
        assert_eq!(repaired, "SELECT Id FROM Contact WHERE Email = ''");
    }

    #[test]
    fn test_no_placeholder_pattern_remains() {
        let ctx = context_with("account_id", "001AAA");
        let repaired = substitute_bind_variables(
            "SELECT Id FROM Opportunity WHERE AccountId = :accountId AND OwnerId = :ownerId",
            &ctx,
        );
        assert!(!BIND_VAR_RE.is_match(&repaired));
    }

    #[test]
    fn test_substitute_snake_case_placeholder() {
        let ctx = context_with("account_id", "001AAA");
        let repaired = substitute_bind_variables("WHERE AccountId = :account_id", &ctx);
        assert_eq!(repaired, "WHERE AccountId = '001AAA'");
    }

    #[test]
    fn test_query_without_placeholders_unchanged() {
        let ctx = ExecutionContext::new();
        let query = "SELECT Id, Name FROM Account LIMIT 10";
        assert_eq!(substitute_bind_variables(query, &ctx), query);
    }

    #[test]
    fn test_extract_entity_case_insensitive() {
        assert_eq!(
            extract_entity("select Id from Opportunity where IsClosed = false"),
            Some("Opportunity".to_string())
        );
    }

    #[test]
    fn test_extract_entity_missing_from() {
        assert_eq!(extract_entity("SELECT Id"), None);
    }

    #[test]
    fn test_extract_offending_field_from_message() {
        assert_eq!(
            extract_offending_field("No such column 'Ammount' on entity 'Opportunity'"),
            Some("Ammount".to_string())
        );
    }

    #[tokio::test]
    async fn test_repair_invalid_field_substitutes_nearest() {
        let crm = FixedSchemaCrm {
            fields: vec![
                "Id".to_string(),
                "Name".to_string(),
                "Amount".to_string(),
                "StageName".to_string(),
            ],
        };
        let repaired = repair_invalid_field(
            "SELECT Id, Ammount FROM Opportunity",
            "INVALID_FIELD: No such column 'Ammount' on entity 'Opportunity'",
            &crm,
        )
        .await;
        assert_eq!(
            repaired,
            Some("SELECT Id, Amount FROM Opportunity".to_string())
        );
    }

    #[tokio::test]
    async fn test_repair_invalid_field_no_confident_match() {
        let crm = FixedSchemaCrm {
            fields: vec!["Id".to_string(), "Name".to_string()],
        };
        let repaired = repair_invalid_field(
            "SELECT Zzzqq FROM Opportunity",
            "INVALID_FIELD: No such column 'Zzzqq' on entity 'Opportunity'",
            &crm,
        )
        .await;
        assert_eq!(repaired, None);
    }
}
