use serde_json::Value;
use std::time::Duration;

use crate::error::PublishError;
use crate::fhir::types::TransactionBundle;

/// Identifier search against one resource type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceQuery<'a> {
    pub resource_type: &'a str,
    pub identifier_system: &'a str,
    pub identifier_value: &'a str,
    /// Restrict the match to this logical id.
    pub resource_id: Option<&'a str>,
}

impl ResourceQuery<'_> {
    /// `system|value` token as FHIR search and conditional create expect it.
    pub fn identifier_token(&self) -> String {
        format!("{}|{}", self.identifier_system, self.identifier_value)
    }
}

/// The resource store the publisher writes to.
pub trait ResourceStore {
    /// First resource matching `query`, if any.
    fn query(&self, query: &ResourceQuery<'_>, timeout: Duration) -> Result<Option<Value>, PublishError>;

    /// Submits a transaction bundle atomically and returns the
    /// transaction-response bundle.
    fn submit_transaction(
        &self,
        bundle: &TransactionBundle,
        timeout: Duration,
    ) -> Result<Value, PublishError>;
}

impl<S: ResourceStore + ?Sized> ResourceStore for &S {
    fn query(&self, query: &ResourceQuery<'_>, timeout: Duration) -> Result<Option<Value>, PublishError> {
        (**self).query(query, timeout)
    }

    fn submit_transaction(
        &self,
        bundle: &TransactionBundle,
        timeout: Duration,
    ) -> Result<Value, PublishError> {
        (**self).submit_transaction(bundle, timeout)
    }
}

/// First entry resource of a search bundle with the given type. Entries the
/// server added as `search.mode: outcome` are skipped.
pub fn first_search_match(
    bundle: Value,
    resource_type: &str,
) -> Result<Option<Value>, PublishError> {
    if bundle.get("resourceType").and_then(Value::as_str) != Some("Bundle") {
        return Err(PublishError::InvalidResponse(
            "search did not return a Bundle".to_string(),
        ));
    }
    Ok(bundle
        .get("entry")
        .and_then(Value::as_array)
        .and_then(|entries| {
            entries
                .iter()
                .filter(|e| e.pointer("/search/mode").and_then(Value::as_str) != Some("outcome"))
                .filter_map(|e| e.get("resource"))
                .find(|r| r.get("resourceType").and_then(Value::as_str) == Some(resource_type))
                .cloned()
        }))
}

/// Status and location of the single entry of a transaction-response bundle.
pub fn transaction_entry_response(response: &Value) -> (Option<&str>, Option<&str>) {
    let entry = response.pointer("/entry/0/response");
    (
        entry.and_then(|r| r.get("status")).and_then(Value::as_str),
        entry.and_then(|r| r.get("location")).and_then(Value::as_str),
    )
}

/// Logical id from a location such as `Questionnaire/123/_history/1`.
pub fn id_from_location(location: &str) -> Option<String> {
    let mut parts = location.trim_start_matches('/').split('/');
    let mut previous = parts.next()?;
    for part in parts {
        if previous == "Questionnaire" && !part.is_empty() {
            return Some(part.to_string());
        }
        previous = part;
    }
    None
}
