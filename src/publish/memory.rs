use serde_json::{json, Value};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::error::PublishError;
use crate::fhir::types::TransactionBundle;

use super::store::{ResourceQuery, ResourceStore};

/// In-process resource store for tests and dry runs. It honours conditional
/// create the way a FHIR server does and counts every transaction it accepts.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

#[derive(Debug, Clone, Default)]
struct MemoryState {
    resources: Vec<Value>,
    writes: usize,
    next_id: u64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of transactions submitted so far.
    pub fn write_count(&self) -> usize {
        self.state().writes
    }

    pub fn resources(&self) -> Vec<Value> {
        self.state().resources.clone()
    }
}

fn has_identifier(resource: &Value, system: &str, value: &str) -> bool {
    resource
        .get("identifier")
        .and_then(Value::as_array)
        .map(|ids| {
            ids.iter().any(|id| {
                id.get("system").and_then(Value::as_str) == Some(system)
                    && id.get("value").and_then(Value::as_str) == Some(value)
            })
        })
        .unwrap_or(false)
}

fn resource_id(resource: &Value) -> Option<&str> {
    resource.get("id").and_then(Value::as_str)
}

impl MemoryState {
    fn find(&self, resource_type: &str, system: &str, value: &str, id: Option<&str>) -> Option<&Value> {
        self.resources.iter().find(|r| {
            r.get("resourceType").and_then(Value::as_str) == Some(resource_type)
                && has_identifier(r, system, value)
                && id.map_or(true, |id| resource_id(r) == Some(id))
        })
    }

    fn create(&mut self, mut resource: Value, if_none_exist: Option<&str>) -> Value {
        let resource_type = resource
            .get("resourceType")
            .and_then(Value::as_str)
            .unwrap_or("Resource")
            .to_string();
        let condition = if_none_exist
            .and_then(|c| c.strip_prefix("identifier="))
            .and_then(|token| token.split_once('|'));
        if let Some((system, value)) = condition {
            if let Some(existing) = self.find(&resource_type, system, value, None) {
                let id = resource_id(existing).unwrap_or_default();
                return json!({"status": "200 OK", "location": format!("{resource_type}/{id}/_history/1")});
            }
        }
        self.next_id += 1;
        let id = self.next_id.to_string();
        resource["id"] = json!(id);
        self.resources.push(resource);
        json!({"status": "201 Created", "location": format!("{resource_type}/{id}/_history/1")})
    }

    fn replace(&mut self, url: &str, mut resource: Value) -> Result<Value, PublishError> {
        let (resource_type, id) = url.split_once('/').ok_or_else(|| PublishError::Rejected {
            status: 400,
            body: format!("PUT requires Type/id, got {url}"),
        })?;
        resource["id"] = json!(id);
        let existing = self.resources.iter_mut().find(|r| {
            r.get("resourceType").and_then(Value::as_str) == Some(resource_type)
                && resource_id(r) == Some(id)
        });
        let status = match existing {
            Some(slot) => {
                *slot = resource;
                "200 OK"
            }
            None => {
                self.resources.push(resource);
                "201 Created"
            }
        };
        Ok(json!({"status": status, "location": format!("{resource_type}/{id}/_history/1")}))
    }
}

impl ResourceStore for MemoryStore {
    fn query(&self, query: &ResourceQuery<'_>, _timeout: Duration) -> Result<Option<Value>, PublishError> {
        Ok(self
            .state()
            .find(
                query.resource_type,
                query.identifier_system,
                query.identifier_value,
                query.resource_id,
            )
            .cloned())
    }

    fn submit_transaction(
        &self,
        bundle: &TransactionBundle,
        _timeout: Duration,
    ) -> Result<Value, PublishError> {
        let mut state = self.state();
        // Entries apply to a staged copy so a rejected bundle leaves no trace.
        let mut staged = state.clone();
        let mut responses = Vec::with_capacity(bundle.entry.len());
        for entry in &bundle.entry {
            let response = match entry.request.method.as_str() {
                "POST" => staged.create(entry.resource.clone(), entry.request.if_none_exist.as_deref()),
                "PUT" => staged.replace(&entry.request.url, entry.resource.clone())?,
                other => {
                    return Err(PublishError::Rejected {
                        status: 405,
                        body: format!("unsupported method {other}"),
                    })
                }
            };
            responses.push(json!({ "response": response }));
        }
        staged.writes += 1;
        *state = staged;
        Ok(json!({"resourceType": "Bundle", "type": "transaction-response", "entry": responses}))
    }
}
