use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::{ACCEPT, CONTENT_TYPE, USER_AGENT};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::config::Settings;
use crate::error::PublishError;
use crate::fhir::types::TransactionBundle;

use super::store::{first_search_match, ResourceQuery, ResourceStore};

const FHIR_JSON: &str = "application/fhir+json";
const AGENT: &str = concat!("qsf-fhir/", env!("CARGO_PKG_VERSION"));

/// FHIR REST endpoint used as the resource store.
#[derive(Debug, Clone)]
pub struct FhirStore {
    client: Client,
    base_url: String,
}

impl FhirStore {
    pub fn new(base_url: &str) -> Result<Self, PublishError> {
        let base_url = base_url.trim().trim_end_matches('/');
        if base_url.is_empty() {
            return Err(PublishError::NotConfigured);
        }
        let client = Client::builder()
            .build()
            .map_err(|e| PublishError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.to_string(),
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, PublishError> {
        Self::new(&settings.fhir_url)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn send(&self, request: RequestBuilder, timeout: Duration) -> Result<Value, PublishError> {
        let response = request
            .timeout(timeout)
            .header(USER_AGENT, AGENT)
            .header(ACCEPT, FHIR_JSON)
            .send()
            .map_err(|e| transport_error(e, timeout))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(PublishError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        response.json::<Value>().map_err(|e| {
            if e.is_timeout() {
                PublishError::Timeout(timeout)
            } else {
                PublishError::InvalidResponse(e.to_string())
            }
        })
    }
}

fn transport_error(err: reqwest::Error, timeout: Duration) -> PublishError {
    if err.is_timeout() {
        PublishError::Timeout(timeout)
    } else {
        PublishError::Transport(err.to_string())
    }
}

impl ResourceStore for FhirStore {
    fn query(&self, query: &ResourceQuery<'_>, timeout: Duration) -> Result<Option<Value>, PublishError> {
        let url = format!("{}/{}", self.base_url, query.resource_type);
        let mut params = vec![("identifier", query.identifier_token())];
        if let Some(id) = query.resource_id {
            params.push(("_id", id.to_string()));
        }
        debug!(url = %url, identifier = %params[0].1, "querying store");
        let bundle = self.send(self.client.get(&url).query(&params), timeout)?;
        first_search_match(bundle, query.resource_type)
    }

    fn submit_transaction(
        &self,
        bundle: &TransactionBundle,
        timeout: Duration,
    ) -> Result<Value, PublishError> {
        debug!(url = %self.base_url, entries = bundle.entry.len(), "submitting transaction");
        let request = self
            .client
            .post(&self.base_url)
            .header(CONTENT_TYPE, FHIR_JSON)
            .json(bundle);
        self.send(request, timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::FhirStore;
    use crate::config::Settings;
    use crate::error::PublishError;

    #[test]
    fn requires_a_base_url() {
        assert!(matches!(
            FhirStore::from_settings(&Settings::default()),
            Err(PublishError::NotConfigured)
        ));
    }

    #[test]
    fn trims_trailing_slash() {
        let store = FhirStore::new(" https://fhir.example.org/baseR4/ ").expect("store");
        assert_eq!(store.base_url(), "https://fhir.example.org/baseR4");
    }
}
