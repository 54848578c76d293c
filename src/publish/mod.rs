pub mod fhir_store;
pub mod memory;
pub mod store;

use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::{IdentifierSystems, Settings};
use crate::error::PublishError;
use crate::fhir::types::{BundleEntryRequest, Questionnaire, TransactionBundle};

use store::{id_from_location, transaction_entry_response, ResourceQuery, ResourceStore};

const RESOURCE_TYPE: &str = "Questionnaire";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    Created { id: Option<String> },
    Replaced { id: String },
    /// A resource with this fingerprint was already stored. Nothing was written
    /// by this call.
    AlreadyExists { id: Option<String> },
}

impl PublishOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Created { .. } => "created",
            Self::Replaced { .. } => "replaced",
            Self::AlreadyExists { .. } => "already-exists",
        }
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Created { id } | Self::AlreadyExists { id } => id.as_deref(),
            Self::Replaced { id } => Some(id),
        }
    }
}

/// Publishes questionnaires at most once per content fingerprint.
///
/// The lookup and the write are two separate calls. Concurrent publishers of
/// the same fingerprint rely on the store honouring `ifNoneExist`; callers that
/// need more must serialize publishes per survey id themselves.
pub struct Publisher<S> {
    store: S,
    systems: IdentifierSystems,
    timeout: Duration,
}

impl<S: ResourceStore> Publisher<S> {
    pub fn new(store: S, systems: IdentifierSystems, timeout: Duration) -> Self {
        Self {
            store,
            systems,
            timeout,
        }
    }

    pub fn from_settings(store: S, settings: &Settings) -> Self {
        Self::new(store, settings.identifier_systems.clone(), settings.timeout())
    }

    pub fn systems(&self) -> &IdentifierSystems {
        &self.systems
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn publish(
        &self,
        questionnaire: &Questionnaire,
        target_id: Option<&str>,
    ) -> Result<PublishOutcome, PublishError> {
        self.publish_with_timeout(questionnaire, target_id, self.timeout)
    }

    /// Looks the fingerprint up, then creates (no target id) or replaces
    /// (target id given). The write is attempted once.
    pub fn publish_with_timeout(
        &self,
        questionnaire: &Questionnaire,
        target_id: Option<&str>,
        timeout: Duration,
    ) -> Result<PublishOutcome, PublishError> {
        let query = ResourceQuery {
            resource_type: RESOURCE_TYPE,
            identifier_system: &self.systems.version,
            identifier_value: &questionnaire.version,
            resource_id: target_id,
        };

        if let Some(existing) = self.store.query(&query, timeout)? {
            let id = existing.get("id").and_then(Value::as_str).map(str::to_string);
            info!(
                survey_id = %questionnaire.name,
                version = %questionnaire.version,
                id = ?id,
                "questionnaire already published"
            );
            return Ok(PublishOutcome::AlreadyExists { id });
        }

        let mut resource =
            serde_json::to_value(questionnaire).map_err(|e| PublishError::Encode(e.to_string()))?;
        align_target_identifier(&mut resource, &self.systems.questionnaire, target_id);
        let request = match target_id {
            Some(id) => {
                resource["id"] = Value::String(id.to_string());
                BundleEntryRequest {
                    method: "PUT".to_string(),
                    url: format!("{RESOURCE_TYPE}/{id}"),
                    if_none_exist: None,
                }
            }
            None => {
                if let Some(fields) = resource.as_object_mut() {
                    fields.remove("id");
                }
                BundleEntryRequest {
                    method: "POST".to_string(),
                    url: RESOURCE_TYPE.to_string(),
                    if_none_exist: Some(format!("identifier={}", query.identifier_token())),
                }
            }
        };
        debug!(method = %request.method, url = %request.url, "publishing questionnaire");

        let bundle = TransactionBundle::single(resource, request);
        let response = self.store.submit_transaction(&bundle, timeout)?;
        let (status, location) = transaction_entry_response(&response);
        let stored_id = location.and_then(id_from_location);

        let outcome = match target_id {
            Some(id) => PublishOutcome::Replaced {
                id: stored_id.unwrap_or_else(|| id.to_string()),
            },
            // Conditional create matched an existing resource.
            None if status.is_some_and(|s| s.starts_with("200")) => {
                PublishOutcome::AlreadyExists { id: stored_id }
            }
            None => PublishOutcome::Created { id: stored_id },
        };
        info!(
            survey_id = %questionnaire.name,
            version = %questionnaire.version,
            outcome = outcome.label(),
            id = ?outcome.id(),
            "published questionnaire"
        );
        Ok(outcome)
    }
}

/// Keeps the target-id identifier in step with the id actually written: set to
/// `target_id` on replace, absent on create.
fn align_target_identifier(resource: &mut Value, system: &str, target_id: Option<&str>) {
    let Some(identifiers) = resource.get_mut("identifier").and_then(Value::as_array_mut) else {
        return;
    };
    identifiers.retain(|i| i.get("system").and_then(Value::as_str) != Some(system));
    if let Some(id) = target_id {
        identifiers.push(serde_json::json!({"system": system, "value": id}));
    }
}

#[cfg(test)]
mod tests {
    use super::memory::MemoryStore;
    use super::store::{ResourceQuery, ResourceStore};
    use super::{PublishOutcome, Publisher};
    use crate::clock::FixedClock;
    use crate::config::IdentifierSystems;
    use crate::error::PublishError;
    use crate::fhir::builder::{build_questionnaire, fingerprint, ConvertOptions};
    use crate::fhir::types::{ItemType, Questionnaire, QuestionnaireItem, TransactionBundle};
    use crate::qsf::parse::parse_qsf_bytes;
    use chrono::{TimeZone, Utc};
    use serde_json::Value;
    use std::time::Duration;

    const FIXTURE: &str = include_str!("../../fixtures/consent_survey.qsf");

    fn questionnaire(target_id: Option<&str>) -> Questionnaire {
        let survey = parse_qsf_bytes(FIXTURE.as_bytes(), "SV_consent01").expect("parse fixture");
        let systems = IdentifierSystems::default();
        let clock = FixedClock(Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap());
        let options = ConvertOptions {
            target_id,
            systems: &systems,
            clock: &clock,
        };
        build_questionnaire(&survey, &options).expect("convert fixture")
    }

    fn publisher(store: &MemoryStore) -> Publisher<&MemoryStore> {
        Publisher::new(store, IdentifierSystems::default(), Duration::from_secs(5))
    }

    #[test]
    fn republishing_unchanged_survey_writes_once() {
        let store = MemoryStore::new();
        let publisher = publisher(&store);
        let q = questionnaire(None);

        let first = publisher.publish(&q, None).expect("first publish");
        assert_eq!(first, PublishOutcome::Created { id: Some("1".to_string()) });
        assert_eq!(store.write_count(), 1);

        let second = publisher.publish(&q, None).expect("second publish");
        assert_eq!(second, PublishOutcome::AlreadyExists { id: Some("1".to_string()) });
        assert_eq!(store.write_count(), 1);
        assert_eq!(store.resources().len(), 1);
    }

    #[test]
    fn changed_content_is_published_as_a_new_version() {
        let store = MemoryStore::new();
        let publisher = publisher(&store);
        let q = questionnaire(None);
        publisher.publish(&q, None).expect("publish");

        let mut changed = q.clone();
        changed
            .item
            .push(QuestionnaireItem::new("question-QID99", "Anything else?", ItemType::String));
        changed.version = fingerprint(&changed.item).expect("fingerprint");
        assert_ne!(changed.version, q.version);

        let outcome = publisher.publish(&changed, None).expect("publish changed");
        assert!(matches!(outcome, PublishOutcome::Created { .. }));
        assert_eq!(store.resources().len(), 2);
    }

    #[test]
    fn target_id_selects_replace() {
        let store = MemoryStore::new();
        let publisher = publisher(&store);
        let q = questionnaire(Some("consent-form"));

        let outcome = publisher.publish(&q, Some("consent-form")).expect("publish");
        assert_eq!(outcome, PublishOutcome::Replaced { id: "consent-form".to_string() });
        let stored = store.resources();
        assert_eq!(stored[0]["id"], "consent-form");
        assert_eq!(stored[0]["resourceType"], "Questionnaire");

        let again = publisher.publish(&q, Some("consent-form")).expect("republish");
        assert!(matches!(again, PublishOutcome::AlreadyExists { .. }));
        assert_eq!(store.write_count(), 1);
    }

    #[test]
    fn create_omits_caller_side_id() {
        let store = MemoryStore::new();
        let q = questionnaire(Some("ignored"));
        publisher(&store).publish(&q, None).expect("publish");
        assert_eq!(store.resources()[0]["id"], "1");
    }

    #[test]
    fn stored_target_identifier_matches_the_written_id() {
        let systems = IdentifierSystems::default();
        let identifier = |resource: &Value| {
            resource["identifier"]
                .as_array()
                .expect("identifiers")
                .iter()
                .filter(|i| i["system"] == systems.questionnaire.as_str())
                .map(|i| i["value"].as_str().unwrap_or_default().to_string())
                .collect::<Vec<String>>()
        };

        let created = MemoryStore::new();
        publisher(&created)
            .publish(&questionnaire(Some("consent-v1")), None)
            .expect("create");
        let stored = created.resources().remove(0);
        assert_eq!(stored["id"], "1");
        assert!(identifier(&stored).is_empty());

        let replaced = MemoryStore::new();
        publisher(&replaced)
            .publish(&questionnaire(None), Some("consent-v2"))
            .expect("replace");
        let stored = replaced.resources().remove(0);
        assert_eq!(stored["id"], "consent-v2");
        assert_eq!(identifier(&stored), vec!["consent-v2".to_string()]);
    }

    /// Query never sees prior writes, as when two publishers race.
    struct BlindStore<'a>(&'a MemoryStore);

    impl ResourceStore for BlindStore<'_> {
        fn query(&self, _: &ResourceQuery<'_>, _: Duration) -> Result<Option<Value>, PublishError> {
            Ok(None)
        }

        fn submit_transaction(
            &self,
            bundle: &TransactionBundle,
            timeout: Duration,
        ) -> Result<Value, PublishError> {
            self.0.submit_transaction(bundle, timeout)
        }
    }

    #[test]
    fn racing_create_is_deduplicated_by_conditional_create() {
        let memory = MemoryStore::new();
        let publisher = Publisher::new(
            BlindStore(&memory),
            IdentifierSystems::default(),
            Duration::from_secs(5),
        );
        let q = questionnaire(None);

        assert!(matches!(
            publisher.publish(&q, None).expect("first"),
            PublishOutcome::Created { .. }
        ));
        assert!(matches!(
            publisher.publish(&q, None).expect("second"),
            PublishOutcome::AlreadyExists { .. }
        ));
        assert_eq!(memory.resources().len(), 1);
    }

    struct RejectingStore;

    impl ResourceStore for RejectingStore {
        fn query(&self, _: &ResourceQuery<'_>, _: Duration) -> Result<Option<Value>, PublishError> {
            Ok(None)
        }

        fn submit_transaction(
            &self,
            _: &TransactionBundle,
            _: Duration,
        ) -> Result<Value, PublishError> {
            Err(PublishError::Rejected {
                status: 422,
                body: "invalid resource".to_string(),
            })
        }
    }

    #[test]
    fn rejection_propagates_without_retry() {
        let publisher = Publisher::new(
            RejectingStore,
            IdentifierSystems::default(),
            Duration::from_secs(5),
        );
        let err = publisher.publish(&questionnaire(None), None).unwrap_err();
        assert!(matches!(err, PublishError::Rejected { status: 422, .. }));
        assert!(!err.is_retryable());
    }
}
