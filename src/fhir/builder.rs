use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use std::collections::HashSet;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::config::IdentifierSystems;
use crate::error::ConvertError;
use crate::qsf::flow::{resolve_flow, ResolvedBlock};
use crate::qsf::types::{QsfMetadata, QsfQuestion, QsfSurvey, ACTIVE_STATUS, UNSET_DATE};
use crate::util::hash::sha256_hex;

use super::logic::translate_display_logic;
use super::mapping::{group_link_id, map_question};
use super::types::{
    Identifier, ItemType, Period, PublicationStatus, Questionnaire, QuestionnaireItem,
};

const VENDOR_TIMESTAMP: &str = "%Y-%m-%d %H:%M:%S";

pub struct ConvertOptions<'a> {
    /// Existing questionnaire to replace; `None` creates a new one.
    pub target_id: Option<&'a str>,
    pub systems: &'a IdentifierSystems,
    pub clock: &'a dyn Clock,
}

/// Converts a parsed survey into a questionnaire. Fails as a whole on the
/// first unsupported question or condition.
pub fn build_questionnaire(
    survey: &QsfSurvey,
    options: &ConvertOptions<'_>,
) -> Result<Questionnaire, ConvertError> {
    let blocks = resolve_flow(survey)?;
    let items = build_items(survey, &blocks)?;
    assemble_questionnaire(survey, items, options)
}

/// Link ids emitted so far, in document order.
struct LinkIds<'s> {
    survey_id: &'s str,
    seen: HashSet<String>,
}

impl<'s> LinkIds<'s> {
    fn new(survey_id: &'s str) -> Self {
        Self {
            survey_id,
            seen: HashSet::new(),
        }
    }

    fn claim(&mut self, link_id: &str) -> Result<(), ConvertError> {
        if !self.seen.insert(link_id.to_string()) {
            return Err(ConvertError::structural(
                self.survey_id,
                link_id,
                "link id emitted more than once",
            ));
        }
        Ok(())
    }

    fn claim_all(&mut self, item: &QuestionnaireItem) -> Result<(), ConvertError> {
        let mut nodes = Vec::new();
        item.walk(&mut nodes);
        for node in nodes {
            self.claim(&node.link_id)?;
        }
        Ok(())
    }
}

pub fn build_items(
    survey: &QsfSurvey,
    blocks: &[ResolvedBlock<'_>],
) -> Result<Vec<QuestionnaireItem>, ConvertError> {
    let mut ids = LinkIds::new(&survey.survey_id);
    let mut items = Vec::new();
    for resolved in blocks {
        items.extend(build_block(survey, resolved, &mut ids)?);
    }
    Ok(items)
}

/// A looping block becomes one repeating group; any other block contributes
/// its questions directly.
fn build_block(
    survey: &QsfSurvey,
    resolved: &ResolvedBlock<'_>,
    ids: &mut LinkIds<'_>,
) -> Result<Vec<QuestionnaireItem>, ConvertError> {
    if !resolved.block.looping {
        return resolved
            .questions
            .iter()
            .map(|q| build_question(survey, q, ids))
            .collect();
    }

    let mut group = QuestionnaireItem::new(
        group_link_id(&resolved.block.id),
        &resolved.block.description,
        ItemType::Group,
    );
    group.repeats = true;
    ids.claim(&group.link_id)?;
    group.item = resolved
        .questions
        .iter()
        .map(|q| build_question(survey, q, ids))
        .collect::<Result<Vec<QuestionnaireItem>, ConvertError>>()?;
    Ok(vec![group])
}

fn build_question(
    survey: &QsfSurvey,
    question: &QsfQuestion,
    ids: &mut LinkIds<'_>,
) -> Result<QuestionnaireItem, ConvertError> {
    let mut item = map_question(question, &survey.survey_id)?;
    if let Some(rule) = translate_display_logic(survey, question)? {
        if !ids.seen.contains(&rule.question) {
            return Err(ConvertError::display_logic(
                &survey.survey_id,
                &question.qualtrics_qid,
                format!("condition on {} which is not shown earlier", rule.question),
            ));
        }
        item.enable_when.push(rule);
    }
    ids.claim_all(&item)?;
    Ok(item)
}

/// Content version of an item list: hex SHA-256 of its compact JSON form.
pub fn fingerprint(items: &[QuestionnaireItem]) -> Result<String, serde_json::Error> {
    Ok(sha256_hex(&serde_json::to_vec(items)?))
}

pub fn assemble_questionnaire(
    survey: &QsfSurvey,
    items: Vec<QuestionnaireItem>,
    options: &ConvertOptions<'_>,
) -> Result<Questionnaire, ConvertError> {
    let meta = &survey.metadata;
    let now = options.clock.now();
    let version = fingerprint(&items).map_err(|e| {
        ConvertError::structural(&survey.survey_id, "item", format!("unable to encode items: {e}"))
    })?;
    let status = derive_status(meta, now);

    let mut identifier = vec![
        Identifier {
            system: options.systems.survey.clone(),
            value: survey.survey_id.clone(),
        },
        Identifier {
            system: options.systems.version.clone(),
            value: version.clone(),
        },
    ];
    if let Some(target_id) = options.target_id {
        identifier.push(Identifier {
            system: options.systems.questionnaire.clone(),
            value: target_id.to_string(),
        });
    }

    let effective_period = Period {
        start: effective_bound(&survey.survey_id, "start", meta.start.as_deref()),
        end: effective_bound(&survey.survey_id, "expiration", meta.expiration.as_deref()),
    };
    let last_modified = parse_vendor_timestamp(meta.last_modified.as_deref());

    debug!(
        survey_id = %survey.survey_id,
        items = items.len(),
        status = ?status,
        version = %version,
        "assembled questionnaire"
    );

    Ok(Questionnaire {
        resource_type: "Questionnaire".to_string(),
        id: options.target_id.map(str::to_string),
        identifier,
        version,
        name: survey.survey_id.clone(),
        title: meta.title.clone(),
        status,
        date: last_modified.map(fhir_date_time),
        approval_date: parse_vendor_timestamp(meta.created.as_deref()).map(fhir_date),
        last_review_date: last_modified.map(fhir_date),
        effective_period: Some(effective_period).filter(|p| !p.is_empty()),
        item: items,
    })
}

/// Active when the survey says so, draft otherwise, retired once expired.
pub fn derive_status(meta: &QsfMetadata, now: DateTime<Utc>) -> PublicationStatus {
    if let Some(expiration) = parse_vendor_timestamp(meta.expiration.as_deref()) {
        if expiration < now {
            return PublicationStatus::Retired;
        }
    }
    if meta.status.as_deref() == Some(ACTIVE_STATUS) {
        PublicationStatus::Active
    } else {
        PublicationStatus::Draft
    }
}

/// `None` for absent values, the unset sentinel and unparseable timestamps.
pub fn parse_vendor_timestamp(value: Option<&str>) -> Option<DateTime<Utc>> {
    let value = value?.trim();
    if value.is_empty() || value == UNSET_DATE {
        return None;
    }
    NaiveDateTime::parse_from_str(value, VENDOR_TIMESTAMP)
        .map(|naive| Utc.from_utc_datetime(&naive))
        .or_else(|_| DateTime::parse_from_rfc3339(value).map(|dt| dt.with_timezone(&Utc)))
        .ok()
}

fn effective_bound(survey_id: &str, field: &str, value: Option<&str>) -> Option<String> {
    let raw = value?;
    match parse_vendor_timestamp(Some(raw)) {
        Some(ts) => Some(fhir_date_time(ts)),
        None => {
            if raw.trim() != UNSET_DATE {
                warn!(survey_id, field, value = raw, "ignoring unparseable survey date");
            }
            None
        }
    }
}

fn fhir_date_time(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn fhir_date(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d").to_string()
}
