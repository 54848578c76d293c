//! Converts Qualtrics survey exports (QSF) into FHIR R4 Questionnaire
//! resources and publishes them to a FHIR store at most once per content
//! version.

pub mod clock;
pub mod config;
pub mod error;
pub mod fhir;
pub mod logging;
pub mod publish;
pub mod qsf;
pub mod util;

use serde_json::Value;
use tracing::info;

use crate::clock::Clock;
use crate::error::{ConvertError, Result};
use crate::fhir::builder::{build_questionnaire, ConvertOptions};
use crate::fhir::types::Questionnaire;
use crate::publish::store::ResourceStore;
use crate::publish::{PublishOutcome, Publisher};
use crate::qsf::parse::{parse_qsf_bytes, parse_qsf_value};

/// Parses and converts a raw QSF document.
pub fn convert_survey(
    raw: &[u8],
    survey_id: &str,
    options: &ConvertOptions<'_>,
) -> Result<Questionnaire, ConvertError> {
    let survey = parse_qsf_bytes(raw, survey_id)?;
    build_questionnaire(&survey, options)
}

pub fn convert_survey_value(
    root: &Value,
    survey_id: &str,
    options: &ConvertOptions<'_>,
) -> Result<Questionnaire, ConvertError> {
    let survey = parse_qsf_value(root, survey_id)?;
    build_questionnaire(&survey, options)
}

/// Converts a survey and publishes the result. Nothing is published when
/// conversion fails.
pub fn convert_and_publish<S: ResourceStore>(
    raw: &[u8],
    survey_id: &str,
    target_id: Option<&str>,
    publisher: &Publisher<S>,
    clock: &dyn Clock,
) -> Result<(Questionnaire, PublishOutcome)> {
    let options = ConvertOptions {
        target_id,
        systems: publisher.systems(),
        clock,
    };
    let questionnaire = convert_survey(raw, survey_id, &options)?;
    info!(
        survey_id,
        items = questionnaire.item.len(),
        version = %questionnaire.version,
        "converted survey"
    );
    let outcome = publisher.publish(&questionnaire, target_id)?;
    Ok((questionnaire, outcome))
}
