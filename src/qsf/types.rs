use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Sentinel the vendor writes into unset date fields.
pub const UNSET_DATE: &str = "0000-00-00 00:00:00";

/// Survey status value marking a published, running survey.
pub const ACTIVE_STATUS: &str = "Active";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QsfChoice {
    pub id: String,
    pub label: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QsfMetadata {
    pub survey_id: Option<String>,
    pub title: String,
    pub status: Option<String>,
    pub created: Option<String>,
    pub last_modified: Option<String>,
    pub start: Option<String>,
    pub expiration: Option<String>,
}

/// One entry of the survey flow. Only some entry types reference blocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QsfFlowEntry {
    pub entry_type: String,
    pub id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QsfBlock {
    pub id: String,
    pub description: String,
    pub question_ids: Vec<String>,
    pub looping: bool,
}

/// Canonical block table, keyed by block id regardless of how the export
/// encoded it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QsfBlockTable(pub BTreeMap<String, QsfBlock>);

impl QsfBlockTable {
    pub fn get(&self, block_id: &str) -> Option<&QsfBlock> {
        self.0.get(block_id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One column of a side-by-side question.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QsfSubQuestion {
    pub id: String,
    pub text: String,
    pub choices: Vec<QsfChoice>,
    pub answers: Vec<QsfChoice>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QsfQuestion {
    pub qualtrics_qid: String,
    pub question_text: String,
    pub question_type: String,
    pub selector: String,
    pub sub_selector: Option<String>,
    pub required: bool,
    pub choices: Vec<QsfChoice>,
    pub answers: Vec<QsfChoice>,
    pub display_logic: Option<serde_json::Value>,
    pub sub_questions: Vec<QsfSubQuestion>,
}

impl QsfQuestion {
    pub fn choice_label(&self, choice_id: &str) -> Option<&str> {
        self.choices
            .iter()
            .find(|c| c.id == choice_id)
            .map(|c| c.label.as_str())
    }
}

/// A parsed survey export. Read once per conversion and discarded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QsfSurvey {
    pub survey_id: String,
    pub metadata: QsfMetadata,
    pub flow: Vec<QsfFlowEntry>,
    pub blocks: QsfBlockTable,
    pub questions: BTreeMap<String, QsfQuestion>,
}
