use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

use crate::error::ConvertError;
use crate::util::text::{compare_ids, strip_markup};

use super::types::{
    QsfBlock, QsfBlockTable, QsfChoice, QsfFlowEntry, QsfMetadata, QsfQuestion, QsfSubQuestion,
    QsfSurvey,
};

const FORCE_RESPONSE_ON: &str = "ON";

pub fn parse_qsf_bytes(raw: &[u8], survey_id: &str) -> Result<QsfSurvey, ConvertError> {
    let root: Value = serde_json::from_slice(raw).map_err(|e| ConvertError::InvalidJson {
        survey_id: survey_id.to_string(),
        message: e.to_string(),
    })?;
    parse_qsf_value(&root, survey_id)
}

pub fn parse_qsf_value(root: &Value, survey_id: &str) -> Result<QsfSurvey, ConvertError> {
    let metadata = parse_metadata(root);

    let elements = root
        .pointer("/SurveyElements")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            ConvertError::structural(survey_id, "SurveyElements", "missing SurveyElements array")
        })?;

    let mut flow: Option<Vec<QsfFlowEntry>> = None;
    let mut blocks: Option<QsfBlockTable> = None;
    let mut questions: BTreeMap<String, QsfQuestion> = BTreeMap::new();

    for element in elements {
        let kind = element.get("Element").and_then(Value::as_str).unwrap_or("");
        let payload = element.get("Payload").unwrap_or(&Value::Null);
        match kind {
            "FL" => {
                if flow.is_some() {
                    return Err(ConvertError::structural(survey_id, "FL", "multiple flow sections"));
                }
                flow = Some(parse_flow(payload, survey_id)?);
            }
            "BL" => {
                if blocks.is_some() {
                    return Err(ConvertError::structural(
                        survey_id,
                        "BL",
                        "multiple block table sections",
                    ));
                }
                blocks = Some(parse_block_table(payload, survey_id)?);
            }
            "SQ" => {
                let question = parse_question(payload, survey_id)?;
                if questions.contains_key(&question.qualtrics_qid) {
                    return Err(ConvertError::structural(
                        survey_id,
                        question.qualtrics_qid.clone(),
                        "question defined more than once",
                    ));
                }
                questions.insert(question.qualtrics_qid.clone(), question);
            }
            _ => {}
        }
    }

    let flow = flow.ok_or_else(|| ConvertError::structural(survey_id, "FL", "missing flow section"))?;
    let blocks = blocks
        .ok_or_else(|| ConvertError::structural(survey_id, "BL", "missing block table section"))?;

    debug!(
        survey_id,
        flow_entries = flow.len(),
        blocks = blocks.len(),
        questions = questions.len(),
        "parsed survey export"
    );

    Ok(QsfSurvey {
        survey_id: survey_id.to_string(),
        metadata,
        flow,
        blocks,
        questions,
    })
}

fn parse_metadata(root: &Value) -> QsfMetadata {
    let field = |name: &str| {
        root.pointer(&format!("/SurveyEntry/{name}"))
            .and_then(Value::as_str)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };
    QsfMetadata {
        survey_id: field("SurveyID"),
        title: field("SurveyName").unwrap_or_else(|| "Qualtrics Survey".to_string()),
        status: field("SurveyStatus"),
        created: field("SurveyCreationDate"),
        last_modified: field("LastModified"),
        start: field("SurveyStartDate"),
        expiration: field("SurveyExpirationDate"),
    }
}

fn parse_flow(payload: &Value, survey_id: &str) -> Result<Vec<QsfFlowEntry>, ConvertError> {
    let entries = payload
        .get("Flow")
        .and_then(Value::as_array)
        .ok_or_else(|| ConvertError::structural(survey_id, "FL", "flow payload has no Flow list"))?;
    Ok(entries
        .iter()
        .map(|entry| QsfFlowEntry {
            entry_type: entry
                .get("Type")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string(),
            id: entry.get("ID").and_then(Value::as_str).map(str::to_string),
        })
        .collect())
}

/// The export writes the block table either as an object keyed by position or
/// as a plain array. Both decode into this union before anything else looks at
/// blocks.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawBlockTable {
    Keyed(BTreeMap<String, Option<RawBlock>>),
    Positional(Vec<Option<RawBlock>>),
}

#[derive(Debug, Deserialize)]
struct RawBlock {
    #[serde(rename = "ID")]
    id: Option<String>,
    #[serde(rename = "Description", default)]
    description: Option<String>,
    #[serde(rename = "BlockElements", default)]
    elements: Option<Vec<RawBlockElement>>,
    #[serde(rename = "Options", default)]
    options: Option<RawBlockOptions>,
}

#[derive(Debug, Deserialize)]
struct RawBlockElement {
    #[serde(rename = "Type")]
    element_type: String,
    #[serde(rename = "QuestionID")]
    question_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawBlockOptions {
    #[serde(rename = "Looping", default)]
    looping: Option<Value>,
}

impl RawBlockTable {
    fn into_blocks(self) -> Vec<RawBlock> {
        match self {
            Self::Keyed(map) => {
                let mut entries = map.into_iter().collect::<Vec<(String, Option<RawBlock>)>>();
                entries.sort_by(|a, b| compare_ids(&a.0, &b.0));
                entries.into_iter().filter_map(|(_, block)| block).collect()
            }
            Self::Positional(list) => list.into_iter().flatten().collect(),
        }
    }
}

fn parse_block_table(payload: &Value, survey_id: &str) -> Result<QsfBlockTable, ConvertError> {
    let raw = RawBlockTable::deserialize(payload).map_err(|e| {
        ConvertError::structural(
            survey_id,
            "BL",
            format!("block table is neither a keyed mapping nor a sequence of blocks: {e}"),
        )
    })?;

    let mut table = BTreeMap::new();
    for block in raw.into_blocks() {
        let id = block
            .id
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ConvertError::structural(survey_id, "BL", "block without an ID"))?;
        let question_ids = block
            .elements
            .unwrap_or_default()
            .into_iter()
            .filter_map(|e| {
                if e.element_type == "Question" {
                    e.question_id
                } else {
                    debug!(block_id = %id, element_type = %e.element_type, "skipping block element");
                    None
                }
            })
            .collect::<Vec<String>>();
        let looping = block
            .options
            .and_then(|o| o.looping)
            .map(|v| is_looping(&v))
            .unwrap_or(false);
        if table.contains_key(&id) {
            return Err(ConvertError::structural(survey_id, id, "block defined more than once"));
        }
        table.insert(
            id.clone(),
            QsfBlock {
                id,
                description: block.description.unwrap_or_default(),
                question_ids,
                looping,
            },
        );
    }
    Ok(QsfBlockTable(table))
}

fn is_looping(value: &Value) -> bool {
    match value {
        Value::String(s) => !s.trim().is_empty() && !s.eq_ignore_ascii_case("None"),
        Value::Bool(b) => *b,
        _ => false,
    }
}

fn parse_question(payload: &Value, survey_id: &str) -> Result<QsfQuestion, ConvertError> {
    let qid = payload
        .get("QuestionID")
        .and_then(Value::as_str)
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ConvertError::structural(survey_id, "SQ", "question without a QuestionID"))?
        .to_string();

    let question_type = payload
        .pointer("/QuestionType/Type")
        .and_then(Value::as_str)
        .or_else(|| payload.get("QuestionType").and_then(Value::as_str))
        .unwrap_or("")
        .to_string();
    let selector = payload
        .get("Selector")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();
    let sub_selector = payload
        .get("SubSelector")
        .and_then(Value::as_str)
        .filter(|v| !v.is_empty())
        .map(str::to_string);

    let required = payload
        .pointer("/Validation/Settings/ForceResponse")
        .and_then(Value::as_str)
        .map(|v| v == FORCE_RESPONSE_ON)
        .unwrap_or(false);

    let display_logic = payload
        .get("DisplayLogic")
        .filter(|v| match v {
            Value::Null | Value::Bool(false) => false,
            Value::Object(map) => !map.is_empty(),
            _ => true,
        })
        .cloned();

    let choices = parse_choice_set(payload.get("Choices"), payload.get("ChoiceOrder"));
    let sub_questions = parse_sub_questions(payload.get("AdditionalQuestions"), &choices);

    Ok(QsfQuestion {
        question_text: strip_markup(
            payload
                .get("QuestionText")
                .and_then(Value::as_str)
                .unwrap_or(""),
        ),
        question_type,
        selector,
        sub_selector,
        required,
        choices,
        answers: parse_choice_set(payload.get("Answers"), payload.get("AnswerOrder")),
        display_logic,
        sub_questions,
        qualtrics_qid: qid,
    })
}

/// Side-by-side columns. A column without its own rows shares the parent's.
fn parse_sub_questions(node: Option<&Value>, parent_choices: &[QsfChoice]) -> Vec<QsfSubQuestion> {
    keyed_entries(node)
        .into_iter()
        .map(|(id, sub)| {
            let choices = parse_choice_set(sub.get("Choices"), sub.get("ChoiceOrder"));
            QsfSubQuestion {
                text: strip_markup(sub.get("QuestionText").and_then(Value::as_str).unwrap_or("")),
                choices: if choices.is_empty() {
                    parent_choices.to_vec()
                } else {
                    choices
                },
                answers: parse_choice_set(sub.get("Answers"), sub.get("AnswerOrder")),
                id,
            }
        })
        .collect()
}

/// Reads a choice or answer set encoded as an id-keyed object or as an array,
/// honouring an explicit order list when one is given.
pub(crate) fn parse_choice_set(node: Option<&Value>, order: Option<&Value>) -> Vec<QsfChoice> {
    let mut choices = keyed_entries(node)
        .into_iter()
        .map(|(id, value)| QsfChoice {
            label: match value {
                Value::String(s) => strip_markup(s),
                other => other
                    .get("Display")
                    .and_then(Value::as_str)
                    .map(strip_markup)
                    .unwrap_or_default(),
            },
            id,
        })
        .collect::<Vec<QsfChoice>>();

    let order = order
        .and_then(Value::as_array)
        .map(|list| list.iter().filter_map(id_string).collect::<Vec<String>>())
        .unwrap_or_default();
    if order.is_empty() {
        return choices;
    }

    let mut ordered = Vec::with_capacity(choices.len());
    for id in &order {
        if let Some(pos) = choices.iter().position(|c| &c.id == id) {
            ordered.push(choices.remove(pos));
        }
    }
    ordered.extend(choices);
    ordered
}

/// Entries of an object (ordered numerically by key) or an array (keyed by
/// index). Null entries are dropped.
fn keyed_entries(node: Option<&Value>) -> Vec<(String, &Value)> {
    let mut entries = match node {
        Some(Value::Object(map)) => map
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| (k.clone(), v))
            .collect::<Vec<(String, &Value)>>(),
        Some(Value::Array(list)) => list
            .iter()
            .enumerate()
            .filter(|(_, v)| !v.is_null())
            .map(|(i, v)| (i.to_string(), v))
            .collect(),
        _ => Vec::new(),
    };
    entries.sort_by(|a, b| compare_ids(&a.0, &b.0));
    entries
}

fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
