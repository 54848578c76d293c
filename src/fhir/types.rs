use serde::{Deserialize, Serialize};

fn is_false(value: &bool) -> bool {
    !*value
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    String,
    Text,
    Integer,
    Decimal,
    Choice,
    Display,
    Group,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerOption {
    pub value_string: String,
}

/// Show the owning item only when `question` was answered with `answer_string`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnableWhen {
    pub question: String,
    pub operator: String,
    pub answer_string: String,
}

impl EnableWhen {
    pub fn equals(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            operator: "=".to_string(),
            answer_string: answer.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionnaireItem {
    pub link_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(rename = "type")]
    pub item_type: ItemType,
    #[serde(default, skip_serializing_if = "is_false")]
    pub required: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub repeats: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enable_when: Vec<EnableWhen>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub answer_option: Vec<AnswerOption>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub item: Vec<QuestionnaireItem>,
}

impl QuestionnaireItem {
    pub fn new(link_id: impl Into<String>, text: &str, item_type: ItemType) -> Self {
        Self {
            link_id: link_id.into(),
            text: Some(text.to_string()).filter(|t| !t.is_empty()),
            item_type,
            required: false,
            repeats: false,
            enable_when: Vec::new(),
            answer_option: Vec::new(),
            item: Vec::new(),
        }
    }

    pub fn with_options<'a>(mut self, labels: impl IntoIterator<Item = &'a str>) -> Self {
        self.answer_option = labels
            .into_iter()
            .map(|label| AnswerOption {
                value_string: label.to_string(),
            })
            .collect();
        self
    }

    /// Pre-order walk over this item and all nested items.
    pub fn walk<'a>(&'a self, out: &mut Vec<&'a QuestionnaireItem>) {
        out.push(self);
        for child in &self.item {
            child.walk(out);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublicationStatus {
    Draft,
    Active,
    Retired,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identifier {
    pub system: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Period {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
}

impl Period {
    pub fn is_empty(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Questionnaire {
    pub resource_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub identifier: Vec<Identifier>,
    pub version: String,
    pub name: String,
    pub title: String,
    pub status: PublicationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_review_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effective_period: Option<Period>,
    pub item: Vec<QuestionnaireItem>,
}

impl Questionnaire {
    pub fn identifier_value(&self, system: &str) -> Option<&str> {
        self.identifier
            .iter()
            .find(|i| i.system == system)
            .map(|i| i.value.as_str())
    }

    /// Every item in document order, groups before their children.
    pub fn flattened_items(&self) -> Vec<&QuestionnaireItem> {
        let mut out = Vec::new();
        for item in &self.item {
            item.walk(&mut out);
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleEntryRequest {
    pub method: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub if_none_exist: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleEntry {
    pub resource: serde_json::Value,
    pub request: BundleEntryRequest,
}

/// A single-entry FHIR transaction bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionBundle {
    pub resource_type: String,
    #[serde(rename = "type")]
    pub bundle_type: String,
    pub entry: Vec<BundleEntry>,
}

impl TransactionBundle {
    pub fn single(resource: serde_json::Value, request: BundleEntryRequest) -> Self {
        Self {
            resource_type: "Bundle".to_string(),
            bundle_type: "transaction".to_string(),
            entry: vec![BundleEntry { resource, request }],
        }
    }
}
