//! Error types for survey conversion and questionnaire publishing.

use thiserror::Error;

/// Errors that abort a survey conversion. None of them are retryable: the same
/// export will fail the same way until it is changed.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// The export could not be read as JSON.
    #[error("survey {survey_id}: invalid export JSON: {message}")]
    InvalidJson { survey_id: String, message: String },

    /// Malformed flow or block sections, or a dangling block/question reference.
    #[error("survey {survey_id}: structural error at {element}: {message}")]
    Structural {
        survey_id: String,
        /// Block, question or section the problem was found in.
        element: String,
        message: String,
    },

    /// Question type triple outside the supported dispatch table.
    #[error(
        "survey {survey_id}: question {question_id} has unsupported type {question_type}/{selector}/{}",
        .sub_selector.as_deref().unwrap_or("-")
    )]
    UnsupportedQuestionType {
        survey_id: String,
        question_id: String,
        question_type: String,
        selector: String,
        sub_selector: Option<String>,
    },

    /// Display logic that is not a single selected-choice condition, or that
    /// could not be resolved against the survey.
    #[error("survey {survey_id}: question {question_id} has unsupported display logic: {message}")]
    UnsupportedDisplayLogic {
        survey_id: String,
        question_id: String,
        message: String,
    },
}

impl ConvertError {
    pub(crate) fn structural(
        survey_id: &str,
        element: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Structural {
            survey_id: survey_id.to_string(),
            element: element.into(),
            message: message.into(),
        }
    }

    pub(crate) fn display_logic(
        survey_id: &str,
        question_id: &str,
        message: impl Into<String>,
    ) -> Self {
        Self::UnsupportedDisplayLogic {
            survey_id: survey_id.to_string(),
            question_id: question_id.to_string(),
            message: message.into(),
        }
    }

    /// Survey the failed conversion belongs to.
    pub fn survey_id(&self) -> &str {
        match self {
            Self::InvalidJson { survey_id, .. }
            | Self::Structural { survey_id, .. }
            | Self::UnsupportedQuestionType { survey_id, .. }
            | Self::UnsupportedDisplayLogic { survey_id, .. } => survey_id,
        }
    }
}

/// Errors raised while querying or writing to the resource store.
#[derive(Debug, Error)]
pub enum PublishError {
    /// The store could not be reached.
    #[error("transport error: {0}")]
    Transport(String),

    /// The request did not complete within the allotted time.
    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The store answered with a non-success status.
    #[error("store rejected request with status {status}: {body}")]
    Rejected { status: u16, body: String },

    /// The store answered with something that is not a FHIR bundle.
    #[error("invalid store response: {0}")]
    InvalidResponse(String),

    /// Publishing requires a store URL and none was configured.
    #[error("no FHIR store URL configured")]
    NotConfigured,

    /// The questionnaire could not be encoded for the transaction.
    #[error("unable to encode questionnaire: {0}")]
    Encode(String),
}

impl PublishError {
    /// Whether the caller may reasonably try the same publish again.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout(_) => true,
            Self::Rejected { status, .. } => *status == 429 || *status >= 500,
            Self::InvalidResponse(_) | Self::NotConfigured | Self::Encode(_) => false,
        }
    }
}

/// Top-level error for callers that drive conversion and publishing together.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Convert(#[from] ConvertError),

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
