use tracing::debug;

use crate::error::ConvertError;
use crate::qsf::types::{QsfChoice, QsfQuestion, QsfSubQuestion};

use super::types::{ItemType, QuestionnaireItem};

/// Every question shape the converter understands. Anything the export can
/// express beyond these is rejected rather than approximated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestionKind {
    /// TE / SL
    SingleLineText,
    /// TE / ML, TE / ESTB
    MultiLineText,
    /// MC / SAVR
    SingleChoice,
    /// MC / MAVR
    MultiChoice,
    /// Matrix / Likert / SingleAnswer
    LikertSingle,
    /// Matrix / Likert / MultipleAnswer
    LikertMultiple,
    /// Slider / HBAR
    BarSlider,
    /// Slider / HSLIDER
    ContinuousSlider,
    /// HotSpot / OnOff
    HotSpot,
    /// DD / DL
    DrillDown,
    /// DB / TB, DB / GRB
    Descriptive,
    /// SBS / SBSMatrix
    SideBySide,
}

impl QuestionKind {
    pub fn classify(question_type: &str, selector: &str, sub_selector: Option<&str>) -> Option<Self> {
        let kind = match (question_type, selector, sub_selector) {
            ("TE", "SL", _) => Self::SingleLineText,
            ("TE", "ML" | "ESTB", _) => Self::MultiLineText,
            ("MC", "SAVR", None | Some("TX")) => Self::SingleChoice,
            ("MC", "MAVR", None | Some("TX")) => Self::MultiChoice,
            ("Matrix", "Likert", Some("SingleAnswer")) => Self::LikertSingle,
            ("Matrix", "Likert", Some("MultipleAnswer")) => Self::LikertMultiple,
            ("Slider", "HBAR", _) => Self::BarSlider,
            ("Slider", "HSLIDER", _) => Self::ContinuousSlider,
            ("HotSpot", "OnOff", _) => Self::HotSpot,
            ("DD", "DL", _) => Self::DrillDown,
            ("DB", "TB" | "GRB", _) => Self::Descriptive,
            ("SBS", "SBSMatrix", _) => Self::SideBySide,
            _ => return None,
        };
        Some(kind)
    }

    pub fn of(question: &QsfQuestion, survey_id: &str) -> Result<Self, ConvertError> {
        Self::classify(
            &question.question_type,
            &question.selector,
            question.sub_selector.as_deref(),
        )
        .ok_or_else(|| ConvertError::UnsupportedQuestionType {
            survey_id: survey_id.to_string(),
            question_id: question.qualtrics_qid.clone(),
            question_type: question.question_type.clone(),
            selector: question.selector.clone(),
            sub_selector: question.sub_selector.clone(),
        })
    }
}

pub fn question_link_id(qid: &str) -> String {
    format!("question-{qid}")
}

pub fn group_link_id(block_id: &str) -> String {
    format!("group-{block_id}")
}

/// Maps one vendor question to one item, including the rows of matrix and
/// side-by-side questions. Display conditions and looping groups are attached
/// by the caller.
pub fn map_question(question: &QsfQuestion, survey_id: &str) -> Result<QuestionnaireItem, ConvertError> {
    let kind = QuestionKind::of(question, survey_id)?;
    let link_id = question_link_id(&question.qualtrics_qid);
    let text = question.question_text.as_str();

    let mut item = match kind {
        QuestionKind::SingleLineText => QuestionnaireItem::new(link_id, text, ItemType::String),
        QuestionKind::MultiLineText => QuestionnaireItem::new(link_id, text, ItemType::Text),
        QuestionKind::SingleChoice => {
            QuestionnaireItem::new(link_id, text, ItemType::Choice).with_options(labels(&question.choices))
        }
        QuestionKind::MultiChoice | QuestionKind::HotSpot => {
            let mut item = QuestionnaireItem::new(link_id, text, ItemType::Choice)
                .with_options(labels(&question.choices));
            item.repeats = true;
            item
        }
        QuestionKind::LikertSingle | QuestionKind::LikertMultiple => {
            let mut group = QuestionnaireItem::new(link_id.clone(), text, ItemType::Group);
            group.repeats = kind == QuestionKind::LikertMultiple;
            group.item = matrix_rows(&link_id, &question.choices, &question.answers, question.required);
            group
        }
        QuestionKind::BarSlider => QuestionnaireItem::new(link_id, text, ItemType::Integer),
        QuestionKind::ContinuousSlider => QuestionnaireItem::new(link_id, text, ItemType::Decimal),
        QuestionKind::DrillDown => {
            QuestionnaireItem::new(link_id, text, ItemType::Choice).with_options(labels(&question.answers))
        }
        QuestionKind::Descriptive => QuestionnaireItem::new(link_id, text, ItemType::Display),
        QuestionKind::SideBySide => {
            let mut group = QuestionnaireItem::new(link_id.clone(), text, ItemType::Group);
            group.item = question
                .sub_questions
                .iter()
                .map(|sub| side_by_side_column(&link_id, sub, question.required))
                .collect();
            group
        }
    };

    // Display items never collect an answer.
    item.required = question.required && item.item_type != ItemType::Display;

    debug!(
        survey_id,
        question_id = %question.qualtrics_qid,
        kind = ?kind,
        "mapped question"
    );
    Ok(item)
}

fn labels(choices: &[QsfChoice]) -> impl Iterator<Item = &str> {
    choices.iter().map(|c| c.label.as_str())
}

/// One single-answer choice item per row, all sharing the column labels.
fn matrix_rows(
    parent_link_id: &str,
    rows: &[QsfChoice],
    columns: &[QsfChoice],
    required: bool,
) -> Vec<QuestionnaireItem> {
    rows.iter()
        .map(|row| {
            let mut item = QuestionnaireItem::new(
                format!("{parent_link_id}-{}", row.id),
                &row.label,
                ItemType::Choice,
            )
            .with_options(labels(columns));
            item.required = required;
            item
        })
        .collect()
}

fn side_by_side_column(parent_link_id: &str, sub: &QsfSubQuestion, required: bool) -> QuestionnaireItem {
    let link_id = format!("{parent_link_id}-{}", sub.id);
    let mut group = QuestionnaireItem::new(link_id.clone(), &sub.text, ItemType::Group);
    group.required = required;
    group.item = matrix_rows(&link_id, &sub.choices, &sub.answers, required);
    group
}

#[cfg(test)]
mod tests {
    use super::{map_question, QuestionKind};
    use crate::error::ConvertError;
    use crate::fhir::types::ItemType;
    use crate::qsf::types::{QsfChoice, QsfQuestion, QsfSubQuestion};

    fn choice(id: &str, label: &str) -> QsfChoice {
        QsfChoice {
            id: id.to_string(),
            label: label.to_string(),
        }
    }

    fn question(question_type: &str, selector: &str, sub_selector: Option<&str>) -> QsfQuestion {
        QsfQuestion {
            qualtrics_qid: "QID4".to_string(),
            question_text: "How do you feel?".to_string(),
            question_type: question_type.to_string(),
            selector: selector.to_string(),
            sub_selector: sub_selector.map(str::to_string),
            required: true,
            choices: vec![choice("1", "Mornings"), choice("2", "Evenings")],
            answers: vec![choice("1", "Bad"), choice("2", "Fine"), choice("3", "Good")],
            display_logic: None,
            sub_questions: Vec::new(),
        }
    }

    fn option_labels(item: &crate::fhir::types::QuestionnaireItem) -> Vec<&str> {
        item.answer_option.iter().map(|o| o.value_string.as_str()).collect()
    }

    #[test]
    fn text_entry_variants() {
        let single = map_question(&question("TE", "SL", None), "SV").expect("map");
        assert_eq!(single.item_type, ItemType::String);
        assert_eq!(single.link_id, "question-QID4");
        assert!(single.required);

        for selector in ["ML", "ESTB"] {
            let multi = map_question(&question("TE", selector, None), "SV").expect("map");
            assert_eq!(multi.item_type, ItemType::Text);
        }
    }

    #[test]
    fn choice_variants() {
        let single = map_question(&question("MC", "SAVR", Some("TX")), "SV").expect("map");
        assert_eq!(single.item_type, ItemType::Choice);
        assert!(!single.repeats);
        assert_eq!(option_labels(&single), vec!["Mornings", "Evenings"]);

        let multi = map_question(&question("MC", "MAVR", Some("TX")), "SV").expect("map");
        assert!(multi.repeats);

        let hotspot = map_question(&question("HotSpot", "OnOff", None), "SV").expect("map");
        assert_eq!(hotspot.item_type, ItemType::Choice);
        assert!(hotspot.repeats);
    }

    #[test]
    fn drill_down_uses_answer_set() {
        let item = map_question(&question("DD", "DL", None), "SV").expect("map");
        assert_eq!(option_labels(&item), vec!["Bad", "Fine", "Good"]);
    }

    #[test]
    fn sliders_and_descriptive_text() {
        assert_eq!(
            map_question(&question("Slider", "HBAR", None), "SV").expect("map").item_type,
            ItemType::Integer
        );
        assert_eq!(
            map_question(&question("Slider", "HSLIDER", None), "SV").expect("map").item_type,
            ItemType::Decimal
        );
        let display = map_question(&question("DB", "TB", None), "SV").expect("map");
        assert_eq!(display.item_type, ItemType::Display);
        assert!(!display.required);
        assert!(display.answer_option.is_empty());
    }

    #[test]
    fn likert_matrix_rows_share_columns() {
        let single = map_question(&question("Matrix", "Likert", Some("SingleAnswer")), "SV").expect("map");
        assert_eq!(single.item_type, ItemType::Group);
        assert!(!single.repeats);
        assert_eq!(single.item.len(), 2);
        assert_eq!(single.item[0].link_id, "question-QID4-1");
        assert_eq!(single.item[1].text.as_deref(), Some("Evenings"));
        for row in &single.item {
            assert_eq!(row.item_type, ItemType::Choice);
            assert_eq!(option_labels(row), vec!["Bad", "Fine", "Good"]);
        }

        let multiple =
            map_question(&question("Matrix", "Likert", Some("MultipleAnswer")), "SV").expect("map");
        assert!(multiple.repeats);
        assert_eq!(multiple.item.len(), 2);
    }

    #[test]
    fn side_by_side_nests_three_levels() {
        let mut q = question("SBS", "SBSMatrix", None);
        q.sub_questions = vec![
            QsfSubQuestion {
                id: "1".to_string(),
                text: "Frequency".to_string(),
                choices: vec![choice("1", "Headache"), choice("2", "Nausea")],
                answers: vec![choice("1", "Never"), choice("2", "Often")],
            },
            QsfSubQuestion {
                id: "2".to_string(),
                text: "Severity".to_string(),
                choices: vec![choice("1", "Headache"), choice("2", "Nausea")],
                answers: vec![choice("1", "Mild"), choice("2", "Severe")],
            },
        ];
        let item = map_question(&q, "SV").expect("map");
        assert_eq!(item.item_type, ItemType::Group);
        assert_eq!(item.item.len(), 2);
        let severity = &item.item[1];
        assert_eq!(severity.link_id, "question-QID4-2");
        assert_eq!(severity.item_type, ItemType::Group);
        assert_eq!(severity.item[1].link_id, "question-QID4-2-2");
        assert_eq!(severity.item[1].text.as_deref(), Some("Nausea"));
        assert_eq!(option_labels(&severity.item[1]), vec!["Mild", "Severe"]);
    }

    #[test]
    fn unknown_triples_are_rejected() {
        for (t, s, ss) in [
            ("Timing", "PageTimer", None),
            ("MC", "DL", Some("TX")),
            ("MC", "SAVR", Some("TB")),
            ("Matrix", "Likert", Some("DND")),
            ("Matrix", "Bipolar", None),
            ("TE", "FORM", None),
        ] {
            assert!(QuestionKind::classify(t, s, ss).is_none(), "{t}/{s}/{ss:?}");
            let err = map_question(&question(t, s, ss), "SV_9").unwrap_err();
            match err {
                ConvertError::UnsupportedQuestionType {
                    survey_id,
                    question_id,
                    ..
                } => {
                    assert_eq!(survey_id, "SV_9");
                    assert_eq!(question_id, "QID4");
                }
                other => panic!("unexpected error {other:?}"),
            }
        }
    }
}
