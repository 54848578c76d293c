//! Translation of vendor display logic into `enableWhen` conditions.
//!
//! Only one form is accepted: a boolean expression holding exactly one
//! condition group with exactly one `Selected` expression whose left operand
//! is a selectable-choice locator (`q://QID1/SelectableChoice/2`). Everything
//! else, and anything that fails to resolve, aborts the conversion.

use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;

use crate::error::ConvertError;
use crate::qsf::types::{QsfQuestion, QsfSurvey};

use super::mapping::question_link_id;
use super::types::EnableWhen;

fn locator_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^q://(QID\d+)/SelectableChoice/(\d+)$").expect("regex"))
}

/// Parsed selectable-choice locator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChoiceLocator {
    pub question_id: String,
    pub choice_id: String,
}

impl ChoiceLocator {
    pub fn parse(operand: &str) -> Option<Self> {
        let caps = locator_re().captures(operand.trim())?;
        Some(Self {
            question_id: caps[1].to_string(),
            choice_id: caps[2].to_string(),
        })
    }
}

pub fn translate_display_logic(
    survey: &QsfSurvey,
    question: &QsfQuestion,
) -> Result<Option<EnableWhen>, ConvertError> {
    let Some(logic) = &question.display_logic else {
        return Ok(None);
    };
    let fail = |message: String| {
        ConvertError::display_logic(&survey.survey_id, &question.qualtrics_qid, message)
    };

    let root = logic
        .as_object()
        .ok_or_else(|| fail("display logic is not an object".to_string()))?;
    expect_type(root, "BooleanExpression").map_err(fail)?;

    let group = single_numbered(root, "condition group").map_err(fail)?;
    let group = group
        .as_object()
        .ok_or_else(|| fail("condition group is not an object".to_string()))?;
    expect_type(group, "If").map_err(fail)?;

    let expression = single_numbered(group, "expression").map_err(fail)?;
    let expression = expression
        .as_object()
        .ok_or_else(|| fail("expression is not an object".to_string()))?;
    expect_type(expression, "Expression").map_err(fail)?;
    expect_field(expression, "LogicType", "Question").map_err(fail)?;
    expect_field(expression, "Operator", "Selected").map_err(fail)?;

    let operand = expression
        .get("LeftOperand")
        .and_then(Value::as_str)
        .ok_or_else(|| fail("expression has no LeftOperand".to_string()))?;
    let locator = ChoiceLocator::parse(operand)
        .ok_or_else(|| fail(format!("unsupported operand path {operand}")))?;

    let referenced = survey
        .questions
        .get(&locator.question_id)
        .ok_or_else(|| fail(format!("references unknown question {}", locator.question_id)))?;
    let label = referenced.choice_label(&locator.choice_id).ok_or_else(|| {
        fail(format!(
            "question {} has no choice {}",
            locator.question_id, locator.choice_id
        ))
    })?;

    Ok(Some(EnableWhen::equals(
        question_link_id(&locator.question_id),
        label,
    )))
}

fn expect_type(node: &Map<String, Value>, expected: &str) -> Result<(), String> {
    expect_field(node, "Type", expected)
}

fn expect_field(node: &Map<String, Value>, field: &str, expected: &str) -> Result<(), String> {
    match node.get(field).and_then(Value::as_str) {
        Some(value) if value == expected => Ok(()),
        Some(value) => Err(format!("{field} {value} is not supported, expected {expected}")),
        None => Err(format!("missing {field}, expected {expected}")),
    }
}

/// The one numerically keyed child of `node`. Zero or several is an error.
fn single_numbered<'a>(node: &'a Map<String, Value>, what: &str) -> Result<&'a Value, String> {
    let mut numbered = node
        .iter()
        .filter(|(key, _)| key.parse::<u32>().is_ok())
        .map(|(_, value)| value);
    let first = numbered.next().ok_or_else(|| format!("no {what}"))?;
    if numbered.next().is_some() {
        return Err(format!("multiple {what}s are not supported"));
    }
    Ok(first)
}

#[cfg(test)]
mod tests {
    use super::{translate_display_logic, ChoiceLocator};
    use crate::error::ConvertError;
    use crate::qsf::parse::parse_qsf_value;
    use crate::qsf::types::QsfSurvey;
    use serde_json::{json, Value};

    fn selected(operand: &str) -> Value {
        json!({
          "0": {
            "0": {
              "LogicType": "Question",
              "QuestionID": "QID1",
              "QuestionIsInLoop": "no",
              "ChoiceLocator": operand,
              "Operator": "Selected",
              "QuestionIDFromLocator": "QID1",
              "LeftOperand": operand,
              "Type": "Expression",
              "Description": "<span>If consent is selected</span>"
            },
            "Type": "If"
          },
          "Type": "BooleanExpression",
          "inPage": false
        })
    }

    fn survey(logic: Value) -> QsfSurvey {
        let raw = json!({
          "SurveyElements": [
            {"Element": "FL", "Payload": {"Flow": [{"Type": "Block", "ID": "BL_a"}]}},
            {"Element": "BL", "Payload": [{"ID": "BL_a", "BlockElements": [
              {"Type": "Question", "QuestionID": "QID1"}, {"Type": "Question", "QuestionID": "QID2"}]}]},
            {"Element": "SQ", "Payload": {"QuestionID": "QID1", "QuestionText": "Consent?",
              "QuestionType": "MC", "Selector": "SAVR", "SubSelector": "TX",
              "Choices": {"0": {"Display": "No"}, "1": {"Display": "Yes"}}}},
            {"Element": "SQ", "Payload": {"QuestionID": "QID2", "QuestionText": "Signature",
              "QuestionType": "TE", "Selector": "SL", "DisplayLogic": logic}}
          ]
        });
        parse_qsf_value(&raw, "SV_1").expect("parse")
    }

    fn translate(logic: Value) -> Result<Option<crate::fhir::types::EnableWhen>, ConvertError> {
        let survey = survey(logic);
        translate_display_logic(&survey, &survey.questions["QID2"])
    }

    #[test]
    fn selected_choice_becomes_enable_when() {
        let rule = translate(selected("q://QID1/SelectableChoice/1"))
            .expect("translate")
            .expect("rule");
        assert_eq!(rule.question, "question-QID1");
        assert_eq!(rule.operator, "=");
        assert_eq!(rule.answer_string, "Yes");
    }

    #[test]
    fn no_logic_no_rule() {
        let survey = survey(Value::Null);
        assert!(translate_display_logic(&survey, &survey.questions["QID1"])
            .expect("translate")
            .is_none());
    }

    #[test]
    fn rejects_other_shapes() {
        let mut two_expressions = selected("q://QID1/SelectableChoice/1");
        two_expressions["0"]["1"] = two_expressions["0"]["0"].clone();
        two_expressions["0"]["1"]["Conjuction"] = json!("Or");

        let mut two_groups = selected("q://QID1/SelectableChoice/1");
        two_groups["1"] = two_groups["0"].clone();

        let mut not_selected = selected("q://QID1/SelectableChoice/1");
        not_selected["0"]["0"]["Operator"] = json!("NotSelected");

        let mut embedded = selected("q://QID1/SelectableChoice/1");
        embedded["0"]["0"]["LogicType"] = json!("EmbeddedField");

        let mut wrong_root = selected("q://QID1/SelectableChoice/1");
        wrong_root["Type"] = json!("Expression");

        for logic in [
            two_expressions,
            two_groups,
            not_selected,
            embedded,
            wrong_root,
            selected("q://QID1/ChoiceTextEntryValue/1"),
            json!(["not", "an", "object"]),
        ] {
            let err = translate(logic).unwrap_err();
            assert!(
                matches!(err, ConvertError::UnsupportedDisplayLogic { ref question_id, .. } if question_id == "QID2"),
                "{err}"
            );
        }
    }

    #[test]
    fn resolution_failures_are_fatal() {
        let missing_question = translate(selected("q://QID8/SelectableChoice/1")).unwrap_err();
        assert!(missing_question.to_string().contains("unknown question QID8"));

        let missing_choice = translate(selected("q://QID1/SelectableChoice/5")).unwrap_err();
        assert!(missing_choice.to_string().contains("no choice 5"));
    }

    #[test]
    fn parses_locators() {
        assert_eq!(
            ChoiceLocator::parse("q://QID12/SelectableChoice/3"),
            Some(ChoiceLocator {
                question_id: "QID12".to_string(),
                choice_id: "3".to_string()
            })
        );
        assert!(ChoiceLocator::parse("q://QID12/SelectableChoice/x").is_none());
        assert!(ChoiceLocator::parse("e://Field/x").is_none());
    }
}
