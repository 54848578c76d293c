use tracing::debug;

use crate::error::ConvertError;

use super::types::{QsfBlock, QsfQuestion, QsfSurvey};

/// Flow entry types that reference a block.
const BLOCK_MARKERS: &[&str] = &["Block", "Standard"];

/// A block in flow order together with its questions in block order.
#[derive(Debug, Clone)]
pub struct ResolvedBlock<'a> {
    pub block: &'a QsfBlock,
    pub questions: Vec<&'a QsfQuestion>,
}

/// Orders blocks as the flow section declares them. The block table's own
/// order is never used.
pub fn resolve_flow(survey: &QsfSurvey) -> Result<Vec<ResolvedBlock<'_>>, ConvertError> {
    let mut resolved = Vec::new();
    for entry in &survey.flow {
        if !BLOCK_MARKERS.contains(&entry.entry_type.as_str()) {
            debug!(survey_id = %survey.survey_id, entry_type = %entry.entry_type, "skipping flow entry");
            continue;
        }
        let block_id = entry.id.as_deref().ok_or_else(|| {
            ConvertError::structural(
                &survey.survey_id,
                "FL",
                format!("{} flow entry without an ID", entry.entry_type),
            )
        })?;
        let block = survey.blocks.get(block_id).ok_or_else(|| {
            ConvertError::structural(&survey.survey_id, block_id, "flow references a missing block")
        })?;
        let questions = block
            .question_ids
            .iter()
            .map(|qid| {
                survey.questions.get(qid).ok_or_else(|| {
                    ConvertError::structural(
                        &survey.survey_id,
                        block_id,
                        format!("block references missing question {qid}"),
                    )
                })
            })
            .collect::<Result<Vec<&QsfQuestion>, ConvertError>>()?;
        debug!(
            survey_id = %survey.survey_id,
            block_id,
            questions = questions.len(),
            looping = block.looping,
            "resolved block"
        );
        resolved.push(ResolvedBlock { block, questions });
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::resolve_flow;
    use crate::error::ConvertError;
    use crate::qsf::parse::parse_qsf_value;
    use serde_json::json;

    fn question(qid: &str) -> serde_json::Value {
        json!({"Element": "SQ", "Payload": {"QuestionID": qid, "QuestionText": qid,
          "QuestionType": "TE", "Selector": "SL"}})
    }

    #[test]
    fn follows_flow_order_not_block_table_order() {
        let raw = json!({
          "SurveyEntry": {"SurveyName": "S"},
          "SurveyElements": [
            {"Element": "BL", "Payload": {
              "0": {"ID": "BL_first", "BlockElements": [{"Type": "Question", "QuestionID": "QID1"}]},
              "1": {"ID": "BL_second", "BlockElements": [{"Type": "Question", "QuestionID": "QID2"}]}
            }},
            {"Element": "FL", "Payload": {"Flow": [
              {"Type": "Standard", "ID": "BL_second"},
              {"Type": "EmbeddedData", "EmbeddedData": []},
              {"Type": "Block", "ID": "BL_first"}
            ]}},
            question("QID1"),
            question("QID2")
          ]
        });
        let survey = parse_qsf_value(&raw, "SV_1").expect("parse");
        let blocks = resolve_flow(&survey).expect("resolve");
        let ids = blocks.iter().map(|b| b.block.id.as_str()).collect::<Vec<&str>>();
        assert_eq!(ids, vec!["BL_second", "BL_first"]);
        assert_eq!(blocks[0].questions[0].qualtrics_qid, "QID2");
    }

    #[test]
    fn missing_block_is_structural() {
        let raw = json!({
          "SurveyElements": [
            {"Element": "BL", "Payload": []},
            {"Element": "FL", "Payload": {"Flow": [{"Type": "Block", "ID": "BL_gone"}]}}
          ]
        });
        let survey = parse_qsf_value(&raw, "SV_1").expect("parse");
        let err = resolve_flow(&survey).unwrap_err();
        assert!(matches!(err, ConvertError::Structural { ref element, .. } if element == "BL_gone"));
    }

    #[test]
    fn missing_question_is_structural() {
        let raw = json!({
          "SurveyElements": [
            {"Element": "BL", "Payload": [{"ID": "BL_a", "BlockElements": [{"Type": "Question", "QuestionID": "QID9"}]}]},
            {"Element": "FL", "Payload": {"Flow": [{"Type": "Block", "ID": "BL_a"}]}}
          ]
        });
        let survey = parse_qsf_value(&raw, "SV_1").expect("parse");
        let err = resolve_flow(&survey).unwrap_err();
        assert!(err.to_string().contains("QID9"));
    }
}
