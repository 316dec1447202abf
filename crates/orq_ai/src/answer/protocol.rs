use orq_core::error::AppError;
use serde::{Deserialize, Serialize};

fn default_confidence() -> f64 {
    0.5
}

/// One model turn. The model must reply with exactly one of these as a JSON object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum ModelStep {
    ToolCall {
        query: String,
        #[serde(default)]
        k: Option<usize>,
    },
    FinalAnswer {
        answer: String,
        #[serde(default)]
        used_record_ids: Vec<String>,
        #[serde(default = "default_confidence")]
        confidence: f64,
    },
}

fn protocol_violation(details: impl Into<String>) -> AppError {
    AppError::new(
        "AI_PROTOCOL_VIOLATION",
        "Model output is not a valid tool_call or final_answer step",
    )
    .with_details(details)
}

/// Parse a raw model reply into a [`ModelStep`].
///
/// Tolerates Markdown code fences and prose around the object by taking the outermost
/// `{ ... }` span.
pub fn parse_model_step(raw: &str) -> Result<ModelStep, AppError> {
    let t = raw.trim();
    let start = t.find('{');
    let end = t.rfind('}');
    let body = match (start, end) {
        (Some(s), Some(e)) if s < e => &t[s..=e],
        _ => return Err(protocol_violation("no JSON object in reply")),
    };
    let step: ModelStep =
        serde_json::from_str(body).map_err(|e| protocol_violation(e.to_string()))?;
    if let ModelStep::FinalAnswer { answer, .. } = &step {
        if answer.trim().is_empty() {
            return Err(protocol_violation("final_answer.answer is empty"));
        }
    }
    Ok(step)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tool_call() {
        let got = parse_model_step(r#"{"step":"tool_call","query":"coupon usage","k":5}"#)
            .expect("parse");
        assert_eq!(
            got,
            ModelStep::ToolCall {
                query: "coupon usage".to_string(),
                k: Some(5)
            }
        );
    }

    #[test]
    fn parses_fenced_final_answer_with_default_confidence() {
        let raw = "```json\n{\"step\":\"final_answer\",\"answer\":\"ok\",\"used_record_ids\":[\"ORD-0001\"]}\n```";
        let got = parse_model_step(raw).expect("parse");
        assert_eq!(
            got,
            ModelStep::FinalAnswer {
                answer: "ok".to_string(),
                used_record_ids: vec!["ORD-0001".to_string()],
                confidence: 0.5
            }
        );
    }

    #[test]
    fn rejects_prose_and_unknown_steps() {
        for raw in [
            "I think the answer is 42",
            r#"{"step":"ask_user","question":"?"}"#,
            r#"{"step":"final_answer","answer":"   "}"#,
        ] {
            let err = parse_model_step(raw).expect_err("should fail");
            assert_eq!(err.code, "AI_PROTOCOL_VIOLATION");
        }
    }
}
