use serde_json::{Map, Value};
use thiserror::Error;

use super::decision::Decision;

#[derive(Debug, Error)]
pub enum DecisionParseError {
    #[error("expected a JSON object in model output")]
    NoJsonObject,
    #[error("decision object is missing a string 'action' field")]
    MissingAction,
}

/// Extracts a structured decision from raw model text.
///
/// Accepts bare JSON, fenced ```json blocks, or the outermost `{...}` slice
/// of a chatty reply. An `action` of `"final"` yields the answer (missing
/// answer is the empty string); any other `action` value is taken as a tool
/// name, registered or not.
pub fn parse_decision(content: &str) -> Result<Decision, DecisionParseError> {
    let value = extract_json(content).ok_or(DecisionParseError::NoJsonObject)?;
    decision_from_value(value)
}

fn decision_from_value(value: Value) -> Result<Decision, DecisionParseError> {
    match value {
        Value::Object(map) => {
            let action = map
                .get("action")
                .and_then(Value::as_str)
                .ok_or(DecisionParseError::MissingAction)?;
            if action == "final" {
                let answer = map
                    .get("answer")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                Ok(Decision::Final { answer })
            } else {
                let args = match map.get("args") {
                    Some(Value::Object(args)) => args.clone(),
                    _ => Map::new(),
                };
                Ok(Decision::Invoke {
                    tool: action.to_string(),
                    args,
                })
            }
        }
        Value::String(text) => parse_decision(&text),
        _ => Err(DecisionParseError::NoJsonObject),
    }
}

fn extract_json(content: &str) -> Option<Value> {
    let trimmed = content.trim();

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Some(value);
    }

    if trimmed.starts_with("```") {
        let stripped = trimmed.trim_start_matches("```json");
        let stripped = stripped.trim_start_matches("```JSON");
        let stripped = stripped.trim_start_matches("```");
        if let Some(end) = stripped.rfind("```") {
            let slice = &stripped[..end];
            if let Ok(value) = serde_json::from_str::<Value>(slice.trim()) {
                return Some(value);
            }
        }
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            let candidate = &trimmed[start..=end];
            if let Ok(value) = serde_json::from_str::<Value>(candidate) {
                return Some(value);
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_final_with_exact_answer() {
        let decision =
            parse_decision(r#"{"action":"final","answer":"The capital is Oslo."}"#).expect("parses");
        assert_eq!(
            decision,
            Decision::Final {
                answer: "The capital is Oslo.".into()
            }
        );
    }

    #[test]
    fn final_without_answer_defaults_to_empty_string() {
        let decision = parse_decision(r#"{"action":"final"}"#).expect("parses");
        assert_eq!(decision, Decision::Final { answer: String::new() });
    }

    #[test]
    fn any_other_action_is_a_tool_name() {
        let decision = parse_decision(
            r#"{"action":"get_weather","args":{"latitude":40.7,"longitude":-74.0}}"#,
        )
        .expect("parses");
        match decision {
            Decision::Invoke { tool, args } => {
                assert_eq!(tool, "get_weather");
                assert_eq!(args.get("latitude"), Some(&json!(40.7)));
                assert_eq!(args.get("longitude"), Some(&json!(-74.0)));
            }
            other => panic!("expected invoke decision, got {other:?}"),
        }
    }

    #[test]
    fn missing_args_become_empty_map() {
        let decision = parse_decision(r#"{"action":"dance_party"}"#).expect("parses");
        assert_eq!(
            decision,
            Decision::Invoke {
                tool: "dance_party".into(),
                args: Map::new()
            }
        );
    }

    #[test]
    fn accepts_fenced_json_block() {
        let raw = "```json\n{\"action\":\"final\",\"answer\":\"ok\"}\n```";
        let decision = parse_decision(raw).expect("parses");
        assert_eq!(decision, Decision::Final { answer: "ok".into() });
    }

    #[test]
    fn accepts_object_embedded_in_prose() {
        let raw = "Sure! Here you go: {\"action\":\"random_joke\",\"args\":{}} hope that helps";
        let decision = parse_decision(raw).expect("parses");
        assert_eq!(
            decision,
            Decision::Invoke {
                tool: "random_joke".into(),
                args: Map::new()
            }
        );
    }

    #[test]
    fn unwraps_json_encoded_string_payload() {
        let raw = r#""{\"action\":\"final\",\"answer\":\"nested\"}""#;
        let decision = parse_decision(raw).expect("parses");
        assert_eq!(decision, Decision::Final { answer: "nested".into() });
    }

    #[test]
    fn prose_without_json_fails() {
        let err = parse_decision("I would love to help with that!").expect_err("must fail");
        assert!(matches!(err, DecisionParseError::NoJsonObject));
    }

    #[test]
    fn object_without_action_fails() {
        let err = parse_decision(r#"{"answer":"orphaned"}"#).expect_err("must fail");
        assert!(matches!(err, DecisionParseError::MissingAction));
    }

    #[test]
    fn non_object_json_fails() {
        let err = parse_decision("[1, 2, 3]").expect_err("must fail");
        assert!(matches!(err, DecisionParseError::NoJsonObject));
    }
}
