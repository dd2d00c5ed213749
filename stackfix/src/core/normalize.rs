//! Normalization of agent replies into [`AgentResult`].
//!
//! Degraded replies (empty, not JSON, not an object) still produce a result;
//! the problem is reported through `warning` instead of an error so callers
//! always have something to show.

use serde_json::{Map, Value};

use crate::core::types::AgentResult;

pub const WARN_EMPTY: &str = "Agent returned empty content";
pub const WARN_NOT_JSON: &str = "Agent response was not valid JSON; falling back to raw content";
pub const WARN_NOT_OBJECT: &str = "Agent JSON was not an object";

/// Normalize extracted reply text.
pub fn normalize_text(content: Option<&str>) -> AgentResult {
    let Some(content) = content else {
        return AgentResult {
            summary: String::new(),
            confidence: None,
            patch: String::new(),
            rerun_command: Vec::new(),
            raw_content: None,
            warning: Some(WARN_EMPTY.to_string()),
        };
    };

    match serde_json::from_str::<Value>(content) {
        Ok(value) => normalize_value(&value, Some(content)),
        Err(_) => fallback(content, WARN_NOT_JSON),
    }
}

/// Normalize an already-decoded reply. `raw` is the text it came from, if any.
pub fn normalize_value(value: &Value, raw: Option<&str>) -> AgentResult {
    let Some(object) = value.as_object() else {
        let rendered = value.to_string();
        return fallback(raw.unwrap_or(&rendered), WARN_NOT_OBJECT);
    };
    from_object(object, raw)
}

fn from_object(object: &Map<String, Value>, raw: Option<&str>) -> AgentResult {
    AgentResult {
        summary: string_field(object.get("summary")),
        confidence: object.get("confidence").and_then(coerce_confidence),
        patch: string_field(object.get("patch_unified_diff")),
        rerun_command: coerce_rerun_command(object.get("rerun_command")),
        raw_content: raw.map(str::to_string),
        warning: None,
    }
}

fn fallback(content: &str, warning: &str) -> AgentResult {
    AgentResult {
        summary: content.to_string(),
        confidence: None,
        patch: String::new(),
        rerun_command: Vec::new(),
        raw_content: Some(content.to_string()),
        warning: Some(warning.to_string()),
    }
}

/// Missing or null is empty; strings are kept; anything else is rendered as JSON.
fn string_field(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(value) => stringify(value),
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn coerce_confidence(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn coerce_rerun_command(value: Option<&Value>) -> Vec<String> {
    match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .filter(|item| !item.is_null())
            .map(stringify)
            .collect(),
        Some(Value::String(command)) => {
            shell_words::split(command).unwrap_or_else(|_| vec![command.clone()])
        }
        Some(other) => vec![stringify(other)],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn well_formed_reply_round_trips() {
        let result = normalize_text(Some(
            r#"{"summary":"ok","confidence":0.5,"patch_unified_diff":"","rerun_command":["pytest","-q"]}"#,
        ));
        assert_eq!(result.summary, "ok");
        assert_eq!(result.confidence, Some(0.5));
        assert_eq!(result.patch, "");
        assert_eq!(result.rerun_command, vec!["pytest", "-q"]);
        assert_eq!(result.warning, None);
        assert!(result.raw_content.is_some());
    }

    #[test]
    fn mistyped_fields_are_coerced() {
        let result = normalize_text(Some(
            r#"{"summary":"ok","confidence":"0.8","patch_unified_diff":null,"rerun_command":"pytest -q"}"#,
        ));
        assert_eq!(result.confidence, Some(0.8));
        assert_eq!(result.patch, "");
        assert_eq!(result.rerun_command, vec!["pytest", "-q"]);
        assert_eq!(result.warning, None);
    }

    #[test]
    fn plain_text_falls_back_to_raw_summary() {
        let result = normalize_text(Some("plain text response"));
        assert_eq!(result.summary, "plain text response");
        assert_eq!(result.patch, "");
        assert!(result.rerun_command.is_empty());
        assert_eq!(result.raw_content.as_deref(), Some("plain text response"));
        assert_eq!(result.warning.as_deref(), Some(WARN_NOT_JSON));
    }

    #[test]
    fn absent_content_is_an_empty_result_with_warning() {
        let result = normalize_text(None);
        assert_eq!(result.summary, "");
        assert_eq!(result.patch, "");
        assert!(result.rerun_command.is_empty());
        assert_eq!(result.warning.as_deref(), Some(WARN_EMPTY));
    }

    #[test]
    fn non_object_json_is_degraded() {
        let result = normalize_text(Some("[1, 2]"));
        assert_eq!(result.summary, "[1, 2]");
        assert_eq!(result.warning.as_deref(), Some(WARN_NOT_OBJECT));

        let scalar = normalize_value(&json!(42), None);
        assert_eq!(scalar.summary, "42");
        assert_eq!(scalar.warning.as_deref(), Some(WARN_NOT_OBJECT));
    }

    #[test]
    fn unparsable_confidence_is_dropped() {
        let result = normalize_text(Some(r#"{"summary":"s","confidence":"high"}"#));
        assert_eq!(result.confidence, None);
        let result = normalize_text(Some(r#"{"summary":"s","confidence":true}"#));
        assert_eq!(result.confidence, None);
    }

    #[test]
    fn confidence_outside_unit_range_is_kept() {
        let result = normalize_text(Some(r#"{"confidence": 7}"#));
        assert_eq!(result.confidence, Some(7.0));
    }

    #[test]
    fn missing_fields_default_to_empty() {
        let result = normalize_text(Some("{}"));
        assert_eq!(result.summary, "");
        assert_eq!(result.patch, "");
        assert!(result.rerun_command.is_empty());
        assert_eq!(result.confidence, None);
    }

    #[test]
    fn rerun_list_drops_nulls_and_stringifies() {
        let result = normalize_value(
            &json!({"rerun_command": ["cargo", null, "test", 3]}),
            None,
        );
        assert_eq!(result.rerun_command, vec!["cargo", "test", "3"]);
    }

    #[test]
    fn untokenizable_rerun_string_is_kept_whole() {
        let result = normalize_value(&json!({"rerun_command": "echo 'unterminated"}), None);
        assert_eq!(result.rerun_command, vec!["echo 'unterminated"]);
    }

    #[test]
    fn scalar_rerun_becomes_single_element() {
        let result = normalize_value(&json!({"rerun_command": 5}), None);
        assert_eq!(result.rerun_command, vec!["5"]);
    }

    #[test]
    fn non_string_summary_is_rendered() {
        let result = normalize_value(&json!({"summary": {"a": 1}}), None);
        assert_eq!(result.summary, r#"{"a":1}"#);
    }
}
