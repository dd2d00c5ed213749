//! Content extraction from chat-completion response bodies.
//!
//! Providers disagree on where the model's words live. Each known location is
//! one [`ResponseShape`] variant; classification tries them in a fixed order
//! and the chosen shape yields the literal text.

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

/// The response body carried nothing the extractor recognizes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("agent returned no content to parse; top-level keys: {keys:?}")]
pub struct NoContentError {
    pub keys: Vec<String>,
}

/// Where the reply text was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseShape {
    /// `choices[0].message.content`, as a string or a list of text parts.
    Chat(String),
    /// `choices[0].message.reasoning_content`.
    Reasoning(String),
    /// `choices[0].message.tool_calls[0].function.arguments`.
    ToolCall(String),
    /// `choices[0].text`, the legacy completion shape.
    PlainText(String),
}

impl ResponseShape {
    /// Classify a decoded response body, in priority order.
    pub fn classify(body: &Value) -> Result<Self, NoContentError> {
        let choice = body
            .get("choices")
            .and_then(Value::as_array)
            .and_then(|choices| choices.first());

        if let Some(choice) = choice {
            if let Some(message) = choice.get("message").filter(|m| !m.is_null())
                && let Some(shape) = classify_message(message)
            {
                return Ok(shape);
            }
            if let Some(text) = choice.get("text").and_then(Value::as_str) {
                return Ok(ResponseShape::PlainText(text.to_string()));
            }
        }

        Err(NoContentError {
            keys: top_level_keys(body),
        })
    }

    pub fn label(&self) -> &'static str {
        match self {
            ResponseShape::Chat(_) => "message.content",
            ResponseShape::Reasoning(_) => "message.reasoning_content",
            ResponseShape::ToolCall(_) => "message.tool_calls.function.arguments",
            ResponseShape::PlainText(_) => "choice.text",
        }
    }

    pub fn into_text(self) -> String {
        match self {
            ResponseShape::Chat(text)
            | ResponseShape::Reasoning(text)
            | ResponseShape::ToolCall(text)
            | ResponseShape::PlainText(text) => text,
        }
    }
}

/// Extract the literal reply text from a completion response body.
pub fn extract_content(body: &Value) -> Result<String, NoContentError> {
    let shape = ResponseShape::classify(body)?;
    debug!(shape = shape.label(), "parsed agent content");
    Ok(shape.into_text())
}

fn classify_message(message: &Value) -> Option<ResponseShape> {
    match message.get("content") {
        Some(Value::Array(parts)) => {
            let texts: Vec<&str> = parts
                .iter()
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .collect();
            if !texts.is_empty() {
                return Some(ResponseShape::Chat(texts.concat()));
            }
        }
        Some(Value::String(text)) if !text.trim().is_empty() => {
            return Some(ResponseShape::Chat(text.clone()));
        }
        _ => {}
    }

    if let Some(reasoning) = message.get("reasoning_content").and_then(non_blank_text) {
        return Some(ResponseShape::Reasoning(reasoning));
    }

    message
        .get("tool_calls")
        .and_then(Value::as_array)
        .and_then(|calls| calls.first())
        .and_then(|call| call.get("function"))
        .and_then(|function| function.get("arguments"))
        .and_then(Value::as_str)
        .filter(|args| !args.is_empty())
        .map(|args| ResponseShape::ToolCall(args.to_string()))
}

/// Strings as-is; other scalars rendered. Blank or null yields `None`.
fn non_blank_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::Null => return None,
        Value::String(text) => text.clone(),
        other => other.to_string(),
    };
    (!text.trim().is_empty()).then_some(text)
}

fn top_level_keys(body: &Value) -> Vec<String> {
    body.as_object()
        .map(Map::keys)
        .map(|keys| keys.cloned().collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn string_content_is_preferred() {
        let body = json!({
            "choices": [{"message": {"content": "{\"summary\":\"ok\"}", "reasoning_content": "thinking"}}]
        });
        assert_eq!(extract_content(&body).unwrap(), "{\"summary\":\"ok\"}");
    }

    #[test]
    fn content_parts_are_concatenated_in_order() {
        let body = json!({
            "choices": [{"message": {"content": [
                {"type": "text", "text": "{\"summary\":"},
                {"type": "image_url", "image_url": "ignored"},
                {"type": "text", "text": "\"ok\"}"}
            ]}}]
        });
        assert_eq!(extract_content(&body).unwrap(), "{\"summary\":\"ok\"}");
    }

    #[test]
    fn blank_content_falls_back_to_reasoning() {
        let body = json!({
            "choices": [{"message": {"content": "   ", "reasoning_content": "answer"}}]
        });
        let shape = ResponseShape::classify(&body).unwrap();
        assert_eq!(shape, ResponseShape::Reasoning("answer".to_string()));
    }

    #[test]
    fn tool_call_arguments_are_used_when_no_text() {
        let body = json!({
            "choices": [{"message": {"content": null, "tool_calls": [
                {"function": {"name": "propose_fix", "arguments": "{\"summary\":\"tool\"}"}}
            ]}}]
        });
        let shape = ResponseShape::classify(&body).unwrap();
        assert_eq!(shape.label(), "message.tool_calls.function.arguments");
        assert_eq!(shape.into_text(), "{\"summary\":\"tool\"}");
    }

    #[test]
    fn legacy_choice_text_is_last_resort() {
        let body = json!({"choices": [{"text": "plain"}]});
        assert_eq!(
            ResponseShape::classify(&body).unwrap(),
            ResponseShape::PlainText("plain".to_string())
        );
    }

    #[test]
    fn empty_message_falls_through_to_choice_text() {
        let body = json!({"choices": [{"message": {"content": ""}, "text": "fallback"}]});
        assert_eq!(extract_content(&body).unwrap(), "fallback");
    }

    #[test]
    fn missing_content_reports_top_level_keys() {
        let body = json!({"id": "x", "error": {"message": "boom"}});
        let err = extract_content(&body).unwrap_err();
        assert_eq!(err.keys, vec!["error".to_string(), "id".to_string()]);
        assert!(err.to_string().contains("no content"));
    }

    #[test]
    fn empty_choices_is_no_content() {
        let body = json!({"choices": []});
        assert!(extract_content(&body).is_err());
    }
}
