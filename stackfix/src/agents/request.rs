//! Chat-completion request payloads.

use serde::Serialize;

use crate::agents::prompts::{PromptEngine, SystemPrompt};
use crate::core::types::AgentContext;

pub const TEMPERATURE: f64 = 0.2;
pub const DEFAULT_MAX_TOKENS: u32 = 2000;

/// Per-provider knobs that shape every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestOptions {
    /// `None` lets a relay pick its upstream model.
    pub model: Option<String>,
    pub max_tokens: u32,
    /// Ask for `response_format: json_object` outside prompt mode.
    pub json_response: bool,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            model: None,
            max_tokens: DEFAULT_MAX_TOKENS,
            json_response: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub kind: &'static str,
}

/// OpenAI-compatible chat-completion body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub temperature: f64,
    pub max_tokens: u32,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
}

#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("render prompt-mode message: {0}")]
    Render(#[from] minijinja::Error),
    #[error("encode agent context: {0}")]
    Encode(#[from] serde_json::Error),
}

impl ChatRequest {
    /// Build the system + user message pair for one attempt.
    ///
    /// In prompt mode the user message is the rendered question; otherwise it
    /// is the JSON-encoded context.
    pub fn build(
        context: &AgentContext,
        system: SystemPrompt,
        options: &RequestOptions,
        prompts: &PromptEngine,
    ) -> Result<Self, RequestError> {
        let prompt_mode = context.is_prompt_mode();
        let user = if prompt_mode {
            prompts.render_prompt_mode(
                context.prompt.as_deref().unwrap_or_default(),
                context.agent_instructions.as_deref(),
            )?
        } else {
            serde_json::to_string(context)?
        };

        let response_format = (!prompt_mode && options.json_response).then_some(ResponseFormat {
            kind: "json_object",
        });

        Ok(Self {
            model: options.model.clone(),
            temperature: TEMPERATURE,
            max_tokens: options.max_tokens,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system.text(prompt_mode).to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            response_format,
        })
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.messages
            .iter()
            .find(|message| message.role == "system")
            .map(|message| message.content.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::prompts::{PROMPT_MODE_SYSTEM_PROMPT, STRICT_DIFF_PROMPT, SYSTEM_PROMPT};
    use serde_json::json;

    fn options() -> RequestOptions {
        RequestOptions {
            model: Some("test-model".to_string()),
            ..RequestOptions::default()
        }
    }

    #[test]
    fn fix_mode_sends_context_json_and_json_format() {
        let context = AgentContext::failed_command(
            "/repo",
            vec!["pytest".to_string()],
            1,
            "out",
            "err",
        );
        let request =
            ChatRequest::build(&context, SystemPrompt::Default, &options(), &PromptEngine::new())
                .expect("build");

        assert_eq!(request.system_prompt(), Some(SYSTEM_PROMPT));
        let user: serde_json::Value =
            serde_json::from_str(&request.messages[1].content).expect("user json");
        assert_eq!(user["command"], json!(["pytest"]));
        assert_eq!(user["exit_code"], json!(1));

        let body = serde_json::to_value(&request).expect("serialize");
        assert_eq!(body["response_format"], json!({"type": "json_object"}));
        assert_eq!(body["temperature"], json!(0.2));
        assert_eq!(body["max_tokens"], json!(2000));
        assert_eq!(body["model"], json!("test-model"));
    }

    #[test]
    fn prompt_mode_sends_plain_text_without_json_format() {
        let mut context = AgentContext::prompt("/repo", "what is this repo?");
        context.agent_instructions = Some("A CLI.".to_string());
        let request =
            ChatRequest::build(&context, SystemPrompt::Default, &options(), &PromptEngine::new())
                .expect("build");

        assert_eq!(request.system_prompt(), Some(PROMPT_MODE_SYSTEM_PROMPT));
        assert_eq!(
            request.messages[1].content,
            "Project context:\nA CLI.\n\nUser question: what is this repo?"
        );
        assert!(request.response_format.is_none());
    }

    #[test]
    fn response_format_can_be_disabled() {
        let context = AgentContext::failed_command("/repo", Vec::new(), 2, "", "");
        let options = RequestOptions {
            json_response: false,
            ..options()
        };
        let request =
            ChatRequest::build(&context, SystemPrompt::StrictDiff, &options, &PromptEngine::new())
                .expect("build");
        assert!(request.response_format.is_none());
        assert_eq!(request.system_prompt(), Some(STRICT_DIFF_PROMPT));
    }

    #[test]
    fn missing_model_is_omitted() {
        let context = AgentContext::prompt("/repo", "hi");
        let request = ChatRequest::build(
            &context,
            SystemPrompt::Default,
            &RequestOptions::default(),
            &PromptEngine::new(),
        )
        .expect("build");
        let body = serde_json::to_value(&request).expect("serialize");
        assert!(body.get("model").is_none());
    }
}
