//! System prompts and the prompt-mode user message template.

use minijinja::{Environment, context};

/// Default instructions for fixing a failing command.
pub const SYSTEM_PROMPT: &str = "You are StackFix, an agent that proposes minimal safe patches to fix a failing command. \
Return ONLY a single JSON object in the assistant message content, with keys: \
summary (string), confidence (0-1 number), patch_unified_diff (string), \
rerun_command (array of strings). \
No markdown, no backticks, no extra text. \
The patch must be a valid git unified diff that starts with: \
diff --git a/<path> b/<path>, includes --- a/<path>, +++ b/<path>, and hunk headers \
with ranges like @@ -1,2 +1,8 @@ (no bare @@ lines).";

/// Plain conversation instructions used when there is no failing command.
pub const PROMPT_MODE_SYSTEM_PROMPT: &str = "You are StackFix, a helpful AI coding assistant. \
Answer the user's question directly and concisely. \
If asked about code, provide clear explanations. \
If asked to modify code, explain what changes would be needed. \
Keep responses focused and practical.";

/// Sent on the single retry after a structurally invalid diff.
pub const STRICT_DIFF_PROMPT: &str = "Your diff was invalid. Return a valid git unified diff with proper @@ ranges. \
Return ONLY a single JSON object in the assistant message content with keys: \
summary, confidence, patch_unified_diff, rerun_command. \
patch_unified_diff MUST be a valid git unified diff only (no Begin Patch markers), \
starting with: diff --git a/<path> b/<path>, including ---/+++ lines, and hunk headers \
with ranges like @@ -1,2 +1,8 @@. Do NOT use bare @@. \
Example hunk header: @@ -1,2 +1,2 @@. No extra text.";

const PROMPT_MODE_TEMPLATE: &str = include_str!("prompts/prompt_mode.md");

/// Which system prompt an attempt uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemPrompt {
    /// First attempt. Resolves to the conversational prompt in prompt mode.
    Default,
    /// The one retry after an invalid diff.
    StrictDiff,
}

impl SystemPrompt {
    pub fn text(self, prompt_mode: bool) -> &'static str {
        match (self, prompt_mode) {
            (SystemPrompt::Default, false) => SYSTEM_PROMPT,
            (SystemPrompt::Default, true) => PROMPT_MODE_SYSTEM_PROMPT,
            (SystemPrompt::StrictDiff, _) => STRICT_DIFF_PROMPT,
        }
    }
}

/// Template engine wrapper around minijinja.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.add_template("prompt_mode", PROMPT_MODE_TEMPLATE)
            .expect("prompt_mode template should be valid");
        Self { env }
    }

    /// User message for a conversational query, prefixed with project
    /// instructions when there are any.
    pub fn render_prompt_mode(
        &self,
        prompt: &str,
        instructions: Option<&str>,
    ) -> Result<String, minijinja::Error> {
        let template = self.env.get_template("prompt_mode")?;
        template.render(context! {
            prompt => prompt,
            instructions => instructions.filter(|text| !text.is_empty()),
        })
    }
}

impl Default for PromptEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_mode_swaps_only_the_default_prompt() {
        assert_eq!(SystemPrompt::Default.text(false), SYSTEM_PROMPT);
        assert_eq!(SystemPrompt::Default.text(true), PROMPT_MODE_SYSTEM_PROMPT);
        assert_eq!(SystemPrompt::StrictDiff.text(true), STRICT_DIFF_PROMPT);
    }

    #[test]
    fn bare_prompt_renders_verbatim() {
        let engine = PromptEngine::new();
        let rendered = engine
            .render_prompt_mode("why does this fail?", None)
            .expect("render");
        assert_eq!(rendered, "why does this fail?");
    }

    #[test]
    fn instructions_are_prepended() {
        let engine = PromptEngine::new();
        let rendered = engine
            .render_prompt_mode("how do I run tests?", Some("Use pnpm."))
            .expect("render");
        assert_eq!(
            rendered,
            "Project context:\nUse pnpm.\n\nUser question: how do I run tests?"
        );
    }

    #[test]
    fn empty_instructions_are_ignored() {
        let engine = PromptEngine::new();
        let rendered = engine.render_prompt_mode("hi", Some("")).expect("render");
        assert_eq!(rendered, "hi");
    }

    #[test]
    fn strict_prompt_forbids_bare_hunks() {
        assert!(STRICT_DIFF_PROMPT.contains("Do NOT use bare @@"));
    }
}
