//! Shared deterministic types for the agent protocol.
//!
//! These types define stable contracts between the core components and the
//! collaborators around them. They carry no I/O and serialize deterministically.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// What kind of conversation the agent is asked to have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextMode {
    /// A failing command needs a patch.
    Fix,
    /// A free-form question; no command and no patch expected.
    Prompt,
}

/// Request context handed to the agent. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentContext {
    pub mode: ContextMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,
    pub cwd: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_diff: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifests: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_instructions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

impl AgentContext {
    /// Context for a conversational query.
    pub fn prompt(cwd: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            mode: ContextMode::Prompt,
            command: None,
            cwd: cwd.into(),
            exit_code: None,
            stdout: None,
            stderr: None,
            git_status: None,
            git_diff: None,
            manifests: None,
            agent_instructions: None,
            prompt: Some(prompt.into()),
        }
    }

    /// Context for a failed command, without any optional repository data.
    pub fn failed_command(
        cwd: impl Into<String>,
        command: Vec<String>,
        exit_code: i32,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) -> Self {
        Self {
            mode: ContextMode::Fix,
            command: Some(command),
            cwd: cwd.into(),
            exit_code: Some(exit_code),
            stdout: Some(stdout.into()),
            stderr: Some(stderr.into()),
            git_status: None,
            git_diff: None,
            manifests: None,
            agent_instructions: None,
            prompt: None,
        }
    }

    pub fn is_prompt_mode(&self) -> bool {
        self.mode == ContextMode::Prompt
    }
}

/// Canonical agent reply after normalization.
///
/// `summary` and `patch` are always present (possibly empty) and
/// `rerun_command` is always a list. A result is superseded, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResult {
    pub summary: String,
    /// Advisory only; values outside `[0, 1]` are kept as-is.
    pub confidence: Option<f64>,
    #[serde(rename = "patch_unified_diff")]
    pub patch: String,
    pub rerun_command: Vec<String>,
    pub raw_content: Option<String>,
    /// Set when the reply was degraded to a best-effort result.
    pub warning: Option<String>,
}

impl AgentResult {
    pub fn has_patch(&self) -> bool {
        !self.patch.trim().is_empty()
    }
}
