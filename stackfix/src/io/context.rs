//! Context assembly for the agent: captured output, repository state,
//! manifests, and project instructions.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, instrument, warn};

use crate::core::path_guard::is_forbidden;
use crate::core::types::AgentContext;
use crate::io::config::StackfixConfig;
use crate::io::git::Git;

pub const AGENTS_FILE: &str = "AGENTS.md";

/// Dependency manifests worth showing the agent, in display order.
pub const MANIFESTS: &[&str] = &[
    "package.json",
    "pnpm-lock.yaml",
    "yarn.lock",
    "pyproject.toml",
    "requirements.txt",
    "poetry.lock",
    "Cargo.toml",
    "go.mod",
];

/// Size caps applied while assembling context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextLimits {
    pub max_stdio_chars: usize,
    pub max_git_chars: usize,
    pub max_file_chars: usize,
    pub max_file_bytes: u64,
    pub max_agent_instruction_bytes: u64,
}

impl From<&StackfixConfig> for ContextLimits {
    fn from(cfg: &StackfixConfig) -> Self {
        Self {
            max_stdio_chars: cfg.max_stdio_chars,
            max_git_chars: cfg.max_git_chars,
            max_file_chars: cfg.max_file_chars,
            max_file_bytes: cfg.max_file_bytes,
            max_agent_instruction_bytes: cfg.max_agent_instruction_bytes,
        }
    }
}

impl Default for ContextLimits {
    fn default() -> Self {
        Self::from(&StackfixConfig::default())
    }
}

/// Keep the first `max_chars` characters, marking the cut.
pub fn truncate_text(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        None => text.to_string(),
        Some((cut, _)) => format!("{}\n... [truncated to {max_chars} chars]\n", &text[..cut]),
    }
}

/// Build the fix-mode context for a command that exited with `exit_code`.
#[instrument(skip_all, fields(root = %root.display(), exit_code))]
pub fn collect_context(
    root: &Path,
    command: &[String],
    exit_code: i32,
    stdout: &str,
    stderr: &str,
    limits: &ContextLimits,
) -> AgentContext {
    let mut context = AgentContext::failed_command(
        root.display().to_string(),
        command.to_vec(),
        exit_code,
        truncate_text(stdout, limits.max_stdio_chars),
        truncate_text(stderr, limits.max_stdio_chars),
    );

    context.agent_instructions = load_agent_instructions(root, limits.max_agent_instruction_bytes)
        .map(|text| truncate_text(&text, limits.max_file_chars));

    let git = Git::new(root);
    if git.is_repo() {
        let status = git.status_porcelain().unwrap_or_else(|err| {
            warn!(err = %err, "git status failed");
            String::new()
        });
        let diff = git.diff().unwrap_or_else(|err| {
            warn!(err = %err, "git diff failed");
            String::new()
        });
        context.git_status = Some(truncate_text(&status, limits.max_git_chars));
        context.git_diff = Some(truncate_text(&diff, limits.max_git_chars));
    }

    let manifests = read_manifests(root, limits);
    debug!(
        manifests = manifests.len(),
        has_instructions = context.agent_instructions.is_some(),
        has_git = context.git_status.is_some(),
        "context collected"
    );
    if !manifests.is_empty() {
        context.manifests = Some(manifests);
    }
    context
}

/// Build the prompt-mode context, carrying project instructions when present.
pub fn prompt_context(root: &Path, prompt: &str, limits: &ContextLimits) -> AgentContext {
    let mut context = AgentContext::prompt(root.display().to_string(), prompt);
    context.agent_instructions = load_agent_instructions(root, limits.max_agent_instruction_bytes)
        .map(|text| truncate_text(&text, limits.max_file_chars));
    context
}

fn read_manifests(root: &Path, limits: &ContextLimits) -> BTreeMap<String, String> {
    let mut files = BTreeMap::new();
    for name in MANIFESTS {
        let path = root.join(name);
        if !path.is_file() || is_forbidden(&path, root) {
            continue;
        }
        let Ok(meta) = fs::metadata(&path) else {
            continue;
        };
        if meta.len() > limits.max_file_bytes {
            debug!(name, bytes = meta.len(), "manifest too large; skipped");
            continue;
        }
        match fs::read(&path) {
            Ok(bytes) => {
                let text = String::from_utf8_lossy(&bytes);
                files.insert(name.to_string(), truncate_text(&text, limits.max_file_chars));
            }
            Err(err) => warn!(name, err = %err, "failed to read manifest"),
        }
    }
    files
}

/// Nearest `AGENTS.md` at or above `start`.
pub fn find_agents_file(start: &Path) -> Option<PathBuf> {
    let start = std::path::absolute(start).unwrap_or_else(|_| start.to_path_buf());
    start
        .ancestors()
        .map(|dir| dir.join(AGENTS_FILE))
        .find(|candidate| candidate.is_file())
}

/// Contents of the nearest `AGENTS.md`, unless it is larger than `max_bytes`
/// or unreadable.
pub fn load_agent_instructions(start: &Path, max_bytes: u64) -> Option<String> {
    let path = find_agents_file(start)?;
    let size = fs::metadata(&path).ok()?.len();
    if size > max_bytes {
        debug!(path = %path.display(), size, "AGENTS.md too large; skipped");
        return None;
    }
    let bytes = fs::read(&path).ok()?;
    Some(String::from_utf8_lossy(&bytes).into_owned())
}
