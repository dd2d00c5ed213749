//! Test-only fixtures: scripted collaborators, canned replies, and sample
//! projects.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::process::Command;

use serde_json::json;

use crate::agents::request::ChatRequest;
use crate::fix::Confirm;
use crate::io::transport::{RawResponse, Transport, TransportError};

pub const CALC_SOURCE: &str = "def add(a, b):\n    return a - b\n";
pub const CALC_FIXED: &str = "def add(a, b):\n    return a + b\n";

/// Well-formed diff turning [`CALC_SOURCE`] into [`CALC_FIXED`].
pub const VALID_DIFF: &str = "diff --git a/calc.py b/calc.py\n--- a/calc.py\n+++ b/calc.py\n@@ -1,2 +1,2 @@\n def add(a, b):\n-    return a - b\n+    return a + b\n";

/// Same edit with a hunk header that has no ranges.
pub const BARE_HUNK_DIFF: &str = "diff --git a/calc.py b/calc.py\n--- a/calc.py\n+++ b/calc.py\n@@ @@\n def add(a, b):\n-    return a - b\n+    return a + b\n";

/// Transport that replays a fixed script and records every request.
pub struct ScriptedTransport {
    script: RefCell<VecDeque<Result<RawResponse, TransportError>>>,
    fallback: Option<RawResponse>,
    requests: RefCell<Vec<ChatRequest>>,
    calls: Cell<usize>,
}

impl ScriptedTransport {
    pub fn new(responses: Vec<RawResponse>) -> Self {
        Self::with_results(responses.into_iter().map(Ok).collect())
    }

    pub fn with_results(results: Vec<Result<RawResponse, TransportError>>) -> Self {
        Self {
            script: RefCell::new(results.into()),
            fallback: None,
            requests: RefCell::new(Vec::new()),
            calls: Cell::new(0),
        }
    }

    /// Answer every request with `response`.
    pub fn repeating(response: RawResponse) -> Self {
        Self {
            fallback: Some(response),
            ..Self::with_results(Vec::new())
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.borrow().clone()
    }
}

impl Transport for ScriptedTransport {
    fn send(&self, request: &ChatRequest) -> Result<RawResponse, TransportError> {
        self.calls.set(self.calls.get() + 1);
        self.requests.borrow_mut().push(request.clone());
        if let Some(next) = self.script.borrow_mut().pop_front() {
            return next;
        }
        match &self.fallback {
            Some(response) => Ok(response.clone()),
            None => panic!("scripted transport exhausted after {} calls", self.calls()),
        }
    }
}

/// Confirmation prompt answering from a fixed list.
pub struct ScriptedConfirm {
    answers: RefCell<VecDeque<bool>>,
    questions: RefCell<Vec<String>>,
}

impl ScriptedConfirm {
    pub fn new(answers: Vec<bool>) -> Self {
        Self {
            answers: RefCell::new(answers.into()),
            questions: RefCell::new(Vec::new()),
        }
    }

    pub fn questions(&self) -> Vec<String> {
        self.questions.borrow().clone()
    }
}

impl Confirm for ScriptedConfirm {
    fn confirm(&self, question: &str) -> anyhow::Result<bool> {
        self.questions.borrow_mut().push(question.to_string());
        let answer = self
            .answers
            .borrow_mut()
            .pop_front()
            .expect("scripted confirm exhausted");
        Ok(answer)
    }
}

/// Chat-completions body whose first choice carries `content`.
pub fn completion(content: &str) -> RawResponse {
    RawResponse::Completion(json!({
        "choices": [{"message": {"role": "assistant", "content": content}}]
    }))
}

/// Agent reply JSON text with no rerun command.
pub fn agent_reply(summary: &str, patch: &str) -> String {
    agent_reply_with_rerun(summary, patch, &[])
}

pub fn agent_reply_with_rerun(summary: &str, patch: &str, rerun: &[&str]) -> String {
    json!({
        "summary": summary,
        "confidence": 0.9,
        "patch_unified_diff": patch,
        "rerun_command": rerun,
    })
    .to_string()
}

/// `sh -c <script>` as an argv.
pub fn sh(script: &str) -> Vec<String> {
    vec!["sh".to_string(), "-c".to_string(), script.to_string()]
}

/// Temp directory holding a single `calc.py` with the subtraction bug.
pub fn calc_project() -> tempfile::TempDir {
    let temp = tempfile::tempdir().expect("tempdir");
    fs::write(temp.path().join("calc.py"), CALC_SOURCE).expect("write calc.py");
    temp
}

/// Initialize a git repository with one committed `README.md`.
pub fn init_git_repo(root: &Path) {
    let git = |args: &[&str]| {
        let status = Command::new("git")
            .args(args)
            .current_dir(root)
            .status()
            .unwrap_or_else(|err| panic!("git {args:?}: {err}"));
        assert!(status.success(), "git {args:?} failed");
    };
    git(&["init", "-q"]);
    git(&["config", "user.email", "test@example.com"]);
    git(&["config", "user.name", "test"]);
    fs::write(root.join("README.md"), "hi\n").expect("write");
    git(&["add", "README.md"]);
    git(&["commit", "-q", "-m", "init"]);
}
