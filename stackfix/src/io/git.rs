//! Git adapter: repository detection, context snapshots, and `git apply`.
//!
//! Kept as a small, explicit wrapper around `git` subprocess calls.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};

use crate::io::process::{CommandOutput, run_command_with_timeout};

const APPLY_TIMEOUT: Duration = Duration::from_secs(60);
const APPLY_OUTPUT_LIMIT: usize = 64 * 1024;

/// True if `root` has a `.git` directory of its own.
pub fn is_git_repo(root: &Path) -> bool {
    root.join(".git").is_dir()
}

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    pub fn is_repo(&self) -> bool {
        is_git_repo(&self.workdir)
    }

    /// `git status --porcelain`, verbatim.
    pub fn status_porcelain(&self) -> Result<String> {
        self.run_capture(&["status", "--porcelain"])
    }

    /// Unstaged changes as a unified diff.
    pub fn diff(&self) -> Result<String> {
        self.run_capture(&["diff"])
    }

    /// Feed `patch` to `git apply` on stdin.
    ///
    /// Outside a repository of its own, the workdir is applied to as a bare
    /// tree: `--no-index` is passed and repository discovery stops at the
    /// workdir, so an enclosing repository cannot re-root the patch paths.
    #[instrument(skip_all, fields(workdir = %self.workdir.display()))]
    pub fn apply(&self, patch: &str) -> Result<CommandOutput> {
        let mut cmd = Command::new("git");
        cmd.arg("apply");
        if !self.is_repo() {
            let workdir = self
                .workdir
                .canonicalize()
                .with_context(|| format!("resolve {}", self.workdir.display()))?;
            let ceiling = workdir.parent().unwrap_or(workdir.as_path());
            cmd.arg("--no-index")
                .env("GIT_CEILING_DIRECTORIES", ceiling)
                .env_remove("GIT_DIR")
                .env_remove("GIT_WORK_TREE");
        }
        cmd.arg("--whitespace=nowarn")
            .arg("-")
            .current_dir(&self.workdir);
        let output = run_command_with_timeout(
            cmd,
            Some(patch.as_bytes()),
            APPLY_TIMEOUT,
            APPLY_OUTPUT_LIMIT,
        )
        .context("run git apply")?;
        if output.success() {
            debug!("git apply succeeded");
        } else {
            warn!(exit_code = ?output.status.code(), "git apply failed");
        }
        Ok(output)
    }

    fn run_capture(&self, args: &[&str]) -> Result<String> {
        let output = self.run_checked(args)?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn run_checked(&self, args: &[&str]) -> Result<Output> {
        let output = self.run(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("git {} failed: {}", args.join(" "), stderr.trim()));
        }
        Ok(output)
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::init_git_repo;
    use std::fs;

    #[test]
    fn plain_directory_is_not_a_repo() {
        let temp = tempfile::tempdir().expect("tempdir");
        assert!(!is_git_repo(temp.path()));
        fs::write(temp.path().join(".git"), "gitdir: elsewhere").expect("write");
        assert!(!is_git_repo(temp.path()));
    }

    #[test]
    fn status_and_diff_reflect_worktree() {
        let temp = tempfile::tempdir().expect("tempdir");
        init_git_repo(temp.path());
        let git = Git::new(temp.path());
        assert!(git.is_repo());

        fs::write(temp.path().join("README.md"), "changed\n").expect("write");
        fs::write(temp.path().join("new.txt"), "new\n").expect("write");

        let status = git.status_porcelain().expect("status");
        assert!(status.contains(" M README.md"));
        assert!(status.contains("?? new.txt"));
        assert!(git.diff().expect("diff").contains("+changed"));
    }

    #[test]
    fn apply_outside_repo_uses_no_index() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("a.txt"), "one\n").expect("write");
        let patch = "diff --git a/a.txt b/a.txt\n--- a/a.txt\n+++ b/a.txt\n@@ -1 +1 @@\n-one\n+two\n";
        let output = Git::new(temp.path()).apply(patch).expect("apply");
        assert!(output.success(), "{}", output.stderr_lossy());
        assert_eq!(
            fs::read_to_string(temp.path().join("a.txt")).expect("read"),
            "two\n"
        );
    }

    #[test]
    fn apply_in_nested_plain_directory_ignores_enclosing_repo() {
        let temp = tempfile::tempdir().expect("tempdir");
        init_git_repo(temp.path());
        let nested = temp.path().join("nested");
        fs::create_dir_all(&nested).expect("mkdir");
        fs::write(nested.join("a.txt"), "one\n").expect("write");
        let patch = "diff --git a/a.txt b/a.txt\n--- a/a.txt\n+++ b/a.txt\n@@ -1 +1 @@\n-one\n+two\n";

        let git = Git::new(&nested);
        assert!(!git.is_repo());
        let output = git.apply(patch).expect("apply");
        assert!(output.success(), "{}", output.stderr_lossy());
        assert_eq!(fs::read_to_string(nested.join("a.txt")).expect("read"), "two\n");
    }

    #[test]
    fn apply_reports_failure_without_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("a.txt"), "other\n").expect("write");
        let patch = "diff --git a/a.txt b/a.txt\n--- a/a.txt\n+++ b/a.txt\n@@ -1 +1 @@\n-one\n+two\n";
        let output = Git::new(temp.path()).apply(patch).expect("apply");
        assert!(!output.success());
        assert_eq!(
            fs::read_to_string(temp.path().join("a.txt")).expect("read"),
            "other\n"
        );
    }
}
