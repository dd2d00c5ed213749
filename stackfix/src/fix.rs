//! Command orchestration: run, diagnose, confirm, patch, rerun, record.
//!
//! The agent and the confirmation prompt are passed in so the whole flow can
//! run against scripted collaborators.

use std::io::{BufRead, Write};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::agents::client::{AgentClient, AgentError};
use crate::core::types::AgentResult;
use crate::exit_codes;
use crate::io::apply::apply_patch;
use crate::io::config::StackfixConfig;
use crate::io::context::{ContextLimits, collect_context, prompt_context};
use crate::io::history::{HistoryRecord, read_last, write_history};
use crate::io::process::{Echo, run_streaming};
use crate::io::transport::Transport;

pub const SUCCESS_SUMMARY: &str = "Command succeeded; no patch applied.";
pub const APPLY_QUESTION: &str = "Apply patch? [y/N]: ";

/// Asks the user whether to apply a proposed patch.
pub trait Confirm {
    fn confirm(&self, question: &str) -> Result<bool>;
}

/// Reads a `y`/`N` answer from stdin. Anything but `y` declines.
pub struct StdinConfirm;

impl Confirm for StdinConfirm {
    fn confirm(&self, question: &str) -> Result<bool> {
        let mut stdout = std::io::stdout();
        write!(stdout, "{question}").context("write prompt")?;
        stdout.flush().context("flush prompt")?;
        let mut answer = String::new();
        std::io::stdin()
            .lock()
            .read_line(&mut answer)
            .context("read answer")?;
        Ok(answer.trim().eq_ignore_ascii_case("y"))
    }
}

/// Accepts every patch (`--yes`).
pub struct AutoConfirm;

impl Confirm for AutoConfirm {
    fn confirm(&self, _question: &str) -> Result<bool> {
        Ok(true)
    }
}

/// Where user-facing text goes.
pub struct Console<'a> {
    pub out: &'a mut dyn Write,
    pub err: &'a mut dyn Write,
}

#[derive(Debug, Serialize)]
struct RunSummary {
    before: i32,
    after: i32,
}

/// Everything [`run_fix`] needs besides its collaborators.
pub struct FixRequest<'a> {
    pub root: &'a Path,
    pub command: &'a [String],
    pub config: &'a StackfixConfig,
    pub echo: Echo,
}

/// Run `command`; on failure ask the agent for a patch, apply it if
/// confirmed, and rerun. Returns the exit code the process should end with.
///
/// `connect` is only invoked once the command has failed, so a missing
/// provider configuration never blocks a passing command.
#[instrument(skip_all, fields(root = %request.root.display()))]
pub fn run_fix<T, F, C>(
    request: &FixRequest<'_>,
    connect: F,
    confirm: &C,
    console: &mut Console<'_>,
) -> Result<i32>
where
    T: Transport,
    F: FnOnce() -> Result<AgentClient<T>, AgentError>,
    C: Confirm + ?Sized,
{
    let FixRequest {
        root,
        command,
        config,
        echo,
    } = *request;

    let output = run_streaming(
        command,
        root,
        config.command_timeout(),
        config.command_output_limit_bytes,
        echo,
    )
    .context("run command")?;
    let exit_code = output.exit_code();
    info!(exit_code, "command finished");

    let base_record = HistoryRecord {
        command: Some(command.to_vec()),
        exit_code,
        ..HistoryRecord::default()
    };

    if output.success() {
        write_history(
            root,
            &HistoryRecord {
                summary: SUCCESS_SUMMARY.to_string(),
                ..base_record
            },
        )?;
        return Ok(exit_code);
    }

    let context = collect_context(
        root,
        command,
        exit_code,
        &output.stdout_lossy(),
        &output.stderr_lossy(),
        &ContextLimits::from(config),
    );

    let result = match connect().and_then(|client| client.call(&context)) {
        Ok(result) => result,
        Err(err) => {
            writeln!(console.err, "Agent call failed: {err}")?;
            return Ok(exit_code);
        }
    };
    print_result(&result, console)?;

    let proposed = HistoryRecord {
        summary: result.summary.clone(),
        patch: result.patch.clone(),
        warning: result.warning.clone(),
        ..base_record
    };

    if !result.has_patch() {
        write_history(root, &proposed)?;
        writeln!(console.out, "No patch provided by agent.")?;
        return Ok(exit_code);
    }

    if !confirm.confirm(APPLY_QUESTION)? {
        write_history(root, &proposed)?;
        writeln!(console.out, "Patch not applied.")?;
        return Ok(exit_code);
    }

    if let Err(err) = apply_patch(&result.patch, root) {
        writeln!(console.err, "Failed to apply patch: {err}")?;
        return Ok(exit_code);
    }

    let rerun_command = if result.rerun_command.is_empty() {
        command.to_vec()
    } else {
        result.rerun_command.clone()
    };
    writeln!(console.out, "\nRerunning command...")?;
    let rerun = run_streaming(
        &rerun_command,
        root,
        config.command_timeout(),
        config.command_output_limit_bytes,
        echo,
    )
    .context("rerun command")?;
    let rerun_exit = rerun.exit_code();
    debug!(before = exit_code, after = rerun_exit, "rerun finished");

    write_history(
        root,
        &HistoryRecord {
            applied: true,
            rerun_command: Some(rerun_command),
            rerun_exit_code: Some(rerun_exit),
            rerun_stdout: Some(rerun.stdout_lossy()),
            rerun_stderr: Some(rerun.stderr_lossy()),
            ..proposed
        },
    )?;

    let summary = serde_json::to_string_pretty(&RunSummary {
        before: exit_code,
        after: rerun_exit,
    })?;
    writeln!(console.out, "\nRun summary:\n{summary}")?;
    Ok(rerun_exit)
}

/// Answer a free-form question. Exits 0 on any reply, 1 when the agent
/// cannot be reached.
#[instrument(skip_all, fields(root = %root.display()))]
pub fn run_prompt<T, F>(
    root: &Path,
    prompt: &str,
    config: &StackfixConfig,
    connect: F,
    console: &mut Console<'_>,
) -> Result<i32>
where
    T: Transport,
    F: FnOnce() -> Result<AgentClient<T>, AgentError>,
{
    let context = prompt_context(root, prompt, &ContextLimits::from(config));
    let result = match connect().and_then(|client| client.call(&context)) {
        Ok(result) => result,
        Err(err) => {
            writeln!(console.err, "Agent call failed: {err}")?;
            return Ok(exit_codes::FAILURE);
        }
    };
    if let Some(warning) = &result.warning {
        writeln!(console.err, "Warning: {warning}")?;
    }
    writeln!(console.out, "{}", result.summary)?;

    write_history(
        root,
        &HistoryRecord {
            summary: result.summary,
            patch: result.patch,
            warning: result.warning,
            ..HistoryRecord::default()
        },
    )?;
    Ok(exit_codes::OK)
}

/// Print the last recorded summary and patch. Returns 1 when nothing has
/// been recorded yet.
pub fn show_last(root: &Path, console: &mut Console<'_>) -> Result<i32> {
    let Some(last) = read_last(root)? else {
        writeln!(console.out, "No history found.")?;
        return Ok(exit_codes::FAILURE);
    };
    writeln!(console.out, "Last run summary:\n{}", last.summary)?;
    writeln!(console.out, "\nPatch:\n{}", last.patch)?;
    Ok(exit_codes::OK)
}

fn print_result(result: &AgentResult, console: &mut Console<'_>) -> Result<()> {
    if let Some(warning) = &result.warning {
        writeln!(console.err, "Warning: {warning}")?;
    }
    writeln!(console.out, "\nProposed fix:\n{}", result.summary)?;
    writeln!(console.out, "\nPatch preview:\n\n{}", result.patch)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::request::RequestOptions;
    use crate::io::transport::TransportError;
    use crate::test_support::{
        BARE_HUNK_DIFF, CALC_FIXED, CALC_SOURCE, ScriptedConfirm, ScriptedTransport, agent_reply,
        agent_reply_with_rerun, completion, sh,
    };
    use std::fs;

    struct Captured {
        out: Vec<u8>,
        err: Vec<u8>,
    }

    impl Captured {
        fn new() -> Self {
            Self {
                out: Vec::new(),
                err: Vec::new(),
            }
        }

        fn console(&mut self) -> Console<'_> {
            Console {
                out: &mut self.out,
                err: &mut self.err,
            }
        }

        fn out(&self) -> String {
            String::from_utf8_lossy(&self.out).into_owned()
        }

        fn err(&self) -> String {
            String::from_utf8_lossy(&self.err).into_owned()
        }
    }

    fn run(
        root: &Path,
        command: &[String],
        transport: &ScriptedTransport,
        confirm: &ScriptedConfirm,
        captured: &mut Captured,
    ) -> i32 {
        let config = StackfixConfig::default();
        let request = FixRequest {
            root,
            command,
            config: &config,
            echo: Echo::Silent,
        };
        run_fix(
            &request,
            || Ok(AgentClient::new(transport, RequestOptions::default())),
            confirm,
            &mut captured.console(),
        )
        .expect("run_fix")
    }

    #[test]
    fn passing_command_records_success_without_agent() {
        let temp = tempfile::tempdir().expect("tempdir");
        let transport = ScriptedTransport::new(Vec::new());
        let mut captured = Captured::new();
        let code = run(
            temp.path(),
            &sh("exit 0"),
            &transport,
            &ScriptedConfirm::new(Vec::new()),
            &mut captured,
        );
        assert_eq!(code, 0);
        assert_eq!(transport.calls(), 0);
        let last = read_last(temp.path()).expect("read").expect("record");
        assert_eq!(last.summary, SUCCESS_SUMMARY);
    }

    #[test]
    fn declined_patch_keeps_original_exit_code() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("calc.py"), CALC_SOURCE).expect("write");
        let transport = ScriptedTransport::repeating(completion(&agent_reply(
            "fix subtraction",
            BARE_HUNK_DIFF,
        )));
        let mut captured = Captured::new();
        let code = run(
            temp.path(),
            &sh("exit 4"),
            &transport,
            &ScriptedConfirm::new(vec![false]),
            &mut captured,
        );
        assert_eq!(code, 4);
        assert!(captured.out().contains("Patch not applied."));
        assert_eq!(
            fs::read_to_string(temp.path().join("calc.py")).expect("read"),
            CALC_SOURCE
        );
        let last = read_last(temp.path()).expect("read").expect("record");
        assert!(!last.applied);
        assert_eq!(last.patch, BARE_HUNK_DIFF);
    }

    #[test]
    fn confirmed_patch_is_applied_and_rerun() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("calc.py"), CALC_SOURCE).expect("write");
        let transport = ScriptedTransport::repeating(completion(&agent_reply_with_rerun(
            "fix subtraction",
            BARE_HUNK_DIFF,
            &["sh", "-c", "grep -q 'a + b' calc.py"],
        )));
        let confirm = ScriptedConfirm::new(vec![true]);
        let mut captured = Captured::new();
        let code = run(
            temp.path(),
            &sh("grep -q 'a + b' calc.py"),
            &transport,
            &confirm,
            &mut captured,
        );

        assert_eq!(code, 0);
        assert_eq!(confirm.questions(), vec![APPLY_QUESTION.to_string()]);
        assert_eq!(
            fs::read_to_string(temp.path().join("calc.py")).expect("read"),
            CALC_FIXED
        );
        let out = captured.out();
        assert!(out.contains("Proposed fix:\nfix subtraction"));
        assert!(out.contains("\"before\": 1,\n  \"after\": 0"));

        let last = read_last(temp.path()).expect("read").expect("record");
        assert!(last.applied);
        assert_eq!(last.exit_code, 1);
        assert_eq!(last.rerun_exit_code, Some(0));
    }

    #[test]
    fn empty_patch_skips_confirmation() {
        let temp = tempfile::tempdir().expect("tempdir");
        let transport =
            ScriptedTransport::new(vec![completion(&agent_reply("cannot fix", ""))]);
        let confirm = ScriptedConfirm::new(Vec::new());
        let mut captured = Captured::new();
        let code = run(temp.path(), &sh("exit 2"), &transport, &confirm, &mut captured);
        assert_eq!(code, 2);
        assert!(confirm.questions().is_empty());
        assert!(captured.out().contains("No patch provided by agent."));
    }

    #[test]
    fn agent_failure_exits_with_original_code() {
        let temp = tempfile::tempdir().expect("tempdir");
        let transport = ScriptedTransport::with_results(vec![Err(TransportError::MissingEnv(
            "MODEL_NAME",
        ))]);
        let mut captured = Captured::new();
        let code = run(
            temp.path(),
            &sh("exit 3"),
            &transport,
            &ScriptedConfirm::new(Vec::new()),
            &mut captured,
        );
        assert_eq!(code, 3);
        assert!(captured.err().contains("Agent call failed"));
        assert!(captured.err().contains("MODEL_NAME"));
    }

    #[test]
    fn forbidden_patch_is_reported_and_not_applied() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join(".env"), "A=1\n").expect("write");
        let patch = "diff --git a/.env b/.env\n--- a/.env\n+++ b/.env\n@@ -1 +1 @@\n-A=1\n+A=2\n";
        let transport = ScriptedTransport::new(vec![completion(&agent_reply("edit env", patch))]);
        let mut captured = Captured::new();
        let code = run(
            temp.path(),
            &sh("exit 1"),
            &transport,
            &ScriptedConfirm::new(vec![true]),
            &mut captured,
        );
        assert_eq!(code, 1);
        assert!(captured.err().contains("forbidden path: .env"));
        assert_eq!(
            fs::read_to_string(temp.path().join(".env")).expect("read"),
            "A=1\n"
        );
    }

    #[test]
    fn degraded_reply_prints_warning() {
        let temp = tempfile::tempdir().expect("tempdir");
        let transport = ScriptedTransport::new(vec![completion("just some prose")]);
        let mut captured = Captured::new();
        run(
            temp.path(),
            &sh("exit 1"),
            &transport,
            &ScriptedConfirm::new(Vec::new()),
            &mut captured,
        );
        assert!(captured.err().contains("Warning: Agent response was not valid JSON"));
        assert!(captured.out().contains("just some prose"));
    }

    #[test]
    fn prompt_mode_prints_summary_and_records() {
        let temp = tempfile::tempdir().expect("tempdir");
        let transport =
            ScriptedTransport::new(vec![completion(&agent_reply("It is a CLI.", ""))]);
        let mut captured = Captured::new();
        let code = run_prompt(
            temp.path(),
            "what is this?",
            &StackfixConfig::default(),
            || Ok(AgentClient::new(&transport, RequestOptions::default())),
            &mut captured.console(),
        )
        .expect("prompt");
        assert_eq!(code, 0);
        assert_eq!(captured.out(), "It is a CLI.\n");
        let last = read_last(temp.path()).expect("read").expect("record");
        assert_eq!(last.command, None);
        assert_eq!(last.summary, "It is a CLI.");
    }

    #[test]
    fn prompt_mode_agent_failure_exits_one() {
        let temp = tempfile::tempdir().expect("tempdir");
        let transport = ScriptedTransport::with_results(vec![Err(TransportError::Status {
            status: 503,
            body: "down".to_string(),
        })]);
        let mut captured = Captured::new();
        let code = run_prompt(
            temp.path(),
            "hi",
            &StackfixConfig::default(),
            || Ok(AgentClient::new(&transport, RequestOptions::default())),
            &mut captured.console(),
        )
        .expect("prompt");
        assert_eq!(code, 1);
        assert!(read_last(temp.path()).expect("read").is_none());
    }

    #[test]
    fn show_last_without_history() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut captured = Captured::new();
        let code = show_last(temp.path(), &mut captured.console()).expect("show");
        assert_eq!(code, 1);
        assert_eq!(captured.out(), "No history found.\n");
    }

    #[test]
    fn show_last_prints_summary_and_patch() {
        let temp = tempfile::tempdir().expect("tempdir");
        write_history(
            temp.path(),
            &HistoryRecord {
                summary: "fixed".to_string(),
                patch: "diff".to_string(),
                ..HistoryRecord::default()
            },
        )
        .expect("write");
        let mut captured = Captured::new();
        let code = show_last(temp.path(), &mut captured.console()).expect("show");
        assert_eq!(code, 0);
        assert_eq!(captured.out(), "Last run summary:\nfixed\n\nPatch:\ndiff\n");
    }
}
