//! `stackfix` command-line entry point.
//!
//! Runs a command in the current directory; when it fails, proposes a patch
//! from the configured agent and optionally applies it and reruns.

use std::path::Path;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, error::ErrorKind};
use stackfix::agents::client::{AgentClient, AgentError};
use stackfix::exit_codes;
use stackfix::fix::{
    AutoConfirm, Confirm, Console, FixRequest, StdinConfirm, run_fix, run_prompt, show_last,
};
use stackfix::io::config::{ProviderSettings, StackfixConfig, config_path, load_config};
use stackfix::io::process::Echo;
use stackfix::io::transport::HttpTransport;
use stackfix::logging;

#[derive(Parser, Debug)]
#[command(
    name = "stackfix",
    version,
    about = "Run a command; on failure, propose and apply a fix"
)]
struct Cli {
    /// Show the summary and patch from the last run.
    #[arg(long, conflicts_with_all = ["prompt", "command"])]
    last: bool,
    /// Ask a question about the project instead of running a command.
    #[arg(long, value_name = "TEXT", conflicts_with = "command")]
    prompt: Option<String>,
    /// Apply proposed patches without asking.
    #[arg(short, long)]
    yes: bool,
    /// Command to run, after `--`.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "CMD")]
    command: Vec<String>,
}

impl Cli {
    /// Command argv with a leading `--` separator removed.
    fn argv(&self) -> &[String] {
        match self.command.split_first() {
            Some((first, rest)) if first == "--" => rest,
            _ => &self.command,
        }
    }
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{err:#}");
            std::process::exit(exit_codes::FAILURE);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let root = std::env::current_dir().context("resolve working directory")?;
    let mut stdout = std::io::stdout();
    let mut stderr = std::io::stderr();
    let mut console = Console {
        out: &mut stdout,
        err: &mut stderr,
    };

    if cli.last {
        return show_last(&root, &mut console);
    }

    let config = load_config(&config_path(&root))?;
    let client = || connect(&root, &config);

    if let Some(prompt) = &cli.prompt {
        return run_prompt(&root, prompt, &config, client, &mut console);
    }

    let command = cli.argv();
    if command.is_empty() {
        Cli::command()
            .error(
                ErrorKind::MissingRequiredArgument,
                "provide a command after `--`, or use --prompt or --last",
            )
            .exit();
    }

    let confirm: &dyn Confirm = if cli.yes { &AutoConfirm } else { &StdinConfirm };
    let request = FixRequest {
        root: &root,
        command,
        config: &config,
        echo: Echo::Terminal,
    };
    run_fix(&request, client, confirm, &mut console)
}

fn connect(root: &Path, config: &StackfixConfig) -> Result<AgentClient<HttpTransport>, AgentError> {
    let settings = ProviderSettings::from_env(root)?;
    let transport = HttpTransport::new(&settings, config)?;
    Ok(AgentClient::new(transport, settings.options))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_command_after_separator() {
        let cli = Cli::parse_from(["stackfix", "--", "pytest", "-q"]);
        assert_eq!(cli.argv(), ["pytest", "-q"]);
        assert!(!cli.yes);
    }

    #[test]
    fn parse_yes_with_command() {
        let cli = Cli::parse_from(["stackfix", "--yes", "--", "npm", "test"]);
        assert!(cli.yes);
        assert_eq!(cli.argv(), ["npm", "test"]);
    }

    #[test]
    fn parse_command_without_separator() {
        let cli = Cli::parse_from(["stackfix", "make", "-j4"]);
        assert_eq!(cli.argv(), ["make", "-j4"]);
    }

    #[test]
    fn parse_last() {
        let cli = Cli::parse_from(["stackfix", "--last"]);
        assert!(cli.last);
        assert!(cli.argv().is_empty());
    }

    #[test]
    fn parse_prompt() {
        let cli = Cli::parse_from(["stackfix", "--prompt", "what does this do?"]);
        assert_eq!(cli.prompt.as_deref(), Some("what does this do?"));
    }

    #[test]
    fn last_conflicts_with_command() {
        assert!(Cli::try_parse_from(["stackfix", "--last", "--", "ls"]).is_err());
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }
}
