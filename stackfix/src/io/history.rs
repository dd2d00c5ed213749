//! Run history under `.stackfix/history/`.
//!
//! Every invocation leaves one timestamped record plus a copy in `last.json`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::io::config::{state_dir, write_atomic};

pub const LAST_FILE: &str = "last.json";

/// What happened during one invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryRecord {
    /// `None` for prompt-mode runs.
    pub command: Option<Vec<String>>,
    pub exit_code: i32,
    pub summary: String,
    pub patch: String,
    pub applied: bool,
    pub rerun_command: Option<Vec<String>>,
    pub rerun_exit_code: Option<i32>,
    pub rerun_stdout: Option<String>,
    pub rerun_stderr: Option<String>,
    pub warning: Option<String>,
}

pub fn history_dir(root: &Path) -> PathBuf {
    state_dir(root).join("history")
}

/// Write `record` as `<UTC timestamp>.json` and `last.json`; returns the
/// timestamped path.
pub fn write_history(root: &Path, record: &HistoryRecord) -> Result<PathBuf> {
    write_history_at(root, record, Utc::now())
}

pub fn write_history_at(root: &Path, record: &HistoryRecord, at: DateTime<Utc>) -> Result<PathBuf> {
    let dir = history_dir(root);
    fs::create_dir_all(&dir).with_context(|| format!("create history dir {}", dir.display()))?;

    let mut buf = serde_json::to_string_pretty(record).context("serialize history record")?;
    buf.push('\n');

    let path = dir.join(format!("{}.json", at.format("%Y%m%d_%H%M%S")));
    write_atomic(&path, &buf)?;
    write_atomic(&dir.join(LAST_FILE), &buf)?;
    debug!(path = %path.display(), applied = record.applied, "history written");
    Ok(path)
}

/// The most recent record, if any run has been recorded.
pub fn read_last(root: &Path) -> Result<Option<HistoryRecord>> {
    let path = history_dir(root).join(LAST_FILE);
    if !path.is_file() {
        return Ok(None);
    }
    let contents = fs::read_to_string(&path)
        .with_context(|| format!("read history {}", path.display()))?;
    let record = serde_json::from_str(&contents)
        .with_context(|| format!("parse history {}", path.display()))?;
    Ok(Some(record))
}
