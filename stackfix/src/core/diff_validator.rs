//! Structural validation of unified-diff text.
//!
//! The validator never applies anything. It checks that the three file
//! markers are present and that every `@@` line is a well-formed hunk header.
//! It is the sole gate for the agent retry decision.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

/// Diffs larger than this are rejected without scanning.
pub const MAX_DIFF_BYTES: usize = 2 * 1024 * 1024;

const MARKERS: [&str; 3] = ["diff --git ", "--- ", "+++ "];

static HUNK_HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^@@ -\d+(,\d+)? \+\d+(,\d+)? @@").expect("hunk header regex should be valid")
});

/// Reason a diff was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffRejection {
    TooLarge { bytes: usize },
    MissingMarker(&'static str),
    MalformedHunkHeader { line: String },
    NoHunks,
}

impl fmt::Display for DiffRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiffRejection::TooLarge { bytes } => {
                write!(f, "diff is {bytes} bytes (limit {MAX_DIFF_BYTES})")
            }
            DiffRejection::MissingMarker(marker) => {
                write!(f, "diff is missing a '{}' line", marker.trim_end())
            }
            DiffRejection::MalformedHunkHeader { line } => {
                write!(f, "malformed hunk header: {line}")
            }
            DiffRejection::NoHunks => write!(f, "diff has no hunk headers"),
        }
    }
}

/// Validate `diff` and report the first reason for rejection.
pub fn validate_unified_diff(diff: &str) -> Result<(), DiffRejection> {
    if diff.len() > MAX_DIFF_BYTES {
        return Err(DiffRejection::TooLarge { bytes: diff.len() });
    }
    if let Some(marker) = MARKERS.iter().copied().find(|marker| !diff.contains(marker)) {
        return Err(DiffRejection::MissingMarker(marker));
    }

    let mut hunks = 0usize;
    for line in diff.lines().filter(|line| line.starts_with("@@")) {
        if !is_valid_hunk_header(line) {
            return Err(DiffRejection::MalformedHunkHeader {
                line: line.to_string(),
            });
        }
        hunks += 1;
    }

    if hunks == 0 {
        return Err(DiffRejection::NoHunks);
    }
    Ok(())
}

pub fn is_valid_unified_diff(diff: &str) -> bool {
    validate_unified_diff(diff).is_ok()
}

/// True if `line` is `@@ -<int>[,<int>] +<int>[,<int>] @@...`.
pub fn is_valid_hunk_header(line: &str) -> bool {
    HUNK_HEADER_RE.is_match(line)
}
