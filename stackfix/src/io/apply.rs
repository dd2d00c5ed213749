//! Patch application.
//!
//! Every declared path passes the path guard before anything is written.
//! Structurally valid diffs go to `git apply`; anything else, or a diff git
//! refuses, falls back to replacing exactly one block in exactly one file.
//! The fallback only rewrites UTF-8 files whose resolved path stays inside
//! the root.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::core::diff_validator::validate_unified_diff;
use crate::core::patch::{BlockEdit, extract_paths, replace_single_block};
use crate::core::path_guard::is_forbidden;
use crate::io::git::Git;

#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("patch contains no file paths")]
    NoPaths,
    #[error("patch touches forbidden path: {path}")]
    ForbiddenPath { path: String },
    #[error("fallback patch only supports single-file edits; patch touches {count} files")]
    MultiFileFallback { count: usize },
    #[error("fallback patch has no changes to apply")]
    EmptyPatch,
    #[error("fallback patch failed; old block found {occurrences} times in {path} (expected exactly once)")]
    AmbiguousOrMissingBlock { path: String, occurrences: usize },
    #[error("git apply failed: {detail}; fallback: {fallback}")]
    NativeApply {
        detail: String,
        #[source]
        fallback: Box<ApplyError>,
    },
    #[error("{path} is not valid UTF-8; refusing to rewrite it")]
    NotUtf8 { path: String },
    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ApplyError {
    /// The fallback's own error when wrapped in a native failure.
    pub fn root_cause(&self) -> &ApplyError {
        match self {
            ApplyError::NativeApply { fallback, .. } => fallback.root_cause(),
            other => other,
        }
    }
}

/// How a patch landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyMethod {
    GitApply,
    BlockReplace,
}

/// Apply `patch` to the tree at `root`.
#[instrument(skip_all, fields(root = %root.display()))]
pub fn apply_patch(patch: &str, root: &Path) -> Result<ApplyMethod, ApplyError> {
    let paths = checked_paths(patch, root)?;

    let mut native_failure = None;
    match validate_unified_diff(patch) {
        Ok(()) => match Git::new(root).apply(patch) {
            Ok(output) if output.success() => {
                info!(files = paths.len(), "patch applied with git apply");
                return Ok(ApplyMethod::GitApply);
            }
            Ok(output) => {
                let stderr = output.stderr_lossy();
                let detail = match stderr.trim() {
                    "" => format!("exit code {}", output.exit_code()),
                    trimmed => trimmed.to_string(),
                };
                native_failure = Some(detail);
            }
            Err(err) => native_failure = Some(format!("{err:#}")),
        },
        Err(reason) => debug!(%reason, "skipping git apply"),
    }

    fallback_replace(patch, root, &paths).map_err(|fallback| match native_failure {
        Some(detail) => {
            warn!(%detail, "git apply failed and fallback could not apply");
            ApplyError::NativeApply {
                detail,
                fallback: Box::new(fallback),
            }
        }
        None => fallback,
    })
}

/// Declared paths, each cleared by the path guard.
fn checked_paths(patch: &str, root: &Path) -> Result<Vec<String>, ApplyError> {
    let paths = extract_paths(patch);
    if paths.is_empty() {
        return Err(ApplyError::NoPaths);
    }
    if let Some(path) = paths
        .iter()
        .find(|path| is_forbidden(Path::new(path.as_str()), root))
    {
        warn!(path = %path, "patch touches forbidden path");
        return Err(ApplyError::ForbiddenPath { path: path.clone() });
    }
    Ok(paths)
}

fn fallback_replace(patch: &str, root: &Path, paths: &[String]) -> Result<ApplyMethod, ApplyError> {
    let [relative] = paths else {
        return Err(ApplyError::MultiFileFallback { count: paths.len() });
    };

    let edit = BlockEdit::parse(patch);
    if edit.is_empty() {
        return Err(ApplyError::EmptyPatch);
    }

    let target = resolve_within(root, relative)?;
    let bytes = fs::read(&target).map_err(|source| ApplyError::Io {
        path: target.clone(),
        source,
    })?;
    let content = String::from_utf8(bytes).map_err(|_| ApplyError::NotUtf8 {
        path: relative.clone(),
    })?;
    let updated = replace_single_block(&content, &edit.old_block(), &edit.new_block()).map_err(
        |occurrences| ApplyError::AmbiguousOrMissingBlock {
            path: relative.clone(),
            occurrences,
        },
    )?;

    write_replacing(&target, &updated)?;
    info!(path = %relative, "patch applied with block replacement");
    Ok(ApplyMethod::BlockReplace)
}

/// Resolve `relative` under `root` through any symlinks, refusing targets
/// that land outside the canonical root.
fn resolve_within(root: &Path, relative: &str) -> Result<PathBuf, ApplyError> {
    let canonical = |path: &Path| {
        path.canonicalize().map_err(|source| ApplyError::Io {
            path: path.to_path_buf(),
            source,
        })
    };
    let root = canonical(root)?;
    let target = canonical(&root.join(relative))?;
    if !target.starts_with(&root) {
        warn!(
            path = %relative,
            resolved = %target.display(),
            "patch target resolves outside root"
        );
        return Err(ApplyError::ForbiddenPath {
            path: relative.to_string(),
        });
    }
    Ok(target)
}

/// Write through a sibling temp file so a failed write leaves the original intact.
fn write_replacing(target: &Path, contents: &str) -> Result<(), ApplyError> {
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source: std::io::Error| ApplyError::Io { path, source }
    };

    let mut tmp_name = target.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".stackfix.tmp");
    let tmp = target.with_file_name(tmp_name);

    fs::write(&tmp, contents).map_err(io_err(&tmp))?;
    if let Ok(meta) = fs::metadata(target) {
        fs::set_permissions(&tmp, meta.permissions()).map_err(io_err(&tmp))?;
    }
    if let Err(source) = fs::rename(&tmp, target) {
        let _ = fs::remove_file(&tmp);
        return Err(ApplyError::Io {
            path: target.to_path_buf(),
            source,
        });
    }
    Ok(())
}
