//! Deterministic classification of paths a patch may touch.
//!
//! A path is forbidden when it escapes the root, crosses a denylisted
//! directory (VCS internals, dependency or build output, credential stores),
//! or names a secret file. Normalization is lexical; the filesystem is never
//! consulted.

use std::path::{Component, Path, PathBuf};

const DENYLIST_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    "dist",
    "build",
    "target",
    "__pycache__",
    ".venv",
    ".env",
    ".ssh",
    ".gnupg",
];

const DENYLIST_NAMES: &[&str] = &[
    ".env",
    ".env.local",
    ".env.development",
    ".env.production",
    ".env.test",
];

/// Matched case-insensitively against the end of the file name.
const DENYLIST_SUFFIXES: &[&str] = &[
    ".key",
    ".pem",
    ".p12",
    ".pfx",
    ".crt",
    ".cer",
    "id_rsa",
    "id_ed25519",
];

/// True if `path` (relative to `root`, or absolute) must never be written.
pub fn is_forbidden(path: &Path, root: &Path) -> bool {
    let root = normalize(&absolute(root));
    let candidate = if path.is_absolute() {
        normalize(path)
    } else {
        normalize(&root.join(path))
    };

    let Ok(relative) = candidate.strip_prefix(&root) else {
        return true;
    };

    let crosses_denied_dir = relative.components().any(|component| match component {
        Component::Normal(name) => name
            .to_str()
            .is_some_and(|name| DENYLIST_DIRS.contains(&name)),
        _ => false,
    });
    if crosses_denied_dir {
        return true;
    }

    let Some(name) = relative.file_name().and_then(|name| name.to_str()) else {
        return false;
    };
    if DENYLIST_NAMES.contains(&name) {
        return true;
    }
    let lowered = name.to_ascii_lowercase();
    DENYLIST_SUFFIXES
        .iter()
        .any(|suffix| lowered.ends_with(suffix))
}

/// Keep only the paths that are not forbidden, preserving order.
pub fn filter_allowed<P: AsRef<Path>>(paths: &[P], root: &Path) -> Vec<PathBuf> {
    paths
        .iter()
        .map(|path| path.as_ref())
        .filter(|path| !is_forbidden(path, root))
        .map(Path::to_path_buf)
        .collect()
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Resolve `.` and `..` lexically. `..` above the filesystem root is dropped.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(prefix) => out.push(prefix.as_os_str()),
            Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(name) => out.push(name),
        }
    }
    out
}
