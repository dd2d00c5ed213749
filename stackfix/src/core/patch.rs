//! Pure patch parsing used by the applier.
//!
//! Two formats are recognized: a `*** Begin Patch` block with explicit
//! per-file action headers, and a standard unified diff.

const BEGIN_PATCH: &str = "*** Begin Patch";
const END_PATCH: &str = "*** End Patch";
const FILE_ACTIONS: [&str; 3] = ["*** Update File: ", "*** Add File: ", "*** Delete File: "];
const DEV_NULL: &str = "/dev/null";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchFormat {
    BeginPatch,
    UnifiedDiff,
}

impl PatchFormat {
    /// `BeginPatch` if the first non-blank line opens a begin-patch block.
    pub fn detect(patch: &str) -> Self {
        match patch.lines().find(|line| !line.trim().is_empty()) {
            Some(line) if line.starts_with(BEGIN_PATCH) => PatchFormat::BeginPatch,
            _ => PatchFormat::UnifiedDiff,
        }
    }
}

/// Paths the patch declares it touches, in order, without duplicates.
pub fn extract_paths(patch: &str) -> Vec<String> {
    let raw = match PatchFormat::detect(patch) {
        PatchFormat::BeginPatch => begin_patch_paths(patch),
        PatchFormat::UnifiedDiff => unified_diff_paths(patch),
    };
    let mut paths: Vec<String> = Vec::with_capacity(raw.len());
    for path in raw {
        if !path.is_empty() && !paths.contains(&path) {
            paths.push(path);
        }
    }
    paths
}

fn begin_patch_paths(patch: &str) -> Vec<String> {
    patch
        .lines()
        .filter_map(|line| {
            FILE_ACTIONS
                .iter()
                .find_map(|action| line.strip_prefix(action))
                .map(|path| path.trim().to_string())
        })
        .collect()
}

fn unified_diff_paths(patch: &str) -> Vec<String> {
    patch
        .lines()
        .filter_map(|line| {
            line.strip_prefix("--- ")
                .or_else(|| line.strip_prefix("+++ "))
        })
        .map(header_path)
        .filter(|path| path != DEV_NULL)
        .collect()
}

/// `a/src/x.rs\t2024-01-01` -> `src/x.rs`
fn header_path(header: &str) -> String {
    let header = header.split('\t').next().unwrap_or(header).trim();
    header
        .strip_prefix("a/")
        .or_else(|| header.strip_prefix("b/"))
        .unwrap_or(header)
        .to_string()
}

/// Line sequences reconstructed from a patch body for exact-block replacement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockEdit {
    pub old_lines: Vec<String>,
    pub new_lines: Vec<String>,
}

impl BlockEdit {
    /// Walk the body: `+` feeds new, `-` feeds old, ` ` feeds both. Lines are
    /// ignored until the first file or hunk boundary.
    pub fn parse(patch: &str) -> Self {
        let mut edit = BlockEdit::default();
        let mut tracking = false;
        for line in patch.lines() {
            if is_boundary(line) {
                tracking = true;
                continue;
            }
            if !tracking {
                continue;
            }
            if let Some(added) = line.strip_prefix('+') {
                edit.new_lines.push(added.to_string());
            } else if let Some(removed) = line.strip_prefix('-') {
                edit.old_lines.push(removed.to_string());
            } else if let Some(context) = line.strip_prefix(' ') {
                edit.old_lines.push(context.to_string());
                edit.new_lines.push(context.to_string());
            }
        }
        edit
    }

    pub fn is_empty(&self) -> bool {
        self.old_lines.is_empty() && self.new_lines.is_empty()
    }

    pub fn old_block(&self) -> String {
        self.old_lines.join("\n")
    }

    pub fn new_block(&self) -> String {
        self.new_lines.join("\n")
    }
}

fn is_boundary(line: &str) -> bool {
    line.starts_with("diff --git ")
        || line.starts_with("--- ")
        || line.starts_with("+++ ")
        || line.starts_with("@@")
        || line.starts_with(BEGIN_PATCH)
        || line.starts_with(END_PATCH)
        || FILE_ACTIONS.iter().any(|action| line.starts_with(action))
}

/// Replace the single occurrence of `old` in `content` with `new`.
///
/// Returns the number of occurrences found when it is not exactly one.
pub fn replace_single_block(content: &str, old: &str, new: &str) -> Result<String, usize> {
    let occurrences = content.matches(old).count();
    if occurrences != 1 {
        return Err(occurrences);
    }
    Ok(content.replacen(old, new, 1))
}
