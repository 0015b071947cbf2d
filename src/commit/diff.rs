//! Typed summary of a unified diff.

/// Literal prefix that starts every per-file block of a git unified diff.
pub const FILE_MARKER: &str = "diff --git";

/// Summary of the changes a commit message should describe.
///
/// File order is the order the diff reports them in and is never sorted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffSummary {
    files: Vec<String>,
    additions: usize,
    deletions: usize,
    raw_diff: String,
    staged_only: bool,
}

impl DiffSummary {
    pub fn new(
        files: Vec<String>,
        additions: usize,
        deletions: usize,
        raw_diff: impl Into<String>,
        staged_only: bool,
    ) -> Self {
        Self {
            files,
            additions,
            deletions,
            raw_diff: raw_diff.into(),
            staged_only,
        }
    }

    /// Build a summary by reading a unified diff as produced by `git diff`.
    ///
    /// Files come from `diff --git a/<old> b/<new>` headers in order of
    /// appearance. Added/removed lines are counted from hunk bodies only, so
    /// the `+++`/`---` file headers are not counted.
    pub fn from_unified(raw_diff: impl Into<String>, staged_only: bool) -> Self {
        let raw_diff = raw_diff.into();
        let mut files = Vec::new();
        let mut additions = 0;
        let mut deletions = 0;
        let mut in_header = false;

        for line in raw_diff.lines() {
            if line.starts_with(FILE_MARKER) {
                in_header = true;
                if let Some(name) = file_name_from_header(line)
                    && !files.contains(&name)
                {
                    files.push(name);
                }
                continue;
            }
            if line.starts_with("@@") {
                in_header = false;
                continue;
            }
            if in_header {
                continue;
            }
            if line.starts_with('+') {
                additions += 1;
            } else if line.starts_with('-') {
                deletions += 1;
            }
        }

        Self {
            files,
            additions,
            deletions,
            raw_diff,
            staged_only,
        }
    }

    pub fn files(&self) -> &[String] {
        &self.files
    }

    pub fn additions(&self) -> usize {
        self.additions
    }

    pub fn deletions(&self) -> usize {
        self.deletions
    }

    pub fn raw_diff(&self) -> &str {
        &self.raw_diff
    }

    pub fn staged_only(&self) -> bool {
        self.staged_only
    }

    /// True when there is nothing at all to describe.
    pub fn is_empty(&self) -> bool {
        self.raw_diff.trim().is_empty() && self.files.is_empty()
    }
}

/// Extract the new-side path from a `diff --git a/<old> b/<new>` header.
pub(crate) fn file_name_from_header(line: &str) -> Option<String> {
    let rest = line.strip_prefix(FILE_MARKER)?.trim();
    // Paths with spaces are ambiguous in this header; the last ` b/` wins.
    if let Some(idx) = rest.rfind(" b/") {
        return Some(rest[idx + 3..].to_string());
    }
    rest.split_whitespace()
        .nth(1)
        .map(|p| p.trim_start_matches("b/").to_string())
}
