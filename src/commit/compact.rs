//! Budgeted compaction of a diff for inclusion in a prompt.
//!
//! Small diffs are embedded verbatim. Large diffs are split per file and each
//! file gets a character quota; oversized files keep their head (file identity
//! and early hunks) and their tail (the latest changes) around a visible
//! truncation marker. The file list and line counts are always emitted and do
//! not count against the budget.
//!
//! Lengths are byte lengths. Cuts are moved onto UTF-8 character boundaries,
//! which can only make a section shorter.

use std::fmt::Write as _;

use tracing::debug;

use crate::commit::diff::{DiffSummary, FILE_MARKER, file_name_from_header};

/// Default character budget for diff content in a prompt.
pub const DEFAULT_BUDGET: usize = 3000;

/// Minimum per-file quota, even when that overshoots the budget.
pub const QUOTA_FLOOR: usize = 500;

/// Below this many available characters no further file is emitted.
pub const MIN_SECTION_CHARS: usize = 300;

/// Maximum number of per-file sections.
pub const MAX_FILE_SECTIONS: usize = 10;

/// Accounted cost of each section's header line and fences.
pub const SECTION_OVERHEAD: usize = 100;

/// Marker placed between the kept head and tail of a truncated file.
pub const TRUNCATION_MARKER: &str = "\n... (content truncated) ...\n";

/// Result of compacting a diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactedDiff {
    text: String,
    omitted_files: Vec<String>,
    truncated: bool,
}

impl CompactedDiff {
    /// Prompt fragment: file list, counts, and diff content.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Files whose diff content was left out entirely.
    pub fn omitted_files(&self) -> &[String] {
        &self.omitted_files
    }

    /// Whether any emitted file section was cut.
    pub fn truncated(&self) -> bool {
        self.truncated
    }
}

/// Per-file quota for `file_count` segments.
pub fn quota_per_file(budget: usize, file_count: usize) -> usize {
    (budget / file_count.max(1)).max(QUOTA_FLOOR)
}

/// Compact `diff` so its content fits (approximately) within `budget`.
pub fn compact(diff: &DiffSummary, budget: usize) -> CompactedDiff {
    let mut text = String::new();

    text.push_str("Changed files:\n");
    for (i, file) in diff.files().iter().enumerate() {
        let _ = writeln!(text, "{}. {}", i + 1, file);
    }
    let _ = writeln!(text, "\nAdditions: {}", diff.additions());
    let _ = writeln!(text, "Deletions: {}", diff.deletions());

    let raw = diff.raw_diff();
    if raw.len() <= budget {
        text.push_str("\nDiff:\n```\n");
        text.push_str(raw);
        text.push_str("\n```\n");
        return CompactedDiff {
            text,
            omitted_files: Vec::new(),
            truncated: false,
        };
    }

    text.push_str("\nDiff (excerpts):\n");

    let segments = split_by_file(raw);
    let quota = quota_per_file(budget, segments.len());
    let mut used = 0usize;
    let mut truncated = false;
    let mut omitted_from = None;

    debug!(
        "Compacting {} byte diff: {} segments, quota {} per file, budget {}",
        raw.len(),
        segments.len(),
        quota,
        budget
    );

    for (i, segment) in segments.iter().enumerate() {
        if i >= MAX_FILE_SECTIONS {
            omitted_from = Some(i);
            break;
        }

        let available = quota.min(budget.saturating_sub(used));
        if available < MIN_SECTION_CHARS {
            omitted_from = Some(i);
            break;
        }

        let _ = write!(text, "\nFile: {}\n```\n", segment_file_name(segment));
        if segment.len() > available {
            text.push_str(&truncate_segment(segment, available));
            truncated = true;
        } else {
            text.push_str(segment);
        }
        text.push_str("\n```\n");

        used += segment.len().min(available) + SECTION_OVERHEAD;

        if used >= budget && i + 1 < segments.len() {
            omitted_from = Some(i + 1);
            break;
        }
    }

    let omitted_files: Vec<String> = match omitted_from {
        Some(start) => segments[start..]
            .iter()
            .map(|s| segment_file_name(s))
            .collect(),
        None => Vec::new(),
    };

    if !omitted_files.is_empty() {
        debug!("Omitted diff content for: {}", omitted_files.join(", "));
        let _ = write!(
            text,
            "\n... {} more file(s) with changes not shown ...\n",
            omitted_files.len()
        );
    }

    CompactedDiff {
        text,
        omitted_files,
        truncated,
    }
}

/// Split a unified diff into per-file segments.
///
/// Splits before every line that starts with the file marker. Content before
/// the first marker becomes its own segment unless it is empty.
pub fn split_by_file(raw: &str) -> Vec<&str> {
    let mut starts: Vec<usize> = raw
        .match_indices(FILE_MARKER)
        .map(|(idx, _)| idx)
        .filter(|&idx| idx == 0 || raw.as_bytes()[idx - 1] == b'\n')
        .collect();

    if starts.first() != Some(&0) {
        starts.insert(0, 0);
    }

    let mut segments = Vec::with_capacity(starts.len());
    for (n, &start) in starts.iter().enumerate() {
        let end = starts.get(n + 1).copied().unwrap_or(raw.len());
        let segment = &raw[start..end];
        if !segment.is_empty() {
            segments.push(segment);
        }
    }
    segments
}

/// Name of the file a segment describes.
fn segment_file_name(segment: &str) -> String {
    let mut lines = segment.lines();
    if let Some(first) = lines.next()
        && let Some(name) = file_name_from_header(first)
    {
        return name;
    }

    segment
        .lines()
        .find_map(|line| line.strip_prefix("+++ b/"))
        .map(str::to_string)
        .unwrap_or_else(|| "unknown file".to_string())
}

/// Keep the head and tail of `segment` so the result spans `available` bytes.
fn truncate_segment(segment: &str, available: usize) -> String {
    let head_len = available * 2 / 3;
    let tail_len = available as isize - head_len as isize - TRUNCATION_MARKER.len() as isize;

    if head_len == 0 || tail_len <= 0 {
        let end = floor_char_boundary(segment, available);
        return format!("{}{}", &segment[..end], TRUNCATION_MARKER);
    }

    let head_end = floor_char_boundary(segment, head_len);
    let tail_start = ceil_char_boundary(segment, segment.len() - tail_len as usize);

    format!(
        "{}{}{}",
        &segment[..head_end],
        TRUNCATION_MARKER,
        &segment[tail_start..]
    )
}

fn floor_char_boundary(s: &str, idx: usize) -> usize {
    if idx >= s.len() {
        return s.len();
    }
    let mut end = idx;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    end
}

fn ceil_char_boundary(s: &str, idx: usize) -> usize {
    let mut start = idx;
    while start < s.len() && !s.is_char_boundary(start) {
        start += 1;
    }
    start
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A file segment of exactly `len` bytes with recognisable head and tail.
    fn segment(name: &str, len: usize) -> String {
        let head = format!("diff --git a/{name} b/{name}\n+++ b/{name}\n@@ -1 +1 @@\n");
        let tail = format!("\n+last-line-of-{name}\n");
        let pad = len - head.len() - tail.len();
        format!("{head}+{}{tail}", "x".repeat(pad - 1))
    }

    fn summary_of(names: &[&str], len: usize) -> DiffSummary {
        let raw: String = names.iter().map(|n| segment(n, len)).collect();
        DiffSummary::from_unified(raw, true)
    }

    /// Contents of every emitted file section, keyed by file name.
    fn sections(text: &str) -> Vec<(String, String)> {
        let mut found = Vec::new();
        let mut rest = text;
        while let Some(idx) = rest.find("\nFile: ") {
            rest = &rest[idx + 7..];
            let name_end = rest.find('\n').unwrap();
            let name = rest[..name_end].to_string();
            let body_start = name_end + "\n```\n".len();
            let body_len = rest[body_start..].find("\n```\n").unwrap();
            found.push((name, rest[body_start..body_start + body_len].to_string()));
            rest = &rest[body_start + body_len..];
        }
        found
    }

    #[test]
    fn test_small_diff_is_embedded_verbatim() {
        let raw = segment("src/lib.rs", 800);
        let summary = DiffSummary::from_unified(raw.clone(), true);

        let compacted = compact(&summary, DEFAULT_BUDGET);

        assert!(compacted.text().contains(&raw));
        assert!(!compacted.truncated());
        assert!(compacted.omitted_files().is_empty());
        assert!(compacted.text().contains("1. src/lib.rs"));
    }

    #[test]
    fn test_diff_equal_to_budget_is_verbatim() {
        let raw = segment("a.rs", 3000);
        let summary = DiffSummary::from_unified(raw.clone(), false);
        let compacted = compact(&summary, 3000);
        assert!(compacted.text().contains(&raw));
        assert!(!compacted.text().contains(TRUNCATION_MARKER));
    }

    #[test]
    fn test_counts_always_present() {
        let summary = summary_of(&["a.rs", "b.rs", "c.rs"], 4000);
        let compacted = compact(&summary, 3000);
        assert!(compacted.text().contains(&format!("Additions: {}", summary.additions())));
        assert!(compacted.text().contains(&format!("Deletions: {}", summary.deletions())));
    }

    #[test]
    fn test_quota_per_file_has_floor() {
        assert_eq!(quota_per_file(3000, 3), 1000);
        assert_eq!(quota_per_file(3000, 20), QUOTA_FLOOR);
        assert_eq!(quota_per_file(3000, 0), 3000);
    }

    #[test]
    fn test_three_large_files_each_truncated_within_quota() {
        let summary = summary_of(&["a.rs", "b.rs", "c.rs"], 4000);
        let compacted = compact(&summary, 3000);

        let found = sections(compacted.text());
        assert_eq!(found.len(), 3);

        let mut total = 0;
        for (name, body) in &found {
            assert!(body.len() <= 1000, "{name} section is {} bytes", body.len());
            assert!(body.contains(TRUNCATION_MARKER.trim()));
            total += body.len();
        }
        assert!(total <= 3000 + 3 * SECTION_OVERHEAD);
        assert!(compacted.truncated());
        // The last file used up the budget, nothing was left to omit.
        assert!(compacted.omitted_files().is_empty());
        assert!(!compacted.text().contains("not shown"));
    }

    #[test]
    fn test_truncated_section_keeps_prefix_and_suffix() {
        let summary = summary_of(&["a.rs", "b.rs", "c.rs"], 4000);
        let compacted = compact(&summary, 3000);

        for (name, body) in sections(compacted.text()) {
            assert!(body.starts_with(&format!("diff --git a/{name} b/{name}")));
            assert!(body.ends_with(&format!("last-line-of-{name}\n")));
            let marker_at = body.find(TRUNCATION_MARKER).unwrap();
            assert!(marker_at > 0);
            assert!(marker_at + TRUNCATION_MARKER.len() < body.len());
        }
    }

    #[test]
    fn test_single_oversized_file_is_truncated_not_dropped() {
        let summary = summary_of(&["huge.rs"], 50_000);
        let compacted = compact(&summary, 3000);

        let found = sections(compacted.text());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0, "huge.rs");
        assert!(found[0].1.len() <= 3000);
        assert!(found[0].1.contains(TRUNCATION_MARKER));
        assert!(found[0].1.ends_with("last-line-of-huge.rs\n"));
    }

    #[test]
    fn test_many_files_capped_at_ten_sections() {
        let names: Vec<String> = (0..12).map(|i| format!("f{i}.rs")).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let summary = summary_of(&refs, 9000);

        let compacted = compact(&summary, 100_000);

        assert_eq!(sections(compacted.text()).len(), MAX_FILE_SECTIONS);
        assert_eq!(compacted.omitted_files(), &["f10.rs", "f11.rs"]);
        assert!(compacted.text().contains("2 more file(s) with changes not shown"));
    }

    #[test]
    fn test_floor_quota_stops_when_budget_spent() {
        let names: Vec<String> = (0..20).map(|i| format!("m{i}.rs")).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let summary = summary_of(&refs, 700);

        let compacted = compact(&summary, 3000);

        let found = sections(compacted.text());
        assert!(found.len() <= MAX_FILE_SECTIONS);
        // 500 quota + 100 overhead per file: five files reach the budget.
        assert_eq!(found.len(), 5);
        for (_, body) in &found {
            assert!(body.len() <= QUOTA_FLOOR);
        }
        assert_eq!(compacted.omitted_files().len(), 15);
        assert_eq!(compacted.omitted_files()[0], "m5.rs");
    }

    #[test]
    fn test_small_files_emitted_whole() {
        let mut raw = segment("big.rs", 5000);
        raw.push_str(&segment("small.rs", 200));
        let summary = DiffSummary::from_unified(raw, false);

        let compacted = compact(&summary, 3000);
        let found = sections(compacted.text());

        assert_eq!(found.len(), 2);
        assert_eq!(found[1].1, segment("small.rs", 200));
    }

    #[test]
    fn test_split_by_file_discards_empty_leading_piece() {
        let raw = format!("{}{}", segment("a.rs", 100), segment("b.rs", 100));
        let segments = split_by_file(&raw);
        assert_eq!(segments.len(), 2);
        assert!(segments[0].starts_with("diff --git a/a.rs"));
        assert!(segments[1].starts_with("diff --git a/b.rs"));
    }

    #[test]
    fn test_split_by_file_keeps_preamble_and_ignores_inline_marker() {
        let raw = "Untracked files:\nnotes.txt\ndiff --git a/a.rs b/a.rs\n+let s = \"diff --git\";\n";
        let segments = split_by_file(raw);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0], "Untracked files:\nnotes.txt\n");
        assert!(segments[1].contains("let s = \"diff --git\""));
    }

    #[test]
    fn test_segment_name_falls_back_to_plus_line_then_unknown() {
        assert_eq!(segment_file_name("junk\n+++ b/x/y.rs\n"), "x/y.rs");
        assert_eq!(segment_file_name("no header here"), "unknown file");
    }

    #[test]
    fn test_truncation_respects_utf8_boundaries() {
        let body = "é".repeat(3000);
        let raw = format!("diff --git a/u.txt b/u.txt\n+{body}\n");
        let summary = DiffSummary::from_unified(raw, false);

        let compacted = compact(&summary, 1000);
        let found = sections(compacted.text());

        assert_eq!(found.len(), 1);
        assert!(found[0].1.len() <= 1000);
        assert!(found[0].1.contains(TRUNCATION_MARKER));
    }

    #[test]
    fn test_degenerate_available_keeps_head_only() {
        let text = "abcdefghij".repeat(10);
        let cut = truncate_segment(&text, 20);
        assert!(cut.starts_with("abcdefghij"));
        assert!(cut.ends_with(TRUNCATION_MARKER));
    }
}
