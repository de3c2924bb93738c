// SPDX-License-Identifier: MIT
//! Unified-diff position index.
//!
//! The forge anchors an inline review comment with a *position* rather than a
//! file line number: a 1-based offset into the diff itself. This module
//! parses the raw unified diff for a pull request once and builds, per file,
//! a map from new-file line number to that position. The position counter
//! restarts at every context line; removed lines advance nothing. That is the
//! counting rule this tool has always shipped, and existing review anchors
//! depend on it.
//!
//! The parser is deliberately tolerant: unrecognized lines are skipped, hunk
//! headers outside a file block are ignored, and a malformed diff yields a
//! sparse index rather than an error. Findings that fail to resolve against a
//! sparse index are still delivered, just not inline.

use std::collections::{BTreeMap, HashMap};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

/// How far (in new-file lines) a finding may drift from an indexed line and
/// still be anchored to it.
pub const MAX_LINE_DRIFT: u32 = 3;

/// Hunk header, e.g. `@@ -1,3 +14,6 @@`. Only the new-side start matters;
/// length fields are optional for single-line hunks.
static HUNK_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^@@ -\d+(?:,\d+)? \+(\d+)(?:,\d+)? @@").expect("hunk header regex"));

// ─── Diff position ────────────────────────────────────────────────────────────

/// A forge diff coordinate for one inline comment.
///
/// Only [`PositionIndex`] mints these; everything downstream treats them as
/// opaque and ships them back to the forge unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct DiffPosition(pub u32);

impl std::fmt::Display for DiffPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ─── Position index ───────────────────────────────────────────────────────────

/// Per-file map from new-file line number to diff position.
///
/// Built once per diff snapshot and read-only afterwards. Files announced by
/// the diff but carrying no added lines (binary files, pure deletions,
/// renames) are present with an empty table, so they count as reviewed even
/// though nothing can anchor to them.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct PositionIndex {
    files: HashMap<String, BTreeMap<u32, DiffPosition>>,
}

impl PositionIndex {
    /// Parse a raw unified diff into an index. Never fails; unparseable
    /// input produces an empty or partial index.
    pub fn from_unified_diff(diff: &str) -> Self {
        let mut files: HashMap<String, BTreeMap<u32, DiffPosition>> = HashMap::new();
        let mut current_file: Option<String> = None;
        let mut in_hunk = false;
        let mut position: u32 = 0;
        let mut new_line: u32 = 0;

        for line in diff.lines() {
            if let Some(rest) = line.strip_prefix("diff --git ") {
                current_file = rest.find(" b/").map(|at| rest[at + 3..].to_string());
                if let Some(file) = &current_file {
                    files.entry(file.clone()).or_default();
                }
                in_hunk = false;
                position = 0;
                new_line = 0;
                continue;
            }

            // File headers look like added/removed lines; they must be
            // classified before the single-character prefixes below.
            if line.starts_with("+++") || line.starts_with("---") {
                continue;
            }

            if let Some(caps) = HUNK_HEADER.captures(line) {
                if current_file.is_some() {
                    let new_start: u32 = caps[1].parse().unwrap_or(1);
                    new_line = new_start.saturating_sub(1);
                    position = 0;
                    in_hunk = true;
                }
                continue;
            }

            if !in_hunk {
                continue;
            }
            let Some(file) = &current_file else {
                continue;
            };

            if line.starts_with('+') {
                position += 1;
                new_line += 1;
                if let Some(table) = files.get_mut(file) {
                    table.insert(new_line, DiffPosition(position));
                }
            } else if line.starts_with('-') {
                // Removed lines occupy no slot in the new file.
            } else {
                // Context (and anything unrecognized, e.g. the `\ No newline`
                // marker) advances the new file and restarts the position run.
                // Future: confirm restart-at-context against a live submission
                // on a hunk with interleaved context before widening drift.
                new_line += 1;
                position = 0;
            }
        }

        Self { files }
    }

    /// Resolve a finding's line to a diff position.
    ///
    /// An exact hit wins. Otherwise the nearest indexed line within
    /// [`MAX_LINE_DRIFT`] is used; on a distance tie the lower line wins, so
    /// repeated runs over the same diff anchor identically.
    pub fn resolve(&self, file: &str, line: u32) -> Option<DiffPosition> {
        let table = self.files.get(file)?;
        if let Some(&position) = table.get(&line) {
            return Some(position);
        }

        let lo = line.saturating_sub(MAX_LINE_DRIFT);
        let hi = line.saturating_add(MAX_LINE_DRIFT);
        let mut best: Option<(u32, DiffPosition)> = None;
        for (&candidate, &position) in table.range(lo..=hi) {
            let distance = candidate.abs_diff(line);
            if best.map_or(true, |(d, _)| distance < d) {
                best = Some((distance, position));
            }
        }
        best.map(|(_, position)| position)
    }

    /// Number of files the diff touches, including files with no added lines.
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Total number of anchorable lines across all files.
    pub fn position_count(&self) -> usize {
        self.files.values().map(|t| t.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const TWO_ADDED_LINES: &str = "\
diff --git a/src/main.rs b/src/main.rs
index 1234567..89abcde 100644
--- a/src/main.rs
+++ b/src/main.rs
@@ -1,2 +1,4 @@
 fn main() {
+    let a = 1;
+    let b = 2;
 }
";

    #[test]
    fn test_positions_count_from_last_context_line() {
        let index = PositionIndex::from_unified_diff(TWO_ADDED_LINES);
        assert_eq!(index.file_count(), 1);
        assert_eq!(index.resolve("src/main.rs", 2), Some(DiffPosition(1)));
        assert_eq!(index.resolve("src/main.rs", 3), Some(DiffPosition(2)));
        // Line 1 and 4 are context; they get anchored to neighbors, not
        // indexed themselves.
        assert_eq!(index.position_count(), 2);
    }

    #[test]
    fn test_context_restarts_position_run() {
        let diff = "\
diff --git a/a.rs b/a.rs
--- a/a.rs
+++ b/a.rs
@@ -1,1 +1,3 @@
+first
 middle
+third
";
        let index = PositionIndex::from_unified_diff(diff);
        assert_eq!(index.resolve("a.rs", 1), Some(DiffPosition(1)));
        assert_eq!(index.resolve("a.rs", 3), Some(DiffPosition(1)));
    }

    #[test]
    fn test_removed_line_does_not_break_an_addition_run() {
        let diff = "\
diff --git a/src/main.rs b/src/main.rs
--- a/src/main.rs
+++ b/src/main.rs
@@ -1,3 +1,4 @@
 fn main() {
+    let a = 1;
-    let old = 0;
+    let b = 2;
";
        let index = PositionIndex::from_unified_diff(diff);
        // Only context resets the run: the removal between the two added
        // lines leaves the second at position 2, not back at 1.
        assert_eq!(index.resolve("src/main.rs", 2), Some(DiffPosition(1)));
        assert_eq!(index.resolve("src/main.rs", 3), Some(DiffPosition(2)));
        assert_eq!(index.position_count(), 2);
    }

    #[test]
    fn test_removed_lines_advance_nothing() {
        let diff = "\
diff --git a/a.rs b/a.rs
--- a/a.rs
+++ b/a.rs
@@ -1,3 +1,2 @@
 keep
-gone
+replacement
";
        let index = PositionIndex::from_unified_diff(diff);
        // `keep` is new line 1; `gone` does not exist in the new file, so
        // `replacement` is new line 2 at position 1.
        assert_eq!(index.resolve("a.rs", 2), Some(DiffPosition(1)));
        assert_eq!(index.position_count(), 1);
    }

    #[test]
    fn test_second_hunk_restarts_counters() {
        let diff = "\
diff --git a/a.rs b/a.rs
--- a/a.rs
+++ b/a.rs
@@ -1,1 +1,2 @@
 top
+one
@@ -10,1 +11,2 @@
 mid
+two
";
        let index = PositionIndex::from_unified_diff(diff);
        assert_eq!(index.resolve("a.rs", 2), Some(DiffPosition(1)));
        assert_eq!(index.resolve("a.rs", 12), Some(DiffPosition(1)));
    }

    #[test]
    fn test_multiple_files_are_independent() {
        let diff = "\
diff --git a/a.rs b/a.rs
--- a/a.rs
+++ b/a.rs
@@ -1,0 +1,1 @@
+only a
diff --git a/b.rs b/b.rs
--- a/b.rs
+++ b/b.rs
@@ -1,0 +1,2 @@
+b one
+b two
";
        let index = PositionIndex::from_unified_diff(diff);
        assert_eq!(index.file_count(), 2);
        assert_eq!(index.resolve("a.rs", 1), Some(DiffPosition(1)));
        assert_eq!(index.resolve("b.rs", 2), Some(DiffPosition(2)));
        assert_eq!(index.resolve("a.rs", 2), None);
    }

    #[test]
    fn test_binary_file_is_counted_but_unanchorable() {
        let diff = "\
diff --git a/logo.png b/logo.png
index 1234567..89abcde 100644
Binary files a/logo.png and b/logo.png differ
";
        let index = PositionIndex::from_unified_diff(diff);
        assert_eq!(index.file_count(), 1);
        assert_eq!(index.resolve("logo.png", 1), None);
    }

    #[test]
    fn test_hunk_without_length_fields() {
        let diff = "\
diff --git a/a.rs b/a.rs
--- a/a.rs
+++ b/a.rs
@@ -5 +5 @@
-old
+new
";
        let index = PositionIndex::from_unified_diff(diff);
        assert_eq!(index.resolve("a.rs", 5), Some(DiffPosition(1)));
    }

    #[test]
    fn test_hunk_header_outside_file_block_is_ignored() {
        let diff = "\
@@ -1,1 +1,2 @@
+orphan
";
        let index = PositionIndex::from_unified_diff(diff);
        assert!(index.is_empty());
    }

    #[test]
    fn test_garbage_prelude_is_skipped() {
        let diff = format!("From: somebody\nSubject: patch\n\n{TWO_ADDED_LINES}");
        let index = PositionIndex::from_unified_diff(&diff);
        assert_eq!(index.resolve("src/main.rs", 2), Some(DiffPosition(1)));
    }

    #[test]
    fn test_no_newline_marker_counts_as_context() {
        let diff = "\
diff --git a/a.rs b/a.rs
--- a/a.rs
+++ b/a.rs
@@ -1,1 +1,2 @@
 head
+tail
\\ No newline at end of file
";
        let index = PositionIndex::from_unified_diff(diff);
        assert_eq!(index.resolve("a.rs", 2), Some(DiffPosition(1)));
    }

    #[test]
    fn test_parse_is_idempotent() {
        let a = PositionIndex::from_unified_diff(TWO_ADDED_LINES);
        let b = PositionIndex::from_unified_diff(TWO_ADDED_LINES);
        assert_eq!(a, b);
    }

    // ─── resolve() ────────────────────────────────────────────────────────────

    fn index_of(entries: &[(u32, u32)]) -> PositionIndex {
        let mut files = HashMap::new();
        files.insert(
            "a.rs".to_string(),
            entries
                .iter()
                .map(|&(line, pos)| (line, DiffPosition(pos)))
                .collect::<BTreeMap<_, _>>(),
        );
        PositionIndex { files }
    }

    #[test]
    fn test_resolve_exact_match() {
        let index = index_of(&[(10, 4), (12, 7)]);
        assert_eq!(index.resolve("a.rs", 12), Some(DiffPosition(7)));
    }

    #[test]
    fn test_resolve_within_drift() {
        let index = index_of(&[(44, 9)]);
        assert_eq!(index.resolve("a.rs", 42), Some(DiffPosition(9)));
        // Distance exactly MAX_LINE_DRIFT still anchors.
        assert_eq!(index.resolve("a.rs", 47), Some(DiffPosition(9)));
    }

    #[test]
    fn test_resolve_beyond_drift_is_none() {
        let index = index_of(&[(55, 9)]);
        assert_eq!(index.resolve("a.rs", 50), None);
        assert_eq!(index.resolve("a.rs", 59), None);
    }

    #[test]
    fn test_resolve_tie_prefers_lower_line() {
        let index = index_of(&[(10, 4), (14, 9)]);
        // Line 12 is two away from both; the lower line wins so repeated
        // runs anchor identically.
        assert_eq!(index.resolve("a.rs", 12), Some(DiffPosition(4)));
    }

    #[test]
    fn test_resolve_unknown_file_is_none() {
        let index = index_of(&[(10, 4)]);
        assert_eq!(index.resolve("b.rs", 10), None);
    }

    #[test]
    fn test_resolve_near_zero_does_not_underflow() {
        let index = index_of(&[(1, 1)]);
        assert_eq!(index.resolve("a.rs", 2), Some(DiffPosition(1)));
    }

    // ─── properties ───────────────────────────────────────────────────────────

    #[derive(Debug, Clone, Copy)]
    enum Kind {
        Add,
        Del,
        Ctx,
    }

    fn kind_strategy() -> impl Strategy<Value = Kind> {
        prop_oneof![Just(Kind::Add), Just(Kind::Del), Just(Kind::Ctx)]
    }

    proptest! {
        /// The indexed keys are exactly the new-file line numbers of added
        /// lines, and every minted position is at least 1.
        #[test]
        fn prop_index_keys_are_added_lines(
            hunks in prop::collection::vec(
                (1u32..400, prop::collection::vec(kind_strategy(), 1..12)),
                1..4,
            )
        ) {
            let mut diff = String::from("diff --git a/f.rs b/f.rs\n--- a/f.rs\n+++ b/f.rs\n");
            let mut expected = std::collections::BTreeSet::new();

            for (start, kinds) in &hunks {
                diff.push_str(&format!("@@ -{start},1 +{start},1 @@\n"));
                let mut new_line = start - 1;
                for kind in kinds {
                    match kind {
                        Kind::Add => {
                            new_line += 1;
                            expected.insert(new_line);
                            diff.push_str("+x\n");
                        }
                        Kind::Del => diff.push_str("-x\n"),
                        Kind::Ctx => {
                            new_line += 1;
                            diff.push_str(" x\n");
                        }
                    }
                }
            }

            let index = PositionIndex::from_unified_diff(&diff);
            let table = &index.files["f.rs"];
            let keys: std::collections::BTreeSet<u32> = table.keys().copied().collect();
            prop_assert_eq!(keys, expected);
            prop_assert!(table.values().all(|p| p.0 >= 1));
        }
    }
}
