//! Routing of findings into delivery classes.
//!
//! Every finding lands in exactly one bucket: inline line comments for
//! findings that resolved to a diff position, per-file comments for findings
//! with no line number, and a skipped list for line-anchored findings the
//! diff could not place. Nothing is dropped here; the pipeline decides how
//! each bucket reaches the forge.

use std::collections::BTreeMap;

use crate::diff::PositionIndex;
use crate::finding::Finding;
use crate::forge::ReviewComment;
use crate::render;

/// A line-anchored finding the diff could not place.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedFinding {
    /// The line the reviewer pointed at.
    pub line: u32,
    pub finding: Finding,
}

/// The full delivery plan for one run.
///
/// `file_comments` is keyed by path in a `BTreeMap` so per-file comments go
/// out in a stable order run over run.
#[derive(Debug, Default, PartialEq)]
pub struct CommentPlan {
    pub line_comments: Vec<ReviewComment>,
    pub file_comments: BTreeMap<String, Vec<Finding>>,
    pub skipped: Vec<SkippedFinding>,
}

impl CommentPlan {
    /// Partition findings against the diff index.
    pub fn build(findings: Vec<Finding>, index: &PositionIndex) -> Self {
        let mut plan = CommentPlan::default();
        for finding in findings {
            match finding.line {
                None => plan
                    .file_comments
                    .entry(finding.file.clone())
                    .or_default()
                    .push(finding),
                Some(line) => match index.resolve(&finding.file, line) {
                    Some(position) => plan.line_comments.push(ReviewComment {
                        path: finding.file.clone(),
                        position,
                        body: render::line_comment(&finding),
                    }),
                    None => plan.skipped.push(SkippedFinding { line, finding }),
                },
            }
        }
        plan
    }

    /// Total findings across all three buckets.
    pub fn total(&self) -> usize {
        self.line_comments.len()
            + self.file_comments.values().map(Vec::len).sum::<usize>()
            + self.skipped.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}
