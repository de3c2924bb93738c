// SPDX-License-Identifier: MIT
//! Rate-limited delivery of a [`CommentPlan`] to the forge.
//!
//! Delivery runs in fixed stages, strictly in order: batched inline review
//! comments, aggregated per-file comments, escalation of findings without a
//! diff anchor, and a closing summary. A failed submission inside a stage is
//! logged and counted but never aborts the run; the only fatal errors are the
//! two prerequisite fetches, which happen before anything is posted.
//!
//! Submissions are sequential by design. The forge applies secondary rate
//! limits to write traffic, so the pipeline spaces its requests out instead
//! of racing them.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::diff::PositionIndex;
use crate::finding::Finding;
use crate::forge::{ForgeClient, ForgeError, ReviewComment};
use crate::plan::{CommentPlan, SkippedFinding};
use crate::render;

/// Inline comments per review submission. One review per batch keeps each
/// request small enough for the forge to validate as a unit.
pub const REVIEW_BATCH_SIZE: usize = 10;

// ─── Pacing ───────────────────────────────────────────────────────────────────

/// Pauses between forge submissions. Defaults match production pacing;
/// [`DeliveryPacing::instant`] removes the waits for tests.
#[derive(Debug, Clone)]
pub struct DeliveryPacing {
    /// Between consecutive review batches.
    pub batch_pause: Duration,
    /// Between individual submissions when a batch falls back to one-by-one.
    pub single_pause: Duration,
    /// Between successive top-level comments.
    pub comment_pause: Duration,
}

impl Default for DeliveryPacing {
    fn default() -> Self {
        Self {
            batch_pause: Duration::from_millis(1500),
            single_pause: Duration::from_millis(500),
            comment_pause: Duration::from_millis(1000),
        }
    }
}

impl DeliveryPacing {
    /// No pauses at all. Tests only; production runs would trip the forge's
    /// secondary rate limits.
    pub fn instant() -> Self {
        Self {
            batch_pause: Duration::ZERO,
            single_pause: Duration::ZERO,
            comment_pause: Duration::ZERO,
        }
    }
}

// ─── Outcome ──────────────────────────────────────────────────────────────────

/// Aggregate result of one delivery run. Escalated findings are posted
/// through the file-comment mechanism and count toward those totals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryOutcome {
    pub line_comments_posted: usize,
    pub line_comments_failed: usize,
    pub file_comments_posted: usize,
    pub file_comments_failed: usize,
    /// Line-anchored findings that had no diff anchor. These are escalated
    /// as file comments, not dropped.
    pub skipped_findings: usize,
    /// Whether the closing summary made it to the forge.
    pub summary_posted: bool,
}

/// A delivery run can only fail before it posts anything: both prerequisite
/// fetches must succeed for any submission to make sense.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("failed to fetch pull request diff: {0}")]
    DiffFetch(#[source] ForgeError),
    #[error("failed to fetch head commit: {0}")]
    HeadCommit(#[source] ForgeError),
}

// ─── Pipeline ─────────────────────────────────────────────────────────────────

/// Full delivery run: fetch prerequisites, build the plan, deliver it.
pub async fn run(
    forge: &dyn ForgeClient,
    findings: Vec<Finding>,
    pacing: &DeliveryPacing,
) -> Result<DeliveryOutcome, DeliveryError> {
    // The two read-only fetches are independent; everything after them is
    // strictly sequential.
    let (diff, head) = tokio::join!(forge.fetch_diff(), forge.fetch_head_commit());
    let diff = diff.map_err(DeliveryError::DiffFetch)?;
    let commit_id = head.map_err(DeliveryError::HeadCommit)?;

    let index = PositionIndex::from_unified_diff(&diff);
    debug!(
        files = index.file_count(),
        anchors = index.position_count(),
        "position index built"
    );

    let plan = CommentPlan::build(findings, &index);
    info!(
        line_comments = plan.line_comments.len(),
        file_comment_files = plan.file_comments.len(),
        skipped = plan.skipped.len(),
        commit = %commit_id,
        "comment plan ready"
    );

    Ok(deliver(forge, &commit_id, &plan, index.file_count(), pacing).await)
}

/// Deliver an already-built plan. Infallible: every submission failure is
/// absorbed into the outcome counts.
pub async fn deliver(
    forge: &dyn ForgeClient,
    commit_id: &str,
    plan: &CommentPlan,
    files_reviewed: usize,
    pacing: &DeliveryPacing,
) -> DeliveryOutcome {
    let mut outcome = DeliveryOutcome {
        skipped_findings: plan.skipped.len(),
        ..Default::default()
    };

    // Stage 1: inline comments, batched into reviews.
    for (batch_no, batch) in plan.line_comments.chunks(REVIEW_BATCH_SIZE).enumerate() {
        if batch_no > 0 {
            tokio::time::sleep(pacing.batch_pause).await;
        }
        match forge.submit_review(commit_id, batch).await {
            Ok(()) => {
                outcome.line_comments_posted += batch.len();
                debug!(batch = batch_no, comments = batch.len(), "review batch accepted");
            }
            Err(err) if err.is_validation() => {
                warn!(
                    batch = batch_no,
                    comments = batch.len(),
                    error = %err,
                    "batch rejected as unprocessable, retrying comments one by one"
                );
                let (posted, failed) = submit_singly(forge, commit_id, batch, pacing).await;
                outcome.line_comments_posted += posted;
                outcome.line_comments_failed += failed;
            }
            Err(err) => {
                warn!(
                    batch = batch_no,
                    comments = batch.len(),
                    error = %err,
                    "review batch failed"
                );
                outcome.line_comments_failed += batch.len();
            }
        }
    }

    // Stages 2 and 3 both post top-level comments; they share one pacing
    // sequence so the boundary between them is spaced like any other pair.
    let mut top_level_sent = 0usize;

    // Stage 2: aggregated per-file comments for line-less findings.
    for (file, findings) in &plan.file_comments {
        pace_top_level(&mut top_level_sent, pacing).await;
        let body = render::file_summary(file, findings);
        match forge.submit_comment(&body).await {
            Ok(()) => {
                outcome.file_comments_posted += 1;
                debug!(file = %file, findings = findings.len(), "file comment posted");
            }
            Err(err) => {
                outcome.file_comments_failed += 1;
                warn!(file = %file, error = %err, "file comment failed");
            }
        }
    }

    // Stage 3: escalate findings the diff could not anchor, one comment per
    // file, so nothing the reviewer produced disappears silently.
    for (file, entries) in group_skipped(&plan.skipped) {
        pace_top_level(&mut top_level_sent, pacing).await;
        let body = render::skipped_summary(file, &entries);
        match forge.submit_comment(&body).await {
            Ok(()) => {
                outcome.file_comments_posted += 1;
                debug!(file = %file, findings = entries.len(), "escalated unanchored findings");
            }
            Err(err) => {
                outcome.file_comments_failed += 1;
                warn!(file = %file, error = %err, "escalation comment failed");
            }
        }
    }

    // Stage 4: closing summary, attempted even when everything else failed.
    let summary = render::final_summary(files_reviewed, plan.total(), &outcome);
    match forge.submit_comment(&summary).await {
        Ok(()) => outcome.summary_posted = true,
        Err(err) => warn!(error = %err, "failed to post closing summary"),
    }

    info!(
        line_posted = outcome.line_comments_posted,
        line_failed = outcome.line_comments_failed,
        file_posted = outcome.file_comments_posted,
        file_failed = outcome.file_comments_failed,
        skipped = outcome.skipped_findings,
        summary = outcome.summary_posted,
        "delivery finished"
    );
    outcome
}

/// Re-submit a rejected batch one comment at a time. Returns (posted, failed).
async fn submit_singly(
    forge: &dyn ForgeClient,
    commit_id: &str,
    batch: &[ReviewComment],
    pacing: &DeliveryPacing,
) -> (usize, usize) {
    let mut posted = 0;
    let mut failed = 0;
    for (i, comment) in batch.iter().enumerate() {
        if i > 0 {
            tokio::time::sleep(pacing.single_pause).await;
        }
        match forge
            .submit_review(commit_id, std::slice::from_ref(comment))
            .await
        {
            Ok(()) => posted += 1,
            Err(err) => {
                failed += 1;
                warn!(
                    path = %comment.path,
                    position = %comment.position,
                    error = %err,
                    "individual comment rejected"
                );
            }
        }
    }
    (posted, failed)
}

async fn pace_top_level(sent: &mut usize, pacing: &DeliveryPacing) {
    if *sent > 0 {
        tokio::time::sleep(pacing.comment_pause).await;
    }
    *sent += 1;
}

fn group_skipped(skipped: &[SkippedFinding]) -> BTreeMap<&str, Vec<&SkippedFinding>> {
    let mut by_file: BTreeMap<&str, Vec<&SkippedFinding>> = BTreeMap::new();
    for entry in skipped {
        by_file.entry(entry.finding.file.as_str()).or_default().push(entry);
    }
    by_file
}
