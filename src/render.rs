//! Markdown bodies for everything we post.
//!
//! Pure string assembly. The planner decides *where* each finding goes; this
//! module decides what the comment says. Keeping it side-effect free lets the
//! tests pin exact output without a forge in the loop.

use chrono::Utc;

use crate::finding::{Finding, Severity};
use crate::pipeline::DeliveryOutcome;
use crate::plan::SkippedFinding;

fn label(severity: Severity) -> &'static str {
    match severity {
        Severity::Error => "Error",
        Severity::Warning => "Warning",
        Severity::Info => "Info",
    }
}

fn group_label(severity: Severity) -> &'static str {
    match severity {
        Severity::Error => "Errors",
        Severity::Warning => "Warnings",
        Severity::Info => "Info",
    }
}

/// Body of one inline comment: severity, message, optional snippet, optional
/// suggestion block the forge can apply with one click.
pub fn line_comment(finding: &Finding) -> String {
    let mut body = format!("**{}**: {}", label(finding.severity), finding.message);
    if let Some(snippet) = &finding.code_snippet {
        body.push_str(&format!("\n\n```\n{}\n```", snippet.trim_end()));
    }
    if let Some(suggestion) = &finding.suggestion {
        body.push_str(&format!("\n\n```suggestion\n{}\n```", suggestion.trim_end()));
    }
    body
}

/// Aggregated comment for a file's line-less findings, grouped by severity,
/// errors first.
pub fn file_summary(file: &str, findings: &[Finding]) -> String {
    let mut body = format!("### Review notes for `{file}`\n");
    for severity in [Severity::Error, Severity::Warning, Severity::Info] {
        let group: Vec<&Finding> = findings.iter().filter(|f| f.severity == severity).collect();
        if group.is_empty() {
            continue;
        }
        body.push_str(&format!("\n**{} ({})**\n\n", group_label(severity), group.len()));
        for finding in group {
            body.push_str(&format!("- {}\n", finding.message));
        }
    }
    body
}

/// Aggregated comment for a file's findings that could not be matched to a
/// line in the current diff.
pub fn skipped_summary(file: &str, entries: &[&SkippedFinding]) -> String {
    let mut body = format!(
        "### Review notes for `{file}` (lines not in diff)\n\n\
         The following findings refer to lines that could not be located in \
         the current diff, so they are listed here instead:\n\n"
    );
    for entry in entries {
        body.push_str(&format!(
            "- line {} (**{}**): {}\n",
            entry.line,
            label(entry.finding.severity),
            entry.finding.message
        ));
    }
    body
}

/// Closing summary posted after every run, successful or not.
pub fn final_summary(files_reviewed: usize, total_findings: usize, outcome: &DeliveryOutcome) -> String {
    format!(
        "## Automated review complete\n\n\
         Reviewed **{files}** file(s) from the diff, **{total}** finding(s).\n\n\
         - Line comments delivered: {lp} ({lf} failed)\n\
         - File comments delivered: {fp} ({ff} failed)\n\
         - Findings without a diff anchor: {sk}\n\n\
         _revpost {version}, {timestamp}_\n",
        files = files_reviewed,
        total = total_findings,
        lp = outcome.line_comments_posted,
        lf = outcome.line_comments_failed,
        fp = outcome.file_comments_posted,
        ff = outcome.file_comments_failed,
        sk = outcome.skipped_findings,
        version = env!("CARGO_PKG_VERSION"),
        timestamp = Utc::now().format("%Y-%m-%d %H:%M UTC"),
    )
}
