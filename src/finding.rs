// SPDX-License-Identifier: MIT
//! Data model for review findings.
//!
//! Findings are produced by an external reviewer process and handed to us as
//! JSON. They are immutable once loaded: the planner routes them, the
//! renderer formats them, nothing rewrites them.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

// ─── Severity ─────────────────────────────────────────────────────────────────

/// Finding severity, ordered so that `Info < Warning < Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational — worth knowing.
    Info,
    /// Potential problem — should be fixed.
    Warning,
    /// Definite problem — must be fixed.
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }

    /// Lenient parse for CLI flags and config values.
    /// Unrecognized input maps to the lowest tier rather than failing.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "error" | "err" | "fatal" => Severity::Error,
            "warning" | "warn" => Severity::Warning,
            _ => Severity::Info,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Finding ──────────────────────────────────────────────────────────────────

/// A single review finding, as emitted by the external reviewer.
///
/// `line` is a 1-based line number in the *new* version of the file. A
/// finding without a line number is a file-level remark and is delivered as
/// part of an aggregated per-file comment instead of an inline comment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    /// Repository-relative file path.
    pub file: String,
    /// 1-based line number in the new file, if the finding is line-anchored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    /// Finding severity.
    pub severity: Severity,
    /// Human-readable diagnostic message.
    pub message: String,
    /// Optional replacement text, rendered as a forge suggestion block.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    /// Optional excerpt of the offending code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_snippet: Option<String>,
}

// ─── Findings file reader ─────────────────────────────────────────────────────

/// Envelope form some reviewer processes wrap their output in.
#[derive(Debug, Deserialize)]
struct FindingsFile {
    findings: Vec<Finding>,
}

/// Load findings from the reviewer's JSON output file.
///
/// Accepts either a bare array of findings or a `{"findings": [...]}` object.
/// A `line` of 0 is not a valid 1-based line number; such findings are
/// demoted to file-level remarks rather than rejected.
pub fn load_findings(path: &Path) -> Result<Vec<Finding>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read findings file {}", path.display()))?;

    let mut findings = match serde_json::from_str::<Vec<Finding>>(&text) {
        Ok(list) => list,
        Err(_) => {
            serde_json::from_str::<FindingsFile>(&text)
                .with_context(|| format!("parse findings file {}", path.display()))?
                .findings
        }
    };

    for finding in &mut findings {
        if finding.line == Some(0) {
            warn!(file = %finding.file, "finding has line 0 — treating as file-level");
            finding.line = None;
        }
    }

    Ok(findings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Error > Severity::Warning);
        assert!(Severity::Warning > Severity::Info);
    }

    #[test]
    fn test_severity_from_str_lenient() {
        assert_eq!(Severity::from_str("ERROR"), Severity::Error);
        assert_eq!(Severity::from_str("warn"), Severity::Warning);
        assert_eq!(Severity::from_str("note"), Severity::Info);
        assert_eq!(Severity::from_str(""), Severity::Info);
    }

    #[test]
    fn test_finding_deserializes_camel_case() {
        let raw = r#"{
            "file": "src/lib.rs",
            "line": 12,
            "severity": "warning",
            "message": "possible panic",
            "codeSnippet": "let x = v[0];"
        }"#;
        let f: Finding = serde_json::from_str(raw).unwrap();
        assert_eq!(f.file, "src/lib.rs");
        assert_eq!(f.line, Some(12));
        assert_eq!(f.severity, Severity::Warning);
        assert_eq!(f.code_snippet.as_deref(), Some("let x = v[0];"));
        assert!(f.suggestion.is_none());
    }

    #[test]
    fn test_load_findings_bare_array() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        write!(
            tmp,
            r#"[{{"file": "a.rs", "severity": "error", "message": "m"}}]"#
        )
        .unwrap();

        let findings = load_findings(tmp.path()).unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].line, None);
    }

    #[test]
    fn test_load_findings_envelope() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        write!(
            tmp,
            r#"{{"findings": [{{"file": "a.rs", "line": 3, "severity": "info", "message": "m"}}]}}"#
        )
        .unwrap();

        let findings = load_findings(tmp.path()).unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].line, Some(3));
    }

    #[test]
    fn test_load_findings_demotes_line_zero() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        write!(
            tmp,
            r#"[{{"file": "a.rs", "line": 0, "severity": "error", "message": "m"}}]"#
        )
        .unwrap();

        let findings = load_findings(tmp.path()).unwrap();
        assert_eq!(findings[0].line, None, "line 0 is not addressable");
    }

    #[test]
    fn test_load_findings_malformed_is_error() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        write!(tmp, "not json").unwrap();
        assert!(load_findings(tmp.path()).is_err());
    }
}
