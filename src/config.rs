//! Run configuration.
//!
//! Priority (highest to lowest):
//!   1. CLI flags — passed as `Some(value)` from clap
//!   2. Environment (`GITHUB_TOKEN`, `GITHUB_REPOSITORY`, `GITHUB_API_URL`)
//!   3. TOML config file (`revpost.toml` or `--config <path>`)
//!   4. Built-in defaults
//!
//! The token is deliberately env-only: it never appears on argv or in a
//! config file that might get committed.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::error;

use crate::finding::Severity;

const DEFAULT_API_BASE_URL: &str = "https://api.github.com";
const DEFAULT_CONFIG_FILE: &str = "revpost.toml";

// ─── TOML config file ─────────────────────────────────────────────────────────

/// `revpost.toml` — all fields are optional overrides.
#[derive(Debug, Deserialize, Default)]
struct ConfigFile {
    /// Repository slug, `owner/name`.
    repository: Option<String>,
    /// Pull request number.
    pull_number: Option<u64>,
    /// Forge API base URL (default: https://api.github.com).
    api_base_url: Option<String>,
    /// Path to the reviewer's findings JSON.
    findings_path: Option<PathBuf>,
    /// Minimum severity to deliver: "error" | "warning" | "info".
    severity_threshold: Option<String>,
    /// Path prefixes excluded from delivery, e.g. ["vendor/", "target/"].
    ignore_paths: Option<Vec<String>>,
}

fn load_toml(explicit: Option<&Path>) -> Result<ConfigFile> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => {
            let path = PathBuf::from(DEFAULT_CONFIG_FILE);
            if !path.exists() {
                return Ok(ConfigFile::default());
            }
            path
        }
    };

    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("read config file {}", path.display()))?;
    match toml::from_str::<ConfigFile>(&contents) {
        Ok(cfg) => Ok(cfg),
        // An explicitly requested file must parse; the probed default may
        // be junk from some other tool.
        Err(err) if explicit.is_some() => {
            Err(err).with_context(|| format!("parse config file {}", path.display()))
        }
        Err(err) => {
            error!(path = %path.display(), err = %err, "failed to parse config file, using defaults");
            Ok(ConfigFile::default())
        }
    }
}

// ─── ReviewerConfig ───────────────────────────────────────────────────────────

/// Resolved configuration for one delivery run.
#[derive(Debug, Clone)]
pub struct ReviewerConfig {
    pub owner: String,
    pub repo: String,
    pub pull_number: u64,
    /// Forge API token (`GITHUB_TOKEN`). Absent is fine for dry runs against
    /// public repositories.
    pub token: Option<String>,
    pub api_base_url: String,
    /// The reviewer's findings JSON.
    pub findings_path: PathBuf,
    /// Findings below this severity are dropped before planning.
    pub severity_threshold: Severity,
    /// Path prefixes excluded from delivery.
    pub ignore_paths: Vec<String>,
}

impl ReviewerConfig {
    /// Build config from CLI args plus env and the optional TOML file.
    pub fn new(
        repository: Option<String>,
        pull_number: Option<u64>,
        findings: Option<PathBuf>,
        severity_threshold: Option<String>,
        ignore_paths: Vec<String>,
        config_file: Option<&Path>,
    ) -> Result<Self> {
        let toml = load_toml(config_file)?;

        let repository = repository
            .or_else(|| std::env::var("GITHUB_REPOSITORY").ok().filter(|s| !s.is_empty()))
            .or(toml.repository)
            .context("no repository configured (set --repo or GITHUB_REPOSITORY)")?;
        let (owner, repo) = repository
            .split_once('/')
            .filter(|(owner, repo)| !owner.is_empty() && !repo.is_empty())
            .with_context(|| format!("repository must be owner/name, got {repository:?}"))?;

        let pull_number = pull_number
            .or(toml.pull_number)
            .context("no pull request number configured (set --pr)")?;
        if pull_number == 0 {
            bail!("pull request number must be positive");
        }

        let findings_path = findings
            .or(toml.findings_path)
            .context("no findings file configured (set --findings)")?;

        let token = std::env::var("GITHUB_TOKEN").ok().filter(|s| !s.is_empty());

        let api_base_url = std::env::var("GITHUB_API_URL")
            .ok()
            .filter(|s| !s.is_empty())
            .or(toml.api_base_url)
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());

        let severity_threshold = severity_threshold
            .or(toml.severity_threshold)
            .map(|s| Severity::from_str(&s))
            .unwrap_or(Severity::Info);

        let ignore_paths = if ignore_paths.is_empty() {
            toml.ignore_paths.unwrap_or_default()
        } else {
            ignore_paths
        };

        Ok(Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
            pull_number,
            token,
            api_base_url,
            findings_path,
            severity_threshold,
            ignore_paths,
        })
    }

    /// `owner/name` for logs.
    pub fn slug(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }

    pub fn is_ignored(&self, file: &str) -> bool {
        self.ignore_paths.iter().any(|prefix| file.starts_with(prefix))
    }
}
