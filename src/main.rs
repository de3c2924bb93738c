use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{debug, info, warn};

use revpost::config::ReviewerConfig;
use revpost::diff::PositionIndex;
use revpost::finding::{self, Finding};
use revpost::forge::{ForgeClient, GitHubClient};
use revpost::pipeline::{self, DeliveryPacing};
use revpost::plan::CommentPlan;

#[derive(Parser)]
#[command(
    name = "revpost",
    about = "Deliver automated code-review findings onto a pull request",
    version
)]
struct Args {
    /// Repository slug, e.g. octocat/hello-world (default: $GITHUB_REPOSITORY)
    #[arg(long, value_name = "OWNER/NAME")]
    repo: Option<String>,

    /// Pull request number
    #[arg(long, env = "REVPOST_PR")]
    pr: Option<u64>,

    /// Path to the findings JSON produced by the reviewer
    #[arg(long, env = "REVPOST_FINDINGS", value_name = "FILE")]
    findings: Option<PathBuf>,

    /// Minimum severity to deliver (error, warning, info)
    #[arg(long, env = "REVPOST_SEVERITY")]
    severity_threshold: Option<String>,

    /// Path prefix to exclude from delivery (repeatable)
    #[arg(long = "ignore", value_name = "PREFIX")]
    ignore: Vec<String>,

    /// Config file (default: ./revpost.toml when present)
    #[arg(long, env = "REVPOST_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "REVPOST_LOG")]
    log: Option<String>,

    /// Build the comment plan and log it without posting anything
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    setup_logging(args.log.as_deref().unwrap_or("info"));

    let config = ReviewerConfig::new(
        args.repo,
        args.pr,
        args.findings,
        args.severity_threshold,
        args.ignore,
        args.config.as_deref(),
    )?;

    if !args.dry_run && config.token.is_none() {
        bail!("a forge token is required to post comments: set GITHUB_TOKEN, or pass --dry-run");
    }

    let findings = load_deliverable_findings(&config)?;

    let client = GitHubClient::new(
        config.api_base_url.clone(),
        config.token.clone(),
        config.owner.clone(),
        config.repo.clone(),
        config.pull_number,
    )?;

    if args.dry_run {
        return dry_run(&client, findings).await;
    }

    let outcome = pipeline::run(&client, findings, &DeliveryPacing::default()).await?;

    let attempted = outcome.line_comments_posted
        + outcome.line_comments_failed
        + outcome.file_comments_posted
        + outcome.file_comments_failed;
    let posted = outcome.line_comments_posted + outcome.file_comments_posted;
    if attempted > 0 && posted == 0 && !outcome.summary_posted {
        bail!("delivery failed entirely: 0 of {attempted} submissions accepted");
    }
    if outcome.line_comments_failed > 0 || outcome.file_comments_failed > 0 {
        warn!(
            line_failed = outcome.line_comments_failed,
            file_failed = outcome.file_comments_failed,
            "some comments were not delivered"
        );
    }
    Ok(())
}

/// Load the findings file and apply the severity and path filters.
fn load_deliverable_findings(config: &ReviewerConfig) -> Result<Vec<Finding>> {
    let mut findings = finding::load_findings(&config.findings_path)?;
    let loaded = findings.len();

    findings.retain(|f| f.severity >= config.severity_threshold);
    let below_threshold = loaded - findings.len();

    let kept_severity = findings.len();
    findings.retain(|f| !config.is_ignored(&f.file));
    let ignored = kept_severity - findings.len();

    info!(
        repo = %config.slug(),
        pr = config.pull_number,
        loaded,
        below_threshold,
        ignored,
        deliverable = findings.len(),
        "findings loaded"
    );
    Ok(findings)
}

/// Fetch the diff, build the plan, log what would be posted, post nothing.
async fn dry_run(client: &GitHubClient, findings: Vec<Finding>) -> Result<()> {
    let diff = client
        .fetch_diff()
        .await
        .context("failed to fetch pull request diff")?;
    let index = PositionIndex::from_unified_diff(&diff);
    let plan = CommentPlan::build(findings, &index);

    info!(
        files = index.file_count(),
        anchors = index.position_count(),
        line_comments = plan.line_comments.len(),
        file_comment_files = plan.file_comments.len(),
        skipped = plan.skipped.len(),
        "dry run: nothing will be posted"
    );
    for comment in &plan.line_comments {
        debug!(path = %comment.path, position = %comment.position, "would post inline comment");
    }
    for (file, findings) in &plan.file_comments {
        debug!(file = %file, findings = findings.len(), "would post file comment");
    }
    for skipped in &plan.skipped {
        debug!(
            file = %skipped.finding.file,
            line = skipped.line,
            "no diff anchor, would escalate to file comment"
        );
    }
    Ok(())
}

fn setup_logging(log_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .compact()
        .init();
}
