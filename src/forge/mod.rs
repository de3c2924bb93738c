// SPDX-License-Identifier: MIT
//! Forge API abstraction.
//!
//! The pipeline talks to the forge through [`ForgeClient`], so delivery logic
//! can be exercised against an in-memory fake and a different forge can be
//! slotted in without touching the pipeline. [`github::GitHubClient`] is the
//! production implementation.

use async_trait::async_trait;
use serde::Serialize;

use crate::diff::DiffPosition;

pub mod github;

pub use github::GitHubClient;

/// One positioned inline comment inside a review submission.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewComment {
    /// Repository-relative path, exactly as it appears in the diff.
    pub path: String,
    /// Diff position the comment anchors to.
    pub position: DiffPosition,
    /// Markdown body.
    pub body: String,
}

/// Errors surfaced by forge operations.
#[derive(Debug, thiserror::Error)]
pub enum ForgeError {
    /// The forge answered with a non-success status.
    #[error("forge API returned {status}: {body}")]
    Api { status: u16, body: String },
    /// The request never produced an HTTP response.
    #[error("forge transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl ForgeError {
    /// True when the forge rejected the payload as unprocessable (HTTP 422),
    /// typically because one comment's position is stale. Worth retrying
    /// item by item; other statuses are not.
    pub fn is_validation(&self) -> bool {
        matches!(self, ForgeError::Api { status: 422, .. })
    }
}

/// Operations the delivery pipeline needs from a forge.
#[async_trait]
pub trait ForgeClient: Send + Sync {
    /// Raw unified diff for the pull request, all files in one blob.
    async fn fetch_diff(&self) -> Result<String, ForgeError>;

    /// SHA of the pull request's head commit. Captured once per run so every
    /// review anchors to the same snapshot.
    async fn fetch_head_commit(&self) -> Result<String, ForgeError>;

    /// Submit one review carrying `comments`, anchored to `commit_id`.
    async fn submit_review(
        &self,
        commit_id: &str,
        comments: &[ReviewComment],
    ) -> Result<(), ForgeError>;

    /// Post a top-level comment on the pull request conversation.
    async fn submit_comment(&self, body: &str) -> Result<(), ForgeError>;
}
