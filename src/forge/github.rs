//! GitHub REST implementation of [`ForgeClient`].
//!
//! Talks to `api.github.com` by default; the base URL is configurable so the
//! same client works against GitHub Enterprise installs.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{ForgeClient, ForgeError, ReviewComment};

/// Review submissions carry `event: COMMENT` — feedback without approving or
/// requesting changes on the author's behalf.
const REVIEW_EVENT: &str = "COMMENT";

const DIFF_MEDIA_TYPE: &str = "application/vnd.github.v3.diff";
const JSON_MEDIA_TYPE: &str = "application/vnd.github+json";

pub struct GitHubClient {
    http: reqwest::Client,
    api_base_url: String,
    token: Option<String>,
    owner: String,
    repo: String,
    pull_number: u64,
}

impl GitHubClient {
    /// `api_base_url` without a trailing slash, e.g. `https://api.github.com`.
    /// `token` is optional; unauthenticated clients can still read public
    /// pull requests, which is all a dry run needs.
    pub fn new(
        api_base_url: impl Into<String>,
        token: Option<String>,
        owner: impl Into<String>,
        repo: impl Into<String>,
        pull_number: u64,
    ) -> Result<Self, ForgeError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            api_base_url: api_base_url.into().trim_end_matches('/').to_string(),
            token,
            owner: owner.into(),
            repo: repo.into(),
            pull_number,
        })
    }

    fn pull_url(&self) -> String {
        format!(
            "{}/repos/{}/{}/pulls/{}",
            self.api_base_url, self.owner, self.repo, self.pull_number
        )
    }

    fn comments_url(&self) -> String {
        // Top-level PR comments live on the issues side of the API.
        format!(
            "{}/repos/{}/{}/issues/{}/comments",
            self.api_base_url, self.owner, self.repo, self.pull_number
        )
    }

    fn get(&self, url: String, accept: &str) -> reqwest::RequestBuilder {
        self.authorize(self.http.get(url).header("Accept", accept))
    }

    fn post(&self, url: String) -> reqwest::RequestBuilder {
        self.authorize(self.http.post(url).header("Accept", JSON_MEDIA_TYPE))
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let req = req.header(
            "User-Agent",
            format!("revpost/{}", env!("CARGO_PKG_VERSION")),
        );
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    /// Map a non-success response to [`ForgeError::Api`], keeping the body
    /// so 422 validation details survive into the logs.
    async fn check(resp: reqwest::Response) -> Result<reqwest::Response, ForgeError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(ForgeError::Api {
            status: status.as_u16(),
            body,
        })
    }
}

#[derive(Debug, Deserialize)]
struct PullResponse {
    head: HeadRef,
}

#[derive(Debug, Deserialize)]
struct HeadRef {
    sha: String,
}

#[async_trait]
impl ForgeClient for GitHubClient {
    async fn fetch_diff(&self) -> Result<String, ForgeError> {
        let resp = self.get(self.pull_url(), DIFF_MEDIA_TYPE).send().await?;
        let diff = Self::check(resp).await?.text().await?;
        debug!(bytes = diff.len(), "fetched pull request diff");
        Ok(diff)
    }

    async fn fetch_head_commit(&self) -> Result<String, ForgeError> {
        let resp = self.get(self.pull_url(), JSON_MEDIA_TYPE).send().await?;
        let pull: PullResponse = Self::check(resp).await?.json().await?;
        debug!(sha = %pull.head.sha, "fetched pull request head");
        Ok(pull.head.sha)
    }

    async fn submit_review(
        &self,
        commit_id: &str,
        comments: &[ReviewComment],
    ) -> Result<(), ForgeError> {
        let url = format!("{}/reviews", self.pull_url());
        let payload = json!({
            "commit_id": commit_id,
            "event": REVIEW_EVENT,
            "comments": comments,
        });
        let resp = self.post(url).json(&payload).send().await?;
        Self::check(resp).await?;
        Ok(())
    }

    async fn submit_comment(&self, body: &str) -> Result<(), ForgeError> {
        let resp = self
            .post(self.comments_url())
            .json(&json!({ "body": body }))
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }
}
