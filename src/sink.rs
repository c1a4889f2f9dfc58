use std::time::Duration;

use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::error::SinkError;

/// One existing entry on the review thread.
#[derive(Debug, Clone, Deserialize)]
pub struct SinkComment {
    pub id: u64,
    pub body: String,
}

/// Minimal surface the report poster needs from a review thread: list the
/// existing entries, create a new one, or rewrite one in place.
pub trait CommentSink {
    fn list(&self) -> Result<Vec<SinkComment>, SinkError>;
    fn create(&self, body: &str) -> Result<(), SinkError>;
    fn update(&self, id: u64, body: &str) -> Result<(), SinkError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostAction {
    Created,
    Updated,
}

/// Update-or-create the report entry identified by `marker`. Idempotent:
/// posting the same body twice leaves exactly one marked entry in the sink.
pub fn post_or_update<S: CommentSink>(
    sink: &S,
    marker: &str,
    body: &str,
) -> Result<PostAction, SinkError> {
    let existing = sink.list()?;
    match existing.iter().find(|comment| comment.body.contains(marker)) {
        Some(previous) => {
            debug!(comment = previous.id, "updating existing report comment");
            sink.update(previous.id, body)?;
            Ok(PostAction::Updated)
        }
        None => {
            debug!("no previous report comment; creating one");
            sink.create(body)?;
            Ok(PostAction::Created)
        }
    }
}

/// Comment sink backed by the GitHub issues API on a pull request thread.
pub struct GithubCommentSink {
    client: Client,
    repo: String,
    pr_number: u64,
    token: String,
}

impl GithubCommentSink {
    pub fn new(
        repo: impl Into<String>,
        pr_number: u64,
        token: impl Into<String>,
    ) -> Result<Self, SinkError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent(concat!("renderbench/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            repo: repo.into(),
            pr_number,
            token: token.into(),
        })
    }

    fn check(response: reqwest::blocking::Response) -> Result<reqwest::blocking::Response, SinkError> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            let body = response.text().unwrap_or_default();
            Err(SinkError::Api {
                status: status.as_u16(),
                body,
            })
        }
    }
}

impl CommentSink for GithubCommentSink {
    fn list(&self) -> Result<Vec<SinkComment>, SinkError> {
        let url = format!(
            "https://api.github.com/repos/{}/issues/{}/comments",
            self.repo, self.pr_number
        );
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .send()?;
        let comments: Vec<SinkComment> = Self::check(response)?.json()?;
        debug!(count = comments.len(), "listed review thread comments");
        Ok(comments)
    }

    fn create(&self, body: &str) -> Result<(), SinkError> {
        let url = format!(
            "https://api.github.com/repos/{}/issues/{}/comments",
            self.repo, self.pr_number
        );
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .json(&json!({ "body": body }))
            .send()?;
        Self::check(response)?;
        info!(repo = %self.repo, pr = self.pr_number, "created report comment");
        Ok(())
    }

    fn update(&self, id: u64, body: &str) -> Result<(), SinkError> {
        let url = format!(
            "https://api.github.com/repos/{}/issues/comments/{}",
            self.repo, id
        );
        let response = self
            .client
            .patch(&url)
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .json(&json!({ "body": body }))
            .send()?;
        Self::check(response)?;
        info!(repo = %self.repo, pr = self.pr_number, comment = id, "updated report comment");
        Ok(())
    }
}
