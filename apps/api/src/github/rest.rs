//! Single-purpose REST calls. Used directly for the file tree and as the
//! fallback for anything the GraphQL path could not supply.

use std::collections::BTreeMap;

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use serde::Deserialize;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::github::http::{GitHubError, HttpFetcher};
use crate::github::models::{CommitInfo, PullRequestInfo};
use crate::github::RepoLocator;

#[derive(Debug, Deserialize)]
struct TreeResponse {
    #[serde(default)]
    tree: Vec<TreeEntry>,
}

#[derive(Debug, Deserialize)]
struct TreeEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct CommitItem {
    sha: String,
    commit: CommitBody,
    #[serde(default)]
    parents: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct CommitBody {
    message: String,
    author: Option<CommitAuthor>,
}

#[derive(Debug, Deserialize)]
struct CommitAuthor {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PullItem {
    number: u64,
    title: String,
    body: Option<String>,
    user: Option<PullUser>,
    merged_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct PullUser {
    login: String,
}

#[derive(Debug, Default, Deserialize)]
struct PullDetail {
    #[serde(default)]
    commits: u64,
    #[serde(default)]
    additions: u64,
    #[serde(default)]
    deletions: u64,
}

/// Description and topics from `GET /repos/{owner}/{repo}`.
#[derive(Debug, Default, Deserialize)]
pub struct RepoInfo {
    pub description: Option<String>,
    #[serde(default)]
    pub topics: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EncodedContent {
    content: Option<String>,
    encoding: Option<String>,
}

/// REST calls bound to one repository and one caller token.
pub struct RestCalls<'a> {
    pub http: &'a HttpFetcher,
    pub api_base: &'a str,
    pub repo: &'a RepoLocator,
    pub token: Option<&'a str>,
}

impl RestCalls<'_> {
    fn url(&self, suffix: &str) -> String {
        format!(
            "{}/repos/{}/{}{}",
            self.api_base, self.repo.owner, self.repo.name, suffix
        )
    }

    /// Every blob path at HEAD.
    pub async fn tree(&self) -> Result<Vec<String>, GitHubError> {
        let response: TreeResponse = self
            .http
            .get_json(
                &self.url("/git/trees/HEAD"),
                self.token,
                &[("recursive", "1".to_string())],
            )
            .await?;

        let files: Vec<String> = response
            .tree
            .into_iter()
            .filter(|entry| entry.kind == "blob")
            .map(|entry| entry.path)
            .collect();

        info!("Fetched file tree for {}: {} files", self.repo, files.len());
        Ok(files)
    }

    /// Recent commits on the default branch, merge commits excluded.
    pub async fn commits(&self, limit: usize) -> Result<Vec<CommitInfo>, GitHubError> {
        let items: Vec<CommitItem> = self
            .http
            .get_json(
                &self.url("/commits"),
                self.token,
                &[("per_page", limit.min(100).to_string())],
            )
            .await?;

        let commits: Vec<CommitInfo> = items
            .into_iter()
            .filter(|item| item.parents.len() < 2)
            .map(|item| CommitInfo {
                sha: item.sha,
                message: item.commit.message,
                author: item
                    .commit
                    .author
                    .and_then(|a| a.name)
                    .unwrap_or_else(|| "Unknown".to_string()),
            })
            .collect();

        info!("Fetched {} commits for {} via REST", commits.len(), self.repo);
        Ok(commits)
    }

    /// Recently closed pull requests that were merged, each enriched with
    /// its commit and line counters. Detail lookups share `permits`.
    pub async fn merged_pulls(
        &self,
        limit: usize,
        permits: &Semaphore,
    ) -> Result<Vec<PullRequestInfo>, GitHubError> {
        let items: Vec<PullItem> = self
            .http
            .get_json(
                &self.url("/pulls"),
                self.token,
                &[
                    ("state", "closed".to_string()),
                    ("per_page", limit.min(100).to_string()),
                ],
            )
            .await?;

        let merged: Vec<PullItem> = items
            .into_iter()
            .filter(|pr| pr.merged_at.is_some())
            .collect();

        let details = try_join_all(merged.iter().map(|pr| async move {
            let _permit = permits
                .acquire()
                .await
                .map_err(|_| GitHubError::LimiterClosed)?;
            self.http
                .get_json::<PullDetail>(&self.url(&format!("/pulls/{}", pr.number)), self.token, &[])
                .await
        }))
        .await?;

        let pulls: Vec<PullRequestInfo> = merged
            .into_iter()
            .zip(details)
            .map(|(pr, detail)| PullRequestInfo {
                number: pr.number,
                title: pr.title,
                body: pr.body,
                author: pr.user.map(|u| u.login).unwrap_or_default(),
                merged_at: pr.merged_at,
                commits_count: detail.commits,
                additions: detail.additions,
                deletions: detail.deletions,
            })
            .collect();

        info!("Fetched {} merged PRs for {} via REST", pulls.len(), self.repo);
        Ok(pulls)
    }

    pub async fn languages(&self) -> Result<BTreeMap<String, u64>, GitHubError> {
        self.http
            .get_json(&self.url("/languages"), self.token, &[])
            .await
    }

    pub async fn info(&self) -> Result<RepoInfo, GitHubError> {
        self.http.get_json(&self.url(""), self.token, &[]).await
    }

    /// README text truncated to `max_chars`; `None` when the repository has none.
    pub async fn readme(&self, max_chars: usize) -> Result<Option<String>, GitHubError> {
        let Some(encoded) = self
            .http
            .get_optional_json::<EncodedContent>(&self.url("/readme"), self.token)
            .await?
        else {
            info!("No README for {}", self.repo);
            return Ok(None);
        };

        Ok(decode_content(&encoded).map(|text| truncate_chars(&text, max_chars)))
    }

    /// Content of one file. Missing, binary and non-file paths come back as
    /// `None`; only transport failures are errors.
    pub async fn file_content(&self, path: &str) -> Result<Option<String>, GitHubError> {
        let url = self.url(&format!("/contents/{path}"));
        let value = match self.http.get_json::<serde_json::Value>(&url, self.token, &[]).await {
            Ok(value) => value,
            Err(GitHubError::Http { status: 404, .. }) => {
                info!("File not found in {}: {path}", self.repo);
                return Ok(None);
            }
            Err(GitHubError::Http { status, .. }) => {
                warn!("Fetching {path} from {} returned HTTP {status}", self.repo);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        // Directories come back as an array.
        let Ok(encoded) = serde_json::from_value::<EncodedContent>(value) else {
            return Ok(None);
        };

        let content = decode_content(&encoded);
        if content.is_none() {
            info!("Skipping non-text file {path} in {}", self.repo);
        }
        Ok(content)
    }
}

/// Decodes a base64 `contents` payload. Returns `None` for other encodings
/// and for bytes that are not UTF-8.
fn decode_content(encoded: &EncodedContent) -> Option<String> {
    if encoded.encoding.as_deref() != Some("base64") {
        return None;
    }
    let raw: String = encoded
        .content
        .as_deref()?
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    let bytes = STANDARD.decode(raw).ok()?;
    String::from_utf8(bytes).ok()
}

pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(text: &[u8]) -> EncodedContent {
        EncodedContent {
            content: Some(STANDARD.encode(text)),
            encoding: Some("base64".to_string()),
        }
    }

    #[test]
    fn test_decode_content_handles_wrapped_base64() {
        let mut payload = encoded(b"fn main() {}\n");
        // GitHub wraps base64 at 60 columns
        let wrapped = payload.content.take().unwrap();
        let (head, tail) = wrapped.split_at(4);
        payload.content = Some(format!("{head}\n{tail}\n"));

        assert_eq!(decode_content(&payload).as_deref(), Some("fn main() {}\n"));
    }

    #[test]
    fn test_decode_content_rejects_binary() {
        assert!(decode_content(&encoded(&[0xff, 0xfe, 0x00, 0x9f])).is_none());
    }

    #[test]
    fn test_decode_content_requires_base64_encoding() {
        let payload = EncodedContent {
            content: Some("plain".to_string()),
            encoding: Some("none".to_string()),
        };
        assert!(decode_content(&payload).is_none());
    }

    #[test]
    fn test_truncate_chars_counts_characters_not_bytes() {
        assert_eq!(truncate_chars("한국어 README", 3), "한국어");
        assert_eq!(truncate_chars("short", 100), "short");
    }
}
