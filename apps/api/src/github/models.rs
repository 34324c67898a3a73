use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitInfo {
    pub sha: String,
    pub message: String,
    pub author: String,
}

/// A merged pull request with its size counters filled in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullRequestInfo {
    pub number: u64,
    pub title: String,
    pub body: Option<String>,
    pub author: String,
    pub merged_at: Option<DateTime<Utc>>,
    pub commits_count: u64,
    pub additions: u64,
    pub deletions: u64,
}

/// Raw per-repository material: every blob path plus recent history.
#[derive(Debug, Clone, Default)]
pub struct RepoSnapshot {
    pub file_tree: Vec<String>,
    pub commits: Vec<CommitInfo>,
    pub pulls: Vec<PullRequestInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepoContext {
    pub name: String,
    /// Language name to byte count.
    pub languages: BTreeMap<String, u64>,
    pub description: Option<String>,
    pub topics: Vec<String>,
    pub readme_summary: Option<String>,
}

impl RepoContext {
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            languages: BTreeMap::new(),
            description: None,
            topics: Vec::new(),
            readme_summary: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStats {
    pub total_commits: u64,
    pub total_prs: u64,
    pub total_issues: u64,
}
