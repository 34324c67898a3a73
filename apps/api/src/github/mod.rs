//! GitHub repository data: file tree, activity, metadata and file contents.
//!
//! With a token, each operation first tries one batched GraphQL query. A
//! failed query falls back to REST for everything; a query that came back
//! with some fields null falls back to REST for those fields only.

pub mod http;
pub mod models;

mod graphql;
mod paths;
mod rest;

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use futures::future::try_join_all;
use regex::Regex;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::config::GitHubSettings;

pub use http::GitHubError;
pub use models::{CommitInfo, PullRequestInfo, RepoContext, RepoSnapshot, UserStats};
pub use paths::sanitize_file_path;

use http::HttpFetcher;
use rest::RestCalls;

pub const COMMITS_LIMIT: usize = 30;
pub const PULLS_LIMIT: usize = 30;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoLocator {
    pub owner: String,
    pub name: String,
}

impl fmt::Display for RepoLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

fn repo_url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"github\.com/([A-Za-z0-9_.-]+)/([A-Za-z0-9_.-]+)").expect("valid URL pattern")
    })
}

/// Extracts owner and repository name from a GitHub URL.
/// A trailing `.git` is dropped.
pub fn parse_repo_url(repo_url: &str) -> Result<RepoLocator, GitHubError> {
    let captures = repo_url_pattern()
        .captures(repo_url)
        .ok_or_else(|| GitHubError::InvalidUrl(repo_url.to_string()))?;

    let owner = captures[1].to_string();
    let name = captures[2].trim_end_matches(".git").to_string();
    if name.is_empty() {
        return Err(GitHubError::InvalidUrl(repo_url.to_string()));
    }

    Ok(RepoLocator { owner, name })
}

/// Read access to repository data. The workflow depends on this trait so it
/// can be driven without a network.
#[async_trait]
pub trait RepositorySource: Send + Sync {
    /// File tree plus recent commits and merged pull requests.
    async fn fetch_project_info(
        &self,
        repo_url: &str,
        token: Option<&str>,
    ) -> Result<RepoSnapshot, GitHubError>;

    /// Languages, description, topics and README. Never fails: on error the
    /// context is empty apart from the repository name.
    async fn fetch_repo_context(&self, repo_url: &str, token: Option<&str>) -> RepoContext;

    /// Contribution totals for an account. `None` without a token or on error.
    async fn fetch_user_stats(&self, login: &str, token: Option<&str>) -> Option<UserStats>;

    /// Contents keyed by requested path. Unsafe, missing and binary paths map to `None`.
    async fn fetch_files_content(
        &self,
        repo_url: &str,
        paths: &[String],
        token: Option<&str>,
    ) -> Result<HashMap<String, Option<String>>, GitHubError>;
}

/// GitHub client. The HTTP connection pool is shared by every clone; the
/// fallback request limiter is per job (see [`GitHubClient::for_job`]).
#[derive(Clone)]
pub struct GitHubClient {
    http: HttpFetcher,
    api_base: String,
    graphql_url: String,
    readme_max_length: usize,
    max_concurrent: usize,
    permits: Arc<Semaphore>,
}

impl GitHubClient {
    pub fn new(settings: &GitHubSettings) -> Self {
        let max_concurrent = settings.max_concurrent_requests.max(1);
        Self {
            http: HttpFetcher::new(settings.timeout),
            api_base: settings.api_base.trim_end_matches('/').to_string(),
            graphql_url: settings.graphql_url.clone(),
            readme_max_length: settings.readme_max_length,
            max_concurrent,
            permits: Arc::new(Semaphore::new(max_concurrent)),
        }
    }

    /// A client sharing this one's connection pool with a fresh request
    /// limiter, to be used by every repository of a single job.
    pub fn for_job(&self) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(self.max_concurrent)),
            ..self.clone()
        }
    }

    fn rest<'a>(&'a self, repo: &'a RepoLocator, token: Option<&'a str>) -> RestCalls<'a> {
        RestCalls {
            http: &self.http,
            api_base: &self.api_base,
            repo,
            token,
        }
    }

    async fn try_fetch_repo_context(
        &self,
        repo: &RepoLocator,
        token: Option<&str>,
    ) -> Result<RepoContext, GitHubError> {
        let mut fields = graphql::ContextFields::default();
        if let Some(token) = token {
            match graphql::context(&self.http, &self.graphql_url, token, repo, self.readme_max_length)
                .await
            {
                Ok(found) => fields = found,
                Err(e) => warn!("GraphQL context query failed for {repo}, using REST: {e}"),
            }
        }

        let graphql::ContextFields {
            languages,
            description_and_topics,
            readme,
        } = fields;

        let rest = self.rest(repo, token);
        let (languages, (description, topics), readme) = tokio::try_join!(
            async {
                match languages {
                    Some(languages) => Ok(languages),
                    None => rest.languages().await,
                }
            },
            async {
                match description_and_topics {
                    Some(found) => Ok(found),
                    None => rest.info().await.map(|info| (info.description, info.topics)),
                }
            },
            async {
                match readme {
                    Some(readme) => Ok(Some(readme)),
                    None => rest.readme(self.readme_max_length).await,
                }
            },
        )?;

        Ok(RepoContext {
            name: repo.name.clone(),
            languages,
            description,
            topics,
            readme_summary: readme,
        })
    }
}

#[async_trait]
impl RepositorySource for GitHubClient {
    async fn fetch_project_info(
        &self,
        repo_url: &str,
        token: Option<&str>,
    ) -> Result<RepoSnapshot, GitHubError> {
        let repo = parse_repo_url(repo_url)?;
        let rest = self.rest(&repo, token);

        let file_tree = rest.tree().await?;

        let mut activity = graphql::Activity::default();
        if let Some(token) = token {
            match graphql::activity(
                &self.http,
                &self.graphql_url,
                token,
                &repo,
                COMMITS_LIMIT,
                PULLS_LIMIT,
            )
            .await
            {
                Ok(found) => activity = found,
                Err(e) => warn!("GraphQL activity query failed for {repo}, using REST: {e}"),
            }
        }

        let graphql::Activity { commits, pulls } = activity;
        let (commits, pulls) = tokio::try_join!(
            async {
                match commits {
                    Some(commits) => Ok(commits),
                    None => rest.commits(COMMITS_LIMIT).await,
                }
            },
            async {
                match pulls {
                    Some(pulls) => Ok(pulls),
                    None => rest.merged_pulls(PULLS_LIMIT, &self.permits).await,
                }
            },
        )?;

        Ok(RepoSnapshot {
            file_tree,
            commits,
            pulls,
        })
    }

    async fn fetch_repo_context(&self, repo_url: &str, token: Option<&str>) -> RepoContext {
        let repo = match parse_repo_url(repo_url) {
            Ok(repo) => repo,
            Err(e) => {
                warn!("{e}");
                return RepoContext::empty(repo_url);
            }
        };

        match self.try_fetch_repo_context(&repo, token).await {
            Ok(context) => {
                info!("Collected context for {repo}");
                context
            }
            Err(e) => {
                warn!("Context collection failed for {repo}: {e}");
                RepoContext::empty(repo.name)
            }
        }
    }

    async fn fetch_user_stats(&self, login: &str, token: Option<&str>) -> Option<UserStats> {
        let Some(token) = token else {
            info!("No token supplied, skipping user stats for {login}");
            return None;
        };

        match graphql::user_stats(&self.http, &self.graphql_url, token, login).await {
            Ok(stats) => {
                info!(
                    "User stats for {login}: commits={} prs={} issues={}",
                    stats.total_commits, stats.total_prs, stats.total_issues
                );
                Some(stats)
            }
            Err(e) => {
                warn!("User stats lookup failed for {login}: {e}");
                None
            }
        }
    }

    async fn fetch_files_content(
        &self,
        repo_url: &str,
        paths: &[String],
        token: Option<&str>,
    ) -> Result<HashMap<String, Option<String>>, GitHubError> {
        let repo = parse_repo_url(repo_url)?;
        let mut contents = HashMap::with_capacity(paths.len());

        let mut pending = Vec::with_capacity(paths.len());
        for path in paths {
            match sanitize_file_path(path) {
                Ok(safe) => pending.push(safe.to_string()),
                Err(e) => {
                    warn!("{e}");
                    contents.insert(path.clone(), None);
                }
            }
        }
        if pending.is_empty() {
            return Ok(contents);
        }

        if let Some(token) = token {
            match graphql::files(&self.http, &self.graphql_url, token, &repo, &pending).await {
                Ok(mut found) => {
                    let mut missing = Vec::new();
                    for path in pending {
                        match found.remove(&path).flatten() {
                            Some(text) => {
                                contents.insert(path, Some(text));
                            }
                            None => missing.push(path),
                        }
                    }
                    if !missing.is_empty() {
                        info!(
                            "GraphQL left {} path(s) unresolved in {repo}, retrying over REST",
                            missing.len()
                        );
                    }
                    pending = missing;
                }
                Err(e) => warn!("GraphQL file query failed for {repo}, using REST: {e}"),
            }
        }

        let rest = self.rest(&repo, token);
        let fetched = try_join_all(pending.iter().map(|path| {
            let rest = &rest;
            async move {
                let _permit = self
                    .permits
                    .acquire()
                    .await
                    .map_err(|_| GitHubError::LimiterClosed)?;
                let content = rest.file_content(path).await?;
                Ok::<_, GitHubError>((path.clone(), content))
            }
        }))
        .await?;
        contents.extend(fetched);

        Ok(contents)
    }
}
