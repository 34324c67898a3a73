//! Data collection: turns repository URLs into the material the generator
//! works from.
//!
//! Repositories are collected concurrently; output order always follows the
//! input order. A repository that fails is logged and left out; the caller
//! decides whether what remains is enough.

use std::collections::{BTreeSet, HashMap, HashSet};

use futures::future::join_all;
use tracing::{info, warn};

use crate::github::{
    parse_repo_url, CommitInfo, GitHubError, PullRequestInfo, RepoContext, RepositorySource,
    UserStats,
};
use crate::resume::dependencies::{filter_and_sort_dependencies, DependencyExtractor};
use crate::resume::models::ProjectInfo;

const MAX_SUMMARY_DIRS: usize = 20;
const MAX_EXTENSION_LEN: usize = 5;
const PR_BODY_MAX_CHARS: usize = 1000;

/// Extensions that mark a repository as containing real source code.
const MEANINGFUL_EXTENSIONS: &[&str] = &[
    "py", "js", "ts", "jsx", "tsx", "java", "kt", "go", "rs", "rb", "c", "cpp", "h", "hpp", "cs",
    "swift", "m", "scala", "php", "dart", "vue", "svelte",
];

/// Everything one job collects before generation starts.
#[derive(Debug, Clone, Default)]
pub struct CollectedData {
    pub projects: Vec<ProjectInfo>,
    /// Keyed by repository name.
    pub contexts: HashMap<String, RepoContext>,
    pub user_stats: Option<UserStats>,
}

/// A repository that could not be collected.
#[derive(Debug)]
pub struct RepoFailure {
    pub repo_url: String,
    pub error: GitHubError,
}

/// Drops repeated URLs, keeping the first occurrence of each.
pub fn dedupe_urls(urls: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    urls.iter()
        .filter(|url| seen.insert(url.as_str()))
        .cloned()
        .collect()
}

// ────────────────────────────────────────────────────────────────────────────
// Collection
// ────────────────────────────────────────────────────────────────────────────

/// Collects one `ProjectInfo` per usable repository. Empty repositories are
/// skipped silently; failed ones are returned alongside for reporting.
pub async fn collect_project_info(
    source: &dyn RepositorySource,
    extractor: &dyn DependencyExtractor,
    repo_urls: &[String],
    token: Option<&str>,
) -> (Vec<ProjectInfo>, Vec<RepoFailure>) {
    let results = join_all(
        repo_urls
            .iter()
            .map(|url| collect_one(source, extractor, url, token)),
    )
    .await;

    let mut projects = Vec::new();
    let mut failures = Vec::new();
    for (url, result) in repo_urls.iter().zip(results) {
        match result {
            Ok(Some(project)) => projects.push(project),
            Ok(None) => {}
            Err(error) => {
                match error.status() {
                    Some(404) => warn!("Repository {url} not found or not accessible"),
                    _ => warn!("Collection failed for {url}: {error}"),
                }
                failures.push(RepoFailure {
                    repo_url: url.clone(),
                    error,
                });
            }
        }
    }

    info!(
        "Project collection finished: {} usable, {} failed",
        projects.len(),
        failures.len()
    );
    (projects, failures)
}

async fn collect_one(
    source: &dyn RepositorySource,
    extractor: &dyn DependencyExtractor,
    repo_url: &str,
    token: Option<&str>,
) -> Result<Option<ProjectInfo>, GitHubError> {
    let repo = parse_repo_url(repo_url)?;
    let snapshot = source.fetch_project_info(repo_url, token).await?;

    if is_empty_repository(&snapshot.file_tree) {
        info!("Skipping {repo}: no source files");
        return Ok(None);
    }

    let dependencies =
        collect_dependencies(source, extractor, repo_url, &snapshot.file_tree, token).await;
    let messages = format_messages(&snapshot.commits, &snapshot.pulls);

    info!(
        "Collected {repo}: files={} deps={} messages={}",
        snapshot.file_tree.len(),
        dependencies.len(),
        messages.len()
    );

    Ok(Some(ProjectInfo {
        repo_name: repo.name,
        repo_url: repo_url.to_string(),
        file_tree: summarize_file_tree(&snapshot.file_tree),
        dependencies,
        messages,
    }))
}

/// Reads every manifest in the tree. A failed fetch means no dependencies,
/// not a failed repository.
async fn collect_dependencies(
    source: &dyn RepositorySource,
    extractor: &dyn DependencyExtractor,
    repo_url: &str,
    file_tree: &[String],
    token: Option<&str>,
) -> Vec<String> {
    let manifest_paths: Vec<String> = file_tree
        .iter()
        .filter(|path| extractor.is_manifest(file_name(path)))
        .cloned()
        .collect();
    if manifest_paths.is_empty() {
        return Vec::new();
    }

    let contents = match source
        .fetch_files_content(repo_url, &manifest_paths, token)
        .await
    {
        Ok(contents) => contents,
        Err(e) => {
            warn!("Manifest fetch failed for {repo_url}: {e}");
            return Vec::new();
        }
    };

    let deps = manifest_paths
        .iter()
        .filter_map(|path| {
            let content = contents.get(path)?.as_deref()?;
            Some(extractor.extract(file_name(path), content))
        })
        .flatten()
        .collect();

    filter_and_sort_dependencies(deps)
}

/// Contexts for every repository, keyed by repository name.
pub async fn collect_repo_contexts(
    source: &dyn RepositorySource,
    repo_urls: &[String],
    token: Option<&str>,
) -> HashMap<String, RepoContext> {
    let contexts = join_all(
        repo_urls
            .iter()
            .map(|url| source.fetch_repo_context(url, token)),
    )
    .await;

    info!("Collected {} repository contexts", contexts.len());
    contexts
        .into_iter()
        .map(|context| (context.name.clone(), context))
        .collect()
}

/// Stats for the owner of the first repository.
pub async fn collect_user_stats(
    source: &dyn RepositorySource,
    repo_urls: &[String],
    token: Option<&str>,
) -> Option<UserStats> {
    let owner = parse_repo_url(repo_urls.first()?).ok()?.owner;
    source.fetch_user_stats(&owner, token).await
}

// ────────────────────────────────────────────────────────────────────────────
// Shaping
// ────────────────────────────────────────────────────────────────────────────

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn extension(path: &str) -> Option<&str> {
    file_name(path)
        .rsplit_once('.')
        .map(|(_, ext)| ext)
        .filter(|ext| !ext.is_empty())
}

/// True when no path carries a known source-code extension.
pub fn is_empty_repository(file_tree: &[String]) -> bool {
    !file_tree.iter().any(|path| {
        extension(path)
            .map(|ext| MEANINGFUL_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
            .unwrap_or(false)
    })
}

/// Top-level and second-level directories (sorted, at most 20) followed by
/// one line listing the file extensions present.
pub fn summarize_file_tree(file_tree: &[String]) -> Vec<String> {
    let mut dirs = BTreeSet::new();
    let mut extensions = BTreeSet::new();

    for path in file_tree {
        let parts: Vec<&str> = path.split('/').collect();
        if parts.len() > 1 {
            dirs.insert(parts[0].to_string());
            if parts.len() > 2 {
                dirs.insert(format!("{}/{}", parts[0], parts[1]));
            }
        }
        if let Some(ext) = extension(path).filter(|ext| ext.len() <= MAX_EXTENSION_LEN) {
            extensions.insert(ext);
        }
    }

    let mut summary: Vec<String> = dirs.into_iter().take(MAX_SUMMARY_DIRS).collect();
    summary.push(format!(
        "extensions: {}",
        extensions.into_iter().collect::<Vec<_>>().join(", ")
    ));
    summary
}

/// One line per merged PR, then one per commit subject.
pub fn format_messages(commits: &[CommitInfo], pulls: &[PullRequestInfo]) -> Vec<String> {
    let pr_lines = pulls.iter().map(|pr| {
        let mut line = format!(
            "PR #{}: {} [commits {}, +{}/-{}]",
            pr.number, pr.title, pr.commits_count, pr.additions, pr.deletions
        );
        if let Some(body) = pr.body.as_deref().filter(|b| !b.trim().is_empty()) {
            let body: String = body
                .chars()
                .take(PR_BODY_MAX_CHARS)
                .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
                .collect();
            line.push_str(" - ");
            line.push_str(&body);
        }
        line
    });

    let commit_lines = commits.iter().map(|commit| {
        let subject = commit.message.lines().next().unwrap_or_default();
        format!("commit: {subject}")
    });

    pr_lines.chain(commit_lines).collect()
}
