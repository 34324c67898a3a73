//! Batched GraphQL queries. Each returns the fields it could resolve as
//! `Option`s so the caller can reconcile only what came back null.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use crate::github::http::{GitHubError, HttpFetcher};
use crate::github::models::{CommitInfo, PullRequestInfo, UserStats};
use crate::github::rest::truncate_chars;
use crate::github::RepoLocator;

const ACTIVITY_QUERY: &str = r#"
query($owner: String!, $repo: String!, $commitsCount: Int!, $prsCount: Int!) {
  repository(owner: $owner, name: $repo) {
    defaultBranchRef {
      target {
        ... on Commit {
          history(first: $commitsCount) {
            nodes { oid message author { name } parents { totalCount } }
          }
        }
      }
    }
    pullRequests(states: MERGED, first: $prsCount, orderBy: {field: UPDATED_AT, direction: DESC}) {
      nodes {
        number title body mergedAt additions deletions
        author { login }
        commits { totalCount }
      }
    }
  }
}
"#;

const CONTEXT_QUERY: &str = r#"
query($owner: String!, $repo: String!) {
  repository(owner: $owner, name: $repo) {
    description
    repositoryTopics(first: 10) { nodes { topic { name } } }
    languages(first: 10) { edges { size node { name } } }
    object(expression: "HEAD:README.md") { ... on Blob { text } }
  }
}
"#;

const USER_STATS_QUERY: &str = r#"
query($login: String!) {
  user(login: $login) {
    contributionsCollection {
      totalCommitContributions
      totalPullRequestContributions
      totalIssueContributions
    }
  }
}
"#;

#[derive(Serialize)]
struct GraphQlRequest<'a> {
    query: &'a str,
    variables: Value,
}

#[derive(Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlErrorEntry>,
}

#[derive(Deserialize)]
struct GraphQlErrorEntry {
    message: String,
}

#[derive(Deserialize)]
struct RepositoryData<R> {
    repository: Option<R>,
}

#[derive(Deserialize)]
#[serde(bound(deserialize = "N: Deserialize<'de>"))]
struct Connection<N> {
    #[serde(default)]
    nodes: Vec<Option<N>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TotalCount {
    total_count: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActivityRepository {
    default_branch_ref: Option<BranchRef>,
    pull_requests: Option<Connection<PullNode>>,
}

#[derive(Deserialize)]
struct BranchRef {
    target: Option<CommitTarget>,
}

#[derive(Deserialize)]
struct CommitTarget {
    history: Option<Connection<CommitNode>>,
}

#[derive(Deserialize)]
struct CommitNode {
    oid: String,
    message: String,
    author: Option<NamedActor>,
    parents: TotalCount,
}

#[derive(Deserialize)]
struct NamedActor {
    name: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PullNode {
    number: u64,
    title: String,
    body: Option<String>,
    author: Option<LoginActor>,
    merged_at: Option<DateTime<Utc>>,
    #[serde(default)]
    additions: u64,
    #[serde(default)]
    deletions: u64,
    commits: Option<TotalCount>,
}

#[derive(Deserialize)]
struct LoginActor {
    login: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContextRepository {
    description: Option<String>,
    repository_topics: Option<Connection<TopicNode>>,
    languages: Option<LanguageConnection>,
    object: Option<BlobText>,
}

#[derive(Deserialize)]
struct TopicNode {
    topic: Option<NamedTopic>,
}

#[derive(Deserialize)]
struct NamedTopic {
    name: String,
}

#[derive(Deserialize)]
struct LanguageConnection {
    #[serde(default)]
    edges: Vec<LanguageEdge>,
}

#[derive(Deserialize)]
struct LanguageEdge {
    size: u64,
    node: NamedTopic,
}

#[derive(Deserialize)]
struct BlobText {
    text: Option<String>,
}

#[derive(Deserialize)]
struct UserData {
    user: Option<UserNode>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserNode {
    contributions_collection: Contributions,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Contributions {
    total_commit_contributions: u64,
    total_pull_request_contributions: u64,
    total_issue_contributions: u64,
}

/// Commit history and merged pull requests. A `None` field was null in the
/// response and must be fetched some other way.
#[derive(Debug, Default)]
pub struct Activity {
    pub commits: Option<Vec<CommitInfo>>,
    pub pulls: Option<Vec<PullRequestInfo>>,
}

/// Repository metadata. Description travels with topics because the REST
/// fallback returns both from the same call.
#[derive(Debug, Default)]
pub struct ContextFields {
    pub languages: Option<BTreeMap<String, u64>>,
    pub description_and_topics: Option<(Option<String>, Vec<String>)>,
    pub readme: Option<String>,
}

/// Runs one query. A response carrying any `errors` entry fails as a whole.
async fn execute<T: DeserializeOwned>(
    http: &HttpFetcher,
    url: &str,
    token: &str,
    query: &str,
    variables: Value,
) -> Result<T, GitHubError> {
    let response: GraphQlResponse<T> = http
        .post_json(url, Some(token), &GraphQlRequest { query, variables })
        .await?;

    if let Some(first) = response.errors.first() {
        warn!("GraphQL returned {} error(s)", response.errors.len());
        return Err(GitHubError::GraphQl(format!(
            "{} error(s), first: {}",
            response.errors.len(),
            first.message
        )));
    }

    response
        .data
        .ok_or_else(|| GitHubError::GraphQl("response carried no data".to_string()))
}

fn require_repository<R>(data: RepositoryData<R>, repo: &RepoLocator) -> Result<R, GitHubError> {
    data.repository
        .ok_or_else(|| GitHubError::GraphQl(format!("repository {repo} not found")))
}

pub async fn activity(
    http: &HttpFetcher,
    url: &str,
    token: &str,
    repo: &RepoLocator,
    commits_count: usize,
    prs_count: usize,
) -> Result<Activity, GitHubError> {
    let data: RepositoryData<ActivityRepository> = execute(
        http,
        url,
        token,
        ACTIVITY_QUERY,
        json!({
            "owner": repo.owner,
            "repo": repo.name,
            "commitsCount": commits_count,
            "prsCount": prs_count,
        }),
    )
    .await?;
    let repository = require_repository(data, repo)?;

    let commits = repository
        .default_branch_ref
        .and_then(|branch| branch.target)
        .and_then(|target| target.history)
        .map(|history| {
            history
                .nodes
                .into_iter()
                .flatten()
                .filter(|node| node.parents.total_count < 2)
                .map(|node| CommitInfo {
                    sha: node.oid,
                    message: node.message,
                    author: node
                        .author
                        .and_then(|a| a.name)
                        .unwrap_or_else(|| "Unknown".to_string()),
                })
                .collect::<Vec<_>>()
        });

    let pulls = repository.pull_requests.map(|connection| {
        connection
            .nodes
            .into_iter()
            .flatten()
            .map(|node| PullRequestInfo {
                number: node.number,
                title: node.title,
                body: node.body,
                author: node.author.map(|a| a.login).unwrap_or_default(),
                merged_at: node.merged_at,
                commits_count: node.commits.map(|c| c.total_count).unwrap_or_default(),
                additions: node.additions,
                deletions: node.deletions,
            })
            .collect::<Vec<_>>()
    });

    info!(
        "GraphQL activity for {repo}: commits={:?} prs={:?}",
        commits.as_ref().map(Vec::len),
        pulls.as_ref().map(Vec::len)
    );
    Ok(Activity { commits, pulls })
}

pub async fn context(
    http: &HttpFetcher,
    url: &str,
    token: &str,
    repo: &RepoLocator,
    readme_max_length: usize,
) -> Result<ContextFields, GitHubError> {
    let data: RepositoryData<ContextRepository> = execute(
        http,
        url,
        token,
        CONTEXT_QUERY,
        json!({ "owner": repo.owner, "repo": repo.name }),
    )
    .await?;
    let repository = require_repository(data, repo)?;

    let languages = repository.languages.map(|connection| {
        connection
            .edges
            .into_iter()
            .map(|edge| (edge.node.name, edge.size))
            .collect::<BTreeMap<_, _>>()
    });

    let description = repository.description;
    let description_and_topics = repository.repository_topics.map(|connection| {
        let topics = connection
            .nodes
            .into_iter()
            .flatten()
            .filter_map(|node| node.topic.map(|t| t.name))
            .collect();
        (description, topics)
    });

    let readme = repository
        .object
        .and_then(|blob| blob.text)
        .filter(|text| !text.is_empty())
        .map(|text| truncate_chars(&text, readme_max_length));

    Ok(ContextFields {
        languages,
        description_and_topics,
        readme,
    })
}

/// Fetches every path in one round trip. Paths travel as variables, never
/// spliced into the query text.
pub async fn files(
    http: &HttpFetcher,
    url: &str,
    token: &str,
    repo: &RepoLocator,
    paths: &[String],
) -> Result<HashMap<String, Option<String>>, GitHubError> {
    let mut declarations = String::from("$owner: String!, $repo: String!");
    let mut selections = String::new();
    let mut variables = Map::new();
    variables.insert("owner".to_string(), json!(repo.owner));
    variables.insert("repo".to_string(), json!(repo.name));

    for (i, path) in paths.iter().enumerate() {
        declarations.push_str(&format!(", $p{i}: String!"));
        selections.push_str(&format!(
            "    f{i}: object(expression: $p{i}) {{ ... on Blob {{ text }} }}\n"
        ));
        variables.insert(format!("p{i}"), json!(format!("HEAD:{path}")));
    }

    let query = format!(
        "query({declarations}) {{\n  repository(owner: $owner, name: $repo) {{\n{selections}  }}\n}}"
    );

    let data: RepositoryData<HashMap<String, Option<BlobText>>> =
        execute(http, url, token, &query, Value::Object(variables)).await?;
    let mut blobs = require_repository(data, repo)?;

    let contents = paths
        .iter()
        .enumerate()
        .map(|(i, path)| {
            let text = blobs
                .remove(&format!("f{i}"))
                .flatten()
                .and_then(|blob| blob.text)
                .filter(|text| !text.is_empty());
            (path.clone(), text)
        })
        .collect();

    info!("GraphQL file query for {repo}: {} paths", paths.len());
    Ok(contents)
}

pub async fn user_stats(
    http: &HttpFetcher,
    url: &str,
    token: &str,
    login: &str,
) -> Result<UserStats, GitHubError> {
    let data: UserData = execute(http, url, token, USER_STATS_QUERY, json!({ "login": login })).await?;
    let user = data
        .user
        .ok_or_else(|| GitHubError::GraphQl(format!("user {login} not found")))?;
    let contributions = user.contributions_collection;

    Ok(UserStats {
        total_commits: contributions.total_commit_contributions,
        total_prs: contributions.total_pull_request_contributions,
        total_issues: contributions.total_issue_contributions,
    })
}
