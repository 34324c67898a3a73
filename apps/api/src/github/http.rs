//! HttpFetcher: the one reusable HTTP client behind every GitHub call.
//!
//! Cloning is cheap: all clones share the same connection pool, so a single
//! instance built at startup serves every job.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

use crate::errors::ErrorCode;

const USER_AGENT: &str = concat!("experience-extractor/", env!("CARGO_PKG_VERSION"));
const GITHUB_ACCEPT: &str = "application/vnd.github.v3+json";

#[derive(Debug, Error)]
pub enum GitHubError {
    #[error("Invalid GitHub repository URL: {0}")]
    InvalidUrl(String),

    #[error("Unsafe file path rejected: {path} ({reason})")]
    UnsafePath { path: String, reason: &'static str },

    #[error("GitHub API returned HTTP {status} for {url}")]
    Http { status: u16, url: String },

    #[error("GitHub request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("GitHub GraphQL query failed: {0}")]
    GraphQl(String),

    #[error("Request limiter closed")]
    LimiterClosed,
}

impl GitHubError {
    pub fn code(&self) -> ErrorCode {
        match self {
            GitHubError::InvalidUrl(_) | GitHubError::UnsafePath { .. } => ErrorCode::InvalidInput,
            _ => ErrorCode::GithubApiError,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            GitHubError::Http { status, .. } => Some(*status),
            GitHubError::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .user_agent(USER_AGENT)
                .build()
                .expect("Failed to build HTTP client"),
        }
    }

    /// GET returning JSON. Any non-2xx status is an error.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        token: Option<&str>,
        query: &[(&str, String)],
    ) -> Result<T, GitHubError> {
        let response = self.send(self.client.get(url).query(query), url, token).await?;
        Ok(response.json().await?)
    }

    /// GET returning JSON, with 404 mapped to `None`.
    pub async fn get_optional_json<T: DeserializeOwned>(
        &self,
        url: &str,
        token: Option<&str>,
    ) -> Result<Option<T>, GitHubError> {
        match self.send(self.client.get(url), url, token).await {
            Ok(response) => Ok(Some(response.json().await?)),
            Err(GitHubError::Http { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        url: &str,
        token: Option<&str>,
        body: &B,
    ) -> Result<T, GitHubError> {
        let response = self.send(self.client.post(url).json(body), url, token).await?;
        Ok(response.json().await?)
    }

    async fn send(
        &self,
        request: RequestBuilder,
        url: &str,
        token: Option<&str>,
    ) -> Result<Response, GitHubError> {
        let mut request = request.header("Accept", GITHUB_ACCEPT);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        Err(GitHubError::Http {
            status: status.as_u16(),
            url: strip_query(url),
        })
    }
}

fn strip_query(url: &str) -> String {
    url.split('?').next().unwrap_or(url).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;

    #[tokio::test]
    async fn test_get_optional_json_maps_404_to_none() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/repos/o/r/readme")
            .with_status(404)
            .create_async()
            .await;

        let http = HttpFetcher::new(Duration::from_secs(5));
        let result: Option<serde_json::Value> = http
            .get_optional_json(&format!("{}/repos/o/r/readme", server.url()), None)
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_bearer_token_is_sent_when_present() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/repos/o/r/languages")
            .match_header("authorization", "Bearer secret")
            .match_header("accept", GITHUB_ACCEPT)
            .with_status(200)
            .with_body("{\"Rust\": 100}")
            .expect(1)
            .create_async()
            .await;

        let http = HttpFetcher::new(Duration::from_secs(5));
        let value: serde_json::Value = http
            .get_json(
                &format!("{}/repos/o/r/languages", server.url()),
                Some("secret"),
                &[],
            )
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(value["Rust"], 100);
    }

    #[tokio::test]
    async fn test_server_error_carries_status() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/repos/o/r")
            .with_status(502)
            .create_async()
            .await;

        let http = HttpFetcher::new(Duration::from_secs(5));
        let err = http
            .get_json::<serde_json::Value>(&format!("{}/repos/o/r", server.url()), None, &[])
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(502));
        assert_eq!(err.code(), ErrorCode::GithubApiError);
    }

    #[test]
    fn test_error_codes_split_input_from_upstream() {
        let input = [
            GitHubError::InvalidUrl("https://gitlab.com/o/r".to_string()),
            GitHubError::UnsafePath {
                path: "../etc".to_string(),
                reason: "traversal",
            },
        ];
        for err in &input {
            assert_eq!(err.code(), ErrorCode::InvalidInput, "{err}");
        }

        let upstream = [
            GitHubError::Http {
                status: 404,
                url: "https://api.github.com/repos/o/r".to_string(),
            },
            GitHubError::GraphQl("rate limited".to_string()),
            GitHubError::LimiterClosed,
        ];
        for err in &upstream {
            assert_eq!(err.code(), ErrorCode::GithubApiError, "{err}");
        }
    }
}
