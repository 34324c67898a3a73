//! Path-safety gate for repository file fetches.
//!
//! Runs once per requested path before either fetch path (GraphQL or REST)
//! sees it. A rejected path is never sent to GitHub.

use std::sync::OnceLock;

use regex::Regex;

use crate::github::http::GitHubError;

/// Segments that name build, version-control or credential locations.
const SENSITIVE_SEGMENTS: &[&str] = &[
    ".git",
    ".github",
    ".env",
    "secrets",
    "credentials",
    ".aws",
    ".ssh",
    "private",
];

fn allowed_chars() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[\w\-./]+$").expect("valid path pattern"))
}

/// Returns the path unchanged when it is safe to request.
pub fn sanitize_file_path(path: &str) -> Result<&str, GitHubError> {
    let reject = |reason| {
        Err(GitHubError::UnsafePath {
            path: path.to_string(),
            reason,
        })
    };

    if path.contains("..") {
        return reject("path traversal");
    }
    if path.starts_with('/') || path.starts_with('\\') {
        return reject("absolute path");
    }
    let lowered = path.to_lowercase();
    if lowered
        .split('/')
        .any(|segment| SENSITIVE_SEGMENTS.contains(&segment))
    {
        return reject("sensitive location");
    }
    if !allowed_chars().is_match(path) {
        return reject("unsupported characters");
    }

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_traversal() {
        assert!(sanitize_file_path("../secret").is_err());
        assert!(sanitize_file_path("src/../../etc/passwd").is_err());
    }

    #[test]
    fn test_rejects_absolute_paths() {
        assert!(sanitize_file_path("/etc/passwd").is_err());
    }

    #[test]
    fn test_rejects_sensitive_segments_case_insensitively() {
        assert!(sanitize_file_path("src/.git/config").is_err());
        assert!(sanitize_file_path(".github/workflows/ci.yml").is_err());
        assert!(sanitize_file_path("config/Secrets/prod.json").is_err());
        assert!(sanitize_file_path(".env").is_err());
    }

    #[test]
    fn test_rejects_shell_and_query_characters() {
        assert!(sanitize_file_path("src/main.rs?ref=x").is_err());
        assert!(sanitize_file_path("src/$(whoami).rs").is_err());
    }

    #[test]
    fn test_accepts_plain_paths_unchanged() {
        assert_eq!(sanitize_file_path("src/main.go").unwrap(), "src/main.go");
        assert_eq!(
            sanitize_file_path("backend/build.gradle.kts").unwrap(),
            "backend/build.gradle.kts"
        );
    }

    #[test]
    fn test_sensitive_words_inside_names_are_allowed() {
        // only whole segments are matched
        assert!(sanitize_file_path("docs/private_api.md").is_ok());
        assert!(sanitize_file_path("src/secrets_loader.rs").is_ok());
    }

    #[test]
    fn test_error_names_reason() {
        let err = sanitize_file_path("../secret").unwrap_err();
        assert!(err.to_string().contains("path traversal"));
    }
}
