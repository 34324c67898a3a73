use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

// ────────────────────────────────────────────────────────────────────────────
// Job input
// ────────────────────────────────────────────────────────────────────────────

/// One accepted extraction request. Shared read-only for the life of the job.
#[derive(Clone)]
pub struct JobRequest {
    pub repo_urls: Vec<String>,
    pub position: String,
    pub company: Option<String>,
    pub github_token: Option<String>,
    pub callback_url: Option<String>,
}

impl JobRequest {
    pub fn token(&self) -> Option<&str> {
        self.github_token.as_deref()
    }
}

impl fmt::Debug for JobRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobRequest")
            .field("repo_urls", &self.repo_urls)
            .field("position", &self.position)
            .field("company", &self.company)
            .field("github_token", &self.github_token.as_ref().map(|_| "<redacted>"))
            .field("callback_url", &self.callback_url)
            .finish()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Collected material
// ────────────────────────────────────────────────────────────────────────────

/// Condensed view of one repository, as handed to the generator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectInfo {
    pub repo_name: String,
    pub repo_url: String,
    /// Directory summary plus one `extensions: ...` line.
    pub file_tree: Vec<String>,
    pub dependencies: Vec<String>,
    /// Merged PR lines first, then commit subject lines.
    pub messages: Vec<String>,
}

// ────────────────────────────────────────────────────────────────────────────
// Generated output
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftProjectEntry {
    pub name: String,
    pub repo_url: String,
    pub description: String,
    #[serde(default)]
    pub tech_stack: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResumeDocument {
    /// Consolidated stack across all projects, first-seen order.
    #[serde(default)]
    pub tech_stack: Vec<String>,
    pub projects: Vec<DraftProjectEntry>,
}

impl ResumeDocument {
    /// Concatenates documents in order. The consolidated stack is the
    /// first-seen union of every part's stack.
    pub fn merge(parts: Vec<ResumeDocument>) -> Self {
        let tech_stack = merge_tech_stacks(parts.iter().map(|doc| doc.tech_stack.as_slice()));
        let projects = parts.into_iter().flat_map(|doc| doc.projects).collect();
        Self {
            tech_stack,
            projects,
        }
    }

    /// Fills an empty consolidated stack from the per-project stacks.
    pub fn with_derived_tech_stack(mut self) -> Self {
        if self.tech_stack.is_empty() {
            self.tech_stack =
                merge_tech_stacks(self.projects.iter().map(|p| p.tech_stack.as_slice()));
        }
        self
    }
}

/// Ordered union. Names compare case-insensitively; the first spelling wins.
pub fn merge_tech_stacks<'a, I>(stacks: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a [String]>,
{
    let mut seen = HashSet::new();
    let mut merged = Vec::new();
    for stack in stacks {
        for tech in stack {
            let key = tech.trim().to_lowercase();
            if !key.is_empty() && seen.insert(key) {
                merged.push(tech.trim().to_string());
            }
        }
    }
    merged
}

// ────────────────────────────────────────────────────────────────────────────
// Evaluation
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Pass,
    Fail,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationVerdict {
    pub result: Verdict,
    pub violated_rule: Option<String>,
    pub violated_item: Option<String>,
    pub feedback: Option<String>,
}

impl EvaluationVerdict {
    /// Neutral verdict used when the evaluator cannot be consulted.
    pub fn pass_without_feedback() -> Self {
        Self {
            result: Verdict::Pass,
            violated_rule: None,
            violated_item: None,
            feedback: None,
        }
    }

    pub fn passed(&self) -> bool {
        self.result == Verdict::Pass
    }

    /// Feedback for the next generation attempt, including which rule failed.
    pub fn retry_feedback(&self) -> Option<String> {
        let mut parts = Vec::new();
        if let Some(rule) = &self.violated_rule {
            parts.push(format!("Violated rule: {rule}"));
        }
        if let Some(item) = &self.violated_item {
            parts.push(format!("Offending item: {item}"));
        }
        if let Some(feedback) = self.feedback.as_deref().filter(|f| !f.trim().is_empty()) {
            parts.push(feedback.to_string());
        }
        (!parts.is_empty()).then(|| parts.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn project(name: &str, stack: &[&str]) -> DraftProjectEntry {
        DraftProjectEntry {
            name: name.to_string(),
            repo_url: format!("https://github.com/o/{name}"),
            description: "- Built it".to_string(),
            tech_stack: strings(stack),
        }
    }

    #[test]
    fn test_merge_tech_stacks_first_seen_union() {
        let a = strings(&["Go", "Redis"]);
        let b = strings(&["Redis", "Postgres"]);
        let merged = merge_tech_stacks([a.as_slice(), b.as_slice()]);
        assert_eq!(merged, strings(&["Go", "Redis", "Postgres"]));
    }

    #[test]
    fn test_merge_tech_stacks_ignores_case_duplicates() {
        let a = strings(&["PostgreSQL", "redis"]);
        let b = strings(&["postgresql", "Redis", "Kafka"]);
        let merged = merge_tech_stacks([a.as_slice(), b.as_slice()]);
        assert_eq!(merged, strings(&["PostgreSQL", "redis", "Kafka"]));
    }

    #[test]
    fn test_document_merge_preserves_project_order() {
        let first = ResumeDocument {
            tech_stack: strings(&["Go", "Redis"]),
            projects: vec![project("a", &["Go"]), project("b", &["Redis"])],
        };
        let second = ResumeDocument {
            tech_stack: strings(&["Redis", "Postgres"]),
            projects: vec![project("c", &["Postgres"])],
        };

        let merged = ResumeDocument::merge(vec![first, second]);
        let names: Vec<_> = merged.projects.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(merged.tech_stack, strings(&["Go", "Redis", "Postgres"]));
    }

    #[test]
    fn test_derived_tech_stack_only_when_empty() {
        let doc = ResumeDocument {
            tech_stack: vec![],
            projects: vec![project("a", &["Rust", "Tokio"]), project("b", &["Rust"])],
        }
        .with_derived_tech_stack();
        assert_eq!(doc.tech_stack, strings(&["Rust", "Tokio"]));

        let explicit = ResumeDocument {
            tech_stack: strings(&["Axum"]),
            projects: vec![project("a", &["Rust"])],
        }
        .with_derived_tech_stack();
        assert_eq!(explicit.tech_stack, strings(&["Axum"]));
    }

    #[test]
    fn test_retry_feedback_combines_fields() {
        let verdict = EvaluationVerdict {
            result: Verdict::Fail,
            violated_rule: Some("2".to_string()),
            violated_item: Some("Pydantic".to_string()),
            feedback: Some("Remove utility libraries".to_string()),
        };
        let feedback = verdict.retry_feedback().unwrap();
        assert!(feedback.contains("Violated rule: 2"));
        assert!(feedback.contains("Pydantic"));
        assert!(feedback.ends_with("Remove utility libraries"));
    }

    #[test]
    fn test_pass_without_feedback_has_nothing_to_retry() {
        let verdict = EvaluationVerdict::pass_without_feedback();
        assert!(verdict.passed());
        assert!(verdict.retry_feedback().is_none());
    }

    #[test]
    fn test_job_request_debug_redacts_token() {
        let request = JobRequest {
            repo_urls: vec!["https://github.com/o/r".to_string()],
            position: "Backend".to_string(),
            company: None,
            github_token: Some("ghp_secret".to_string()),
            callback_url: None,
        };
        let rendered = format!("{request:?}");
        assert!(!rendered.contains("ghp_secret"));
    }
}
