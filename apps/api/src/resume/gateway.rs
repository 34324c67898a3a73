//! Model gateways: the two capabilities the workflow needs from a model:
//! produce a draft, and judge a draft.
//!
//! Both are traits so the workflow can be driven by test doubles. The default
//! implementations each own an independently configured `LlmClient`.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::info;

use crate::errors::ErrorCode;
use crate::github::{RepoContext, UserStats};
use crate::llm_client::prompts::{GROUNDING_INSTRUCTION, JSON_ONLY_SYSTEM};
use crate::llm_client::{LlmClient, LlmError};
use crate::resume::models::{EvaluationVerdict, ProjectInfo, ResumeDocument, Verdict};
use crate::resume::prompts::{
    EVALUATION_PROMPT_TEMPLATE, EVALUATION_SYSTEM_TEMPLATE, FEEDBACK_SECTION_TEMPLATE,
    GENERATION_PROMPT_TEMPLATE, GENERATION_SYSTEM,
};

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum GenerateError {
    /// The provider could not be reached or refused the call.
    #[error("Generation provider error: {0}")]
    Provider(String),

    /// The provider answered, but not with a usable draft.
    #[error("Generated draft failed validation: {0}")]
    Validation(String),
}

impl GenerateError {
    pub fn code(&self) -> ErrorCode {
        match self {
            GenerateError::Provider(_) => ErrorCode::GenerateProviderError,
            GenerateError::Validation(_) => ErrorCode::GenerateValidationError,
        }
    }
}

impl From<LlmError> for GenerateError {
    fn from(e: LlmError) -> Self {
        if e.is_provider_failure() {
            GenerateError::Provider(e.to_string())
        } else {
            GenerateError::Validation(e.to_string())
        }
    }
}

#[derive(Debug, Error)]
pub enum EvaluateError {
    #[error("Evaluation call failed: {0}")]
    Llm(#[from] LlmError),

    #[error("Evaluation output malformed: {0}")]
    Malformed(String),
}

// ────────────────────────────────────────────────────────────────────────────
// Traits
// ────────────────────────────────────────────────────────────────────────────

/// Everything one generation call sees. Built per batch.
#[derive(Debug, Clone, Default)]
pub struct GenerationInput {
    pub projects: Vec<ProjectInfo>,
    pub position: String,
    pub company: Option<String>,
    pub repo_urls: Vec<String>,
    pub repo_contexts: Vec<RepoContext>,
    pub user_stats: Option<UserStats>,
    /// Reviewer feedback from the previous attempt, if any.
    pub feedback: Option<String>,
}

#[async_trait]
pub trait GenerativeGateway: Send + Sync {
    async fn generate(&self, input: &GenerationInput) -> Result<ResumeDocument, GenerateError>;
}

#[async_trait]
pub trait EvaluativeGateway: Send + Sync {
    async fn evaluate(
        &self,
        draft: &ResumeDocument,
        position: &str,
    ) -> Result<EvaluationVerdict, EvaluateError>;
}

// ────────────────────────────────────────────────────────────────────────────
// LlmGenerator
// ────────────────────────────────────────────────────────────────────────────

pub struct LlmGenerator {
    llm: LlmClient,
}

impl LlmGenerator {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl GenerativeGateway for LlmGenerator {
    async fn generate(&self, input: &GenerationInput) -> Result<ResumeDocument, GenerateError> {
        let prompt = build_generation_prompt(input);
        let draft: ResumeDocument = self.llm.call_json(&prompt, GENERATION_SYSTEM).await?;

        validate_draft(&draft)?;
        info!(
            "Generated draft with {} projects (model: {})",
            draft.projects.len(),
            self.llm.model()
        );
        Ok(draft.with_derived_tech_stack())
    }
}

/// Rejects drafts the callback consumer could not use.
fn validate_draft(draft: &ResumeDocument) -> Result<(), GenerateError> {
    if draft.projects.is_empty() {
        return Err(GenerateError::Validation("draft contains no projects".to_string()));
    }
    if let Some(index) = draft
        .projects
        .iter()
        .position(|p| p.name.trim().is_empty() || p.repo_url.trim().is_empty())
    {
        return Err(GenerateError::Validation(format!(
            "project {index} is missing a name or repo_url"
        )));
    }
    Ok(())
}

fn to_pretty_json<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_default()
}

fn build_generation_prompt(input: &GenerationInput) -> String {
    let company_clause = input
        .company
        .as_deref()
        .map(|c| format!(" at {c}"))
        .unwrap_or_default();
    let feedback_section = input
        .feedback
        .as_deref()
        .filter(|f| !f.trim().is_empty())
        .map(|f| FEEDBACK_SECTION_TEMPLATE.replace("{feedback}", f))
        .unwrap_or_default();
    let user_stats = input
        .user_stats
        .as_ref()
        .map(to_pretty_json)
        .unwrap_or_else(|| "not available".to_string());

    GENERATION_PROMPT_TEMPLATE
        .replace("{position}", &input.position)
        .replace("{company_clause}", &company_clause)
        .replace("{grounding_instruction}", GROUNDING_INSTRUCTION)
        .replace("{project_count}", &input.projects.len().to_string())
        .replace("{feedback_section}", &feedback_section)
        .replace("{user_stats}", &user_stats)
        .replace("{repo_contexts}", &to_pretty_json(&input.repo_contexts))
        .replace("{project_info}", &to_pretty_json(&input.projects))
        .replace("{repo_urls}", &input.repo_urls.join("\n"))
}

// ────────────────────────────────────────────────────────────────────────────
// LlmEvaluator
// ────────────────────────────────────────────────────────────────────────────

pub struct LlmEvaluator {
    llm: LlmClient,
}

impl LlmEvaluator {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }
}

/// Model output before normalization. `violated_rule` arrives as a number,
/// a string or null depending on the model.
#[derive(Debug, Deserialize)]
struct RawVerdict {
    result: String,
    #[serde(default)]
    violated_rule: Value,
    #[serde(default)]
    violated_item: Value,
    #[serde(default)]
    feedback: Option<String>,
}

impl TryFrom<RawVerdict> for EvaluationVerdict {
    type Error = EvaluateError;

    fn try_from(raw: RawVerdict) -> Result<Self, Self::Error> {
        let result = match raw.result.trim().to_ascii_lowercase().as_str() {
            "pass" => Verdict::Pass,
            "fail" => Verdict::Fail,
            other => {
                return Err(EvaluateError::Malformed(format!(
                    "unknown result '{other}'"
                )))
            }
        };

        Ok(EvaluationVerdict {
            result,
            violated_rule: value_text(raw.violated_rule),
            violated_item: value_text(raw.violated_item),
            feedback: raw.feedback.filter(|f| !f.trim().is_empty()),
        })
    }
}

fn value_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

#[async_trait]
impl EvaluativeGateway for LlmEvaluator {
    async fn evaluate(
        &self,
        draft: &ResumeDocument,
        position: &str,
    ) -> Result<EvaluationVerdict, EvaluateError> {
        let system = format!(
            "{} {JSON_ONLY_SYSTEM}",
            EVALUATION_SYSTEM_TEMPLATE.replace("{position}", position)
        );
        let prompt = EVALUATION_PROMPT_TEMPLATE
            .replace("{position}", position)
            .replace("{resume_json}", &to_pretty_json(draft));

        let raw: RawVerdict = self.llm.call_json(&prompt, &system).await?;
        let verdict = EvaluationVerdict::try_from(raw)?;
        info!(
            "Evaluation result: {:?} (model: {})",
            verdict.result,
            self.llm.model()
        );
        Ok(verdict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_client::{LlmProvider, LlmSettings};
    use crate::resume::models::DraftProjectEntry;
    use mockito::Server;
    use serde_json::json;
    use std::time::Duration;

    fn llm_for(url: String) -> LlmClient {
        LlmClient::new(LlmSettings {
            provider: LlmProvider::OpenAi,
            model: "test-model".to_string(),
            api_key: "k".to_string(),
            base_url: Some(url),
            timeout: Duration::from_secs(5),
        })
    }

    fn completion(content: &str) -> String {
        json!({ "choices": [{ "message": { "content": content } }] }).to_string()
    }

    fn sample_input() -> GenerationInput {
        GenerationInput {
            projects: vec![ProjectInfo {
                repo_name: "queue".to_string(),
                repo_url: "https://github.com/o/queue".to_string(),
                file_tree: vec!["src".to_string(), "extensions: go".to_string()],
                dependencies: vec!["redis".to_string()],
                messages: vec!["commit: Add worker pool".to_string()],
            }],
            position: "Backend".to_string(),
            company: Some("Acme".to_string()),
            repo_urls: vec!["https://github.com/o/queue".to_string()],
            repo_contexts: vec![],
            user_stats: None,
            feedback: Some("Too many items in tech_stack".to_string()),
        }
    }

    #[test]
    fn test_generation_prompt_fills_every_placeholder() {
        let prompt = build_generation_prompt(&sample_input());
        assert!(prompt.contains("Backend position at Acme"));
        assert!(prompt.contains("Too many items in tech_stack"));
        assert!(prompt.contains("https://github.com/o/queue"));
        assert!(prompt.contains("exactly 1 projects"));
        for placeholder in ["{position}", "{feedback_section}", "{project_info}", "{repo_urls}"] {
            assert!(!prompt.contains(placeholder), "{placeholder} left in prompt");
        }
    }

    #[test]
    fn test_generation_prompt_without_feedback_has_no_feedback_section() {
        let mut input = sample_input();
        input.feedback = None;
        let prompt = build_generation_prompt(&input);
        assert!(!prompt.contains("MUST FIX"));
    }

    #[test]
    fn test_llm_error_classification() {
        let provider: GenerateError = LlmError::RateLimited { retries: 3 }.into();
        assert_eq!(provider.code(), ErrorCode::GenerateProviderError);

        let validation: GenerateError = LlmError::EmptyContent.into();
        assert_eq!(validation.code(), ErrorCode::GenerateValidationError);
    }

    #[test]
    fn test_validate_draft_rejects_empty_and_incomplete() {
        assert!(validate_draft(&ResumeDocument::default()).is_err());

        let incomplete = ResumeDocument {
            tech_stack: vec![],
            projects: vec![DraftProjectEntry {
                name: "api".to_string(),
                repo_url: " ".to_string(),
                description: "- x".to_string(),
                tech_stack: vec![],
            }],
        };
        assert!(matches!(
            validate_draft(&incomplete),
            Err(GenerateError::Validation(_))
        ));
    }

    #[test]
    fn test_raw_verdict_accepts_numeric_rule() {
        let raw: RawVerdict = serde_json::from_value(json!({
            "result": "FAIL", "violated_rule": 2, "violated_item": "Pydantic", "feedback": "drop utilities"
        }))
        .unwrap();
        let verdict = EvaluationVerdict::try_from(raw).unwrap();
        assert_eq!(verdict.result, Verdict::Fail);
        assert_eq!(verdict.violated_rule.as_deref(), Some("2"));
        assert_eq!(verdict.violated_item.as_deref(), Some("Pydantic"));
    }

    #[test]
    fn test_raw_verdict_rejects_unknown_result() {
        let raw: RawVerdict = serde_json::from_value(json!({ "result": "maybe" })).unwrap();
        assert!(matches!(
            EvaluationVerdict::try_from(raw),
            Err(EvaluateError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn test_llm_generator_derives_missing_tech_stack() {
        let mut server = Server::new_async().await;
        let draft = json!({
            "projects": [{
                "name": "queue",
                "repo_url": "https://github.com/o/queue",
                "tech_stack": ["Go", "Redis"],
                "description": "- Built a worker pool"
            }]
        });
        let _mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_body(completion(&draft.to_string()))
            .create_async()
            .await;

        let generator = LlmGenerator::new(llm_for(format!("{}/v1/chat/completions", server.url())));
        let document = generator.generate(&sample_input()).await.unwrap();

        assert_eq!(document.projects.len(), 1);
        assert_eq!(document.tech_stack, vec!["Go".to_string(), "Redis".to_string()]);
    }

    #[tokio::test]
    async fn test_llm_generator_non_json_is_validation_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_body(completion("Sorry, I cannot help with that."))
            .create_async()
            .await;

        let generator = LlmGenerator::new(llm_for(format!("{}/v1/chat/completions", server.url())));
        let err = generator.generate(&sample_input()).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::GenerateValidationError);
    }

    #[tokio::test]
    async fn test_llm_evaluator_parses_verdict() {
        let mut server = Server::new_async().await;
        let verdict = json!({ "result": "pass", "violated_rule": null, "violated_item": null, "feedback": "" });
        let _mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_body(completion(&verdict.to_string()))
            .create_async()
            .await;

        let evaluator = LlmEvaluator::new(llm_for(format!("{}/v1/chat/completions", server.url())));
        let verdict = evaluator
            .evaluate(&ResumeDocument::default(), "Backend")
            .await
            .unwrap();
        assert!(verdict.passed());
        assert!(verdict.feedback.is_none());
    }
}
