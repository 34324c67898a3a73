use std::sync::{Arc, OnceLock};

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::errors::{AppError, FieldError};
use crate::resume::callback::CallbackPayload;
use crate::resume::models::JobRequest;
use crate::resume::workflow::WorkflowOrchestrator;
use crate::state::AppState;

const MAX_REPO_URLS: usize = 10;

fn repo_url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^https://github\.com/[^/]+/[^/]+$").expect("valid URL pattern")
    })
}

/// Body of `POST /resume/generate`. Fields default so that missing values are
/// reported through field validation rather than a deserialization error.
/// `githubToken` must be present but may be empty.
#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerateRequest {
    pub repo_urls: Vec<String>,
    pub position: String,
    pub company: Option<String>,
    pub github_token: Option<String>,
    pub callback_url: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateAccepted {
    pub job_id: Uuid,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl GenerateRequest {
    fn validate(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();

        if self.repo_urls.is_empty() {
            errors.push(FieldError::new("repoUrls", "at least one repository URL is required"));
        } else if self.repo_urls.len() > MAX_REPO_URLS {
            errors.push(FieldError::new(
                "repoUrls",
                format!("at most {MAX_REPO_URLS} repository URLs are allowed"),
            ));
        }
        for (i, url) in self.repo_urls.iter().enumerate() {
            if !repo_url_pattern().is_match(url.trim()) {
                errors.push(FieldError::new(
                    format!("repoUrls[{i}]"),
                    "must look like https://github.com/owner/repo",
                ));
            }
        }

        if self.position.trim().is_empty() {
            errors.push(FieldError::new("position", "must not be empty"));
        }

        if self.github_token.is_none() {
            errors.push(FieldError::new("githubToken", "is required (may be empty)"));
        }

        if let Some(url) = self.callback_url.as_deref().filter(|u| !u.trim().is_empty()) {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                errors.push(FieldError::new("callbackUrl", "must be an http(s) URL"));
            }
        }

        errors
    }

    /// Validates and normalizes into a job. Blank optional strings become absent.
    fn into_job_request(self) -> Result<JobRequest, AppError> {
        let errors = self.validate();
        if !errors.is_empty() {
            return Err(AppError::InvalidInput(errors));
        }

        Ok(JobRequest {
            repo_urls: self.repo_urls.iter().map(|u| u.trim().to_string()).collect(),
            position: self.position.trim().to_string(),
            company: non_blank(self.company),
            github_token: non_blank(self.github_token),
            callback_url: non_blank(self.callback_url),
        })
    }
}

/// POST /resume/generate
/// Accepts the job, schedules it in the background and returns its id.
pub async fn handle_generate(
    State(state): State<AppState>,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<GenerateAccepted>), AppError> {
    let Json(body) =
        payload.map_err(|e| AppError::InvalidInput(vec![FieldError::new("body", e.body_text())]))?;

    let mut request = body.into_job_request()?;
    request.callback_url = state.callback.resolve_url(request.callback_url.as_deref());

    let job_id = Uuid::new_v4();
    info!(
        "Accepted job {job_id}: {} repositories for '{}'",
        request.repo_urls.len(),
        request.position
    );
    spawn_job(state, job_id, Arc::new(request));

    Ok((StatusCode::ACCEPTED, Json(GenerateAccepted { job_id })))
}

fn spawn_job(state: AppState, job_id: Uuid, request: Arc<JobRequest>) {
    let span = info_span!("job", job_id = %job_id);
    tokio::spawn(
        async move {
            let Ok(_permit) = state.job_permits.clone().acquire_owned().await else {
                error!("Job limiter closed, dropping job");
                return;
            };

            let orchestrator = WorkflowOrchestrator::new(
                Arc::new(state.github.for_job()),
                state.generator.clone(),
                state.evaluator.clone(),
                state.config.workflow.clone(),
            );
            let outcome = orchestrator.run(request.clone()).await;
            match &outcome {
                Ok(document) => info!("Job finished with {} projects", document.projects.len()),
                Err(failure) => warn!("Job failed: {failure}"),
            }

            let payload = CallbackPayload::new(job_id, outcome);
            match request.callback_url.as_deref() {
                Some(url) => {
                    if let Err(e) = state.callback.deliver(url, &payload).await {
                        error!("{}: {e}", e.code());
                    }
                }
                None => info!(
                    "No callback URL, result: {}",
                    serde_json::to_string(&payload).unwrap_or_default()
                ),
            }
        }
        .instrument(span),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(urls: &[&str], position: &str) -> GenerateRequest {
        GenerateRequest {
            repo_urls: urls.iter().map(|u| u.to_string()).collect(),
            position: position.to_string(),
            github_token: Some(String::new()),
            ..GenerateRequest::default()
        }
    }

    #[test]
    fn test_valid_request_normalizes_blank_optionals() {
        let mut request = body(&["https://github.com/o/api"], " Backend ");
        request.company = Some("  ".to_string());

        let job = request.into_job_request().unwrap();
        assert_eq!(job.position, "Backend");
        assert!(job.github_token.is_none());
        assert!(job.company.is_none());
    }

    #[test]
    fn test_rejects_bad_urls_with_index() {
        let errors = body(
            &["https://github.com/o/api", "https://github.com/o", "https://gitlab.com/o/x"],
            "Backend",
        )
        .validate();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["repoUrls[1]", "repoUrls[2]"]);
    }

    #[test]
    fn test_rejects_url_with_extra_path() {
        let errors = body(&["https://github.com/o/api/tree/main"], "Backend").validate();
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_rejects_empty_and_oversized_lists() {
        let empty = body(&[], "Backend").validate();
        assert_eq!(empty[0].field, "repoUrls");

        let urls: Vec<String> = (0..11).map(|i| format!("https://github.com/o/r{i}")).collect();
        let refs: Vec<&str> = urls.iter().map(String::as_str).collect();
        let oversized = body(&refs, "Backend").validate();
        assert_eq!(oversized.len(), 1);
        assert!(oversized[0].message.contains("at most 10"));
    }

    #[test]
    fn test_rejects_blank_position_and_bad_callback() {
        let mut request = body(&["https://github.com/o/api"], "   ");
        request.callback_url = Some("ftp://somewhere".to_string());
        let fields: Vec<_> = request.validate().into_iter().map(|e| e.field).collect();
        assert_eq!(fields, vec!["position".to_string(), "callbackUrl".to_string()]);
    }

    #[test]
    fn test_missing_token_is_a_field_error() {
        let mut request = body(&["https://github.com/o/api"], "Backend");
        request.github_token = None;
        let fields: Vec<_> = request.validate().into_iter().map(|e| e.field).collect();
        assert_eq!(fields, vec!["githubToken".to_string()]);
    }

    #[test]
    fn test_token_field_presence_from_json() {
        let missing: GenerateRequest = serde_json::from_value(serde_json::json!({
            "repoUrls": ["https://github.com/o/api"],
            "position": "Backend"
        }))
        .unwrap();
        assert!(missing.github_token.is_none());

        let empty: GenerateRequest = serde_json::from_value(serde_json::json!({
            "repoUrls": ["https://github.com/o/api"],
            "position": "Backend",
            "githubToken": ""
        }))
        .unwrap();
        assert!(empty.validate().is_empty());
        assert!(empty.into_job_request().unwrap().github_token.is_none());
    }
}
