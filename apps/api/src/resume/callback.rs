//! CallbackClient: delivers each job's terminal outcome to the caller's
//! backend, once, with bounded exponential backoff.

use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::CallbackSettings;
use crate::errors::ErrorCode;
use crate::resume::models::ResumeDocument;
use crate::resume::workflow::JobFailure;

#[derive(Debug, Error)]
pub enum CallbackError {
    #[error("Callback endpoint returned HTTP {0}")]
    Status(u16),

    #[error("Callback request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Callback delivery failed after {attempts} attempts: {last}")]
    Exhausted { attempts: usize, last: String },
}

impl CallbackError {
    pub fn code(&self) -> ErrorCode {
        ErrorCode::CallbackDeliveryFailed
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Payload
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackPayload {
    pub job_id: Uuid,
    #[serde(flatten)]
    pub outcome: CallbackOutcome,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum CallbackOutcome {
    Success { resume: ResumePayload },
    Failed { error: ErrorPayload },
}

#[derive(Debug, Serialize)]
pub struct ResumePayload {
    pub projects: Vec<ProjectPayload>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectPayload {
    pub name: String,
    pub repo_url: String,
    pub description: String,
    pub tech_stack: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorPayload {
    pub code: ErrorCode,
    pub message: String,
}

impl CallbackPayload {
    pub fn new(job_id: Uuid, outcome: Result<ResumeDocument, JobFailure>) -> Self {
        let outcome = match outcome {
            Ok(document) => CallbackOutcome::Success {
                resume: ResumePayload {
                    projects: document
                        .projects
                        .into_iter()
                        .map(|p| ProjectPayload {
                            name: p.name,
                            repo_url: p.repo_url,
                            description: p.description,
                            tech_stack: p.tech_stack,
                        })
                        .collect(),
                },
            },
            Err(failure) => CallbackOutcome::Failed {
                error: ErrorPayload {
                    code: failure.code,
                    message: failure.message,
                },
            },
        };
        Self { job_id, outcome }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Client
// ────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct CallbackClient {
    client: Client,
    default_url: Option<String>,
    /// Wait before attempt k+2 is `delays[k]`; one entry fewer than attempts.
    delays: Vec<Duration>,
}

impl CallbackClient {
    pub fn new(settings: &CallbackSettings) -> Self {
        let delays = (0..settings.max_attempts.saturating_sub(1))
            .map(|k| settings.base_delay * 2u32.saturating_pow(k))
            .collect();
        Self {
            client: Client::builder()
                .timeout(settings.timeout)
                .build()
                .expect("Failed to build HTTP client"),
            default_url: settings.default_url.clone(),
            delays,
        }
    }

    /// The request's own URL wins; otherwise the configured default.
    pub fn resolve_url(&self, requested: Option<&str>) -> Option<String> {
        requested
            .filter(|url| !url.trim().is_empty())
            .map(str::to_string)
            .or_else(|| self.default_url.clone())
    }

    pub async fn deliver(&self, url: &str, payload: &CallbackPayload) -> Result<(), CallbackError> {
        let attempts = self.delays.len() + 1;
        let mut last_error = None;

        for attempt in 1..=attempts {
            match self.send_once(url, payload).await {
                Ok(()) => {
                    info!("Callback delivered for job {} (attempt {attempt})", payload.job_id);
                    return Ok(());
                }
                Err(e) => {
                    warn!("Callback attempt {attempt}/{attempts} failed: {e}");
                    last_error = Some(e);
                }
            }
            if let Some(delay) = self.delays.get(attempt - 1) {
                tokio::time::sleep(*delay).await;
            }
        }

        Err(CallbackError::Exhausted {
            attempts,
            last: last_error.map(|e| e.to_string()).unwrap_or_default(),
        })
    }

    async fn send_once(&self, url: &str, payload: &CallbackPayload) -> Result<(), CallbackError> {
        let response = self.client.post(url).json(payload).send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(CallbackError::Status(status.as_u16()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resume::models::DraftProjectEntry;
    use mockito::{Matcher, Server};
    use serde_json::json;

    fn settings(max_attempts: u32) -> CallbackSettings {
        CallbackSettings {
            default_url: Some("http://backend.local/callback".to_string()),
            timeout: Duration::from_secs(5),
            max_attempts,
            base_delay: Duration::from_millis(1),
        }
    }

    fn success_payload(job_id: Uuid) -> CallbackPayload {
        CallbackPayload::new(
            job_id,
            Ok(ResumeDocument {
                tech_stack: vec!["Go".to_string()],
                projects: vec![DraftProjectEntry {
                    name: "queue".to_string(),
                    repo_url: "https://github.com/o/queue".to_string(),
                    description: "- Built a worker pool".to_string(),
                    tech_stack: vec!["Go".to_string(), "Redis".to_string()],
                }],
            }),
        )
    }

    #[test]
    fn test_backoff_delays_double() {
        let mut s = settings(4);
        s.base_delay = Duration::from_secs(1);
        let client = CallbackClient::new(&s);
        assert_eq!(
            client.delays,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4)
            ]
        );
    }

    #[test]
    fn test_success_payload_shape() {
        let job_id = Uuid::new_v4();
        let value = serde_json::to_value(success_payload(job_id)).unwrap();
        assert_eq!(
            value,
            json!({
                "jobId": job_id.to_string(),
                "status": "success",
                "resume": {
                    "projects": [{
                        "name": "queue",
                        "repoUrl": "https://github.com/o/queue",
                        "description": "- Built a worker pool",
                        "techStack": ["Go", "Redis"]
                    }]
                }
            })
        );
    }

    #[test]
    fn test_failure_payload_shape() {
        let job_id = Uuid::new_v4();
        let payload = CallbackPayload::new(
            job_id,
            Err(JobFailure::new(ErrorCode::WorkflowTimeout, "workflow exceeded 300 seconds")),
        );
        let value = serde_json::to_value(payload).unwrap();
        assert_eq!(value["status"], "failed");
        assert_eq!(value["error"]["code"], "WORKFLOW_TIMEOUT");
        assert!(value.get("resume").is_none());
    }

    #[test]
    fn test_resolve_url_prefers_request() {
        let client = CallbackClient::new(&settings(1));
        assert_eq!(
            client.resolve_url(Some("http://caller/cb")).as_deref(),
            Some("http://caller/cb")
        );
        assert_eq!(
            client.resolve_url(Some("  ")).as_deref(),
            Some("http://backend.local/callback")
        );
    }

    #[tokio::test]
    async fn test_deliver_posts_once_on_success() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/callback")
            .match_body(Matcher::PartialJson(json!({ "status": "success" })))
            .with_status(200)
            .expect(1)
            .create_async()
            .await;

        let client = CallbackClient::new(&settings(3));
        let url = format!("{}/callback", server.url());
        client
            .deliver(&url, &success_payload(Uuid::new_v4()))
            .await
            .unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_deliver_gives_up_after_max_attempts() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/callback")
            .with_status(502)
            .expect(3)
            .create_async()
            .await;

        let client = CallbackClient::new(&settings(3));
        let url = format!("{}/callback", server.url());
        let err = client
            .deliver(&url, &success_payload(Uuid::new_v4()))
            .await
            .unwrap_err();

        mock.assert_async().await;
        assert_eq!(err.code(), ErrorCode::CallbackDeliveryFailed);
        match err {
            CallbackError::Exhausted { attempts, last } => {
                assert_eq!(attempts, 3);
                assert!(last.contains("502"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
