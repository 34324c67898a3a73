//! WorkflowOrchestrator: the per-job state machine.
//!
//! Collecting → Generating → Evaluating → { Generating | Done }, with Failed
//! reachable from Collecting and Generating. The whole run sits inside one
//! timeout; when it fires every in-flight future is dropped and no partial
//! draft escapes.

use std::sync::Arc;

use thiserror::Error;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::config::WorkflowSettings;
use crate::errors::ErrorCode;
use crate::github::{parse_repo_url, RepositorySource};
use crate::resume::batch::{BatchedGenerator, GenerationRequest};
use crate::resume::collector::{
    collect_project_info, collect_repo_contexts, collect_user_stats, dedupe_urls, CollectedData,
};
use crate::resume::dependencies::{DependencyExtractor, ManifestDependencyExtractor};
use crate::resume::gateway::{EvaluativeGateway, GenerativeGateway};
use crate::resume::models::{EvaluationVerdict, JobRequest, ResumeDocument};
use crate::resume::positions::validate_position_match;

/// Terminal failure of a job, as reported through the callback.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{code}: {message}")]
pub struct JobFailure {
    pub code: ErrorCode,
    pub message: String,
}

impl JobFailure {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// One job's progress. Each variant holds only what that phase needs.
#[derive(Debug)]
enum WorkflowState {
    Collecting {
        request: Arc<JobRequest>,
    },
    Generating {
        request: Arc<JobRequest>,
        collected: CollectedData,
        /// Generation calls made so far.
        attempts: u32,
        feedback: Option<String>,
    },
    Evaluating {
        request: Arc<JobRequest>,
        collected: CollectedData,
        attempts: u32,
        draft: ResumeDocument,
    },
    Done(ResumeDocument),
    Failed(JobFailure),
}

pub struct WorkflowOrchestrator {
    source: Arc<dyn RepositorySource>,
    extractor: Arc<dyn DependencyExtractor>,
    generator: BatchedGenerator,
    evaluator: Arc<dyn EvaluativeGateway>,
    settings: WorkflowSettings,
}

impl WorkflowOrchestrator {
    pub fn new(
        source: Arc<dyn RepositorySource>,
        generator: Arc<dyn GenerativeGateway>,
        evaluator: Arc<dyn EvaluativeGateway>,
        settings: WorkflowSettings,
    ) -> Self {
        Self {
            source,
            extractor: Arc::new(ManifestDependencyExtractor),
            generator: BatchedGenerator::new(generator, settings.batch_size),
            evaluator,
            settings,
        }
    }

    /// Replaces the manifest extractor used during collection.
    pub fn with_extractor(mut self, extractor: Arc<dyn DependencyExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// Runs one job to completion or to the timeout.
    pub async fn run(&self, request: Arc<JobRequest>) -> Result<ResumeDocument, JobFailure> {
        match timeout(self.settings.timeout, self.drive(request)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!("Workflow timed out after {:?}", self.settings.timeout);
                Err(JobFailure::new(
                    ErrorCode::WorkflowTimeout,
                    format!(
                        "workflow exceeded {} seconds",
                        self.settings.timeout.as_secs()
                    ),
                ))
            }
        }
    }

    async fn drive(&self, request: Arc<JobRequest>) -> Result<ResumeDocument, JobFailure> {
        let mut state = WorkflowState::Collecting { request };
        loop {
            state = match state {
                WorkflowState::Done(document) => return Ok(document),
                WorkflowState::Failed(failure) => return Err(failure),
                active => self.step(active).await,
            };
        }
    }

    async fn step(&self, state: WorkflowState) -> WorkflowState {
        match state {
            WorkflowState::Collecting { request } => match self.collect(&request).await {
                Ok(collected) => WorkflowState::Generating {
                    request,
                    collected,
                    attempts: 0,
                    feedback: None,
                },
                Err(failure) => WorkflowState::Failed(failure),
            },

            WorkflowState::Generating {
                request,
                collected,
                attempts,
                feedback,
            } => {
                info!(
                    "Generating draft (attempt {} of {})",
                    attempts + 1,
                    self.settings.max_retries
                );
                let result = self
                    .generator
                    .generate(
                        &collected.projects,
                        GenerationRequest {
                            position: &request.position,
                            company: request.company.as_deref(),
                            contexts: &collected.contexts,
                            user_stats: collected.user_stats,
                            feedback: feedback.as_deref(),
                        },
                    )
                    .await;

                match result {
                    Ok(draft) => WorkflowState::Evaluating {
                        request,
                        collected,
                        attempts: attempts + 1,
                        draft,
                    },
                    Err(e) => {
                        warn!("Generation failed: {e}");
                        WorkflowState::Failed(JobFailure::new(e.code(), e.to_string()))
                    }
                }
            }

            WorkflowState::Evaluating {
                request,
                collected,
                attempts,
                draft,
            } => {
                // Fail-open: an unreachable or confused evaluator never blocks delivery.
                let verdict = match self.evaluator.evaluate(&draft, &request.position).await {
                    Ok(verdict) => verdict,
                    Err(e) => {
                        warn!("Evaluation failed, accepting draft: {e}");
                        EvaluationVerdict::pass_without_feedback()
                    }
                };

                if verdict.passed() {
                    info!("Draft passed evaluation after {attempts} generation(s)");
                    WorkflowState::Done(draft)
                } else if attempts >= self.settings.max_retries {
                    warn!("Retry budget exhausted after {attempts} generation(s), accepting last draft");
                    WorkflowState::Done(draft)
                } else {
                    info!(
                        "Draft failed evaluation (rule {}), regenerating",
                        verdict.violated_rule.as_deref().unwrap_or("unspecified")
                    );
                    WorkflowState::Generating {
                        request,
                        collected,
                        attempts,
                        feedback: verdict.retry_feedback(),
                    }
                }
            }

            terminal @ (WorkflowState::Done(_) | WorkflowState::Failed(_)) => terminal,
        }
    }

    async fn collect(&self, request: &JobRequest) -> Result<CollectedData, JobFailure> {
        for url in &request.repo_urls {
            parse_repo_url(url).map_err(|e| JobFailure::new(e.code(), e.to_string()))?;
        }
        let urls = dedupe_urls(&request.repo_urls);
        if urls.is_empty() {
            return Err(JobFailure::new(
                ErrorCode::InvalidInput,
                "no repository URLs supplied",
            ));
        }

        let source = self.source.as_ref();
        let token = request.token();
        let ((projects, failures), contexts, user_stats) = tokio::join!(
            collect_project_info(source, self.extractor.as_ref(), &urls, token),
            collect_repo_contexts(source, &urls, token),
            collect_user_stats(source, &urls, token),
        );

        if projects.is_empty() {
            let message = if failures.is_empty() {
                "no repository contains source files".to_string()
            } else {
                let reasons: Vec<String> = failures
                    .iter()
                    .map(|f| format!("{}: {}", f.repo_url, f.error))
                    .collect();
                format!("no repository could be collected ({})", reasons.join("; "))
            };
            return Err(JobFailure::new(ErrorCode::CollectDataFailed, message));
        }

        let dependencies: Vec<String> = projects
            .iter()
            .flat_map(|p| p.dependencies.iter().cloned())
            .collect();
        if let Some(mismatch) = validate_position_match(&request.position, &dependencies) {
            warn!("Position fit check: {mismatch}");
        }

        info!(
            "Collected {} of {} repositories",
            projects.len(),
            urls.len()
        );
        Ok(CollectedData {
            projects,
            contexts,
            user_stats,
        })
    }
}
