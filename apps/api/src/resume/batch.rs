//! Splits a large project list into fixed-size batches, generates each batch
//! concurrently and merges the partial drafts back in input order.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::try_join_all;
use tracing::{info, warn};

use crate::github::{RepoContext, UserStats};
use crate::resume::gateway::{GenerateError, GenerationInput, GenerativeGateway};
use crate::resume::models::{ProjectInfo, ResumeDocument};

/// Shared inputs that do not vary per batch.
#[derive(Debug, Clone, Copy)]
pub struct GenerationRequest<'a> {
    pub position: &'a str,
    pub company: Option<&'a str>,
    pub contexts: &'a HashMap<String, RepoContext>,
    pub user_stats: Option<UserStats>,
    pub feedback: Option<&'a str>,
}

#[derive(Clone)]
pub struct BatchedGenerator {
    gateway: Arc<dyn GenerativeGateway>,
    batch_size: usize,
}

impl BatchedGenerator {
    pub fn new(gateway: Arc<dyn GenerativeGateway>, batch_size: usize) -> Self {
        Self {
            gateway,
            batch_size: batch_size.max(1),
        }
    }

    /// One gateway call when the list fits in a batch; otherwise one call per
    /// contiguous chunk, all in flight together. Any failed batch fails the
    /// whole generation.
    pub async fn generate(
        &self,
        projects: &[ProjectInfo],
        request: GenerationRequest<'_>,
    ) -> Result<ResumeDocument, GenerateError> {
        if projects.len() <= self.batch_size {
            let input = batch_input(projects, &request, true);
            return self.gateway.generate(&input).await;
        }

        let inputs: Vec<GenerationInput> = projects
            .chunks(self.batch_size)
            .enumerate()
            .map(|(index, chunk)| batch_input(chunk, &request, index == 0))
            .collect();
        info!(
            "Generating {} projects in {} batches of up to {}",
            projects.len(),
            inputs.len(),
            self.batch_size
        );

        let parts = try_join_all(inputs.iter().map(|input| self.gateway.generate(input))).await?;
        let merged = ResumeDocument::merge(parts);

        if merged.projects.len() != projects.len() {
            warn!(
                "Merged draft has {} projects, expected {}",
                merged.projects.len(),
                projects.len()
            );
        }
        Ok(merged)
    }
}

/// Each batch sees only its own repositories' contexts and URLs. Account-wide
/// stats go to the first batch only.
fn batch_input(
    projects: &[ProjectInfo],
    request: &GenerationRequest<'_>,
    include_stats: bool,
) -> GenerationInput {
    GenerationInput {
        projects: projects.to_vec(),
        position: request.position.to_string(),
        company: request.company.map(str::to_string),
        repo_urls: projects.iter().map(|p| p.repo_url.clone()).collect(),
        repo_contexts: projects
            .iter()
            .filter_map(|p| request.contexts.get(&p.repo_name).cloned())
            .collect(),
        user_stats: request.user_stats.filter(|_| include_stats),
        feedback: request.feedback.map(str::to_string),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resume::models::DraftProjectEntry;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Echoes one draft entry per input project and records every call.
    #[derive(Default)]
    struct RecordingGateway {
        calls: Mutex<Vec<GenerationInput>>,
        fail_on_url: Option<String>,
    }

    #[async_trait]
    impl GenerativeGateway for RecordingGateway {
        async fn generate(
            &self,
            input: &GenerationInput,
        ) -> Result<ResumeDocument, GenerateError> {
            self.calls.lock().unwrap().push(input.clone());
            if let Some(url) = &self.fail_on_url {
                if input.repo_urls.contains(url) {
                    return Err(GenerateError::Provider("boom".to_string()));
                }
            }
            Ok(ResumeDocument {
                tech_stack: input.projects.iter().map(|p| format!("{}-tech", p.repo_name)).collect(),
                projects: input
                    .projects
                    .iter()
                    .map(|p| DraftProjectEntry {
                        name: p.repo_name.clone(),
                        repo_url: p.repo_url.clone(),
                        description: "- Built it".to_string(),
                        tech_stack: vec![],
                    })
                    .collect(),
            })
        }
    }

    fn projects(count: usize) -> Vec<ProjectInfo> {
        (0..count)
            .map(|i| ProjectInfo {
                repo_name: format!("repo{i}"),
                repo_url: format!("https://github.com/o/repo{i}"),
                file_tree: vec![],
                dependencies: vec![],
                messages: vec![],
            })
            .collect()
    }

    fn contexts(count: usize) -> HashMap<String, RepoContext> {
        (0..count)
            .map(|i| {
                let name = format!("repo{i}");
                (name.clone(), RepoContext::empty(&name))
            })
            .collect()
    }

    fn request<'a>(contexts: &'a HashMap<String, RepoContext>) -> GenerationRequest<'a> {
        GenerationRequest {
            position: "Backend",
            company: None,
            contexts,
            user_stats: Some(UserStats {
                total_commits: 100,
                total_prs: 10,
                total_issues: 2,
            }),
            feedback: Some("shorter bullets"),
        }
    }

    #[tokio::test]
    async fn test_small_list_is_a_single_call() {
        let gateway = Arc::new(RecordingGateway::default());
        let generator = BatchedGenerator::new(gateway.clone(), 3);
        let ctx = contexts(3);

        let document = generator.generate(&projects(3), request(&ctx)).await.unwrap();

        let calls = gateway.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].repo_contexts.len(), 3);
        assert!(calls[0].user_stats.is_some());
        assert_eq!(document.projects.len(), 3);
    }

    #[tokio::test]
    async fn test_seven_projects_in_batches_of_three() {
        let gateway = Arc::new(RecordingGateway::default());
        let generator = BatchedGenerator::new(gateway.clone(), 3);
        let ctx = contexts(7);

        let document = generator.generate(&projects(7), request(&ctx)).await.unwrap();

        let calls = gateway.calls.lock().unwrap();
        let mut sizes: Vec<usize> = calls.iter().map(|c| c.projects.len()).collect();
        sizes.sort_unstable();
        assert_eq!(sizes, vec![1, 3, 3]);

        for call in calls.iter() {
            let context_names: Vec<_> = call.repo_contexts.iter().map(|c| c.name.clone()).collect();
            let project_names: Vec<_> = call.projects.iter().map(|p| p.repo_name.clone()).collect();
            assert_eq!(context_names, project_names);
            assert_eq!(call.feedback.as_deref(), Some("shorter bullets"));
            assert_eq!(
                call.user_stats.is_some(),
                call.repo_urls[0] == "https://github.com/o/repo0"
            );
        }

        let names: Vec<_> = document.projects.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["repo0", "repo1", "repo2", "repo3", "repo4", "repo5", "repo6"]
        );
        assert_eq!(document.tech_stack.len(), 7);
        assert_eq!(document.tech_stack[0], "repo0-tech");
    }

    #[tokio::test]
    async fn test_one_failed_batch_fails_generation() {
        let gateway = Arc::new(RecordingGateway {
            calls: Mutex::new(Vec::new()),
            fail_on_url: Some("https://github.com/o/repo4".to_string()),
        });
        let generator = BatchedGenerator::new(gateway, 2);
        let ctx = contexts(5);

        let err = generator.generate(&projects(5), request(&ctx)).await.unwrap_err();
        assert!(matches!(err, GenerateError::Provider(_)));
    }
}
