use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::config::Config;
use crate::github::GitHubClient;
use crate::resume::callback::CallbackClient;
use crate::resume::gateway::{EvaluativeGateway, GenerativeGateway};

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    /// Shares one connection pool; each job takes its own limiter via `for_job`.
    pub github: GitHubClient,
    pub generator: Arc<dyn GenerativeGateway>,
    pub evaluator: Arc<dyn EvaluativeGateway>,
    pub callback: CallbackClient,
    /// Bounds the number of jobs running at once.
    pub job_permits: Arc<Semaphore>,
}
