mod config;
mod errors;
mod github;
mod llm_client;
mod resume;
mod routes;
mod state;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::github::GitHubClient;
use crate::llm_client::LlmClient;
use crate::resume::callback::CallbackClient;
use crate::resume::gateway::{LlmEvaluator, LlmGenerator};
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (malformed values abort startup)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting experience extractor v{} ({})",
        env!("CARGO_PKG_VERSION"),
        config.environment
    );

    // GitHub client: one connection pool for every job
    let github = GitHubClient::new(&config.github);
    info!(
        "GitHub client initialized (api: {}, fallback concurrency: {})",
        config.github.api_base, config.github.max_concurrent_requests
    );

    // Model gateways, configured independently
    let generator = LlmClient::new(config.generator.clone());
    info!(
        "Generator initialized (provider: {}, model: {})",
        generator.provider(),
        generator.model()
    );
    let evaluator = LlmClient::new(config.evaluator.clone());
    info!(
        "Evaluator initialized (provider: {}, model: {})",
        evaluator.provider(),
        evaluator.model()
    );

    let callback = CallbackClient::new(&config.callback);
    if config.callback.default_url.is_none() {
        info!("No BACKEND_CALLBACK_URL set; jobs without callbackUrl only log their result");
    }

    // Build app state
    let state = AppState {
        github,
        generator: Arc::new(LlmGenerator::new(generator)),
        evaluator: Arc::new(LlmEvaluator::new(evaluator)),
        callback,
        job_permits: Arc::new(Semaphore::new(config.max_concurrent_jobs)),
        config: config.clone(),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
