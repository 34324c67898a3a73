use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::llm_client::{LlmProvider, LlmSettings};

const DEFAULT_GITHUB_API_BASE: &str = "https://api.github.com";
const DEFAULT_GITHUB_GRAPHQL_URL: &str = "https://api.github.com/graphql";
const DEFAULT_GENERATOR_MODEL: &str = "gpt-5.2-codex";
const DEFAULT_EVALUATOR_MODEL: &str = "gpt-4o";

/// Application configuration loaded from environment variables.
/// Startup fails if a value is present but malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub rust_log: String,
    pub environment: String,
    pub github: GitHubSettings,
    pub generator: LlmSettings,
    pub evaluator: LlmSettings,
    pub callback: CallbackSettings,
    pub workflow: WorkflowSettings,
    pub max_concurrent_jobs: usize,
}

#[derive(Debug, Clone)]
pub struct GitHubSettings {
    pub api_base: String,
    pub graphql_url: String,
    pub timeout: Duration,
    pub max_concurrent_requests: usize,
    pub readme_max_length: usize,
}

#[derive(Debug, Clone)]
pub struct CallbackSettings {
    /// Fallback delivery address when a request carries no `callbackUrl`.
    pub default_url: Option<String>,
    pub timeout: Duration,
    pub max_attempts: u32,
    pub base_delay: Duration,
}

#[derive(Debug, Clone)]
pub struct WorkflowSettings {
    /// Upper bound on generation calls per job. Always at least 1.
    pub max_retries: u32,
    pub batch_size: usize,
    pub timeout: Duration,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            max_retries: 2,
            batch_size: 3,
            timeout: Duration::from_secs(300),
        }
    }
}

impl Default for GitHubSettings {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_GITHUB_API_BASE.to_string(),
            graphql_url: DEFAULT_GITHUB_GRAPHQL_URL.to_string(),
            timeout: Duration::from_secs(60),
            max_concurrent_requests: 5,
            readme_max_length: 2000,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let environment = env_or("ENVIRONMENT", "development".to_string())?;
        let llm_timeout = Duration::from_secs(env_or("LLM_TIMEOUT_SECS", 120u64)?);

        let generator = llm_from_env("GENERATOR", DEFAULT_GENERATOR_MODEL, llm_timeout)?;
        let evaluator = llm_from_env("EVALUATOR", DEFAULT_EVALUATOR_MODEL, llm_timeout)?;

        if environment.eq_ignore_ascii_case("production") && generator.requires_key_but_missing()
        {
            bail!("GENERATOR_API_KEY (or the provider's default key) is required in production");
        }

        Ok(Config {
            port: env_or("PORT", 8080u16).context("PORT must be a valid port number")?,
            rust_log: env_or("RUST_LOG", "info".to_string())?,
            environment,
            github: GitHubSettings {
                api_base: env_or("GITHUB_API_BASE", DEFAULT_GITHUB_API_BASE.to_string())?,
                graphql_url: env_or("GITHUB_GRAPHQL_URL", DEFAULT_GITHUB_GRAPHQL_URL.to_string())?,
                timeout: Duration::from_secs(env_or("GITHUB_TIMEOUT_SECS", 60u64)?),
                max_concurrent_requests: env_or("GITHUB_MAX_CONCURRENT_REQUESTS", 5usize)?.max(1),
                readme_max_length: env_or("README_MAX_LENGTH", 2000usize)?,
            },
            generator,
            evaluator,
            callback: CallbackSettings {
                default_url: optional_env("BACKEND_CALLBACK_URL"),
                timeout: Duration::from_secs(env_or("CALLBACK_TIMEOUT_SECS", 120u64)?),
                max_attempts: env_or("CALLBACK_MAX_RETRIES", 3u32)?.max(1),
                base_delay: Duration::from_millis(env_or("CALLBACK_RETRY_BASE_DELAY_MS", 1000u64)?),
            },
            workflow: WorkflowSettings {
                max_retries: env_or("WORKFLOW_MAX_RETRIES", 2u32)?.max(1),
                batch_size: env_or("WORKFLOW_BATCH_SIZE", 3usize)?.max(1),
                timeout: Duration::from_secs(env_or("WORKFLOW_TIMEOUT_SECS", 300u64)?),
            },
            max_concurrent_jobs: env_or("MAX_CONCURRENT_JOBS", 10usize)?.max(1),
        })
    }
}

/// Reads `{prefix}_PROVIDER`, `{prefix}_MODEL`, `{prefix}_API_KEY` and `{prefix}_BASE_URL`.
/// A missing key falls back to the provider's conventional variable.
fn llm_from_env(prefix: &str, default_model: &str, timeout: Duration) -> Result<LlmSettings> {
    let provider: LlmProvider = env_or(&format!("{prefix}_PROVIDER"), LlmProvider::OpenAi)?;
    let api_key = optional_env(&format!("{prefix}_API_KEY"))
        .or_else(|| provider.default_key_var().and_then(optional_env))
        .unwrap_or_default();

    Ok(LlmSettings {
        provider,
        model: env_or(&format!("{prefix}_MODEL"), default_model.to_string())?,
        api_key,
        base_url: optional_env(&format!("{prefix}_BASE_URL")),
        timeout,
    })
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match optional_env(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| anyhow::anyhow!("{e}"))
        .with_context(|| format!("Environment variable '{key}' has an invalid value: {raw}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_value_accepts_trimmed_numbers() {
        let value: u32 = parse_value("WORKFLOW_MAX_RETRIES", " 4 ").unwrap();
        assert_eq!(value, 4);
    }

    #[test]
    fn test_parse_value_names_the_variable_on_error() {
        let err = parse_value::<u16>("PORT", "eighty").unwrap_err();
        assert!(format!("{err:#}").contains("PORT"));
    }

    #[test]
    fn test_workflow_defaults() {
        let settings = WorkflowSettings::default();
        assert_eq!(settings.max_retries, 2);
        assert_eq!(settings.batch_size, 3);
        assert_eq!(settings.timeout, Duration::from_secs(300));
    }
}
