/// LLM Client: the single point of entry for all model calls in the extractor.
///
/// ARCHITECTURAL RULE: No other module may call a model provider directly.
/// The generative and evaluative gateways each own one `LlmClient`, configured
/// independently through `LlmSettings`.
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

pub mod prompts;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";
const MAX_TOKENS: u32 = 4096;
const MAX_RETRIES: u32 = 3;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Rate limited after {retries} retries")]
    RateLimited { retries: u32 },

    #[error("LLM returned empty content")]
    EmptyContent,
}

impl LlmError {
    /// True when the provider could not be reached or refused the call,
    /// as opposed to answering with output we could not use.
    pub fn is_provider_failure(&self) -> bool {
        matches!(
            self,
            LlmError::Http(_) | LlmError::Api { .. } | LlmError::RateLimited { .. }
        )
    }
}

/// Which wire protocol a client speaks. `Vllm` is an OpenAI-compatible server
/// reached through `LlmSettings::base_url`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    OpenAi,
    Vllm,
    Anthropic,
}

impl LlmProvider {
    /// Conventional environment variable holding this provider's key.
    pub fn default_key_var(self) -> Option<&'static str> {
        match self {
            LlmProvider::OpenAi => Some("OPENAI_API_KEY"),
            LlmProvider::Anthropic => Some("ANTHROPIC_API_KEY"),
            LlmProvider::Vllm => None,
        }
    }
}

impl FromStr for LlmProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(LlmProvider::OpenAi),
            "vllm" => Ok(LlmProvider::Vllm),
            "anthropic" | "claude" => Ok(LlmProvider::Anthropic),
            other => Err(format!("unsupported LLM provider '{other}'")),
        }
    }
}

impl fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LlmProvider::OpenAi => "openai",
            LlmProvider::Vllm => "vllm",
            LlmProvider::Anthropic => "anthropic",
        };
        f.write_str(name)
    }
}

/// Provider selection for one gateway.
#[derive(Clone)]
pub struct LlmSettings {
    pub provider: LlmProvider,
    pub model: String,
    pub api_key: String,
    /// Full endpoint override. Required for `Vllm`.
    pub base_url: Option<String>,
    pub timeout: Duration,
}

impl LlmSettings {
    pub fn requires_key_but_missing(&self) -> bool {
        self.provider != LlmProvider::Vllm && self.api_key.is_empty()
    }

    fn endpoint(&self) -> String {
        if let Some(url) = &self.base_url {
            return url.clone();
        }
        match self.provider {
            LlmProvider::Anthropic => ANTHROPIC_API_URL.to_string(),
            LlmProvider::OpenAi | LlmProvider::Vllm => OPENAI_API_URL.to_string(),
        }
    }
}

// Keys stay out of logs.
impl fmt::Debug for LlmSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmSettings")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("api_key", &if self.api_key.is_empty() { "<unset>" } else { "<redacted>" })
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
    usage: Option<AnthropicUsage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

/// Provider-neutral response: the first text block plus token usage.
#[derive(Debug)]
pub struct LlmResponse {
    pub text: Option<String>,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl From<AnthropicResponse> for LlmResponse {
    fn from(response: AnthropicResponse) -> Self {
        let text = response
            .content
            .into_iter()
            .find(|b| b.block_type == "text")
            .and_then(|b| b.text);
        let (input_tokens, output_tokens) = response
            .usage
            .map(|u| (u.input_tokens, u.output_tokens))
            .unwrap_or_default();
        Self {
            text,
            input_tokens,
            output_tokens,
        }
    }
}

impl From<OpenAiResponse> for LlmResponse {
    fn from(response: OpenAiResponse) -> Self {
        let text = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content);
        let (input_tokens, output_tokens) = response
            .usage
            .map(|u| (u.prompt_tokens, u.completion_tokens))
            .unwrap_or_default();
        Self {
            text,
            input_tokens,
            output_tokens,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProviderError {
    error: ProviderErrorBody,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    message: String,
}

/// Wraps a provider's chat API with retry logic and structured output helpers.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    settings: LlmSettings,
    endpoint: String,
}

impl LlmClient {
    pub fn new(settings: LlmSettings) -> Self {
        Self {
            client: Client::builder()
                .timeout(settings.timeout)
                .build()
                .expect("Failed to build HTTP client"),
            endpoint: settings.endpoint(),
            settings,
        }
    }

    pub fn model(&self) -> &str {
        &self.settings.model
    }

    pub fn provider(&self) -> LlmProvider {
        self.settings.provider
    }

    /// Makes a raw call to the configured provider.
    /// Retries on 429 (rate limit) and 5xx errors with exponential backoff.
    pub async fn call(&self, prompt: &str, system: &str) -> Result<LlmResponse, LlmError> {
        let mut last_error: Option<LlmError> = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s
                let delay = Duration::from_millis(1000 * (1 << (attempt - 1)));
                warn!(
                    "LLM call attempt {} failed, retrying after {}ms...",
                    attempt,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            let response = match self.build_request(prompt, system).send().await {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(LlmError::Http(e));
                    continue;
                }
            };

            let status = response.status();

            if status.as_u16() == 429 || status.is_server_error() {
                let body = response.text().await.unwrap_or_default();
                warn!("LLM API returned {}: {}", status, body);
                last_error = Some(LlmError::Api {
                    status: status.as_u16(),
                    message: body,
                });
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                let message = serde_json::from_str::<ProviderError>(&body)
                    .map(|e| e.error.message)
                    .unwrap_or(body);
                return Err(LlmError::Api {
                    status: status.as_u16(),
                    message,
                });
            }

            let llm_response: LlmResponse = match self.settings.provider {
                LlmProvider::Anthropic => response.json::<AnthropicResponse>().await?.into(),
                LlmProvider::OpenAi | LlmProvider::Vllm => {
                    response.json::<OpenAiResponse>().await?.into()
                }
            };

            debug!(
                "LLM call succeeded: provider={}, model={}, input_tokens={}, output_tokens={}",
                self.settings.provider,
                self.settings.model,
                llm_response.input_tokens,
                llm_response.output_tokens
            );

            return Ok(llm_response);
        }

        Err(last_error.unwrap_or(LlmError::RateLimited {
            retries: MAX_RETRIES,
        }))
    }

    /// Calls the model and deserializes the text response as JSON.
    /// The prompt must instruct the model to return valid JSON.
    pub async fn call_json<T: DeserializeOwned>(
        &self,
        prompt: &str,
        system: &str,
    ) -> Result<T, LlmError> {
        let response = self.call(prompt, system).await?;

        let text = response.text.as_deref().ok_or(LlmError::EmptyContent)?;
        let text = strip_json_fences(text);
        if text.is_empty() {
            return Err(LlmError::EmptyContent);
        }

        serde_json::from_str(text).map_err(LlmError::Parse)
    }

    fn build_request(&self, prompt: &str, system: &str) -> reqwest::RequestBuilder {
        let model = self.settings.model.as_str();
        match self.settings.provider {
            LlmProvider::Anthropic => self
                .client
                .post(&self.endpoint)
                .header("x-api-key", &self.settings.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .header("content-type", "application/json")
                .json(&AnthropicRequest {
                    model,
                    max_tokens: MAX_TOKENS,
                    system,
                    messages: vec![ChatMessage {
                        role: "user",
                        content: prompt,
                    }],
                }),
            LlmProvider::OpenAi | LlmProvider::Vllm => {
                let request = self.client.post(&self.endpoint).json(&OpenAiRequest {
                    model,
                    messages: vec![
                        ChatMessage {
                            role: "system",
                            content: system,
                        },
                        ChatMessage {
                            role: "user",
                            content: prompt,
                        },
                    ],
                    response_format: ResponseFormat {
                        kind: "json_object",
                    },
                });
                if self.settings.api_key.is_empty() {
                    request
                } else {
                    request.bearer_auth(&self.settings.api_key)
                }
            }
        }
    }
}

/// Strips ```json ... ``` or ``` ... ``` code fences from LLM output.
fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    if let Some(stripped) = text.strip_prefix("```json") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else if let Some(stripped) = text.strip_prefix("```") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else {
        text
    }
}
