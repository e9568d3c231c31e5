//! OpenAI-compatible chat completions backend
//!
//! Works with any gateway exposing `POST {base_url}/chat/completions` with
//! bearer authentication.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::LlmError;
use crate::http_client::{HttpClient, RetryPolicy};
use crate::types::{LlmBackend, LlmInvocation, LlmResult, Message};
use reelforge_config::Config;

const PROVIDER: &str = "openai-compatible";

/// Request parameters applied when the invocation does not override them
#[derive(Debug, Clone)]
pub struct HttpParams {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for HttpParams {
    fn default() -> Self {
        Self {
            max_tokens: 1200,
            temperature: 0.2,
        }
    }
}

/// OpenAI-compatible backend
#[derive(Clone)]
pub struct OpenAiCompatBackend {
    client: Arc<HttpClient>,
    endpoint: String,
    api_key: String,
    default_model: String,
    default_params: HttpParams,
}

impl std::fmt::Debug for OpenAiCompatBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatBackend")
            .field("endpoint", &self.endpoint)
            .field("default_model", &self.default_model)
            .finish_non_exhaustive()
    }
}

/// Chat completions URL for a base URL; a full endpoint is kept as is
#[must_use]
pub fn chat_endpoint(base_url: &str) -> String {
    let trimmed = base_url.trim_end_matches('/');
    if trimmed.ends_with("/chat/completions") {
        trimmed.to_string()
    } else {
        format!("{trimmed}/chat/completions")
    }
}

impl OpenAiCompatBackend {
    /// Create a backend for an explicit endpoint
    pub fn new(
        client: Arc<HttpClient>,
        base_url: &str,
        api_key: String,
        default_model: String,
        default_params: HttpParams,
    ) -> Self {
        Self {
            client,
            endpoint: chat_endpoint(base_url),
            api_key,
            default_model,
            default_params,
        }
    }

    /// Create a backend from the `[llm]` configuration section
    ///
    /// # Errors
    ///
    /// Returns `LlmError::Misconfiguration` if the API key environment
    /// variable is unset or empty, or the HTTP client cannot be built.
    pub fn new_from_config(config: &Config) -> Result<Self, LlmError> {
        let api_key_env = config.llm_api_key_env();
        let api_key = std::env::var(api_key_env)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| {
                LlmError::Misconfiguration(format!(
                    "API key not found in environment variable '{api_key_env}'. \
                     Set it or configure a different api_key_env in [llm]."
                ))
            })?;

        let client = HttpClient::with_policy(RetryPolicy::with_attempts(config.llm_max_retries()))?;
        let params = HttpParams {
            max_tokens: config.llm_max_tokens(),
            temperature: config.llm_temperature(),
        };

        Ok(Self::new(
            Arc::new(client),
            config.llm_base_url(),
            api_key,
            config.llm_model().to_string(),
            params,
        ))
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Model and sampling parameters for `inv`, falling back to the
    /// backend defaults for anything it leaves unset
    fn resolve_params(&self, inv: &LlmInvocation) -> (String, HttpParams) {
        let model = inv
            .model
            .clone()
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| self.default_model.clone());
        let params = HttpParams {
            max_tokens: inv.max_tokens.unwrap_or(self.default_params.max_tokens),
            temperature: inv.temperature.unwrap_or(self.default_params.temperature),
        };
        (model, params)
    }

    fn convert_messages(messages: &[Message]) -> Vec<ChatMessage<'_>> {
        messages
            .iter()
            .map(|msg| ChatMessage {
                role: msg.role.into(),
                content: &msg.content,
            })
            .collect()
    }
}

#[async_trait]
impl LlmBackend for OpenAiCompatBackend {
    fn provider(&self) -> &str {
        PROVIDER
    }

    async fn invoke(&self, inv: LlmInvocation) -> Result<LlmResult, LlmError> {
        let (model, params) = self.resolve_params(&inv);

        debug!(
            provider = PROVIDER,
            model = %model,
            max_tokens = params.max_tokens,
            temperature = params.temperature,
            timeout_secs = inv.timeout.as_secs(),
            "Invoking chat completion"
        );

        let body = ChatRequest {
            model: &model,
            messages: Self::convert_messages(&inv.messages),
            max_tokens: params.max_tokens,
            temperature: params.temperature,
            stream: false,
        };

        let request = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body);

        let response = self
            .client
            .execute_with_retry(request, inv.timeout, PROVIDER)
            .await?;

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Transport(format!("Failed to parse chat response: {e}")))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                LlmError::Transport("Chat response missing choices[0].message.content".to_string())
            })?;

        let mut result = LlmResult::new(content, PROVIDER, parsed.model.unwrap_or(model));
        if let Some(usage) = parsed.usage {
            result = result.with_usage(usage.prompt_tokens, usage.completion_tokens);
        }

        debug!(
            provider = PROVIDER,
            usage = ?result.usage,
            "Chat completion finished"
        );

        Ok(result)
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    model: Option<String>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u64,
    completion_tokens: u64,
}
