//! Request and response types shared by the LLM backends

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::LlmError;

/// Speaker of a chat message
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// A single completion request.
///
/// Unset sampling fields fall back to the backend's configured values.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmInvocation {
    /// Model override; the backend default when `None`
    pub model: Option<String>,
    /// Limit on each HTTP attempt
    pub timeout: Duration,
    pub messages: Vec<Message>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl LlmInvocation {
    #[must_use]
    pub fn new(timeout: Duration, messages: Vec<Message>) -> Self {
        Self {
            model: None,
            timeout,
            messages,
            max_tokens: None,
            temperature: None,
        }
    }

    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Override the sampling parameters for this request
    #[must_use]
    pub fn with_sampling(mut self, max_tokens: u32, temperature: f32) -> Self {
        self.max_tokens = Some(max_tokens);
        self.temperature = Some(temperature);
        self
    }
}

/// Token accounting reported by the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input: u64,
    pub output: u64,
}

/// Completion text plus provenance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmResult {
    pub raw_response: String,
    pub provider: String,
    /// Model the provider reports having used
    pub model_used: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

impl LlmResult {
    #[must_use]
    pub fn new(
        raw_response: impl Into<String>,
        provider: impl Into<String>,
        model_used: impl Into<String>,
    ) -> Self {
        Self {
            raw_response: raw_response.into(),
            provider: provider.into(),
            model_used: model_used.into(),
            usage: None,
        }
    }

    #[must_use]
    pub fn with_usage(mut self, input: u64, output: u64) -> Self {
        self.usage = Some(TokenUsage { input, output });
        self
    }
}

/// A chat-completion provider
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Provider name used in logs
    fn provider(&self) -> &str;

    /// Run one completion.
    ///
    /// # Errors
    ///
    /// `LlmError` for transport failures, provider rejections (auth, quota,
    /// outages) and timeouts.
    async fn invoke(&self, inv: LlmInvocation) -> Result<LlmResult, LlmError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_wire_names() {
        let role: &'static str = Role::Assistant.into();
        assert_eq!(role, "assistant");
        assert_eq!(
            serde_json::to_value(Message::system("x")).unwrap(),
            serde_json::json!({"role": "system", "content": "x"})
        );
    }

    #[test]
    fn test_invocation_defaults_defer_to_backend() {
        let inv = LlmInvocation::new(Duration::from_secs(3), vec![Message::user("hi")]);
        assert_eq!(inv.model, None);
        assert_eq!(inv.max_tokens, None);

        let inv = inv.with_model("m").with_sampling(16, 0.2);
        assert_eq!(inv.model.as_deref(), Some("m"));
        assert_eq!(inv.max_tokens, Some(16));
        assert_eq!(inv.temperature, Some(0.2));
    }
}
