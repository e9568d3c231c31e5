//! LLM backend abstraction
//!
//! Backends implement [`LlmBackend`]; the router only sees that trait. The
//! retrying [`HttpClient`] is shared with HTTP-based generation methods.

pub mod account;
mod http_client;
mod openai_compat;
mod types;

pub use account::{AccountReport, DEFAULT_MIN_BALANCE, check_account};
pub use http_client::{HttpClient, RetryPolicy};
pub use openai_compat::{HttpParams, OpenAiCompatBackend, chat_endpoint};
pub use reelforge_utils::error::LlmError;
pub use types::{LlmBackend, LlmInvocation, LlmResult, Message, Role, TokenUsage};

use reelforge_config::Config;
use std::sync::Arc;

/// Build the backend selected by `[llm] provider`.
///
/// Returns `Ok(None)` for provider `none`, meaning routing always uses the
/// configured fallback method.
///
/// # Errors
///
/// Returns `LlmError::Unsupported` for an unknown provider and
/// `LlmError::Misconfiguration` when the provider cannot be constructed
/// (for example a missing API key).
pub fn from_config(config: &Config) -> Result<Option<Arc<dyn LlmBackend>>, LlmError> {
    match config.llm_provider() {
        "none" => Ok(None),
        "openai-compatible" => {
            let backend = OpenAiCompatBackend::new_from_config(config)?;
            Ok(Some(Arc::new(backend)))
        }
        other => Err(LlmError::Unsupported(format!(
            "Unknown LLM provider '{other}'"
        ))),
    }
}
