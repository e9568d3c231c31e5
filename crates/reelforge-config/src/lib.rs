//! Configuration management for reelforge
//!
//! Hierarchical configuration with discovery and precedence CLI > file >
//! defaults. The TOML file (`.reelforge/config.toml`) has `[defaults]`,
//! `[router]`, `[llm]`, `[audio]` and free-form `[methods.<name>]` sections:
//!
//! ```toml
//! [defaults]
//! output_dir = "output"
//! concurrency = 2
//!
//! [router]
//! default_method = "subtitle_only"
//! confidence_threshold = 0.6
//!
//! [llm]
//! provider = "openai-compatible"
//! model = "deepseek-ai/DeepSeek-V3"
//!
//! [audio]
//! method = "tts"
//!
//! [methods.tts]
//! voice = "alloy"
//! ```

mod cli_args;
mod discovery;
mod model;
mod sources;
mod validation;

pub use cli_args::CliArgs;
pub use discovery::{CONFIG_DIR, CONFIG_FILE};
pub use model::*;
pub use validation::KNOWN_LLM_PROVIDERS;

use camino::Utf8PathBuf;
use std::time::Duration;

impl Config {
    /// Output root for per-line working directories
    #[must_use]
    pub fn output_dir(&self) -> Utf8PathBuf {
        Utf8PathBuf::from(
            self.defaults
                .output_dir
                .as_deref()
                .unwrap_or(DEFAULT_OUTPUT_DIR),
        )
    }

    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.defaults.concurrency.unwrap_or(DEFAULT_CONCURRENCY)
    }

    /// Hard timeout for a single stage invocation
    #[must_use]
    pub fn stage_timeout(&self) -> Duration {
        Duration::from_secs(
            self.defaults
                .stage_timeout_secs
                .unwrap_or(DEFAULT_STAGE_TIMEOUT_SECS),
        )
    }

    #[must_use]
    pub fn verbose(&self) -> bool {
        self.defaults.verbose.unwrap_or(false)
    }

    #[must_use]
    pub fn router_default_method(&self) -> &str {
        self.router.default_method.as_deref().unwrap_or(DEFAULT_METHOD)
    }

    #[must_use]
    pub fn confidence_threshold(&self) -> f64 {
        self.router
            .confidence_threshold
            .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD)
    }

    #[must_use]
    pub fn fallback_confidence(&self) -> f64 {
        self.router
            .fallback_confidence
            .unwrap_or(DEFAULT_FALLBACK_CONFIDENCE)
    }

    #[must_use]
    pub fn router_timeout(&self) -> Duration {
        Duration::from_secs(self.router.timeout_secs.unwrap_or(DEFAULT_ROUTER_TIMEOUT_SECS))
    }

    #[must_use]
    pub fn llm_provider(&self) -> &str {
        self.llm.provider.as_deref().unwrap_or(DEFAULT_LLM_PROVIDER)
    }

    #[must_use]
    pub fn llm_base_url(&self) -> &str {
        self.llm.base_url.as_deref().unwrap_or(DEFAULT_LLM_BASE_URL)
    }

    #[must_use]
    pub fn llm_model(&self) -> &str {
        self.llm.model.as_deref().unwrap_or(DEFAULT_LLM_MODEL)
    }

    #[must_use]
    pub fn llm_api_key_env(&self) -> &str {
        self.llm.api_key_env.as_deref().unwrap_or(DEFAULT_LLM_API_KEY_ENV)
    }

    #[must_use]
    pub fn llm_max_tokens(&self) -> u32 {
        self.llm.max_tokens.unwrap_or(DEFAULT_LLM_MAX_TOKENS)
    }

    #[must_use]
    pub fn llm_temperature(&self) -> f32 {
        self.llm.temperature.unwrap_or(DEFAULT_LLM_TEMPERATURE)
    }

    #[must_use]
    pub fn llm_max_retries(&self) -> u32 {
        self.llm.max_retries.unwrap_or(DEFAULT_LLM_MAX_RETRIES)
    }

    #[must_use]
    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm.timeout_secs.unwrap_or(DEFAULT_LLM_TIMEOUT_SECS))
    }

    /// Dedicated audio method, if one is configured
    #[must_use]
    pub fn audio_method(&self) -> Option<&str> {
        self.audio.method.as_deref()
    }

    /// Settings table for a method; empty when the file has none
    #[must_use]
    pub fn method_settings(&self, name: &str) -> MethodSettings {
        self.methods.get(name).cloned().unwrap_or_default()
    }

    /// Configuration with built-in defaults only, independent of the
    /// environment
    #[must_use]
    pub fn builtin() -> Self {
        Self::default()
    }
}
