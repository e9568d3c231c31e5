use reelforge_utils::error::ConfigError;

use super::Config;

/// Providers understood by the LLM factory
pub const KNOWN_LLM_PROVIDERS: &[&str] = &["openai-compatible", "none"];

fn invalid(key: &str, value: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.into(),
    }
}

fn check_unit_interval(key: &str, value: Option<f64>) -> Result<(), ConfigError> {
    match value {
        Some(v) if !(0.0..=1.0).contains(&v) => {
            Err(invalid(key, format!("{v} is outside 0.0..=1.0")))
        }
        _ => Ok(()),
    }
}

impl Config {
    /// Validate configuration values
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.defaults.concurrency == Some(0) {
            return Err(invalid("concurrency", "must be greater than 0"));
        }

        if let Some(timeout) = self.defaults.stage_timeout_secs {
            if timeout == 0 {
                return Err(invalid("stage_timeout_secs", "must be greater than 0"));
            }
            if timeout > 86_400 {
                return Err(invalid(
                    "stage_timeout_secs",
                    "exceeds maximum limit of 86400 seconds (24 hours)",
                ));
            }
        }

        check_unit_interval("confidence_threshold", self.router.confidence_threshold)?;
        check_unit_interval("fallback_confidence", self.router.fallback_confidence)?;

        if self.router.timeout_secs == Some(0) {
            return Err(invalid("router.timeout_secs", "must be greater than 0"));
        }

        if let Some(name) = &self.router.default_method
            && name.trim().is_empty()
        {
            return Err(invalid("router.default_method", "must not be empty"));
        }

        if let Some(name) = &self.audio.method
            && name.trim().is_empty()
        {
            return Err(invalid("audio.method", "must not be empty"));
        }

        if let Some(provider) = &self.llm.provider
            && !KNOWN_LLM_PROVIDERS.contains(&provider.as_str())
        {
            return Err(invalid(
                "llm.provider",
                format!(
                    "unknown provider '{provider}' (expected one of: {})",
                    KNOWN_LLM_PROVIDERS.join(", ")
                ),
            ));
        }

        if let Some(temperature) = self.llm.temperature
            && !(0.0..=2.0).contains(&temperature)
        {
            return Err(invalid("llm.temperature", "must be between 0.0 and 2.0"));
        }

        if let Some(retries) = self.llm.max_retries
            && !(1..=10).contains(&retries)
        {
            return Err(invalid("llm.max_retries", "must be between 1 and 10"));
        }

        if self.llm.max_tokens == Some(0) {
            return Err(invalid("llm.max_tokens", "must be greater than 0"));
        }

        if self.llm.timeout_secs == Some(0) {
            return Err(invalid("llm.timeout_secs", "must be greater than 0"));
        }

        Ok(())
    }
}
