use std::collections::BTreeMap;

use super::{Config, ConfigSource};

fn source_label(source: Option<&ConfigSource>) -> &'static str {
    match source {
        Some(ConfigSource::Cli) => "cli",
        Some(ConfigSource::ConfigFile(_)) => "config",
        Some(ConfigSource::Defaults) | None => "default",
    }
}

impl Config {
    /// Effective configuration as `key -> (value, source)` pairs.
    ///
    /// Values are the resolved ones, so keys left at their built-in default
    /// show that default.
    #[must_use]
    pub fn effective_config(&self) -> BTreeMap<String, (String, String)> {
        let mut out = BTreeMap::new();
        let mut add = |key: &str, value: String| {
            let source = source_label(self.source_attribution.get(key));
            out.insert(key.to_string(), (value, source.to_string()));
        };

        add("output_dir", self.output_dir().to_string());
        add("concurrency", self.concurrency().to_string());
        add("stage_timeout_secs", self.stage_timeout().as_secs().to_string());
        add("verbose", self.verbose().to_string());
        add("router_default_method", self.router_default_method().to_string());
        add(
            "router_confidence_threshold",
            self.confidence_threshold().to_string(),
        );
        add(
            "router_fallback_confidence",
            self.fallback_confidence().to_string(),
        );
        add("router_timeout_secs", self.router_timeout().as_secs().to_string());
        add("llm_provider", self.llm_provider().to_string());
        add("llm_base_url", self.llm_base_url().to_string());
        add("llm_model", self.llm_model().to_string());
        add("llm_api_key_env", self.llm_api_key_env().to_string());
        if let Some(method) = self.audio_method() {
            add("audio_method", method.to_string());
        }

        out
    }
}
