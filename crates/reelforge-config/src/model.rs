use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

/// Default output root for per-line working directories
pub const DEFAULT_OUTPUT_DIR: &str = "output";
/// Default number of lines processed concurrently
pub const DEFAULT_CONCURRENCY: usize = 1;
/// Default hard timeout for a single stage invocation (30 minutes)
pub const DEFAULT_STAGE_TIMEOUT_SECS: u64 = 1800;
/// Default method used when the classification signal gives no usable answer
pub const DEFAULT_METHOD: &str = "subtitle_only";
/// Default confidence below which a routed decision is flagged
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.5;
/// Default confidence recorded for fallback decisions
pub const DEFAULT_FALLBACK_CONFIDENCE: f64 = 0.0;
/// Default timeout for one routing call
pub const DEFAULT_ROUTER_TIMEOUT_SECS: u64 = 60;

/// Default LLM provider
pub const DEFAULT_LLM_PROVIDER: &str = "openai-compatible";
/// Default base URL of the OpenAI-compatible endpoint
pub const DEFAULT_LLM_BASE_URL: &str = "https://api.siliconflow.cn/v1";
/// Default chat model
pub const DEFAULT_LLM_MODEL: &str = "deepseek-ai/DeepSeek-V3";
/// Default environment variable holding the API key
pub const DEFAULT_LLM_API_KEY_ENV: &str = "LLM_API_TOKEN";
/// Default completion token budget for classification
pub const DEFAULT_LLM_MAX_TOKENS: u32 = 20;
/// Default sampling temperature for classification
pub const DEFAULT_LLM_TEMPERATURE: f32 = 0.2;
/// Default number of attempts for one LLM request
pub const DEFAULT_LLM_MAX_RETRIES: u32 = 3;
/// Default per-request LLM timeout
pub const DEFAULT_LLM_TIMEOUT_SECS: u64 = 120;

/// Source of a configuration value.
///
/// Precedence: CLI arguments > config file > built-in defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Value provided via CLI argument
    Cli,
    /// Value loaded from the given configuration file
    ConfigFile(PathBuf),
    /// Built-in default
    Defaults,
}

/// `[defaults]` section
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Defaults {
    pub output_dir: Option<String>,
    pub concurrency: Option<usize>,
    pub stage_timeout_secs: Option<u64>,
    pub verbose: Option<bool>,
}

/// `[router]` section
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RouterSection {
    pub default_method: Option<String>,
    pub confidence_threshold: Option<f64>,
    pub fallback_confidence: Option<f64>,
    pub timeout_secs: Option<u64>,
}

/// `[llm]` section
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LlmSection {
    /// `openai-compatible` or `none`
    pub provider: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
    /// Name of the environment variable that holds the API key
    pub api_key_env: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub max_retries: Option<u32>,
    pub timeout_secs: Option<u64>,
}

/// `[audio]` section
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AudioSection {
    /// Dedicated audio method; when unset the decided method produces audio
    /// only if it is an audio method
    pub method: Option<String>,
}

/// Free-form `[methods.<name>]` table
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct MethodSettings(pub toml::Table);

impl MethodSettings {
    /// String value for `key`
    #[must_use]
    pub fn str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(toml::Value::as_str)
    }

    /// Non-negative integer value for `key`
    #[must_use]
    pub fn u64(&self, key: &str) -> Option<u64> {
        self.0
            .get(key)
            .and_then(toml::Value::as_integer)
            .and_then(|v| u64::try_from(v).ok())
    }

    /// Float value for `key`; integers are accepted too
    #[must_use]
    pub fn f64(&self, key: &str) -> Option<f64> {
        match self.0.get(key)? {
            toml::Value::Float(f) => Some(*f),
            toml::Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Boolean value for `key`
    #[must_use]
    pub fn bool(&self, key: &str) -> Option<bool> {
        self.0.get(key).and_then(toml::Value::as_bool)
    }
}

/// Configuration for reelforge.
///
/// Built by [`Config::discover`] with precedence CLI > file > defaults. The
/// typed accessors (`concurrency()`, `router_default_method()`, ...) apply
/// the built-in defaults for unset values.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub defaults: Defaults,
    pub router: RouterSection,
    pub llm: LlmSection,
    pub audio: AudioSection,
    pub methods: BTreeMap<String, MethodSettings>,
    /// Configuration file the values were loaded from, if any
    pub config_path: Option<PathBuf>,
    pub source_attribution: HashMap<String, ConfigSource>,
}
