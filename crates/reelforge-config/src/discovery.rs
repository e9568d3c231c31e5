use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use super::{
    AudioSection, CliArgs, Config, ConfigSource, Defaults, LlmSection, MethodSettings,
    RouterSection,
};

/// Directory holding the configuration file
pub const CONFIG_DIR: &str = ".reelforge";
/// Configuration file name inside [`CONFIG_DIR`]
pub const CONFIG_FILE: &str = "config.toml";

/// TOML configuration file structure
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlConfig {
    defaults: Option<Defaults>,
    router: Option<RouterSection>,
    llm: Option<LlmSection>,
    audio: Option<AudioSection>,
    #[serde(default)]
    methods: BTreeMap<String, MethodSettings>,
}

/// Keys attributed to the built-in defaults until a file or CLI value wins
const DEFAULTED_KEYS: &[&str] = &[
    "output_dir",
    "concurrency",
    "stage_timeout_secs",
    "verbose",
    "router_default_method",
    "router_confidence_threshold",
    "router_fallback_confidence",
    "router_timeout_secs",
    "llm_provider",
    "llm_base_url",
    "llm_model",
    "llm_api_key_env",
    "llm_max_tokens",
    "llm_temperature",
    "llm_max_retries",
    "llm_timeout_secs",
];

/// Move `value` into `slot` when present and record where it came from
fn apply<T>(
    slot: &mut Option<T>,
    value: Option<T>,
    key: &str,
    source: &ConfigSource,
    attribution: &mut HashMap<String, ConfigSource>,
) {
    if let Some(v) = value {
        *slot = Some(v);
        attribution.insert(key.to_string(), source.clone());
    }
}

impl Config {
    /// Discover and load configuration with precedence: CLI > file > defaults
    ///
    /// Uses the current working directory for config file discovery when no
    /// explicit path is provided in `cli_args`.
    pub fn discover(cli_args: &CliArgs) -> Result<Self> {
        let start_dir = std::env::current_dir().context("Failed to get current directory")?;
        Self::discover_from(&start_dir, cli_args)
    }

    /// Discover and load configuration starting from a specific directory
    ///
    /// This is the path-driven variant used by tests to avoid process-global state.
    pub fn discover_from(start_dir: &Path, cli_args: &CliArgs) -> Result<Self> {
        let mut source_attribution: HashMap<String, ConfigSource> = DEFAULTED_KEYS
            .iter()
            .map(|key| ((*key).to_string(), ConfigSource::Defaults))
            .collect();

        let mut defaults = Defaults::default();
        let mut router = RouterSection::default();
        let mut llm = LlmSection::default();
        let mut audio = AudioSection::default();
        let mut methods = BTreeMap::new();

        let config_path = match &cli_args.config_path {
            Some(explicit) => {
                if !explicit.exists() {
                    anyhow::bail!(reelforge_utils::error::ConfigError::NotFound {
                        path: explicit.display().to_string(),
                    });
                }
                Some(explicit.clone())
            }
            None => Self::discover_config_file_from(start_dir)?,
        };

        if let Some(path) = &config_path {
            let file = Self::load_config_file(path)
                .with_context(|| format!("Failed to load config file: {}", path.display()))?;
            let src = ConfigSource::ConfigFile(path.clone());
            let attr = &mut source_attribution;

            if let Some(d) = file.defaults {
                apply(&mut defaults.output_dir, d.output_dir, "output_dir", &src, attr);
                apply(&mut defaults.concurrency, d.concurrency, "concurrency", &src, attr);
                apply(
                    &mut defaults.stage_timeout_secs,
                    d.stage_timeout_secs,
                    "stage_timeout_secs",
                    &src,
                    attr,
                );
                apply(&mut defaults.verbose, d.verbose, "verbose", &src, attr);
            }

            if let Some(r) = file.router {
                apply(
                    &mut router.default_method,
                    r.default_method,
                    "router_default_method",
                    &src,
                    attr,
                );
                apply(
                    &mut router.confidence_threshold,
                    r.confidence_threshold,
                    "router_confidence_threshold",
                    &src,
                    attr,
                );
                apply(
                    &mut router.fallback_confidence,
                    r.fallback_confidence,
                    "router_fallback_confidence",
                    &src,
                    attr,
                );
                apply(&mut router.timeout_secs, r.timeout_secs, "router_timeout_secs", &src, attr);
            }

            if let Some(l) = file.llm {
                apply(&mut llm.provider, l.provider, "llm_provider", &src, attr);
                apply(&mut llm.base_url, l.base_url, "llm_base_url", &src, attr);
                apply(&mut llm.model, l.model, "llm_model", &src, attr);
                apply(&mut llm.api_key_env, l.api_key_env, "llm_api_key_env", &src, attr);
                apply(&mut llm.max_tokens, l.max_tokens, "llm_max_tokens", &src, attr);
                apply(&mut llm.temperature, l.temperature, "llm_temperature", &src, attr);
                apply(&mut llm.max_retries, l.max_retries, "llm_max_retries", &src, attr);
                apply(&mut llm.timeout_secs, l.timeout_secs, "llm_timeout_secs", &src, attr);
            }

            if let Some(a) = file.audio {
                apply(&mut audio.method, a.method, "audio_method", &src, attr);
            }

            for name in file.methods.keys() {
                attr.insert(format!("methods.{name}"), src.clone());
            }
            methods = file.methods;
        }

        // CLI overrides (highest priority)
        let cli = ConfigSource::Cli;
        let attr = &mut source_attribution;
        apply(&mut defaults.output_dir, cli_args.output_dir.clone(), "output_dir", &cli, attr);
        apply(&mut defaults.concurrency, cli_args.concurrency, "concurrency", &cli, attr);
        apply(
            &mut defaults.stage_timeout_secs,
            cli_args.stage_timeout_secs,
            "stage_timeout_secs",
            &cli,
            attr,
        );
        apply(&mut defaults.verbose, cli_args.verbose, "verbose", &cli, attr);
        apply(
            &mut router.default_method,
            cli_args.default_method.clone(),
            "router_default_method",
            &cli,
            attr,
        );
        apply(&mut llm.provider, cli_args.llm_provider.clone(), "llm_provider", &cli, attr);
        apply(&mut audio.method, cli_args.audio_method.clone(), "audio_method", &cli, attr);

        let config = Config {
            defaults,
            router,
            llm,
            audio,
            methods,
            config_path,
            source_attribution,
        };

        config.validate()?;
        Ok(config)
    }

    /// Discover the config file by searching upward from the current directory
    pub fn discover_config_file() -> Result<Option<PathBuf>> {
        let current_dir = std::env::current_dir().context("Failed to get current directory")?;
        Self::discover_config_file_from(&current_dir)
    }

    /// Discover the config file by searching upward from a specific directory
    ///
    /// Walks up the directory tree looking for `.reelforge/config.toml`,
    /// stopping at repository root markers (.git, .hg, .svn) or the
    /// filesystem root.
    pub fn discover_config_file_from(start_dir: &Path) -> Result<Option<PathBuf>> {
        let mut current_dir = start_dir.to_path_buf();

        loop {
            let config_path = current_dir.join(CONFIG_DIR).join(CONFIG_FILE);
            if config_path.is_file() {
                return Ok(Some(config_path));
            }

            if current_dir.join(".git").exists()
                || current_dir.join(".hg").exists()
                || current_dir.join(".svn").exists()
            {
                break;
            }

            match current_dir.parent() {
                Some(parent) => current_dir = parent.to_path_buf(),
                None => break,
            }
        }

        Ok(None)
    }

    /// Load configuration from a TOML file
    fn load_config_file(path: &Path) -> Result<TomlConfig> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&content).map_err(|e| {
            anyhow::Error::new(reelforge_utils::error::ConfigError::InvalidFile(format!(
                "{}: {}",
                path.display(),
                e.message()
            )))
        })
    }
}
