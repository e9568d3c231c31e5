use std::path::PathBuf;

/// Configuration overrides taken from the command line.
///
/// Every field is optional; `None` leaves the file or default value in place.
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    /// Explicit configuration file; disables upward discovery
    pub config_path: Option<PathBuf>,
    pub output_dir: Option<String>,
    pub concurrency: Option<usize>,
    pub stage_timeout_secs: Option<u64>,
    pub verbose: Option<bool>,
    pub default_method: Option<String>,
    pub llm_provider: Option<String>,
    pub audio_method: Option<String>,
}
