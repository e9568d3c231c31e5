use std::fmt;
use std::io;
use std::time::Duration;
use thiserror::Error;
pub use reelforge_lock::LockError;

/// Library-level error type with context for user-facing reporting.
///
/// `ReelforgeError` covers the failures that abort a whole invocation:
/// registry misconfiguration, unreadable or corrupt project documents,
/// configuration problems and lock contention. Failures local to a single
/// script line never surface here; the engine records them on the line.
///
/// # Exit Code Mapping
///
/// Use [`to_exit_code()`](Self::to_exit_code) to map errors to CLI exit codes:
///
/// | Exit Code | Error Type |
/// |-----------|------------|
/// | 2 | Configuration/CLI argument errors |
/// | 4 | Corrupt or unreadable project document |
/// | 5 | Method registry misconfiguration |
/// | 9 | Project lock held |
/// | 1 | Other errors |
#[derive(Error, Debug)]
pub enum ReelforgeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Method registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Project error: {0}")]
    Project(#[from] ProjectError),

    #[error("LLM backend error: {0}")]
    Llm(#[from] LlmError),

    #[error("File lock error: {0}")]
    Lock(#[from] LockError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Terminal rendering of an error: message, optional context, and what to try next
pub trait UserFriendlyError {
    /// One-line message for the user
    fn user_message(&self) -> String;

    /// Extra detail shown under the message
    fn context(&self) -> Option<String>;

    /// Things to try, most likely fix first
    fn suggestions(&self) -> Vec<String>;

    /// Heading shown in brackets before the message
    fn category(&self) -> ErrorCategory;
}

/// Error headings used by [`ReelforgeError::display_for_user`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Registry,
    Project,
    LlmIntegration,
    FileSystem,
    Concurrency,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration => write!(f, "Configuration"),
            Self::Registry => write!(f, "Method Registry"),
            Self::Project => write!(f, "Project"),
            Self::LlmIntegration => write!(f, "LLM Integration"),
            Self::FileSystem => write!(f, "File System"),
            Self::Concurrency => write!(f, "Concurrency"),
        }
    }
}

/// Invalid or unreadable configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration file: {0}")]
    InvalidFile(String),

    #[error("Invalid configuration value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found at {path}")]
    NotFound { path: String },

    #[error("Configuration validation failed: {error_count} errors")]
    ValidationFailed {
        errors: Vec<String>,
        error_count: usize,
    },
}

impl UserFriendlyError for ConfigError {
    fn user_message(&self) -> String {
        match self {
            Self::InvalidFile(reason) => {
                format!("Configuration file has invalid format: {reason}")
            }
            Self::InvalidValue { key, value } => {
                format!("Configuration '{key}' has invalid value: {value}")
            }
            Self::NotFound { path } => format!("Configuration file not found: {path}"),
            Self::ValidationFailed { errors, .. } => format!(
                "Configuration validation failed with {} errors: {}",
                errors.len(),
                errors.join(", ")
            ),
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::InvalidFile(_) => Some(
                "Configuration files must be valid TOML with [defaults], [router], [llm] and [methods.*] sections."
                    .to_string(),
            ),
            Self::NotFound { .. } => Some(
                "reelforge searches for .reelforge/config.toml starting from the current directory upward."
                    .to_string(),
            ),
            Self::InvalidValue { key, .. } => Some(format!(
                "The '{key}' configuration option has specific format requirements."
            )),
            Self::ValidationFailed { .. } => None,
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::InvalidFile(_) => vec![
                "Check the TOML syntax using a TOML validator".to_string(),
                "Compare with the example configuration in the README".to_string(),
            ],
            Self::InvalidValue { key, .. } => match key.as_str() {
                "confidence_threshold" | "fallback_confidence" => {
                    vec!["Use a number between 0.0 and 1.0".to_string()]
                }
                "concurrency" => vec!["Use a positive integer (1 runs lines one by one)".to_string()],
                "stage" => vec!["Valid stages are: decision, audio, media".to_string()],
                _ => vec![
                    "Check the documentation for valid values for this option".to_string(),
                    "Remove the option to use the default value".to_string(),
                ],
            },
            Self::NotFound { .. } => vec![
                "Create .reelforge/config.toml in your project root".to_string(),
                "Pass --config with an explicit path".to_string(),
            ],
            Self::ValidationFailed { errors, .. } => errors
                .iter()
                .map(|e| format!("Fix: {e}"))
                .collect(),
        }
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Configuration
    }
}

/// A decision or configuration referenced a method name the registry does not know.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown method '{name}' (registered: {})", .known.join(", "))]
pub struct UnknownMethodError {
    pub name: String,
    pub known: Vec<String>,
}

/// Two registrations claimed the same method name.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Method '{name}' is already registered")]
pub struct DuplicateMethodError {
    pub name: String,
}

/// Method registry errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error(transparent)]
    Duplicate(#[from] DuplicateMethodError),

    #[error(transparent)]
    Unknown(#[from] UnknownMethodError),

    #[error("Invalid method name '{name}': {reason}")]
    InvalidName { name: String, reason: String },
}

impl UserFriendlyError for RegistryError {
    fn user_message(&self) -> String {
        match self {
            Self::Duplicate(e) => format!(
                "Two generation methods were registered under the name '{}'",
                e.name
            ),
            Self::Unknown(e) => format!("No generation method named '{}' is registered", e.name),
            Self::InvalidName { name, reason } => {
                format!("Method name '{name}' cannot be registered: {reason}")
            }
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::Duplicate(_) => Some(
                "Method names are unique, case-sensitive keys. A conflict indicates a start-up configuration defect."
                    .to_string(),
            ),
            Self::Unknown(e) if !e.known.is_empty() => {
                Some(format!("Registered methods: {}", e.known.join(", ")))
            }
            _ => None,
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::Duplicate(_) => vec![
                "Rename one of the methods".to_string(),
                "Register the replacement with an explicit override".to_string(),
            ],
            Self::Unknown(_) => vec![
                "Run 'reelforge list-methods' to see the available names".to_string(),
                "Check [router] default_method and [audio] method in the configuration".to_string(),
            ],
            Self::InvalidName { .. } => {
                vec!["Use a non-empty name without surrounding whitespace".to_string()]
            }
        }
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Registry
    }
}

/// The persisted project document is structurally invalid.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Corrupt project document {path}: {reason}")]
pub struct CorruptProjectError {
    pub path: String,
    pub reason: String,
}

/// Project state store errors
#[derive(Error, Debug)]
pub enum ProjectError {
    #[error(transparent)]
    Corrupt(#[from] CorruptProjectError),

    #[error("Project document not found: {path}")]
    NotFound { path: String },

    #[error("Failed to read project document {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write project document {path}: {reason}")]
    Write { path: String, reason: String },

    #[error("Unknown script line '{id}'")]
    UnknownLine { id: String },
}

impl UserFriendlyError for ProjectError {
    fn user_message(&self) -> String {
        match self {
            Self::Corrupt(e) => format!("The project document {} is invalid: {}", e.path, e.reason),
            Self::NotFound { path } => format!("Project document not found: {path}"),
            Self::Read { path, source } => format!("Could not read {path}: {source}"),
            Self::Write { path, reason } => format!("Could not save {path}: {reason}"),
            Self::UnknownLine { id } => format!("The project has no line with id '{id}'"),
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::Corrupt(_) => Some(
                "No stage was executed; reelforge never proceeds on partial or garbled state."
                    .to_string(),
            ),
            _ => None,
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::Corrupt(_) => vec![
                "Validate the JSON syntax of the document".to_string(),
                "Every line needs a non-empty 'text' and a unique 'id'".to_string(),
                "Stage results require a 'decision' on the same line".to_string(),
            ],
            Self::NotFound { .. } => vec![
                "Create one with 'reelforge init <name>'".to_string(),
                "Check the path passed on the command line".to_string(),
            ],
            Self::UnknownLine { .. } => {
                vec!["Run 'reelforge status <project>' to list line ids".to_string()]
            }
            Self::Read { .. } | Self::Write { .. } => {
                vec!["Check file permissions and free disk space".to_string()]
            }
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Read { .. } | Self::Write { .. } => ErrorCategory::FileSystem,
            _ => ErrorCategory::Project,
        }
    }
}

/// LLM backend errors
#[derive(Error, Debug, Clone)]
pub enum LlmError {
    /// Transport-level failure (HTTP connectivity, malformed response)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Provider authentication failure (401, 403, missing API key)
    #[error("Provider authentication error: {0}")]
    ProviderAuth(String),

    /// Provider quota/rate limit exceeded (429)
    #[error("Provider quota exceeded: {0}")]
    ProviderQuota(String),

    /// Provider service outage (5xx errors)
    #[error("Provider outage: {0}")]
    ProviderOutage(String),

    /// Invocation timed out
    #[error("Timeout after {duration:?}")]
    Timeout { duration: Duration },

    /// Configuration error
    #[error("Misconfiguration: {0}")]
    Misconfiguration(String),

    /// Unsupported feature or provider
    #[error("Unsupported: {0}")]
    Unsupported(String),
}

impl LlmError {
    /// Whether retrying the same request may succeed
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::ProviderQuota(_) | Self::ProviderOutage(_) | Self::Timeout { .. }
        )
    }
}

impl UserFriendlyError for LlmError {
    fn user_message(&self) -> String {
        match self {
            Self::Transport(msg) => format!("LLM transport error: {msg}"),
            Self::ProviderAuth(msg) => format!("LLM provider rejected the credentials: {msg}"),
            Self::ProviderQuota(msg) => format!("LLM provider quota exceeded: {msg}"),
            Self::ProviderOutage(msg) => format!("LLM provider is unavailable: {msg}"),
            Self::Timeout { duration } => format!("LLM call timed out after {duration:?}"),
            Self::Misconfiguration(msg) => format!("LLM backend is misconfigured: {msg}"),
            Self::Unsupported(msg) => format!("Unsupported LLM configuration: {msg}"),
        }
    }

    fn context(&self) -> Option<String> {
        Some(
            "The LLM only drives method selection; lines fall back to [router] default_method when it is unavailable."
                .to_string(),
        )
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::ProviderAuth(_) | Self::Misconfiguration(_) => vec![
                "Check the environment variable named by [llm] api_key_env".to_string(),
                "Set [llm] provider = \"none\" to always use the fallback method".to_string(),
            ],
            Self::ProviderQuota(_) | Self::ProviderOutage(_) | Self::Transport(_) => vec![
                "Retry later; completed lines are not re-run".to_string(),
            ],
            Self::Timeout { .. } => vec!["Increase [llm] timeout_secs".to_string()],
            Self::Unsupported(_) => {
                vec!["Supported providers: openai-compatible, none".to_string()]
            }
        }
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::LlmIntegration
    }
}

impl UserFriendlyError for LockError {
    fn user_message(&self) -> String {
        match self {
            Self::ConcurrentExecution { document, pid, .. } => {
                format!("Another reelforge process (PID {pid}) is already running on {document}")
            }
            Self::StaleLock { document, age_secs, .. } => {
                format!("A stale lock ({age_secs}s old) is blocking {document}")
            }
            other => other.to_string(),
        }
    }

    fn context(&self) -> Option<String> {
        Some("Runs hold an exclusive lock on the project document to serialize writes.".to_string())
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::ConcurrentExecution { .. } => {
                vec!["Wait for the other run to finish".to_string()]
            }
            _ => vec!["Re-run with --force-lock if no other run is active".to_string()],
        }
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Concurrency
    }
}

impl UserFriendlyError for ReelforgeError {
    fn user_message(&self) -> String {
        match self {
            Self::Config(e) => e.user_message(),
            Self::Registry(e) => e.user_message(),
            Self::Project(e) => e.user_message(),
            Self::Llm(e) => e.user_message(),
            Self::Lock(e) => e.user_message(),
            Self::Io(e) => format!("File system operation failed: {e}"),
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::Config(e) => e.context(),
            Self::Registry(e) => e.context(),
            Self::Project(e) => e.context(),
            Self::Llm(e) => e.context(),
            Self::Lock(e) => e.context(),
            Self::Io(_) => None,
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::Config(e) => e.suggestions(),
            Self::Registry(e) => e.suggestions(),
            Self::Project(e) => e.suggestions(),
            Self::Llm(e) => e.suggestions(),
            Self::Lock(e) => e.suggestions(),
            Self::Io(_) => vec!["Check file permissions and free disk space".to_string()],
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Config(e) => e.category(),
            Self::Registry(e) => e.category(),
            Self::Project(e) => e.category(),
            Self::Llm(e) => e.category(),
            Self::Lock(e) => e.category(),
            Self::Io(_) => ErrorCategory::FileSystem,
        }
    }
}

impl ReelforgeError {
    /// Render the error with context and suggestions for terminal output
    #[must_use]
    pub fn display_for_user(&self) -> String {
        let mut out = format!("✗ [{}] {}", self.category(), self.user_message());
        if let Some(context) = self.context() {
            out.push_str(&format!("\n  {context}"));
        }
        let suggestions = self.suggestions();
        if !suggestions.is_empty() {
            out.push_str("\n  Suggestions:");
            for s in suggestions {
                out.push_str(&format!("\n    • {s}"));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_method_lists_known_names() {
        let err = UnknownMethodError {
            name: "hologram".to_string(),
            known: vec!["subtitle_only".to_string(), "tts".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Unknown method 'hologram' (registered: subtitle_only, tts)"
        );
    }

    #[test]
    fn test_registry_error_from_duplicate() {
        let err: RegistryError = DuplicateMethodError {
            name: "tts".to_string(),
        }
        .into();
        assert_eq!(err.to_string(), "Method 'tts' is already registered");
        assert_eq!(err.category(), ErrorCategory::Registry);
    }

    #[test]
    fn test_corrupt_project_display_for_user() {
        let err = ReelforgeError::Project(ProjectError::Corrupt(CorruptProjectError {
            path: "demo.json".to_string(),
            reason: "duplicate line id 'L2'".to_string(),
        }));
        let rendered = err.display_for_user();
        assert!(rendered.contains("[Project]"));
        assert!(rendered.contains("duplicate line id 'L2'"));
        assert!(rendered.contains("Suggestions:"));
    }

    #[test]
    fn test_llm_error_retryable() {
        assert!(LlmError::ProviderOutage("502".into()).is_retryable());
        assert!(LlmError::Timeout {
            duration: Duration::from_secs(1)
        }
        .is_retryable());
        assert!(!LlmError::ProviderAuth("401".into()).is_retryable());
        assert!(!LlmError::Misconfiguration("no key".into()).is_retryable());
    }
}
