//! Generation method contract
//!
//! Every generation method (subtitle rendering, text-to-video, speech
//! synthesis, ...) implements [`Method`]. The engine only talks to methods
//! through this trait, so implementations are swappable and can be
//! registered under any unique name.
//!
//! # Failure contract
//!
//! Expected conditions such as missing credentials, upstream API errors or
//! timeouts are reported as `Ok(GenerationResult { ok: false, .. })` with the
//! reason in `meta["error"]`. `Err(MethodError)` is reserved for contract
//! violations and programming errors. The engine records both on the line
//! and carries on with the next one.

mod result;
mod workdir;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_support;

pub use result::{GenerationResult, META_ERROR};
pub use workdir::{WorkdirClaims, WorkdirGuard};

use async_trait::async_trait;
use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use reelforge_utils::paths::is_filesystem_safe;

/// Kind of media a method produces
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::VariantNames,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum OutputKind {
    Video,
    Audio,
    Other,
}

/// Input to one method invocation
#[derive(Debug, Clone, PartialEq)]
pub struct MethodRequest {
    /// Generation guidance derived from the line
    pub prompt: String,
    /// Project name
    pub project: String,
    /// Filesystem-safe name for artifacts of this line
    pub target_name: String,
    /// Narration text of the line
    pub text: String,
    /// Working directory claimed for `project` + `target_name`
    pub workdir: Utf8PathBuf,
    /// Length to match, typically the duration of the line's audio
    pub duration_ms: Option<u64>,
    /// The line's JSON form, for methods that need structural hints
    pub block: serde_json::Value,
}

impl MethodRequest {
    /// Check the request preconditions
    ///
    /// # Errors
    ///
    /// `MethodError::InvalidRequest` when `text` or `prompt` is blank or
    /// `target_name` is not filesystem-safe.
    pub fn validate(&self) -> Result<(), MethodError> {
        if self.text.trim().is_empty() {
            return Err(MethodError::InvalidRequest {
                field: "text",
                reason: "must not be empty".to_string(),
            });
        }
        if self.prompt.trim().is_empty() {
            return Err(MethodError::InvalidRequest {
                field: "prompt",
                reason: "must not be empty".to_string(),
            });
        }
        if !is_filesystem_safe(&self.target_name) {
            return Err(MethodError::InvalidRequest {
                field: "target_name",
                reason: format!("'{}' is not filesystem-safe", self.target_name),
            });
        }
        Ok(())
    }

    /// Path for an artifact named `<target_name>.<extension>` in the workdir
    #[must_use]
    pub fn artifact_path(&self, extension: &str) -> Utf8PathBuf {
        self.workdir
            .join(format!("{}.{}", self.target_name, extension))
    }
}

/// Exceptional method failures.
///
/// Expected failures are `GenerationResult::failure` instead.
#[derive(Error, Debug)]
pub enum MethodError {
    #[error("Method contract violated: {0}")]
    ContractViolation(String),

    #[error("Invalid method request: {field} {reason}")]
    InvalidRequest { field: &'static str, reason: String },

    #[error("Working directory for {project}/{target} is already claimed")]
    WorkdirBusy { project: String, target: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal method error: {0}")]
    Internal(String),
}

/// Contract implemented by every generation method
#[async_trait]
pub trait Method: Send + Sync {
    /// Unique, case-sensitive registry key
    fn name(&self) -> &str;

    /// Kind of media this method produces
    fn output_kind(&self) -> OutputKind;

    /// Produce the artifacts for one line
    ///
    /// # Errors
    ///
    /// Only for exceptional conditions; see the crate documentation.
    async fn run(&self, request: &MethodRequest) -> Result<GenerationResult, MethodError>;

    /// Derive generation guidance from narration text. Pure.
    fn generate_prompt(&self, text: &str) -> String {
        text.trim().to_string()
    }
}
