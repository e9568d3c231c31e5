use async_trait::async_trait;
use thiserror::Error;

use reelforge_llm::LlmError;

/// Line to route
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRequest {
    pub project: String,
    pub line_id: String,
    pub text: String,
    pub context: Option<String>,
}

impl RouteRequest {
    #[must_use]
    pub fn new(
        project: impl Into<String>,
        line_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            line_id: line_id.into(),
            text: text.into(),
            context: None,
        }
    }

    #[must_use]
    pub fn with_context(mut self, context: Option<String>) -> Self {
        self.context = context;
        self
    }
}

/// Method chosen by a classification signal
#[derive(Debug, Clone, PartialEq)]
pub struct SignalAnswer {
    pub method: String,
    pub confidence: f64,
}

impl SignalAnswer {
    #[must_use]
    pub fn new(method: impl Into<String>, confidence: f64) -> Self {
        Self {
            method: method.into(),
            confidence,
        }
    }
}

#[derive(Error, Debug)]
pub enum SignalError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("Could not map answer '{0}' to a method")]
    Unparseable(String),

    #[error("{0}")]
    Other(String),
}

/// External capability that proposes a method for a line.
///
/// The answer is advisory: the router validates the name against the
/// registry before accepting it.
#[async_trait]
pub trait ClassificationSignal: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Propose one of `candidates` for the line
    async fn classify(
        &self,
        request: &RouteRequest,
        candidates: &[String],
    ) -> Result<SignalAnswer, SignalError>;
}
