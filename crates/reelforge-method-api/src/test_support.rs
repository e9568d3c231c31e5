//! Scripted [`Method`] implementations for tests.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::{GenerationResult, Method, MethodError, MethodRequest, OutputKind};

/// What a [`StubMethod`] does when run
#[derive(Debug, Clone)]
pub enum StubBehavior {
    /// Write `<target>.<extension>` into the workdir and report it
    Succeed { extension: String },
    /// Return `ok = false` with the given error
    Fail(String),
    /// Return `Err(MethodError::Internal)`
    Error(String),
    /// Report a success whose artifact was never written
    PhantomArtifact,
    /// Sleep, then behave like `Succeed`
    Slow { delay: Duration, extension: String },
}

/// Method with scripted behavior that records every request it receives
#[derive(Debug, Clone)]
pub struct StubMethod {
    name: String,
    kind: OutputKind,
    behavior: StubBehavior,
    duration_ms: Option<u64>,
    calls: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<MethodRequest>>>,
}

impl StubMethod {
    #[must_use]
    pub fn new(name: impl Into<String>, kind: OutputKind, behavior: StubBehavior) -> Self {
        Self {
            name: name.into(),
            kind,
            behavior,
            duration_ms: None,
            calls: Arc::new(AtomicUsize::new(0)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Video method that succeeds with an `.mp4`
    #[must_use]
    pub fn video(name: impl Into<String>) -> Self {
        Self::new(
            name,
            OutputKind::Video,
            StubBehavior::Succeed {
                extension: "mp4".to_string(),
            },
        )
    }

    /// Audio method that succeeds with an `.mp3` lasting `duration_ms`
    #[must_use]
    pub fn audio(name: impl Into<String>, duration_ms: u64) -> Self {
        let mut stub = Self::new(
            name,
            OutputKind::Audio,
            StubBehavior::Succeed {
                extension: "mp3".to_string(),
            },
        );
        stub.duration_ms = Some(duration_ms);
        stub
    }

    /// Method of the given kind that always fails with `error`
    #[must_use]
    pub fn failing(name: impl Into<String>, kind: OutputKind, error: impl Into<String>) -> Self {
        Self::new(name, kind, StubBehavior::Fail(error.into()))
    }

    /// Number of times `run` was called
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Requests received so far, in call order
    #[must_use]
    pub fn requests(&self) -> Vec<MethodRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn write_artifact(
        &self,
        request: &MethodRequest,
        extension: &str,
    ) -> Result<GenerationResult, MethodError> {
        let path = request.artifact_path(extension);
        std::fs::create_dir_all(&request.workdir)?;
        std::fs::write(&path, request.text.as_bytes())?;
        let mut result = GenerationResult::success([path.to_string()]).with_meta("stub", self.name.clone());
        if let Some(ms) = self.duration_ms {
            result = result.with_duration_ms(ms);
        }
        Ok(result)
    }
}

#[async_trait]
impl Method for StubMethod {
    fn name(&self) -> &str {
        &self.name
    }

    fn output_kind(&self) -> OutputKind {
        self.kind
    }

    async fn run(&self, request: &MethodRequest) -> Result<GenerationResult, MethodError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());

        match &self.behavior {
            StubBehavior::Succeed { extension } => self.write_artifact(request, extension),
            StubBehavior::Fail(error) => Ok(GenerationResult::failure(error.clone())),
            StubBehavior::Error(message) => Err(MethodError::Internal(message.clone())),
            StubBehavior::PhantomArtifact => Ok(GenerationResult::success([request
                .artifact_path("missing")
                .to_string()])),
            StubBehavior::Slow { delay, extension } => {
                tokio::time::sleep(*delay).await;
                self.write_artifact(request, extension)
            }
        }
    }

    fn generate_prompt(&self, text: &str) -> String {
        format!("[{}] {}", self.name, text.trim())
    }
}
