//! Scripted [`ClassificationSignal`] implementations for tests.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::signal::{ClassificationSignal, RouteRequest, SignalAnswer, SignalError};

/// What a [`StubSignal`] answers
#[derive(Debug, Clone)]
pub enum SignalBehavior {
    /// Propose `method` with `confidence`
    Answer { method: String, confidence: f64 },
    /// Fail with `SignalError::Other`
    Fail(String),
    /// Never answer within any reasonable timeout
    Hang,
}

/// Signal with a fixed answer that counts its calls
#[derive(Debug, Clone)]
pub struct StubSignal {
    behavior: SignalBehavior,
    calls: Arc<AtomicUsize>,
}

impl StubSignal {
    #[must_use]
    pub fn new(behavior: SignalBehavior) -> Self {
        Self {
            behavior,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    #[must_use]
    pub fn answering(method: impl Into<String>, confidence: f64) -> Self {
        Self::new(SignalBehavior::Answer {
            method: method.into(),
            confidence,
        })
    }

    #[must_use]
    pub fn failing(reason: impl Into<String>) -> Self {
        Self::new(SignalBehavior::Fail(reason.into()))
    }

    #[must_use]
    pub fn hanging() -> Self {
        Self::new(SignalBehavior::Hang)
    }

    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClassificationSignal for StubSignal {
    fn name(&self) -> &str {
        "stub"
    }

    async fn classify(
        &self,
        _request: &RouteRequest,
        _candidates: &[String],
    ) -> Result<SignalAnswer, SignalError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            SignalBehavior::Answer { method, confidence } => {
                Ok(SignalAnswer::new(method.clone(), *confidence))
            }
            SignalBehavior::Fail(reason) => Err(SignalError::Other(reason.clone())),
            SignalBehavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(SignalError::Other("stub signal woke up".to_string()))
            }
        }
    }
}
