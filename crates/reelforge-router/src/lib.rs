//! Decision router
//!
//! Chooses the generation method for a script line. A classification
//! signal (normally an LLM) is consulted first; its answer is only accepted
//! when it names a registered method. Anything else, including a missing
//! signal, an error or a timeout, falls back to the configured default
//! method with `decided_by = fallback`. When the default is not registered
//! either, the router reports [`RouterError::Unavailable`] and the engine
//! records the failure on the line.

mod llm_signal;
mod signal;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_support;

pub use llm_signal::{
    CONTAINED_MATCH_CONFIDENCE, EXACT_MATCH_CONFIDENCE, LlmSignal, build_messages,
    normalize_answer,
};
pub use signal::{ClassificationSignal, RouteRequest, SignalAnswer, SignalError};

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use reelforge_config::Config;
use reelforge_project::{DecidedBy, Decision};
use reelforge_registry::MethodRegistry;

/// Routing parameters
#[derive(Debug, Clone, PartialEq)]
pub struct RouterConfig {
    pub default_method: String,
    pub confidence_threshold: f64,
    pub fallback_confidence: f64,
    pub timeout: Duration,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            default_method: reelforge_config::DEFAULT_METHOD.to_string(),
            confidence_threshold: reelforge_config::DEFAULT_CONFIDENCE_THRESHOLD,
            fallback_confidence: reelforge_config::DEFAULT_FALLBACK_CONFIDENCE,
            timeout: Duration::from_secs(reelforge_config::DEFAULT_ROUTER_TIMEOUT_SECS),
        }
    }
}

impl RouterConfig {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            default_method: config.router_default_method().to_string(),
            confidence_threshold: config.confidence_threshold(),
            fallback_confidence: config.fallback_confidence(),
            timeout: config.router_timeout(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouterError {
    #[error("No method could be decided: {reason}")]
    Unavailable { reason: String },
}

/// Decision plus the reason the fallback was used, if it was
#[derive(Debug, Clone, PartialEq)]
pub struct RoutedDecision {
    pub decision: Decision,
    pub fallback_reason: Option<String>,
}

/// Routes lines to registered methods
pub struct DecisionRouter {
    registry: Arc<MethodRegistry>,
    signal: Option<Arc<dyn ClassificationSignal>>,
    config: RouterConfig,
}

impl std::fmt::Debug for DecisionRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecisionRouter")
            .field("methods", &self.registry.names())
            .field("signal", &self.signal.as_ref().map(|s| s.name().to_string()))
            .field("config", &self.config)
            .finish()
    }
}

fn clamp_confidence(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

impl DecisionRouter {
    #[must_use]
    pub fn new(
        registry: Arc<MethodRegistry>,
        signal: Option<Arc<dyn ClassificationSignal>>,
        config: RouterConfig,
    ) -> Self {
        Self {
            registry,
            signal,
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Whether a classification signal is configured
    #[must_use]
    pub fn has_signal(&self) -> bool {
        self.signal.is_some()
    }

    /// Decide the method for one line.
    ///
    /// # Errors
    ///
    /// `RouterError::Unavailable` when the signal gives no usable answer and
    /// the default method is not registered.
    pub async fn decide(&self, request: &RouteRequest) -> Result<RoutedDecision, RouterError> {
        let reason = match &self.signal {
            None => "no classification signal configured".to_string(),
            Some(signal) => match self.consult(signal.as_ref(), request).await {
                Ok(decision) => {
                    return Ok(RoutedDecision {
                        decision,
                        fallback_reason: None,
                    });
                }
                Err(reason) => reason,
            },
        };
        self.fall_back(request, reason)
    }

    async fn consult(
        &self,
        signal: &dyn ClassificationSignal,
        request: &RouteRequest,
    ) -> Result<Decision, String> {
        let candidates = self.registry.names();
        let answer = match tokio::time::timeout(
            self.config.timeout,
            signal.classify(request, &candidates),
        )
        .await
        {
            Err(_) => {
                return Err(format!(
                    "{} signal timed out after {:?}",
                    signal.name(),
                    self.config.timeout
                ));
            }
            Ok(Err(e)) => return Err(format!("{} signal failed: {e}", signal.name())),
            Ok(Ok(answer)) => answer,
        };

        if !self.registry.contains(&answer.method) {
            return Err(format!(
                "{} signal chose unregistered method '{}'",
                signal.name(),
                answer.method
            ));
        }

        let confidence = clamp_confidence(answer.confidence);
        let mut decision = Decision::new(answer.method, confidence, DecidedBy::Model);
        if confidence < self.config.confidence_threshold {
            info!(
                line = %request.line_id,
                method = %decision.method,
                confidence,
                threshold = self.config.confidence_threshold,
                "Accepting low-confidence decision"
            );
            decision = decision.flagged_low_confidence();
        } else {
            debug!(
                line = %request.line_id,
                method = %decision.method,
                confidence,
                "Decision accepted"
            );
        }
        Ok(decision)
    }

    fn fall_back(
        &self,
        request: &RouteRequest,
        reason: String,
    ) -> Result<RoutedDecision, RouterError> {
        let default = &self.config.default_method;
        if !self.registry.contains(default) {
            return Err(RouterError::Unavailable {
                reason: format!("{reason}; default method '{default}' is not registered"),
            });
        }

        if self.signal.is_some() {
            warn!(
                line = %request.line_id,
                method = %default,
                reason = %reason,
                "Falling back to default method"
            );
        } else {
            debug!(line = %request.line_id, method = %default, "Using default method");
        }
        let decision = Decision::new(
            default.clone(),
            clamp_confidence(self.config.fallback_confidence),
            DecidedBy::Fallback,
        );
        Ok(RoutedDecision {
            decision,
            fallback_reason: Some(reason),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::StubSignal;
    use reelforge_method_api::test_support::StubMethod;
    use reelforge_registry::MethodDescriptor;

    fn registry() -> Arc<MethodRegistry> {
        let mut registry = MethodRegistry::new();
        for stub in [
            StubMethod::video("subtitle_only"),
            StubMethod::video("text_to_video"),
            StubMethod::audio("tts", 1000),
        ] {
            registry
                .register(MethodDescriptor::from_method(Arc::new(stub)))
                .unwrap();
        }
        Arc::new(registry)
    }

    fn router(signal: Option<StubSignal>) -> DecisionRouter {
        DecisionRouter::new(
            registry(),
            signal.map(|s| Arc::new(s) as Arc<dyn ClassificationSignal>),
            RouterConfig::default(),
        )
    }

    fn request() -> RouteRequest {
        RouteRequest::new("demo", "L1", "A plane takes off")
    }

    #[tokio::test]
    async fn test_accepts_registered_answer() {
        let routed = router(Some(StubSignal::answering("text_to_video", 0.9)))
            .decide(&request())
            .await
            .unwrap();
        assert_eq!(routed.fallback_reason, None);
        assert_eq!(routed.decision.method, "text_to_video");
        assert_eq!(routed.decision.decided_by, DecidedBy::Model);
        assert!(!routed.decision.is_low_confidence());
    }

    #[tokio::test]
    async fn test_low_confidence_is_flagged_not_rejected() {
        let routed = router(Some(StubSignal::answering("text_to_video", 0.2)))
            .decide(&request())
            .await
            .unwrap();
        assert_eq!(routed.decision.method, "text_to_video");
        assert!(routed.decision.is_low_confidence());
    }

    #[tokio::test]
    async fn test_confidence_is_clamped() {
        let routed = router(Some(StubSignal::answering("tts", 3.5)))
            .decide(&request())
            .await
            .unwrap();
        assert_eq!(routed.decision.confidence, 1.0);

        let routed = router(Some(StubSignal::answering("tts", f64::NAN)))
            .decide(&request())
            .await
            .unwrap();
        assert_eq!(routed.decision.confidence, 0.0);
        assert!(routed.decision.is_low_confidence());
    }

    #[tokio::test]
    async fn test_unregistered_answer_falls_back() {
        let routed = router(Some(StubSignal::answering("react_animation", 1.0)))
            .decide(&request())
            .await
            .unwrap();
        assert_eq!(routed.decision.method, "subtitle_only");
        assert_eq!(routed.decision.decided_by, DecidedBy::Fallback);
        assert_eq!(routed.decision.confidence, 0.0);
        assert!(routed.fallback_reason.unwrap().contains("react_animation"));
    }

    #[tokio::test]
    async fn test_signal_error_falls_back() {
        let routed = router(Some(StubSignal::failing("quota")))
            .decide(&request())
            .await
            .unwrap();
        assert_eq!(routed.decision.decided_by, DecidedBy::Fallback);
        assert!(routed.fallback_reason.unwrap().contains("quota"));
    }

    #[tokio::test]
    async fn test_missing_signal_falls_back() {
        let routed = router(None).decide(&request()).await.unwrap();
        assert_eq!(routed.decision.method, "subtitle_only");
        assert_eq!(routed.decision.decided_by, DecidedBy::Fallback);
    }

    #[tokio::test]
    async fn test_signal_timeout_falls_back() {
        let signal = StubSignal::hanging();
        let config = RouterConfig {
            timeout: Duration::from_millis(50),
            ..RouterConfig::default()
        };
        let router = DecisionRouter::new(registry(), Some(Arc::new(signal.clone())), config);
        let routed = router.decide(&request()).await.unwrap();
        assert_eq!(routed.decision.decided_by, DecidedBy::Fallback);
        assert!(routed.fallback_reason.unwrap().contains("timed out"));
        assert_eq!(signal.calls(), 1);
    }

    #[tokio::test]
    async fn test_unavailable_when_default_unregistered() {
        let config = RouterConfig {
            default_method: "missing".to_string(),
            ..RouterConfig::default()
        };
        let router = DecisionRouter::new(
            registry(),
            Some(Arc::new(StubSignal::answering("react_animation", 1.0))),
            config,
        );
        let err = router.decide(&request()).await.unwrap_err();
        let RouterError::Unavailable { reason } = err;
        assert!(reason.contains("react_animation"));
        assert!(reason.contains("'missing' is not registered"));
    }

    #[test]
    fn test_router_config_from_config() {
        let mut config = Config::builtin();
        config.router.default_method = Some("tts".to_string());
        let routing = RouterConfig::from_config(&config);
        assert_eq!(routing.default_method, "tts");
        assert_eq!(routing.confidence_threshold, 0.5);
        assert_eq!(routing.timeout, Duration::from_secs(60));
    }
}
