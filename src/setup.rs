//! Start-up wiring: registry, classification signal, router and engine
//! built from the effective configuration.

use std::sync::Arc;
use tracing::{debug, info, warn};

use reelforge_config::Config;
use reelforge_engine::Engine;
use reelforge_registry::MethodRegistry;
use reelforge_router::{ClassificationSignal, DecisionRouter, LlmSignal, RouterConfig};
use reelforge_utils::error::{ReelforgeError, RegistryError};

/// Fresh registry holding the built-in methods
///
/// # Errors
///
/// `ReelforgeError::Registry` on a duplicate name.
pub fn build_registry(config: &Config) -> Result<MethodRegistry, ReelforgeError> {
    let mut registry = MethodRegistry::new();
    reelforge_methods::register_builtin(&mut registry, config)?;
    Ok(registry)
}

/// LLM classification signal, when a provider is configured and usable.
///
/// A provider that cannot be constructed (for example because its API key
/// is not set) is logged and skipped; lines are then decided by the
/// fallback method.
#[must_use]
pub fn build_signal(config: &Config) -> Option<Arc<dyn ClassificationSignal>> {
    match reelforge_llm::from_config(config) {
        Ok(Some(backend)) => {
            info!(provider = backend.provider(), model = config.llm_model(), "Using LLM classification");
            Some(Arc::new(LlmSignal::from_config(backend, config)))
        }
        Ok(None) => {
            debug!("LLM classification disabled");
            None
        }
        Err(e) => {
            warn!(error = %e, "LLM classification unavailable; using the default method");
            None
        }
    }
}

/// Check that the configured method names resolve.
///
/// A dedicated audio method that is not registered is an error. An
/// unregistered default method is only warned about: the run still
/// proceeds, and lines the signal cannot decide fail individually.
///
/// # Errors
///
/// `ReelforgeError::Registry` for an unknown audio method.
pub fn check_configured_methods(
    registry: &MethodRegistry,
    config: &Config,
) -> Result<(), ReelforgeError> {
    if let Some(audio) = config.audio_method() {
        registry
            .resolve(audio)
            .map_err(|e| ReelforgeError::Registry(RegistryError::Unknown(e)))?;
    }
    let default_method = config.router_default_method();
    if !registry.contains(default_method) {
        warn!(
            method = default_method,
            registered = ?registry.names(),
            "Default method is not registered; undecidable lines will fail"
        );
    }
    Ok(())
}

/// Engine over `registry` with the router and audio method from `config`
#[must_use]
pub fn build_engine(
    registry: Arc<MethodRegistry>,
    signal: Option<Arc<dyn ClassificationSignal>>,
    config: &Config,
) -> Engine {
    let router = DecisionRouter::new(
        Arc::clone(&registry),
        signal,
        RouterConfig::from_config(config),
    );
    Engine::new(registry, Arc::new(router))
        .with_audio_method(config.audio_method().map(str::to_string))
}
