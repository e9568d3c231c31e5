//! Built-in generation methods
//!
//! | Name | Output | Backend |
//! |------|--------|---------|
//! | `react_render` | video | LLM-authored page, headless browser, ffmpeg |
//! | `subtitle_only` | video | local ffmpeg |
//! | `text_to_video` | video | OpenAI-compatible video API |
//! | `tts` | audio | OpenAI-compatible `/audio/speech` |
//! | `voice_clone` | audio | GPT-SoVITS style `/tts` server |
//!
//! All of them report missing credentials, missing tools and upstream
//! errors as `ok = false` results. [`register_builtin`] adds them to a
//! registry; it is called once at start-up.

pub mod ffmpeg;
pub mod react_render;
pub mod srt;
pub mod subtitle_only;
pub mod text_to_video;
pub mod tts;
pub mod voice_clone;

pub use react_render::{ReactRender, ReactSettings};
pub use subtitle_only::{SubtitleOnly, SubtitleSettings};
pub use text_to_video::{TextToVideo, VideoApiSettings};
pub use tts::{Tts, TtsSettings};
pub use voice_clone::{VoiceClone, VoiceCloneSettings};

use std::sync::Arc;
use tracing::debug;

use reelforge_config::Config;
use reelforge_llm::{HttpClient, RetryPolicy};
use reelforge_registry::{MethodDescriptor, MethodRegistry};
use reelforge_utils::error::ReelforgeError;

/// Names of the built-in methods, sorted
pub const BUILTIN_METHODS: [&str; 5] = [
    react_render::NAME,
    subtitle_only::NAME,
    text_to_video::NAME,
    tts::NAME,
    voice_clone::NAME,
];

/// Register the built-in methods configured from `config`.
///
/// # Errors
///
/// `ReelforgeError::Registry` when a name is already taken and
/// `ReelforgeError::Llm` when the HTTP client cannot be built.
pub fn register_builtin(registry: &mut MethodRegistry, config: &Config) -> Result<(), ReelforgeError> {
    let client = Arc::new(HttpClient::with_policy(RetryPolicy::with_attempts(
        config.llm_max_retries(),
    ))?);

    let subtitle = SubtitleOnly::new(SubtitleSettings::from_settings(
        &config.method_settings(subtitle_only::NAME),
    ));
    registry.register(MethodDescriptor::from_method(Arc::new(subtitle)))?;
    registry.register(MethodDescriptor::from_method(Arc::new(
        TextToVideo::from_config(Arc::clone(&client), config),
    )))?;
    registry.register(MethodDescriptor::from_method(Arc::new(Tts::from_config(
        Arc::clone(&client),
        config,
    ))))?;
    registry.register(MethodDescriptor::from_method(Arc::new(VoiceClone::new(
        client,
        VoiceCloneSettings::from_settings(&config.method_settings(voice_clone::NAME)),
    ))))?;

    // Without a usable LLM the page falls back to a title card
    let author = reelforge_llm::from_config(config).unwrap_or_else(|e| {
        debug!(error = %e, "react_render runs without an authoring model");
        None
    });
    registry.register(MethodDescriptor::from_method(Arc::new(ReactRender::new(
        ReactSettings::from_settings(&config.method_settings(react_render::NAME)),
        author,
    ))))?;

    debug!(methods = ?BUILTIN_METHODS, "Registered built-in methods");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use reelforge_method_api::OutputKind;
    use reelforge_utils::error::RegistryError;

    #[test]
    fn test_register_builtin() {
        let mut registry = MethodRegistry::new();
        register_builtin(&mut registry, &Config::builtin()).unwrap();

        assert_eq!(registry.names(), BUILTIN_METHODS.to_vec());
        assert_eq!(
            registry.resolve("tts").unwrap().output_kind,
            OutputKind::Audio
        );
        assert_eq!(
            registry.resolve("subtitle_only").unwrap().output_kind,
            OutputKind::Video
        );
        assert_eq!(
            registry.resolve("react_render").unwrap().output_kind,
            OutputKind::Video
        );
        assert_eq!(
            registry.resolve("voice_clone").unwrap().output_kind,
            OutputKind::Audio
        );
    }

    #[test]
    fn test_register_builtin_twice_is_duplicate() {
        let mut registry = MethodRegistry::new();
        register_builtin(&mut registry, &Config::builtin()).unwrap();
        let err = register_builtin(&mut registry, &Config::builtin()).unwrap_err();
        assert!(matches!(
            err,
            ReelforgeError::Registry(RegistryError::Duplicate(_))
        ));
    }
}
