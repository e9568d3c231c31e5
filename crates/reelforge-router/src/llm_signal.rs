//! Classification signal backed by a chat-completion model.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use reelforge_config::Config;
use reelforge_llm::{LlmBackend, LlmInvocation, Message};

use crate::signal::{ClassificationSignal, RouteRequest, SignalAnswer, SignalError};

/// Confidence given to an answer that names a method exactly
pub const EXACT_MATCH_CONFIDENCE: f64 = 1.0;
/// Confidence given to an answer that only mentions a method
pub const CONTAINED_MATCH_CONFIDENCE: f64 = 0.7;

const MAX_ANSWER_IN_ERROR: usize = 120;

/// Asks an [`LlmBackend`] for a single method keyword
pub struct LlmSignal {
    backend: Arc<dyn LlmBackend>,
    timeout: Duration,
    max_tokens: u32,
    temperature: f32,
}

impl std::fmt::Debug for LlmSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmSignal")
            .field("provider", &self.backend.provider())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl LlmSignal {
    #[must_use]
    pub fn new(backend: Arc<dyn LlmBackend>, timeout: Duration) -> Self {
        Self {
            backend,
            timeout,
            max_tokens: reelforge_config::DEFAULT_LLM_MAX_TOKENS,
            temperature: reelforge_config::DEFAULT_LLM_TEMPERATURE,
        }
    }

    /// Signal using the `[llm]` request parameters
    #[must_use]
    pub fn from_config(backend: Arc<dyn LlmBackend>, config: &Config) -> Self {
        Self {
            backend,
            timeout: config.llm_timeout(),
            max_tokens: config.llm_max_tokens(),
            temperature: config.llm_temperature(),
        }
    }
}

/// Conversation asking the model to pick one of `candidates`
#[must_use]
pub fn build_messages(request: &RouteRequest, candidates: &[String]) -> Vec<Message> {
    let mut system = String::from(
        "You are a video director assistant. \
         Your job is to decide which rendering method best fits a given line of script.\n\
         Possible options:\n",
    );
    for name in candidates {
        system.push_str("- ");
        system.push_str(name);
        system.push('\n');
    }
    system.push_str(
        "Respond with exactly one of the options above, or with a JSON object \
         {\"method\": <option>, \"confidence\": <0..1>}.",
    );

    let mut user = format!("Video topic: {}\n\nLine: {}\n", request.project, request.text);
    if let Some(context) = request.context.as_deref().filter(|c| !c.trim().is_empty()) {
        user.push_str(&format!("\nContext: {context}\n"));
    }
    user.push_str("\nWhich rendering method should be used? Reply with one keyword only.");

    vec![Message::system(system), Message::user(user)]
}

fn normalize(s: &str) -> String {
    s.trim()
        .trim_matches(|c: char| matches!(c, '"' | '\'' | '`' | '.' | ',' | '*'))
        .to_lowercase()
        .chars()
        .map(|c| if c == '-' || c.is_whitespace() { '_' } else { c })
        .collect()
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_suffix("```").unwrap_or(inner);
    // Drop an info string such as `json`
    match inner.split_once('\n') {
        Some((first, rest)) if !first.trim_start().starts_with('{') => rest.trim(),
        _ => inner.trim(),
    }
}

fn match_candidate(answer: &str, candidates: &[String]) -> Option<(String, f64)> {
    let wanted = normalize(answer);
    if wanted.is_empty() {
        return None;
    }
    if let Some(exact) = candidates.iter().find(|c| normalize(c) == wanted) {
        return Some((exact.clone(), EXACT_MATCH_CONFIDENCE));
    }

    // Longest name first so `text_to_video_hd` wins over `text_to_video`
    let mut by_length: Vec<&String> = candidates.iter().collect();
    by_length.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    by_length
        .into_iter()
        .find(|c| {
            let name = normalize(c);
            !name.is_empty() && wanted.contains(&name)
        })
        .map(|c| (c.clone(), CONTAINED_MATCH_CONFIDENCE))
}

/// Map a raw model answer onto one of `candidates`.
///
/// Accepts a bare keyword (exact match gives full confidence, a mention
/// inside a longer answer gives reduced confidence) or a JSON object with
/// `method` and optional `confidence`.
#[must_use]
pub fn normalize_answer(raw: &str, candidates: &[String]) -> Option<SignalAnswer> {
    let body = strip_code_fence(raw);

    if let Ok(serde_json::Value::Object(map)) = serde_json::from_str::<serde_json::Value>(body)
        && let Some(method) = map.get("method").and_then(serde_json::Value::as_str)
    {
        let (name, matched) = match_candidate(method, candidates)?;
        let confidence = map
            .get("confidence")
            .and_then(serde_json::Value::as_f64)
            .unwrap_or(matched);
        return Some(SignalAnswer::new(name, confidence));
    }

    match_candidate(body, candidates).map(|(name, confidence)| SignalAnswer::new(name, confidence))
}

fn truncate(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.chars().count() <= MAX_ANSWER_IN_ERROR {
        trimmed.to_string()
    } else {
        let head: String = trimmed.chars().take(MAX_ANSWER_IN_ERROR).collect();
        format!("{head}...")
    }
}

#[async_trait]
impl ClassificationSignal for LlmSignal {
    fn name(&self) -> &str {
        self.backend.provider()
    }

    async fn classify(
        &self,
        request: &RouteRequest,
        candidates: &[String],
    ) -> Result<SignalAnswer, SignalError> {
        let invocation = LlmInvocation::new(self.timeout, build_messages(request, candidates))
            .with_sampling(self.max_tokens, self.temperature);

        let result = self.backend.invoke(invocation).await?;
        debug!(
            line = %request.line_id,
            model = %result.model_used,
            answer = %truncate(&result.raw_response),
            "Classification answer received"
        );

        normalize_answer(&result.raw_response, candidates)
            .ok_or_else(|| SignalError::Unparseable(truncate(&result.raw_response)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reelforge_llm::{LlmError, LlmResult};
    use std::sync::Mutex;

    fn candidates() -> Vec<String> {
        vec![
            "subtitle_only".to_string(),
            "text_to_video".to_string(),
            "tts".to_string(),
        ]
    }

    #[test]
    fn test_exact_keyword() {
        let answer = normalize_answer("subtitle_only", &candidates()).unwrap();
        assert_eq!(answer, SignalAnswer::new("subtitle_only", 1.0));

        let answer = normalize_answer("  Text-To-Video.\n", &candidates()).unwrap();
        assert_eq!(answer.method, "text_to_video");
        assert_eq!(answer.confidence, EXACT_MATCH_CONFIDENCE);
    }

    #[test]
    fn test_contained_keyword() {
        let answer =
            normalize_answer("I would use text to video for this one", &candidates()).unwrap();
        assert_eq!(answer.method, "text_to_video");
        assert_eq!(answer.confidence, CONTAINED_MATCH_CONFIDENCE);
    }

    #[test]
    fn test_longest_contained_name_wins() {
        let names = vec!["video".to_string(), "text_to_video".to_string()];
        let answer = normalize_answer("go with text_to_video please", &names).unwrap();
        assert_eq!(answer.method, "text_to_video");
    }

    #[test]
    fn test_json_answer() {
        let answer = normalize_answer(
            "```json\n{\"method\": \"subtitle_only\", \"confidence\": 0.35}\n```",
            &candidates(),
        )
        .unwrap();
        assert_eq!(answer, SignalAnswer::new("subtitle_only", 0.35));

        let answer = normalize_answer(r#"{"method":"tts"}"#, &candidates()).unwrap();
        assert_eq!(answer.confidence, 1.0);
    }

    #[test]
    fn test_unknown_answer() {
        assert!(normalize_answer("react_animation", &candidates()).is_none());
        assert!(normalize_answer("", &candidates()).is_none());
        assert!(normalize_answer(r#"{"method":"hologram"}"#, &candidates()).is_none());
    }

    #[test]
    fn test_messages_list_candidates_and_context() {
        let request = RouteRequest::new("aviation", "L1", "The plane lands.")
            .with_context(Some("Earlier: takeoff".to_string()));
        let messages = build_messages(&request, &candidates());
        assert_eq!(messages.len(), 2);
        assert!(messages[0].content.contains("- text_to_video\n"));
        assert!(messages[1].content.contains("Video topic: aviation"));
        assert!(messages[1].content.contains("Context: Earlier: takeoff"));

        let bare = build_messages(&RouteRequest::new("aviation", "L1", "x"), &candidates());
        assert!(!bare[1].content.contains("Context:"));
    }

    struct ScriptedBackend {
        answer: Result<String, String>,
        seen: Mutex<Vec<LlmInvocation>>,
    }

    #[async_trait]
    impl LlmBackend for ScriptedBackend {
        fn provider(&self) -> &str {
            "scripted"
        }

        async fn invoke(&self, inv: LlmInvocation) -> Result<LlmResult, LlmError> {
            self.seen.lock().unwrap().push(inv);
            match &self.answer {
                Ok(text) => Ok(LlmResult::new(text.clone(), "scripted", "m")),
                Err(reason) => Err(LlmError::ProviderOutage(reason.clone())),
            }
        }
    }

    #[tokio::test]
    async fn test_classify_passes_parameters() {
        let backend = Arc::new(ScriptedBackend {
            answer: Ok("tts".to_string()),
            seen: Mutex::new(Vec::new()),
        });
        let signal = LlmSignal::new(backend.clone(), Duration::from_secs(5));
        let answer = signal
            .classify(&RouteRequest::new("p", "L1", "Hello"), &candidates())
            .await
            .unwrap();
        assert_eq!(answer.method, "tts");

        let seen = backend.seen.lock().unwrap();
        assert_eq!(seen[0].max_tokens, Some(20));
        assert_eq!(seen[0].timeout, Duration::from_secs(5));
        assert!(seen[0].model.is_none());
    }

    #[tokio::test]
    async fn test_classify_errors() {
        let garbled = LlmSignal::new(
            Arc::new(ScriptedBackend {
                answer: Ok("no idea".to_string()),
                seen: Mutex::new(Vec::new()),
            }),
            Duration::from_secs(5),
        );
        let err = garbled
            .classify(&RouteRequest::new("p", "L1", "x"), &candidates())
            .await
            .unwrap_err();
        assert!(matches!(err, SignalError::Unparseable(ref s) if s == "no idea"));

        let down = LlmSignal::new(
            Arc::new(ScriptedBackend {
                answer: Err("503".to_string()),
                seen: Mutex::new(Vec::new()),
            }),
            Duration::from_secs(5),
        );
        let err = down
            .classify(&RouteRequest::new("p", "L1", "x"), &candidates())
            .await
            .unwrap_err();
        assert!(matches!(err, SignalError::Llm(_)));
    }
}
