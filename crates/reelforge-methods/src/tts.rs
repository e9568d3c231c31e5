//! `tts`: speech synthesis through an OpenAI-compatible
//! `/audio/speech` endpoint.

use async_trait::async_trait;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use reelforge_config::{Config, MethodSettings};
use reelforge_llm::HttpClient;
use reelforge_method_api::{GenerationResult, Method, MethodError, MethodRequest, OutputKind};
use reelforge_utils::atomic_write::write_bytes_atomic;

pub const NAME: &str = "tts";

const DEFAULT_MODEL: &str = "FunAudioLLM/CosyVoice2-0.5B";
const DEFAULT_FORMAT: &str = "wav";
const DEFAULT_SAMPLE_RATE: u64 = 44_100;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

/// Floor for estimated durations
const MIN_ESTIMATE_MS: u64 = 1000;
const MS_PER_CJK_CHAR: u64 = 250;
const MS_PER_WORD: u64 = 380;

/// Speech parameters, read from `[methods.tts]` with the endpoint and key
/// falling back to `[llm]`
#[derive(Debug, Clone, PartialEq)]
pub struct TtsSettings {
    pub base_url: String,
    pub api_key_env: String,
    pub model: String,
    /// Voice used when the line names no known character
    pub voice: Option<String>,
    /// Character name → voice id, from the `voices` sub-table
    pub voices: BTreeMap<String, String>,
    pub response_format: String,
    pub sample_rate: u64,
    pub speed: f64,
    pub gain: f64,
    pub request_timeout: Duration,
}

impl TtsSettings {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::from_parts(
            &config.method_settings(NAME),
            config.llm_base_url(),
            config.llm_api_key_env(),
        )
    }

    fn from_parts(settings: &MethodSettings, base_url: &str, api_key_env: &str) -> Self {
        let voices = settings
            .0
            .get("voices")
            .and_then(toml::Value::as_table)
            .map(|table| {
                table
                    .iter()
                    .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            base_url: settings.str("base_url").unwrap_or(base_url).to_string(),
            api_key_env: settings.str("api_key_env").unwrap_or(api_key_env).to_string(),
            model: settings.str("model").unwrap_or(DEFAULT_MODEL).to_string(),
            voice: settings.str("voice").map(str::to_string),
            voices,
            response_format: settings
                .str("response_format")
                .unwrap_or(DEFAULT_FORMAT)
                .to_string(),
            sample_rate: settings.u64("sample_rate").unwrap_or(DEFAULT_SAMPLE_RATE),
            speed: settings.f64("speed").unwrap_or(1.0),
            gain: settings.f64("gain").unwrap_or(0.0),
            request_timeout: Duration::from_secs(
                settings
                    .u64("timeout_secs")
                    .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
            ),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/audio/speech", self.base_url.trim_end_matches('/'))
    }

    /// Voice for a line, by its `character` hint
    fn voice_for(&self, character: Option<&str>) -> Option<&str> {
        character
            .and_then(|c| self.voices.get(c))
            .or(self.voice.as_ref())
            .map(String::as_str)
    }
}

fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{3040}'..='\u{30FF}'
        | '\u{3400}'..='\u{4DBF}'
        | '\u{4E00}'..='\u{9FFF}'
        | '\u{AC00}'..='\u{D7AF}')
}

/// Rough spoken length of `text`
#[must_use]
pub fn estimate_duration_ms(text: &str) -> u64 {
    let cjk = text.chars().filter(|c| is_cjk(*c)).count() as u64;
    let words = text
        .split(|c: char| c.is_whitespace() || is_cjk(c))
        .filter(|w| w.chars().any(char::is_alphanumeric))
        .count() as u64;
    (cjk * MS_PER_CJK_CHAR + words * MS_PER_WORD).max(MIN_ESTIMATE_MS)
}

fn u32_at(bytes: &[u8], offset: usize) -> Option<u32> {
    let slice = bytes.get(offset..offset + 4)?;
    Some(u32::from_le_bytes([slice[0], slice[1], slice[2], slice[3]]))
}

/// Duration of a RIFF/WAVE file from its `fmt ` and `data` chunks
#[must_use]
pub fn wav_duration_ms(bytes: &[u8]) -> Option<u64> {
    if bytes.get(0..4)? != b"RIFF" || bytes.get(8..12)? != b"WAVE" {
        return None;
    }

    let mut offset = 12;
    let mut byte_rate = None;
    while offset + 8 <= bytes.len() {
        let id = &bytes[offset..offset + 4];
        let size = u32_at(bytes, offset + 4)? as usize;
        let body = offset + 8;
        match id {
            b"fmt " => byte_rate = u32_at(bytes, body + 8),
            b"data" => {
                // Streamed files may carry a placeholder size
                let available = bytes.len().saturating_sub(body);
                let data_len = size.min(available) as u64;
                let rate = u64::from(byte_rate.filter(|r| *r > 0)?);
                return Some(data_len * 1000 / rate);
            }
            _ => {}
        }
        offset = body.checked_add(size)?.checked_add(size % 2)?;
    }
    None
}

/// Speech synthesis method
#[derive(Debug, Clone)]
pub struct Tts {
    client: Arc<HttpClient>,
    settings: TtsSettings,
    api_key: Option<String>,
}

impl Tts {
    #[must_use]
    pub fn new(client: Arc<HttpClient>, settings: TtsSettings, api_key: Option<String>) -> Self {
        Self {
            client,
            settings,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        }
    }

    #[must_use]
    pub fn from_config(client: Arc<HttpClient>, config: &Config) -> Self {
        let settings = TtsSettings::from_config(config);
        let api_key = std::env::var(&settings.api_key_env).ok();
        Self::new(client, settings, api_key)
    }
}

pub(crate) fn block_str<'a>(block: &'a serde_json::Value, key: &str) -> Option<&'a str> {
    block
        .get(key)
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

#[async_trait]
impl Method for Tts {
    fn name(&self) -> &str {
        NAME
    }

    fn output_kind(&self) -> OutputKind {
        OutputKind::Audio
    }

    async fn run(&self, request: &MethodRequest) -> Result<GenerationResult, MethodError> {
        request.validate()?;
        let Some(api_key) = self.api_key.as_deref() else {
            return Ok(GenerationResult::failure(format!(
                "Missing API key: set {}",
                self.settings.api_key_env
            )));
        };

        // A line may carry a separate spoken form of its text
        let spoken = block_str(&request.block, "voice").unwrap_or(request.text.trim());
        let character = block_str(&request.block, "character");
        let voice = self.settings.voice_for(character);

        let mut body = json!({
            "model": self.settings.model,
            "input": spoken,
            "response_format": self.settings.response_format,
            "sample_rate": self.settings.sample_rate,
            "speed": self.settings.speed,
            "gain": self.settings.gain,
        });
        if let Some(voice) = voice {
            body["voice"] = json!(voice);
        }

        let http = self
            .client
            .post(&self.settings.endpoint())
            .bearer_auth(api_key)
            .json(&body);
        let response = match self
            .client
            .execute_with_retry(http, self.settings.request_timeout, NAME)
            .await
        {
            Ok(response) => response,
            Err(e) => return Ok(GenerationResult::failure(format!("TTS request failed: {e}"))),
        };
        let audio = match response.bytes().await {
            Ok(bytes) if !bytes.is_empty() => bytes,
            Ok(_) => return Ok(GenerationResult::failure("TTS returned no audio")),
            Err(e) => return Ok(GenerationResult::failure(format!("TTS download interrupted: {e}"))),
        };

        let path = request.artifact_path(&self.settings.response_format);
        if let Err(e) = write_bytes_atomic(path.as_std_path(), &audio) {
            return Ok(GenerationResult::failure(format!("{e:#}")));
        }

        let (duration_ms, source) = match wav_duration_ms(&audio) {
            Some(ms) => (ms, "header"),
            None => (estimate_duration_ms(spoken), "estimate"),
        };
        debug!(target_name = %request.target_name, duration_ms, source, "Synthesized speech");

        let mut result = GenerationResult::success([path.to_string()])
            .with_meta("model", self.settings.model.clone())
            .with_meta("duration_source", source)
            .with_duration_ms(duration_ms);
        if let Some(voice) = voice {
            result = result.with_meta("voice", voice);
        }
        if let Some(character) = character {
            result = result.with_meta("character", character);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use reelforge_llm::RetryPolicy;
    use tempfile::TempDir;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Minimal PCM WAV: 16-bit mono at 8 kHz
    fn wav(samples: usize) -> Vec<u8> {
        let data_len = (samples * 2) as u32;
        let mut out = Vec::new();
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(36 + data_len).to_le_bytes());
        out.extend_from_slice(b"WAVE");
        out.extend_from_slice(b"fmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&8000u32.to_le_bytes());
        out.extend_from_slice(&16000u32.to_le_bytes());
        out.extend_from_slice(&2u16.to_le_bytes());
        out.extend_from_slice(&16u16.to_le_bytes());
        out.extend_from_slice(b"data");
        out.extend_from_slice(&data_len.to_le_bytes());
        out.resize(out.len() + samples * 2, 0);
        out
    }

    fn tts_for(server: &MockServer) -> Tts {
        let table: toml::Table = toml::from_str(
            "voice = \"default-voice\"\n[voices]\nnarrator = \"speech:narrator\"",
        )
        .unwrap();
        let settings = TtsSettings::from_parts(&MethodSettings(table), &server.uri(), "TEST_KEY");
        let client = HttpClient::with_policy(RetryPolicy::with_attempts(1)).unwrap();
        Tts::new(Arc::new(client), settings, Some("secret".to_string()))
    }

    fn request(dir: &TempDir, block: serde_json::Value) -> MethodRequest {
        MethodRequest {
            prompt: "Hello".to_string(),
            project: "demo".to_string(),
            target_name: "L2".to_string(),
            text: "Hello there".to_string(),
            workdir: Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap(),
            duration_ms: None,
            block,
        }
    }

    #[test]
    fn test_wav_duration() {
        assert_eq!(wav_duration_ms(&wav(8000)), Some(1000));
        assert_eq!(wav_duration_ms(&wav(4000)), Some(500));
        assert_eq!(wav_duration_ms(b"ID3 not a wav"), None);
        let mut truncated = wav(8000);
        truncated.truncate(44 + 800);
        assert_eq!(wav_duration_ms(&truncated), Some(50));
    }

    #[test]
    fn test_estimate_duration() {
        assert_eq!(estimate_duration_ms("Hi"), MIN_ESTIMATE_MS);
        assert_eq!(estimate_duration_ms("one two three four five"), 5 * MS_PER_WORD);
        assert_eq!(estimate_duration_ms("飞机起飞了"), MIN_ESTIMATE_MS.max(5 * MS_PER_CJK_CHAR));
        assert_eq!(
            estimate_duration_ms("这是一个很长的中文句 with words"),
            10 * MS_PER_CJK_CHAR + 2 * MS_PER_WORD
        );
    }

    #[tokio::test]
    async fn test_synthesizes_with_character_voice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/audio/speech"))
            .and(body_partial_json(json!({
                "input": "Spoken form",
                "voice": "speech:narrator",
                "response_format": "wav"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(wav(16000)))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let block = json!({"voice": "Spoken form", "character": "narrator"});
        let result = tts_for(&server).run(&request(&dir, block)).await.unwrap();

        assert!(result.ok, "{result:?}");
        assert_eq!(result.duration_ms, Some(2000));
        assert_eq!(result.meta["duration_source"], json!("header"));
        assert!(dir.path().join("L2.wav").exists());
    }

    #[tokio::test]
    async fn test_non_wav_audio_uses_estimate() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/audio/speech"))
            .and(body_partial_json(json!({"voice": "default-voice", "input": "Hello there"})))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"compressed".to_vec()))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let result = tts_for(&server)
            .run(&request(&dir, serde_json::Value::Null))
            .await
            .unwrap();
        assert!(result.ok);
        assert_eq!(result.duration_ms, Some(MIN_ESTIMATE_MS));
        assert_eq!(result.meta["duration_source"], json!("estimate"));
    }

    #[tokio::test]
    async fn test_upstream_error_is_expected_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/audio/speech"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let result = tts_for(&server)
            .run(&request(&dir, serde_json::Value::Null))
            .await
            .unwrap();
        assert!(!result.ok);
        assert!(result.error_message().unwrap().contains("bad key"));
        assert!(!dir.path().join("L2.wav").exists());
    }
}
