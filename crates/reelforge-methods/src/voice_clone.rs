//! `voice_clone`: narration in a cloned voice from a GPT-SoVITS style
//! `GET /tts` server.
//!
//! The line is split into clips at sentence and clause punctuation. Each
//! clip is synthesized with the speaker's reference audio and transcript,
//! written as `<target>_NNN.wav`, and timed from its WAV header. The clips
//! are joined into `<target>.wav` and a per-clip `<target>.srt` is written
//! alongside.

use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use reelforge_config::MethodSettings;
use reelforge_llm::HttpClient;
use reelforge_method_api::{GenerationResult, Method, MethodError, MethodRequest, OutputKind};
use reelforge_utils::atomic_write::{write_bytes_atomic, write_file_atomic};

use crate::ffmpeg::{Ffmpeg, concat_list};
use crate::srt::{self, SrtCue};
use crate::tts::{block_str, estimate_duration_ms, wav_duration_ms};

pub const NAME: &str = "voice_clone";

const DEFAULT_URL: &str = "http://127.0.0.1:9880/tts";
const DEFAULT_LANG: &str = "zh";
const DEFAULT_SPEED: &str = "1.0";
const DEFAULT_SPLIT_METHOD: &str = "cut5";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
const DEFAULT_MERGE_TIMEOUT_SECS: u64 = 120;

/// Speaker entry used when the line names no known character
const DEFAULT_SPEAKER: &str = "default";

static CLIP_SEPARATORS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[，。？！；,.?!;\n]+").expect("clip separator pattern is valid"));

/// Reference voice for one character
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Speaker {
    pub lang: Option<String>,
    /// Reference recording, as a path on the synthesis server
    pub ref_audio_path: Option<String>,
    /// Transcript of the reference recording
    pub prompt_text: Option<String>,
}

impl Speaker {
    fn from_table(table: &toml::Table) -> Self {
        let get = |key: &str| table.get(key).and_then(toml::Value::as_str).map(str::to_string);
        Self {
            lang: get("lang"),
            ref_audio_path: get("ref_audio_path"),
            prompt_text: get("prompt_text"),
        }
    }

    /// Fields of `self`, with gaps filled from `fallback`
    fn or(self, fallback: &Self) -> Self {
        Self {
            lang: self.lang.or_else(|| fallback.lang.clone()),
            ref_audio_path: self.ref_audio_path.or_else(|| fallback.ref_audio_path.clone()),
            prompt_text: self.prompt_text.or_else(|| fallback.prompt_text.clone()),
        }
    }
}

/// Server parameters, read from `[methods.voice_clone]`
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceCloneSettings {
    pub url: String,
    /// Reference voice when neither the character nor `default` sets one
    pub speaker: Speaker,
    /// Per-character voices from the `characters` sub-table
    pub characters: BTreeMap<String, Speaker>,
    pub speed: String,
    pub split_method: String,
    /// ffmpeg name or path, used only for clips that cannot be joined in
    /// process
    pub ffmpeg: Option<String>,
    pub request_timeout: Duration,
}

impl Default for VoiceCloneSettings {
    fn default() -> Self {
        Self::from_settings(&MethodSettings::default())
    }
}

impl VoiceCloneSettings {
    #[must_use]
    pub fn from_settings(settings: &MethodSettings) -> Self {
        let characters = settings
            .0
            .get("characters")
            .and_then(toml::Value::as_table)
            .map(|table| {
                table
                    .iter()
                    .filter_map(|(name, entry)| {
                        entry
                            .as_table()
                            .map(|entry| (name.clone(), Speaker::from_table(entry)))
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            url: settings.str("url").unwrap_or(DEFAULT_URL).to_string(),
            speaker: Speaker::from_table(&settings.0),
            characters,
            speed: settings.str("speed").unwrap_or(DEFAULT_SPEED).to_string(),
            split_method: settings
                .str("text_split_method")
                .unwrap_or(DEFAULT_SPLIT_METHOD)
                .to_string(),
            ffmpeg: settings.str("ffmpeg").map(str::to_string),
            request_timeout: Duration::from_secs(
                settings
                    .u64("timeout_secs")
                    .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
            ),
        }
    }

    /// Voice for a line: its character, else `default`, else the top-level
    /// reference
    #[must_use]
    pub fn speaker_for(&self, character: Option<&str>) -> Speaker {
        let named = character
            .and_then(|c| self.characters.get(c))
            .or_else(|| self.characters.get(DEFAULT_SPEAKER))
            .cloned()
            .unwrap_or_default();
        named.or(&self.speaker)
    }

    /// Request URL synthesizing `clip` with `speaker`'s voice.
    ///
    /// # Errors
    ///
    /// A message when the configured URL does not parse.
    pub fn clip_url(&self, clip: &str, speaker: &Speaker) -> Result<reqwest::Url, String> {
        let mut url =
            reqwest::Url::parse(&self.url).map_err(|e| format!("invalid url '{}': {e}", self.url))?;
        let lang = speaker.lang.as_deref().unwrap_or(DEFAULT_LANG);
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("text", clip)
                .append_pair("text_lang", lang)
                .append_pair("prompt_lang", lang)
                .append_pair("text_split_method", &self.split_method)
                .append_pair("speed", &self.speed)
                .append_pair("media_type", "wav")
                .append_pair("batch_size", "1");
            if let Some(path) = &speaker.ref_audio_path {
                query.append_pair("ref_audio_path", path);
            }
            if let Some(text) = &speaker.prompt_text {
                query.append_pair("prompt_text", text);
            }
        }
        Ok(url)
    }
}

/// Clips of `text`, split at sentence and clause punctuation
#[must_use]
pub fn split_clips(text: &str) -> Vec<String> {
    CLIP_SEPARATORS
        .split(text)
        .map(str::trim)
        .filter(|clip| !clip.is_empty())
        .map(str::to_string)
        .collect()
}

/// `fmt ` body and `data` body of a RIFF/WAVE file
fn wav_chunks(bytes: &[u8]) -> Option<(&[u8], &[u8])> {
    if bytes.get(0..4)? != b"RIFF" || bytes.get(8..12)? != b"WAVE" {
        return None;
    }
    let mut offset = 12;
    let mut fmt = None;
    while offset + 8 <= bytes.len() {
        let id = &bytes[offset..offset + 4];
        let size = u32::from_le_bytes(bytes.get(offset + 4..offset + 8)?.try_into().ok()?) as usize;
        let body = offset + 8;
        match id {
            b"fmt " => fmt = Some(bytes.get(body..body.checked_add(size)?)?),
            b"data" => {
                let end = body.saturating_add(size).min(bytes.len());
                return Some((fmt?, &bytes[body..end]));
            }
            _ => {}
        }
        offset = body.checked_add(size)?.checked_add(size % 2)?;
    }
    None
}

/// Join WAV files of identical format into one.
///
/// `None` when a part is not a WAV file or the formats differ.
#[must_use]
pub fn merge_wavs(parts: &[Vec<u8>]) -> Option<Vec<u8>> {
    let chunks: Vec<(&[u8], &[u8])> = parts.iter().map(|p| wav_chunks(p)).collect::<Option<_>>()?;
    let (fmt, _) = *chunks.first()?;
    if chunks.iter().any(|(other, _)| *other != fmt) {
        return None;
    }

    let data_len: usize = chunks.iter().map(|(_, data)| data.len()).sum();
    let fmt_len = u32::try_from(fmt.len()).ok()?;
    let data_len_u32 = u32::try_from(data_len).ok()?;
    let riff_len = 4 + (8 + fmt_len + fmt_len % 2) + 8 + data_len_u32;

    let mut out = Vec::with_capacity(data_len + fmt.len() + 28);
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&riff_len.to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&fmt_len.to_le_bytes());
    out.extend_from_slice(fmt);
    if fmt.len() % 2 == 1 {
        out.push(0);
    }
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len_u32.to_le_bytes());
    for (_, data) in &chunks {
        out.extend_from_slice(data);
    }
    Some(out)
}

/// Clip-by-clip voice cloning method
#[derive(Debug, Clone)]
pub struct VoiceClone {
    client: Arc<HttpClient>,
    settings: VoiceCloneSettings,
}

impl VoiceClone {
    #[must_use]
    pub fn new(client: Arc<HttpClient>, settings: VoiceCloneSettings) -> Self {
        Self { client, settings }
    }

    #[must_use]
    pub fn settings(&self) -> &VoiceCloneSettings {
        &self.settings
    }

    async fn synthesize(&self, clip: &str, speaker: &Speaker) -> Result<Vec<u8>, String> {
        let url = self.settings.clip_url(clip, speaker)?;
        let response = self
            .client
            .execute_with_retry(
                self.client.get(url.as_str()),
                self.settings.request_timeout,
                NAME,
            )
            .await
            .map_err(|e| e.to_string())?;
        match response.bytes().await {
            Ok(bytes) if !bytes.is_empty() => Ok(bytes.to_vec()),
            Ok(_) => Err("server returned no audio".to_string()),
            Err(e) => Err(format!("download interrupted: {e}")),
        }
    }

    /// Write the joined narration to `output`; returns how it was joined
    async fn join(
        &self,
        parts: &[Vec<u8>],
        clip_paths: &[Utf8PathBuf],
        request: &MethodRequest,
        output: &Utf8Path,
    ) -> Result<&'static str, String> {
        let (bytes, mode) = match parts {
            [single] => (single.clone(), "single"),
            _ => match merge_wavs(parts) {
                Some(merged) => (merged, "wav"),
                None => {
                    self.join_with_ffmpeg(clip_paths, request, output).await?;
                    return Ok("ffmpeg");
                }
            },
        };
        write_bytes_atomic(output.as_std_path(), &bytes).map_err(|e| format!("{e:#}"))?;
        Ok(mode)
    }

    async fn join_with_ffmpeg(
        &self,
        clip_paths: &[Utf8PathBuf],
        request: &MethodRequest,
        output: &Utf8Path,
    ) -> Result<(), String> {
        let ffmpeg = Ffmpeg::locate(self.settings.ffmpeg.as_deref())?;
        let list = request
            .workdir
            .join(format!("{}_clips.txt", request.target_name));
        write_file_atomic(&list, &concat_list(clip_paths.iter().map(|p| p.as_str())))
            .map_err(|e| format!("{e:#}"))?;
        let args: Vec<OsString> = [
            "-y", "-f", "concat", "-safe", "0", "-i", list.as_str(), "-c", "copy", output.as_str(),
        ]
        .into_iter()
        .map(OsString::from)
        .collect();
        let result = ffmpeg
            .run(&args, Duration::from_secs(DEFAULT_MERGE_TIMEOUT_SECS))
            .await;
        if let Err(e) = std::fs::remove_file(&list) {
            debug!(list = %list, error = %e, "Could not remove clip list");
        }
        result
    }
}

#[async_trait]
impl Method for VoiceClone {
    fn name(&self) -> &str {
        NAME
    }

    fn output_kind(&self) -> OutputKind {
        OutputKind::Audio
    }

    async fn run(&self, request: &MethodRequest) -> Result<GenerationResult, MethodError> {
        request.validate()?;
        let spoken = block_str(&request.block, "voice").unwrap_or(request.text.trim());
        let clips = split_clips(spoken);
        if clips.is_empty() {
            return Ok(GenerationResult::failure("nothing to synthesize after splitting"));
        }
        let character = block_str(&request.block, "character");
        let speaker = self.settings.speaker_for(character);

        let mut parts = Vec::with_capacity(clips.len());
        let mut clip_paths = Vec::with_capacity(clips.len());
        let mut cues = Vec::with_capacity(clips.len());
        let mut elapsed_ms = 0;
        for (index, clip) in clips.iter().enumerate() {
            let number = index + 1;
            let audio = match self.synthesize(clip, &speaker).await {
                Ok(audio) => audio,
                Err(e) => {
                    return Ok(GenerationResult::failure(format!(
                        "clip {number} of {}: {e}",
                        clips.len()
                    ))
                    .with_meta("mode", NAME));
                }
            };
            let path = request
                .workdir
                .join(format!("{}_{number:03}.wav", request.target_name));
            if let Err(e) = write_bytes_atomic(path.as_std_path(), &audio) {
                return Ok(GenerationResult::failure(format!("{e:#}")));
            }

            let duration_ms = wav_duration_ms(&audio).unwrap_or_else(|| estimate_duration_ms(clip));
            cues.push(SrtCue {
                start_ms: elapsed_ms,
                end_ms: elapsed_ms + duration_ms,
                text: clip.clone(),
            });
            elapsed_ms += duration_ms;
            debug!(target_name = %request.target_name, clip = number, duration_ms, "Synthesized clip");
            parts.push(audio);
            clip_paths.push(path);
        }

        let subtitles = request.artifact_path("srt");
        if let Err(e) = write_file_atomic(&subtitles, &srt::render(&cues)) {
            return Ok(GenerationResult::failure(format!("{e:#}")));
        }
        let narration = request.artifact_path("wav");
        let joined = match self.join(&parts, &clip_paths, request, &narration).await {
            Ok(joined) => joined,
            Err(message) => {
                return Ok(GenerationResult::failure(format!("joining clips failed: {message}"))
                    .with_meta("mode", NAME));
            }
        };

        let mut artifacts = vec![narration.to_string(), subtitles.to_string()];
        artifacts.extend(clip_paths.iter().map(ToString::to_string));
        let mut result = GenerationResult::success(artifacts)
            .with_meta("mode", NAME)
            .with_meta("clips", clips.len())
            .with_meta("joined", joined)
            .with_meta("server", self.settings.url.clone())
            .with_duration_ms(elapsed_ms);
        if let Some(character) = character {
            result = result.with_meta("character", character);
        }
        Ok(result)
    }
}
