//! `subtitle_only`: the line's text centered on a solid background.

use async_trait::async_trait;
use camino::Utf8PathBuf;
use std::ffi::OsString;
use std::time::Duration;
use tracing::debug;

use reelforge_config::MethodSettings;
use reelforge_method_api::{GenerationResult, Method, MethodError, MethodRequest, OutputKind};
use reelforge_utils::atomic_write::write_file_atomic;

use crate::ffmpeg::{Ffmpeg, escape_filter_value};
use crate::srt;

pub const NAME: &str = "subtitle_only";

const DEFAULT_WIDTH: u64 = 1280;
const DEFAULT_HEIGHT: u64 = 720;
const DEFAULT_FONT_SIZE: u64 = 46;
const DEFAULT_WRAP_WIDTH: usize = 28;
const DEFAULT_DURATION_MS: u64 = 4000;
const DEFAULT_RENDER_TIMEOUT_SECS: u64 = 300;

/// Rendering parameters, read from `[methods.subtitle_only]`
#[derive(Debug, Clone, PartialEq)]
pub struct SubtitleSettings {
    /// ffmpeg name or path; `ffmpeg` on `PATH` when unset
    pub ffmpeg: Option<String>,
    /// Font file; ffmpeg's default font when unset
    pub font: Option<Utf8PathBuf>,
    pub width: u64,
    pub height: u64,
    pub font_size: u64,
    pub font_color: String,
    pub background: String,
    /// Characters per rendered line before wrapping
    pub wrap_width: usize,
    /// Clip length when the request has no duration
    pub default_duration_ms: u64,
    pub render_timeout: Duration,
}

impl Default for SubtitleSettings {
    fn default() -> Self {
        Self {
            ffmpeg: None,
            font: None,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            font_size: DEFAULT_FONT_SIZE,
            font_color: "white".to_string(),
            background: "black".to_string(),
            wrap_width: DEFAULT_WRAP_WIDTH,
            default_duration_ms: DEFAULT_DURATION_MS,
            render_timeout: Duration::from_secs(DEFAULT_RENDER_TIMEOUT_SECS),
        }
    }
}

impl SubtitleSettings {
    #[must_use]
    pub fn from_settings(settings: &MethodSettings) -> Self {
        let defaults = Self::default();
        Self {
            ffmpeg: settings.str("ffmpeg").map(str::to_string),
            font: settings.str("font").map(Utf8PathBuf::from),
            width: settings.u64("width").unwrap_or(defaults.width),
            height: settings.u64("height").unwrap_or(defaults.height),
            font_size: settings.u64("font_size").unwrap_or(defaults.font_size),
            font_color: settings
                .str("font_color")
                .map_or(defaults.font_color, str::to_string),
            background: settings
                .str("background")
                .map_or(defaults.background, str::to_string),
            wrap_width: settings
                .u64("wrap_width")
                .and_then(|w| usize::try_from(w).ok())
                .unwrap_or(defaults.wrap_width),
            default_duration_ms: settings
                .u64("default_duration_ms")
                .unwrap_or(defaults.default_duration_ms),
            render_timeout: settings
                .u64("timeout_secs")
                .map_or(defaults.render_timeout, Duration::from_secs),
        }
    }
}

/// Wrap `text` so no rendered line exceeds `width` characters.
///
/// Words longer than `width` (including unspaced CJK runs) are split.
#[must_use]
pub fn wrap_text(text: &str, width: usize) -> String {
    let width = width.max(1);
    let mut lines = Vec::new();
    for paragraph in text.trim().lines() {
        let mut current = String::new();
        let mut current_len = 0;
        for word in paragraph.split_whitespace() {
            let mut chars: Vec<char> = word.chars().collect();
            while chars.len() > width {
                if current_len > 0 {
                    lines.push(std::mem::take(&mut current));
                    current_len = 0;
                }
                let rest = chars.split_off(width);
                lines.push(chars.into_iter().collect());
                chars = rest;
            }
            if chars.is_empty() {
                continue;
            }
            if current_len > 0 && current_len + 1 + chars.len() > width {
                lines.push(std::mem::take(&mut current));
                current_len = 0;
            }
            if current_len > 0 {
                current.push(' ');
                current_len += 1;
            }
            current_len += chars.len();
            current.extend(chars);
        }
        if current_len > 0 {
            lines.push(current);
        }
    }
    lines.join("\n")
}

/// Renders subtitle cards with ffmpeg
#[derive(Debug, Clone, Default)]
pub struct SubtitleOnly {
    settings: SubtitleSettings,
}

impl SubtitleOnly {
    #[must_use]
    pub fn new(settings: SubtitleSettings) -> Self {
        Self { settings }
    }

    #[must_use]
    pub fn settings(&self) -> &SubtitleSettings {
        &self.settings
    }

    fn ffmpeg_args(&self, text_file: &Utf8PathBuf, output: &Utf8PathBuf, duration_ms: u64) -> Vec<OsString> {
        let s = &self.settings;
        let seconds = format!("{:.3}", duration_ms as f64 / 1000.0);
        let mut drawtext = format!(
            "drawtext=textfile={}:fontcolor={}:fontsize={}:x=(w-text_w)/2:y=(h-text_h)/2:line_spacing=12",
            escape_filter_value(text_file),
            s.font_color,
            s.font_size
        );
        if let Some(font) = &s.font {
            drawtext.push_str(&format!(":fontfile={}", escape_filter_value(font)));
        }

        [
            "-y".to_string(),
            "-f".to_string(),
            "lavfi".to_string(),
            "-i".to_string(),
            format!("color=c={}:s={}x{}:d={seconds}", s.background, s.width, s.height),
            "-vf".to_string(),
            drawtext,
            "-r".to_string(),
            "30".to_string(),
            "-c:v".to_string(),
            "libx264".to_string(),
            "-pix_fmt".to_string(),
            "yuv420p".to_string(),
            "-movflags".to_string(),
            "+faststart".to_string(),
            output.to_string(),
        ]
        .into_iter()
        .map(OsString::from)
        .collect()
    }
}

#[async_trait]
impl Method for SubtitleOnly {
    fn name(&self) -> &str {
        NAME
    }

    fn output_kind(&self) -> OutputKind {
        OutputKind::Video
    }

    async fn run(&self, request: &MethodRequest) -> Result<GenerationResult, MethodError> {
        request.validate()?;
        let duration_ms = request
            .duration_ms
            .filter(|d| *d > 0)
            .unwrap_or(self.settings.default_duration_ms);

        let video = request.artifact_path("mp4");
        let subtitles = request.artifact_path("srt");
        let text_file = request.artifact_path("txt");

        if let Some(font) = &self.settings.font
            && !font.exists()
        {
            return Ok(GenerationResult::failure(format!("Font not found: {font}")));
        }

        if let Err(e) = write_file_atomic(&subtitles, &srt::cue_for_line(&request.text, duration_ms))
            .and_then(|_| {
                write_file_atomic(
                    &text_file,
                    &wrap_text(&request.text, self.settings.wrap_width),
                )
            })
        {
            return Ok(GenerationResult::failure(format!("{e:#}")));
        }

        let ffmpeg = match Ffmpeg::locate(self.settings.ffmpeg.as_deref()) {
            Ok(ffmpeg) => ffmpeg,
            Err(message) => return Ok(GenerationResult::failure(message)),
        };

        let args = self.ffmpeg_args(&text_file, &video, duration_ms);
        if let Err(message) = ffmpeg.run(&args, self.settings.render_timeout).await {
            return Ok(GenerationResult::failure(message).with_meta("mode", NAME));
        }
        debug!(target_name = %request.target_name, duration_ms, "Rendered subtitle card");

        let mut result = GenerationResult::success([video.to_string(), subtitles.to_string()])
            .with_meta("mode", NAME)
            .with_meta("width", self.settings.width)
            .with_meta("height", self.settings.height)
            .with_duration_ms(duration_ms);
        if let Some(font) = &self.settings.font {
            result = result.with_meta("font", font.to_string());
        }
        Ok(result)
    }
}
