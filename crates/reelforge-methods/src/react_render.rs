//! `react_render`: an animated HTML page for the line, recorded with a
//! headless Chromium and encoded with ffmpeg.
//!
//! With an LLM backend the page body is authored by the model as a React 18
//! fragment (UMD + Babel), cleaned up and checked before use; a fragment that
//! fails the check is requested again, up to `max_attempts` times. Without a
//! backend a built-in CSS title card is used.
//!
//! Recording takes `frames` screenshots at evenly spaced virtual times and
//! turns them into an mp4 of the requested length.

use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use once_cell::sync::Lazy;
use regex::Regex;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use reelforge_config::MethodSettings;
use reelforge_llm::{LlmBackend, LlmInvocation, Message};
use reelforge_method_api::{GenerationResult, Method, MethodError, MethodRequest, OutputKind};
use reelforge_utils::atomic_write::write_file_atomic;

use crate::ffmpeg::Ffmpeg;
use crate::srt;

pub const NAME: &str = "react_render";

const REACT_UMD: &str = "https://unpkg.com/react@18/umd/react.production.min.js";
const REACTDOM_UMD: &str = "https://unpkg.com/react-dom@18/umd/react-dom.production.min.js";
const BABEL_UMD: &str = "https://unpkg.com/@babel/standalone/babel.min.js";

/// Tried in order when no browser is configured
const BROWSER_CANDIDATES: [&str; 4] = [
    "chromium",
    "chromium-browser",
    "google-chrome",
    "google-chrome-stable",
];

const DEFAULT_WIDTH: u64 = 1280;
const DEFAULT_HEIGHT: u64 = 720;
const DEFAULT_DURATION_MS: u64 = 6000;
const DEFAULT_FRAMES: u64 = 12;
const DEFAULT_MAX_ATTEMPTS: u64 = 3;
const DEFAULT_RENDER_TIMEOUT_SECS: u64 = 300;
const DEFAULT_AUTHOR_TIMEOUT_SECS: u64 = 120;

const AUTHOR_PROMPT: &str = "You are a motion designer working with React 18 UMD and Babel. \
Write an HTML fragment, not a full page: no <html>, <head> or <body> and no extra \
<div id='root'>. The fragment is placed inside an existing <div id='root'>. \
Use JSX inside <script type='text/babel'> and mount it with ReactDOM.createRoot. \
An optional <style> block is allowed. Center the content with CSS grid or flexbox, \
keep the design clean and light, and keep the animation smooth. \
Output only the fragment, without explanations.";

static OPENING_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^```[^\n]*\n").expect("opening fence pattern is valid"));
static ANY_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"```(?:html)?").expect("fence pattern is valid"));
static BODY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<body[^>]*>(.*?)</body>").expect("body pattern is valid"));
static DOCTYPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<!DOCTYPE[^>]*>").expect("doctype pattern is valid"));
static PAGE_TAGS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)</?(?:html|head)(?:\s[^>]*)?>").expect("page tag pattern is valid")
});
static ROOT_DIV: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<div\s+id=["']root["']\s*>\s*</div>"#).expect("root div pattern is valid")
});
static TRAILING_CHATTER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)\n\s*(?:Here'?s|This implementation|The animation sequence)\b.*$")
        .expect("chatter pattern is valid")
});
static SCRIPT_OPEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<script\b[^>]*>").expect("script pattern is valid"));
static SCRIPT_CLOSE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)</script\s*>").expect("script close pattern is valid"));
static BABEL_SCRIPT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<script\b[^>]*type\s*=\s*["']text/babel["'][^>]*>"#)
        .expect("babel script pattern is valid")
});
static EXTERNAL_SCRIPT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)<script\b[^>]*\bsrc\s*=").expect("external script pattern is valid")
});

/// Rendering parameters, read from `[methods.react_render]`
#[derive(Debug, Clone, PartialEq)]
pub struct ReactSettings {
    /// Chromium name or path; the first of the usual names on `PATH` when unset
    pub browser: Option<String>,
    /// ffmpeg name or path; `ffmpeg` on `PATH` when unset
    pub ffmpeg: Option<String>,
    pub width: u64,
    pub height: u64,
    /// Clip length when the request has no duration
    pub default_duration_ms: u64,
    /// Screenshots taken over the clip
    pub frames: u64,
    /// Authoring requests before giving up on the model
    pub max_attempts: u64,
    /// Limit on each browser or ffmpeg process
    pub render_timeout: Duration,
    /// Limit on each authoring request
    pub author_timeout: Duration,
}

impl Default for ReactSettings {
    fn default() -> Self {
        Self {
            browser: None,
            ffmpeg: None,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            default_duration_ms: DEFAULT_DURATION_MS,
            frames: DEFAULT_FRAMES,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            render_timeout: Duration::from_secs(DEFAULT_RENDER_TIMEOUT_SECS),
            author_timeout: Duration::from_secs(DEFAULT_AUTHOR_TIMEOUT_SECS),
        }
    }
}

impl ReactSettings {
    #[must_use]
    pub fn from_settings(settings: &MethodSettings) -> Self {
        let defaults = Self::default();
        Self {
            browser: settings.str("browser").map(str::to_string),
            ffmpeg: settings.str("ffmpeg").map(str::to_string),
            width: settings.u64("width").unwrap_or(defaults.width),
            height: settings.u64("height").unwrap_or(defaults.height),
            default_duration_ms: settings
                .u64("default_duration_ms")
                .unwrap_or(defaults.default_duration_ms),
            frames: settings.u64("frames").unwrap_or(defaults.frames).max(1),
            max_attempts: settings
                .u64("max_attempts")
                .unwrap_or(defaults.max_attempts)
                .max(1),
            render_timeout: settings
                .u64("timeout_secs")
                .map_or(defaults.render_timeout, Duration::from_secs),
            author_timeout: settings
                .u64("author_timeout_secs")
                .map_or(defaults.author_timeout, Duration::from_secs),
        }
    }
}

/// Strip what models wrap around a fragment: code fences, page scaffolding,
/// a duplicate root element and trailing explanations.
#[must_use]
pub fn sanitize_fragment(raw: &str) -> String {
    let text = OPENING_FENCE.replace(raw.trim(), "");
    let text = ANY_FENCE.replace_all(&text, "");
    let text = ROOT_DIV.replace_all(&text, "");
    let body = BODY.captures(&text).map(|c| c[1].to_string());
    let text = body.unwrap_or_else(|| text.into_owned());
    let text = DOCTYPE.replace_all(&text, "");
    let text = PAGE_TAGS.replace_all(&text, "");
    let text = TRAILING_CHATTER.replace(&text, "");
    text.trim().to_string()
}

/// Structural check of an authored fragment.
///
/// # Errors
///
/// The first problem found, worded for the `meta.error` of a failed result.
pub fn validate_fragment(fragment: &str) -> Result<(), String> {
    if fragment.trim().is_empty() {
        return Err("fragment is empty".to_string());
    }
    let lower = fragment.to_lowercase();
    if lower.contains("<html") || lower.contains("<body") {
        return Err("fragment contains page-level tags".to_string());
    }
    let opened = SCRIPT_OPEN.find_iter(fragment).count();
    let closed = SCRIPT_CLOSE.find_iter(fragment).count();
    if opened != closed {
        return Err(format!("unbalanced <script> tags ({opened} opened, {closed} closed)"));
    }
    if EXTERNAL_SCRIPT.is_match(fragment) {
        return Err("fragment loads external scripts".to_string());
    }
    if !BABEL_SCRIPT.is_match(fragment) {
        return Err("no <script type=\"text/babel\"> block".to_string());
    }
    if !lower.contains("createroot") && !lower.contains("reactdom.render") {
        return Err("script never mounts a React root".to_string());
    }
    Ok(())
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Title card used when no model authors the page
#[must_use]
pub fn fallback_fragment(text: &str) -> String {
    format!(
        "<style>\n\
         .card {{ opacity: 0; transform: translateY(24px); \
         animation: rise 1.2s ease-out 0.2s forwards; }}\n\
         @keyframes rise {{ to {{ opacity: 1; transform: none; }} }}\n\
         </style>\n\
         <div class=\"card\">{}</div>",
        escape_html(text.trim())
    )
}

/// Complete page around `fragment`.
///
/// React and Babel are loaded only when the fragment has a Babel script.
/// The page sets `window.__PLAY_DONE` once `duration_ms` has elapsed.
#[must_use]
pub fn build_page(title: &str, width: u64, height: u64, duration_ms: u64, fragment: &str) -> String {
    let scripts = if BABEL_SCRIPT.is_match(fragment) {
        format!(
            "<script src=\"{REACT_UMD}\"></script>\n\
             <script src=\"{REACTDOM_UMD}\"></script>\n\
             <script src=\"{BABEL_UMD}\"></script>\n"
        )
    } else {
        String::new()
    };
    format!(
        "<!DOCTYPE html>\n\
         <html>\n\
         <head>\n\
         <meta charset=\"utf-8\">\n\
         <title>{title}</title>\n\
         <style>\n\
         html, body {{ margin: 0; width: {width}px; height: {height}px; overflow: hidden; \
         background: #ffffff; font-family: sans-serif; }}\n\
         #root {{ width: 100%; height: 100%; display: grid; place-items: center; \
         font-size: 48px; color: #1f2933; text-align: center; }}\n\
         </style>\n\
         {scripts}\
         </head>\n\
         <body>\n\
         <div id=\"root\">\n\
         {fragment}\n\
         </div>\n\
         <script>setTimeout(function () {{ window.__PLAY_DONE = true; }}, {duration_ms});</script>\n\
         </body>\n\
         </html>\n",
        title = escape_html(title),
    )
}

/// Virtual times of the screenshots: the middle of each of `frames` equal
/// slices of the clip
#[must_use]
pub fn frame_times(duration_ms: u64, frames: u64) -> Vec<u64> {
    let frames = frames.max(1);
    (0..frames)
        .map(|i| (2 * i + 1) * duration_ms / (2 * frames))
        .collect()
}

/// Located headless browser
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Browser {
    program: PathBuf,
}

impl Browser {
    #[must_use]
    pub fn program(&self) -> &std::path::Path {
        &self.program
    }

    /// Find `configured` (a name or path), or the first usual Chromium name
    /// on `PATH`.
    ///
    /// # Errors
    ///
    /// A message suitable for `meta.error` when no browser can be found.
    pub fn locate(configured: Option<&str>) -> Result<Self, String> {
        if let Some(name) = configured {
            return which::which(name)
                .map(|program| Self { program })
                .map_err(|e| format!("headless browser not found ('{name}'): {e}"));
        }
        BROWSER_CANDIDATES
            .iter()
            .find_map(|name| which::which(name).ok())
            .map(|program| Self { program })
            .ok_or_else(|| {
                format!(
                    "headless browser not found (tried {})",
                    BROWSER_CANDIDATES.join(", ")
                )
            })
    }

    fn screenshot_args(page_url: &str, output: &Utf8Path, width: u64, height: u64, at_ms: u64) -> Vec<OsString> {
        [
            "--headless".to_string(),
            "--disable-gpu".to_string(),
            "--hide-scrollbars".to_string(),
            "--no-first-run".to_string(),
            "--mute-audio".to_string(),
            format!("--window-size={width},{height}"),
            format!("--virtual-time-budget={at_ms}"),
            format!("--screenshot={output}"),
            page_url.to_string(),
        ]
        .into_iter()
        .map(OsString::from)
        .collect()
    }

    /// Screenshot `page_url` after `at_ms` of virtual time into `output`.
    ///
    /// # Errors
    ///
    /// A message when the browser fails, overruns `timeout` or writes no
    /// image.
    pub async fn screenshot(
        &self,
        page_url: &str,
        output: &Utf8Path,
        (width, height): (u64, u64),
        at_ms: u64,
        timeout: Duration,
    ) -> Result<(), String> {
        let args = Self::screenshot_args(page_url, output, width, height, at_ms);
        debug!(program = %self.program.display(), at_ms, %output, "Capturing frame");
        let child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output_status = match tokio::time::timeout(timeout, child).await {
            Err(_) => return Err(format!("browser timed out after {}s", timeout.as_secs())),
            Ok(Err(e)) => return Err(format!("failed to start browser: {e}")),
            Ok(Ok(out)) => out,
        };
        if !output_status.status.success() {
            let stderr = String::from_utf8_lossy(&output_status.stderr);
            let last = stderr.trim().lines().last().unwrap_or_default();
            return Err(format!("browser failed ({}): {last}", output_status.status));
        }
        if !output.exists() {
            return Err(format!("browser wrote no screenshot for {at_ms} ms"));
        }
        Ok(())
    }
}

/// Page content plus where it came from
#[derive(Debug, Clone, PartialEq)]
pub struct AuthoredFragment {
    pub fragment: String,
    /// `llm` or `template`
    pub source: &'static str,
    /// Authoring requests made; 0 for the template
    pub attempts: u64,
}

/// Animated HTML renderer
#[derive(Clone)]
pub struct ReactRender {
    settings: ReactSettings,
    author: Option<Arc<dyn LlmBackend>>,
}

impl std::fmt::Debug for ReactRender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReactRender")
            .field("settings", &self.settings)
            .field("author", &self.author.as_ref().map(|a| a.provider().to_string()))
            .finish()
    }
}

impl ReactRender {
    #[must_use]
    pub fn new(settings: ReactSettings, author: Option<Arc<dyn LlmBackend>>) -> Self {
        Self { settings, author }
    }

    #[must_use]
    pub fn settings(&self) -> &ReactSettings {
        &self.settings
    }

    /// The page body for `prompt`, from the model when one is configured.
    ///
    /// # Errors
    ///
    /// A message when every authoring attempt failed or was rejected.
    pub async fn author_fragment(&self, prompt: &str, text: &str) -> Result<AuthoredFragment, String> {
        let Some(author) = &self.author else {
            return Ok(AuthoredFragment {
                fragment: fallback_fragment(text),
                source: "template",
                attempts: 0,
            });
        };

        let mut last_error = String::new();
        for attempt in 1..=self.settings.max_attempts {
            let invocation = LlmInvocation::new(
                self.settings.author_timeout,
                vec![
                    Message::system(AUTHOR_PROMPT),
                    Message::user(format!("Prompt: {prompt}")),
                ],
            );
            let raw = match author.invoke(invocation).await {
                Ok(result) => result.raw_response,
                Err(e) => {
                    warn!(attempt, error = %e, "Authoring request failed");
                    last_error = e.to_string();
                    continue;
                }
            };
            let fragment = sanitize_fragment(&raw);
            match validate_fragment(&fragment) {
                Ok(()) => {
                    debug!(attempt, "Authored fragment accepted");
                    return Ok(AuthoredFragment {
                        fragment,
                        source: "llm",
                        attempts: attempt,
                    });
                }
                Err(reason) => {
                    warn!(attempt, %reason, "Authored fragment rejected");
                    last_error = reason;
                }
            }
        }
        Err(format!(
            "no usable page after {} attempts: {last_error}",
            self.settings.max_attempts
        ))
    }

    fn encode_args(&self, frames_dir: &Utf8Path, output: &Utf8Path, duration_ms: u64) -> Vec<OsString> {
        let s = &self.settings;
        [
            "-y".to_string(),
            "-framerate".to_string(),
            format!("{}/{}", s.frames * 1000, duration_ms.max(1)),
            "-i".to_string(),
            frames_dir.join("frame_%03d.png").to_string(),
            "-vf".to_string(),
            format!("scale={}:{}:flags=lanczos,fps=30", s.width, s.height),
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

    async fn record(
        &self,
        browser: &Browser,
        page: &Utf8Path,
        frames_dir: &Utf8Path,
        duration_ms: u64,
    ) -> Result<(), String> {
        let absolute = std::fs::canonicalize(page).map_err(|e| format!("{page}: {e}"))?;
        let page_url = format!("file://{}", absolute.display());
        std::fs::create_dir_all(frames_dir).map_err(|e| format!("{frames_dir}: {e}"))?;

        let size = (self.settings.width, self.settings.height);
        for (index, at_ms) in frame_times(duration_ms, self.settings.frames).into_iter().enumerate() {
            let frame = frames_dir.join(format!("frame_{index:03}.png"));
            browser
                .screenshot(&page_url, &frame, size, at_ms, self.settings.render_timeout)
                .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Method for ReactRender {
    fn name(&self) -> &str {
        NAME
    }

    fn output_kind(&self) -> OutputKind {
        OutputKind::Video
    }

    fn generate_prompt(&self, text: &str) -> String {
        format!("Animated explainer scene for: {}", text.trim())
    }

    async fn run(&self, request: &MethodRequest) -> Result<GenerationResult, MethodError> {
        request.validate()?;
        let duration_ms = request
            .duration_ms
            .filter(|d| *d > 0)
            .unwrap_or(self.settings.default_duration_ms);

        // Tools are located before any authoring request
        let browser = match Browser::locate(self.settings.browser.as_deref()) {
            Ok(browser) => browser,
            Err(message) => return Ok(GenerationResult::failure(message).with_meta("mode", NAME)),
        };
        let ffmpeg = match Ffmpeg::locate(self.settings.ffmpeg.as_deref()) {
            Ok(ffmpeg) => ffmpeg,
            Err(message) => return Ok(GenerationResult::failure(message).with_meta("mode", NAME)),
        };

        let authored = match self.author_fragment(&request.prompt, &request.text).await {
            Ok(authored) => authored,
            Err(message) => return Ok(GenerationResult::failure(message).with_meta("mode", NAME)),
        };

        let page = request.artifact_path("html");
        let video = request.artifact_path("mp4");
        let subtitles = request.artifact_path("srt");
        let frames_dir: Utf8PathBuf = request
            .workdir
            .join(format!("{}_frames", request.target_name));

        let html = build_page(
            &format!("{}:{}", request.project, request.target_name),
            self.settings.width,
            self.settings.height,
            duration_ms,
            &authored.fragment,
        );
        if let Err(e) = write_file_atomic(&page, &html)
            .and_then(|_| write_file_atomic(&subtitles, &srt::cue_for_line(&request.text, duration_ms)))
        {
            return Ok(GenerationResult::failure(format!("{e:#}")));
        }

        if let Err(message) = self.record(&browser, &page, &frames_dir, duration_ms).await {
            return Ok(GenerationResult::failure(message)
                .with_meta("mode", NAME)
                .with_meta("html", page.to_string()));
        }
        let encoded = ffmpeg
            .run(&self.encode_args(&frames_dir, &video, duration_ms), self.settings.render_timeout)
            .await;
        if let Err(e) = std::fs::remove_dir_all(&frames_dir) {
            debug!(dir = %frames_dir, error = %e, "Could not remove frames");
        }
        if let Err(message) = encoded {
            return Ok(GenerationResult::failure(message)
                .with_meta("mode", NAME)
                .with_meta("html", page.to_string()));
        }
        debug!(target_name = %request.target_name, duration_ms, source = authored.source, "Rendered page");

        Ok(
            GenerationResult::success([video.to_string(), page.to_string(), subtitles.to_string()])
                .with_meta("mode", NAME)
                .with_meta("source", authored.source)
                .with_meta("attempts", authored.attempts)
                .with_meta("frames", self.settings.frames)
                .with_meta("width", self.settings.width)
                .with_meta("height", self.settings.height)
                .with_duration_ms(duration_ms),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reelforge_llm::{LlmError, LlmResult};
    use std::sync::Mutex;
    use tempfile::TempDir;

    const GOOD: &str = "<div id=\"stage\"></div>\n\
        <script type=\"text/babel\">\n\
        ReactDOM.createRoot(document.getElementById('stage')).render(<h1>Hi</h1>);\n\
        </script>";

    /// Returns the queued answers in order, then errors
    struct QueuedAuthor {
        answers: Mutex<Vec<String>>,
        calls: Mutex<u32>,
    }

    impl QueuedAuthor {
        fn new(answers: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                answers: Mutex::new(answers.iter().rev().map(ToString::to_string).collect()),
                calls: Mutex::new(0),
            })
        }
    }

    #[async_trait]
    impl LlmBackend for QueuedAuthor {
        fn provider(&self) -> &str {
            "queued"
        }

        async fn invoke(&self, inv: LlmInvocation) -> Result<LlmResult, LlmError> {
            *self.calls.lock().unwrap() += 1;
            assert!(inv.messages[1].content.starts_with("Prompt: "));
            match self.answers.lock().unwrap().pop() {
                Some(answer) => Ok(LlmResult::new(answer, "queued", "m")),
                None => Err(LlmError::ProviderOutage("exhausted".to_string())),
            }
        }
    }

    fn request(dir: &TempDir) -> MethodRequest {
        MethodRequest {
            prompt: "Orbit of the moon".to_string(),
            project: "demo".to_string(),
            target_name: "L1".to_string(),
            text: "The moon circles the earth".to_string(),
            workdir: Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap(),
            duration_ms: Some(3000),
            block: serde_json::Value::Null,
        }
    }

    #[test]
    fn test_sanitize_strips_wrapping() {
        let raw = "```html\n<!DOCTYPE html><html><head></head><body>\n<div id=\"root\"></div>\n<p>x</p>\n</body></html>\n```\nHere's how it works: ...";
        assert_eq!(sanitize_fragment(raw), "<p>x</p>");

        let chatty = format!("{GOOD}\n\nThis implementation features a fade.");
        assert_eq!(sanitize_fragment(&chatty), GOOD);
    }

    #[test]
    fn test_validate_fragment() {
        assert!(validate_fragment(GOOD).is_ok());
        assert_eq!(validate_fragment("  ").unwrap_err(), "fragment is empty");
        assert!(validate_fragment("<html><p>x</p></html>").unwrap_err().contains("page-level"));
        assert!(
            validate_fragment("<script type=\"text/babel\">ReactDOM.createRoot(x)")
                .unwrap_err()
                .contains("unbalanced")
        );
        assert!(
            validate_fragment("<script src=\"https://cdn.example/x.js\"></script>")
                .unwrap_err()
                .contains("external")
        );
        assert!(validate_fragment("<p>static</p>").unwrap_err().contains("text/babel"));
        assert!(
            validate_fragment("<script type='text/babel'>const x = 1;</script>")
                .unwrap_err()
                .contains("mounts")
        );
    }

    #[test]
    fn test_build_page_loads_react_only_for_babel() {
        let page = build_page("demo:<L1>", 640, 360, 2500, GOOD);
        assert!(page.contains("<title>demo:&lt;L1&gt;</title>"));
        assert!(page.contains(REACT_UMD));
        assert!(page.contains("width: 640px; height: 360px"));
        assert!(page.contains("}, 2500);"));

        let card = build_page("t", 640, 360, 2500, &fallback_fragment("Tom & Jerry"));
        assert!(!card.contains(REACT_UMD));
        assert!(card.contains("Tom &amp; Jerry"));
    }

    #[test]
    fn test_frame_times() {
        assert_eq!(frame_times(4000, 4), vec![500, 1500, 2500, 3500]);
        assert_eq!(frame_times(1000, 0), vec![500]);
    }

    #[test]
    fn test_settings_from_table() {
        let table: toml::Table =
            toml::from_str("browser = \"chromium\"\nframes = 0\nmax_attempts = 5\nwidth = 1920")
                .unwrap();
        let settings = ReactSettings::from_settings(&MethodSettings(table));
        assert_eq!(settings.browser.as_deref(), Some("chromium"));
        assert_eq!(settings.frames, 1);
        assert_eq!(settings.max_attempts, 5);
        assert_eq!(settings.width, 1920);
        assert_eq!(settings.height, DEFAULT_HEIGHT);
    }

    #[test]
    fn test_encode_args() {
        let method = ReactRender::new(ReactSettings::default(), None);
        let args: Vec<String> = method
            .encode_args(Utf8Path::new("/w/L1_frames"), Utf8Path::new("/w/L1.mp4"), 6000)
            .into_iter()
            .map(|a| a.into_string().unwrap())
            .collect();
        assert!(args.contains(&"12000/6000".to_string()));
        assert!(args.contains(&"/w/L1_frames/frame_%03d.png".to_string()));
        assert_eq!(args.last().unwrap(), "/w/L1.mp4");
    }

    #[tokio::test]
    async fn test_author_retries_rejected_fragments() {
        let author = QueuedAuthor::new(&["Sorry, I cannot help.", format!("```html\n{GOOD}\n```").as_str()]);
        let method = ReactRender::new(ReactSettings::default(), Some(author.clone()));

        let authored = method.author_fragment("Orbit", "text").await.unwrap();
        assert_eq!(authored.source, "llm");
        assert_eq!(authored.attempts, 2);
        assert_eq!(authored.fragment, GOOD);
        assert_eq!(*author.calls.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_author_gives_up_after_max_attempts() {
        let author = QueuedAuthor::new(&["<p>static</p>"]);
        let settings = ReactSettings {
            max_attempts: 2,
            ..ReactSettings::default()
        };
        let method = ReactRender::new(settings, Some(author.clone()));

        let err = method.author_fragment("Orbit", "text").await.unwrap_err();
        assert!(err.starts_with("no usable page after 2 attempts"));
        assert!(err.contains("exhausted"));
        assert_eq!(*author.calls.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_without_author_uses_title_card() {
        let method = ReactRender::new(ReactSettings::default(), None);
        let authored = method.author_fragment("Orbit", "The moon").await.unwrap();
        assert_eq!(authored.source, "template");
        assert_eq!(authored.attempts, 0);
        assert!(authored.fragment.contains("The moon"));
    }

    #[tokio::test]
    async fn test_missing_browser_is_expected_failure() {
        let dir = TempDir::new().unwrap();
        let author = QueuedAuthor::new(&[GOOD]);
        let method = ReactRender::new(
            ReactSettings {
                browser: Some("reelforge-no-such-browser".to_string()),
                ..ReactSettings::default()
            },
            Some(author.clone()),
        );

        let result = method.run(&request(&dir)).await.unwrap();
        assert!(!result.ok);
        assert!(result.error_message().unwrap().contains("headless browser not found"));
        assert_eq!(result.meta["mode"], NAME);
        // Nothing authored or written
        assert_eq!(*author.calls.lock().unwrap(), 0);
        assert!(!dir.path().join("L1.html").exists());
    }

    #[tokio::test]
    async fn test_invalid_request_is_error() {
        let dir = TempDir::new().unwrap();
        let mut req = request(&dir);
        req.prompt = " ".to_string();
        assert!(matches!(
            ReactRender::new(ReactSettings::default(), None).run(&req).await,
            Err(MethodError::InvalidRequest { field: "prompt", .. })
        ));
    }
}
