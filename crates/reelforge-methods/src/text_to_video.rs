//! `text_to_video`: asynchronous video generation through an
//! OpenAI-compatible video API (submit, poll, download).

use async_trait::async_trait;
use camino::Utf8Path;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use reelforge_config::{Config, MethodSettings};
use reelforge_llm::HttpClient;
use reelforge_method_api::{GenerationResult, Method, MethodError, MethodRequest, OutputKind};
use reelforge_utils::atomic_write::write_bytes_atomic;

pub const NAME: &str = "text_to_video";

const DEFAULT_MODEL: &str = "Wan-AI/Wan2.2-T2V-A14B";
const DEFAULT_IMAGE_SIZE: &str = "1280x720";
const DEFAULT_POLL_INTERVAL_SECS: u64 = 8;
const DEFAULT_MAX_POLLS: u64 = 120;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Status recorded in `meta.status` when polling gave up
pub const STATUS_TIMEOUT: &str = "timeout";

/// Video API parameters, read from `[methods.text_to_video]` with the
/// endpoint and key falling back to `[llm]`
#[derive(Debug, Clone, PartialEq)]
pub struct VideoApiSettings {
    pub base_url: String,
    pub api_key_env: String,
    pub model: String,
    pub image_size: String,
    pub poll_interval: Duration,
    pub max_polls: u64,
    pub request_timeout: Duration,
}

impl VideoApiSettings {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let settings = config.method_settings(NAME);
        Self::from_parts(&settings, config.llm_base_url(), config.llm_api_key_env())
    }

    fn from_parts(settings: &MethodSettings, base_url: &str, api_key_env: &str) -> Self {
        Self {
            base_url: settings.str("base_url").unwrap_or(base_url).to_string(),
            api_key_env: settings.str("api_key_env").unwrap_or(api_key_env).to_string(),
            model: settings.str("model").unwrap_or(DEFAULT_MODEL).to_string(),
            image_size: settings
                .str("image_size")
                .unwrap_or(DEFAULT_IMAGE_SIZE)
                .to_string(),
            poll_interval: Duration::from_secs(
                settings
                    .u64("poll_interval_secs")
                    .unwrap_or(DEFAULT_POLL_INTERVAL_SECS),
            ),
            max_polls: settings.u64("max_polls").unwrap_or(DEFAULT_MAX_POLLS).max(1),
            request_timeout: Duration::from_secs(
                settings
                    .u64("timeout_secs")
                    .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
            ),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    #[serde(rename = "requestId")]
    request_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StatusResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    results: Option<StatusResults>,
}

#[derive(Debug, Default, Deserialize)]
struct StatusResults {
    #[serde(default)]
    videos: Vec<VideoRef>,
}

#[derive(Debug, Deserialize)]
struct VideoRef {
    url: String,
}

enum TaskState {
    Succeeded(String),
    Failed(String),
    Running(String),
}

fn classify(status: StatusResponse) -> TaskState {
    match status.status.to_ascii_lowercase().as_str() {
        "succeed" | "succeeded" | "success" => {
            match status.results.and_then(|r| r.videos.into_iter().next()) {
                Some(video) => TaskState::Succeeded(video.url),
                None => TaskState::Failed("task succeeded without a video url".to_string()),
            }
        }
        "failed" | "error" | "canceled" | "cancelled" => TaskState::Failed(
            status
                .reason
                .filter(|r| !r.trim().is_empty())
                .unwrap_or_else(|| format!("task ended with status {}", status.status)),
        ),
        _ => TaskState::Running(status.status),
    }
}

/// Request id of an earlier attempt that timed out while polling
fn resumable_request_id(block: &serde_json::Value) -> Option<String> {
    let generation = block.get("generation")?;
    if generation.get("ok")?.as_bool()? {
        return None;
    }
    let meta = generation.get("meta")?;
    (meta.get("status")?.as_str()? == STATUS_TIMEOUT)
        .then(|| meta.get("request_id")?.as_str().map(str::to_string))
        .flatten()
}

/// Text-to-video method
#[derive(Debug, Clone)]
pub struct TextToVideo {
    client: Arc<HttpClient>,
    settings: VideoApiSettings,
    api_key: Option<String>,
}

impl TextToVideo {
    #[must_use]
    pub fn new(client: Arc<HttpClient>, settings: VideoApiSettings, api_key: Option<String>) -> Self {
        Self {
            client,
            settings,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        }
    }

    /// Method configured from `config`, reading the key from the environment
    #[must_use]
    pub fn from_config(client: Arc<HttpClient>, config: &Config) -> Self {
        let settings = VideoApiSettings::from_config(config);
        let api_key = std::env::var(&settings.api_key_env).ok();
        Self::new(client, settings, api_key)
    }

    async fn submit(&self, api_key: &str, prompt: &str) -> Result<String, String> {
        let request = self
            .client
            .post(&self.settings.url("video/submit"))
            .bearer_auth(api_key)
            .json(&json!({
                "model": self.settings.model,
                "prompt": prompt,
                "image_size": self.settings.image_size,
            }));
        let response = self
            .client
            .execute_with_retry(request, self.settings.request_timeout, NAME)
            .await
            .map_err(|e| format!("submit failed: {e}"))?;
        let body: SubmitResponse = response
            .json()
            .await
            .map_err(|e| format!("submit returned malformed JSON: {e}"))?;
        body.request_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| "submit failed (no requestId)".to_string())
    }

    async fn status(&self, api_key: &str, request_id: &str) -> Result<StatusResponse, String> {
        let request = self
            .client
            .post(&self.settings.url("video/status"))
            .bearer_auth(api_key)
            .json(&json!({ "requestId": request_id }));
        let response = self
            .client
            .execute_with_retry(request, self.settings.request_timeout, NAME)
            .await
            .map_err(|e| format!("status check failed: {e}"))?;
        response
            .json()
            .await
            .map_err(|e| format!("status returned malformed JSON: {e}"))
    }

    async fn download(&self, url: &str, target: &Utf8Path) -> Result<(), String> {
        let response = self
            .client
            .execute_with_retry(self.client.get(url), self.settings.request_timeout, NAME)
            .await
            .map_err(|e| format!("download failed: {e}"))?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| format!("download interrupted: {e}"))?;
        write_bytes_atomic(target.as_std_path(), &bytes)
            .map(|_| ())
            .map_err(|e| format!("{e:#}"))
    }
}

#[async_trait]
impl Method for TextToVideo {
    fn name(&self) -> &str {
        NAME
    }

    fn output_kind(&self) -> OutputKind {
        OutputKind::Video
    }

    async fn run(&self, request: &MethodRequest) -> Result<GenerationResult, MethodError> {
        request.validate()?;
        let Some(api_key) = self.api_key.as_deref() else {
            return Ok(GenerationResult::failure(format!(
                "Missing API key: set {}",
                self.settings.api_key_env
            )));
        };

        let request_id = match resumable_request_id(&request.block) {
            Some(id) => {
                info!(target_name = %request.target_name, request_id = %id, "Resuming video task");
                id
            }
            None => match self.submit(api_key, &request.prompt).await {
                Ok(id) => id,
                Err(message) => return Ok(GenerationResult::failure(message)),
            },
        };

        let mut last_status = String::new();
        for poll in 1..=self.settings.max_polls {
            let state = match self.status(api_key, &request_id).await {
                Ok(status) => classify(status),
                // A failed status check is not a failed task
                Err(message) => {
                    warn!(request_id = %request_id, poll, error = %message, "Status check failed");
                    TaskState::Running(last_status.clone())
                }
            };

            match state {
                TaskState::Succeeded(url) => {
                    let video = request.artifact_path("mp4");
                    if let Err(message) = self.download(&url, &video).await {
                        return Ok(GenerationResult::failure(message)
                            .with_meta("request_id", request_id.clone()));
                    }
                    debug!(request_id = %request_id, polls = poll, "Video downloaded");
                    return Ok(GenerationResult::success([video.to_string()])
                        .with_meta("request_id", request_id)
                        .with_meta("model", self.settings.model.clone())
                        .with_meta("source_url", url)
                        .with_meta("status", "succeed"));
                }
                TaskState::Failed(reason) => {
                    return Ok(GenerationResult::failure(reason)
                        .with_meta("request_id", request_id)
                        .with_meta("status", "failed"));
                }
                TaskState::Running(status) => {
                    last_status = status;
                    if poll < self.settings.max_polls {
                        tokio::time::sleep(self.settings.poll_interval).await;
                    }
                }
            }
        }

        Ok(GenerationResult::failure(format!(
            "Timed out waiting for video task after {} polls (last status '{last_status}')",
            self.settings.max_polls
        ))
        .with_meta("request_id", request_id)
        .with_meta("status", STATUS_TIMEOUT))
    }

    fn generate_prompt(&self, text: &str) -> String {
        format!(
            "Cinematic shot: {}. Show the environment, lighting, camera motion and atmosphere. \
             No on-screen text.",
            text.trim().trim_end_matches(['.', '。', '!', '?'])
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use reelforge_llm::RetryPolicy;
    use tempfile::TempDir;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn method_for(server: &MockServer, max_polls: u64) -> TextToVideo {
        let settings = VideoApiSettings {
            base_url: server.uri(),
            api_key_env: "TEST_KEY".to_string(),
            model: "test-model".to_string(),
            image_size: DEFAULT_IMAGE_SIZE.to_string(),
            poll_interval: Duration::from_millis(1),
            max_polls,
            request_timeout: Duration::from_secs(5),
        };
        let client = HttpClient::with_policy(RetryPolicy::with_attempts(1)).unwrap();
        TextToVideo::new(Arc::new(client), settings, Some("secret".to_string()))
    }

    fn request(dir: &TempDir, block: serde_json::Value) -> MethodRequest {
        MethodRequest {
            prompt: "A plane over the sea".to_string(),
            project: "demo".to_string(),
            target_name: "L1".to_string(),
            text: "A plane over the sea".to_string(),
            workdir: Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap(),
            duration_ms: None,
            block,
        }
    }

    #[tokio::test]
    async fn test_submit_poll_download() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/video/submit"))
            .and(header("authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"requestId": "r-1"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/video/status"))
            .and(body_json(json!({"requestId": "r-1"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "Succeed",
                "results": {"videos": [{"url": format!("{}/files/r-1.mp4", server.uri())}]}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/files/r-1.mp4"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"mp4-bytes".to_vec()))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let result = method_for(&server, 3)
            .run(&request(&dir, serde_json::Value::Null))
            .await
            .unwrap();

        assert!(result.ok, "{result:?}");
        assert_eq!(result.meta["request_id"], json!("r-1"));
        assert_eq!(std::fs::read(dir.path().join("L1.mp4")).unwrap(), b"mp4-bytes");
        assert!(result.missing_artifacts().is_empty());
    }

    #[tokio::test]
    async fn test_failed_task_reports_reason() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/video/submit"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"requestId": "r-2"})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/video/status"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"status": "Failed", "reason": "content policy"})),
            )
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let result = method_for(&server, 3)
            .run(&request(&dir, serde_json::Value::Null))
            .await
            .unwrap();
        assert!(!result.ok);
        assert_eq!(result.error_message(), Some("content policy"));
    }

    #[tokio::test]
    async fn test_polling_gives_up_and_resumes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/video/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "InQueue"})))
            .expect(2)
            .mount(&server)
            .await;
        // No submit mock: the earlier request id must be reused
        let block = json!({
            "generation": {"ok": false, "artifacts": [], "meta": {"status": "timeout", "request_id": "r-3"}}
        });

        let dir = TempDir::new().unwrap();
        let result = method_for(&server, 2).run(&request(&dir, block)).await.unwrap();
        assert!(!result.ok);
        assert_eq!(result.meta["status"], json!(STATUS_TIMEOUT));
        assert_eq!(result.meta["request_id"], json!("r-3"));
        assert!(result.error_message().unwrap().contains("InQueue"));
    }

    #[tokio::test]
    async fn test_quota_error_is_expected_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/video/submit"))
            .respond_with(ResponseTemplate::new(429).set_body_string("quota_exceeded"))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let result = method_for(&server, 1)
            .run(&request(&dir, serde_json::Value::Null))
            .await
            .unwrap();
        assert!(!result.ok);
        assert!(result.error_message().unwrap().contains("quota_exceeded"));
    }

    #[tokio::test]
    async fn test_missing_key() {
        let server = MockServer::start().await;
        let mut method = method_for(&server, 1);
        method.api_key = None;
        let dir = TempDir::new().unwrap();
        let result = method.run(&request(&dir, serde_json::Value::Null)).await.unwrap();
        assert_eq!(result.error_message(), Some("Missing API key: set TEST_KEY"));
    }

    #[test]
    fn test_settings_fall_back_to_llm_section() {
        let table: toml::Table = toml::from_str("model = \"m\"\nmax_polls = 0").unwrap();
        let settings =
            VideoApiSettings::from_parts(&MethodSettings(table), "https://api.example/v1/", "KEY");
        assert_eq!(settings.model, "m");
        assert_eq!(settings.max_polls, 1);
        assert_eq!(settings.api_key_env, "KEY");
        assert_eq!(settings.url("video/submit"), "https://api.example/v1/video/submit");
    }

    #[test]
    fn test_generate_prompt_is_pure() {
        let method = TextToVideo::new(
            Arc::new(HttpClient::new().unwrap()),
            VideoApiSettings::from_parts(&MethodSettings::default(), "http://x", "K"),
            None,
        );
        let prompt = method.generate_prompt("The meteor strikes.");
        assert!(prompt.starts_with("Cinematic shot: The meteor strikes. Show"));
        assert_eq!(prompt, method.generate_prompt("The meteor strikes."));
    }
}
