use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Meta key carrying the failure reason of an `ok = false` result
pub const META_ERROR: &str = "error";

/// Outcome of one stage invocation.
///
/// `ok = true` promises that every path in `artifacts` exists when the
/// result is returned. `ok = false` makes no promise about listed paths;
/// the reason is in `meta["error"]`. `meta` is opaque to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub ok: bool,
    #[serde(default)]
    pub artifacts: Vec<String>,
    #[serde(default)]
    pub meta: BTreeMap<String, serde_json::Value>,
    /// Length of the produced media in milliseconds, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl GenerationResult {
    /// Successful result listing the produced files
    #[must_use]
    pub fn success<I, S>(artifacts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ok: true,
            artifacts: artifacts.into_iter().map(Into::into).collect(),
            meta: BTreeMap::new(),
            duration_ms: None,
        }
    }

    /// Expected failure (missing credentials, upstream error, timeout)
    #[must_use]
    pub fn failure(error: impl Into<String>) -> Self {
        let mut meta = BTreeMap::new();
        meta.insert(
            META_ERROR.to_string(),
            serde_json::Value::String(error.into()),
        );
        Self {
            ok: false,
            artifacts: Vec::new(),
            meta,
            duration_ms: None,
        }
    }

    #[must_use]
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    /// Failure reason recorded in `meta["error"]`, if it is a string
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        self.meta.get(META_ERROR).and_then(serde_json::Value::as_str)
    }

    /// Artifact paths that do not exist on disk
    #[must_use]
    pub fn missing_artifacts(&self) -> Vec<&str> {
        self.artifacts
            .iter()
            .filter(|p| !std::path::Path::new(p.as_str()).exists())
            .map(String::as_str)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_failure_carries_error() {
        let result = GenerationResult::failure("quota_exceeded");
        assert!(!result.ok);
        assert!(result.artifacts.is_empty());
        assert_eq!(result.error_message(), Some("quota_exceeded"));
    }

    #[test]
    fn test_serialized_shape() {
        let result = GenerationResult::success(["out/L1/L1.mp4"])
            .with_meta("provider", "stub")
            .with_duration_ms(4000);
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({
                "ok": true,
                "artifacts": ["out/L1/L1.mp4"],
                "meta": {"provider": "stub"},
                "duration_ms": 4000
            })
        );

        let bare: GenerationResult = serde_json::from_value(json!({"ok": false})).unwrap();
        assert!(bare.meta.is_empty());
        assert_eq!(bare.duration_ms, None);
        assert!(
            !serde_json::to_string(&bare)
                .unwrap()
                .contains("duration_ms")
        );
    }

    #[test]
    fn test_missing_artifacts() {
        let dir = tempfile::TempDir::new().unwrap();
        let present = dir.path().join("a.mp4");
        std::fs::write(&present, b"x").unwrap();
        let absent = dir.path().join("b.mp4");

        let result = GenerationResult::success([
            present.to_string_lossy().into_owned(),
            absent.to_string_lossy().into_owned(),
        ]);
        let missing = result.missing_artifacts();
        assert_eq!(missing.len(), 1);
        assert!(missing[0].ends_with("b.mp4"));
    }
}
