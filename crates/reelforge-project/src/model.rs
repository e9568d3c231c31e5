use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub use reelforge_method_api::GenerationResult;

/// Pipeline stage of a script line
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::VariantNames,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Stage {
    Decision,
    Audio,
    Media,
}

impl Stage {
    /// All stages in execution order
    pub const ALL: [Stage; 3] = [Stage::Decision, Stage::Audio, Stage::Media];

    /// Stage that must be satisfied before this one may run.
    ///
    /// Media only needs a decision; audio, when present, just lends it a
    /// duration.
    #[must_use]
    pub fn prerequisite(self) -> Option<Stage> {
        match self {
            Stage::Decision => None,
            Stage::Audio | Stage::Media => Some(Stage::Decision),
        }
    }
}

/// Who produced a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DecidedBy {
    /// The classification signal
    #[serde(alias = "llm")]
    Model,
    /// The configured default method
    Fallback,
    /// Assigned by hand
    Manual,
}

/// Method choice for a line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub method: String,
    pub confidence: f64,
    pub decided_by: DecidedBy,
    /// Present (and `true`) only when confidence was below the threshold
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub low_confidence: Option<bool>,
}

impl Decision {
    #[must_use]
    pub fn new(method: impl Into<String>, confidence: f64, decided_by: DecidedBy) -> Self {
        Self {
            method: method.into(),
            confidence,
            decided_by,
            low_confidence: None,
        }
    }

    /// Manual decision with full confidence
    #[must_use]
    pub fn manual(method: impl Into<String>) -> Self {
        Self::new(method, 1.0, DecidedBy::Manual)
    }

    #[must_use]
    pub fn flagged_low_confidence(mut self) -> Self {
        self.low_confidence = Some(true);
        self
    }

    #[must_use]
    pub fn is_low_confidence(&self) -> bool {
        self.low_confidence == Some(true)
    }
}

/// Classification of a recorded failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DiagnosticKind {
    /// Neither the classification signal nor the fallback produced a method
    RouterUnavailable,
    /// The decided or configured method is not registered
    UnknownMethod,
    /// The method returned `ok = false`
    MethodFailed,
    /// The method returned an error
    MethodError,
    /// The method claimed success but broke its contract
    ContractViolation,
    /// The stage exceeded the hard timeout
    Timeout,
}

/// Most recent failure of a line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub stage: Stage,
    pub kind: DiagnosticKind,
    pub message: String,
}

impl Diagnostic {
    #[must_use]
    pub fn new(stage: Stage, kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            stage,
            kind,
            message: message.into(),
        }
    }
}

/// Derived summary of a line's progress
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LineStatus {
    Pending,
    Decided,
    AudioDone,
    AudioSkipped,
    MediaDone,
    Done,
    Failed,
}

/// Stored status value that asks for all stages of the line to be redone
pub const REGENERATE_STATUS: &str = "regenerate";

/// One narrative unit of a script
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptLine {
    pub id: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<Decision>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation: Option<GenerationResult>,
    #[serde(
        rename = "audioGeneration",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub audio_generation: Option<GenerationResult>,
    #[serde(rename = "audioSkipped", default, skip_serializing_if = "Option::is_none")]
    pub audio_skipped: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<Diagnostic>,
    /// Set when the stored status was `regenerate`; cleared once the line
    /// has been re-run
    #[serde(skip)]
    pub regenerate: bool,
    /// Fields this version does not interpret, kept verbatim
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

fn is_ok(result: Option<&GenerationResult>) -> bool {
    result.is_some_and(|r| r.ok)
}

impl ScriptLine {
    #[must_use]
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            prompt: None,
            context: None,
            decision: None,
            generation: None,
            audio_generation: None,
            audio_skipped: None,
            diagnostic: None,
            regenerate: false,
            extra: BTreeMap::new(),
        }
    }

    /// Prompt, ignoring a blank stored value
    #[must_use]
    pub fn effective_prompt(&self) -> Option<&str> {
        self.prompt.as_deref().filter(|p| !p.trim().is_empty())
    }

    /// Context, ignoring a blank stored value
    #[must_use]
    pub fn effective_context(&self) -> Option<&str> {
        self.context.as_deref().filter(|c| !c.trim().is_empty())
    }

    #[must_use]
    pub fn is_audio_skipped(&self) -> bool {
        self.audio_skipped == Some(true)
    }

    /// Whether the stage holds a successful outcome, ignoring any diagnostic.
    ///
    /// This is what later stages need from it as a prerequisite.
    #[must_use]
    pub fn has_outcome(&self, stage: Stage) -> bool {
        match stage {
            Stage::Decision => self.decision.is_some(),
            Stage::Audio => self.is_audio_skipped() || is_ok(self.audio_generation.as_ref()),
            Stage::Media => is_ok(self.generation.as_ref()),
        }
    }

    /// Whether the stage is finished: a successful outcome and no
    /// diagnostic of its own. A stage that is not satisfied is retried.
    #[must_use]
    pub fn is_satisfied(&self, stage: Stage) -> bool {
        self.has_outcome(stage) && !self.diagnostic.as_ref().is_some_and(|d| d.stage == stage)
    }

    /// Whether any recorded result or diagnostic marks the line failed
    #[must_use]
    pub fn has_failure(&self) -> bool {
        self.diagnostic.is_some()
            || self.generation.as_ref().is_some_and(|g| !g.ok)
            || self.audio_generation.as_ref().is_some_and(|a| !a.ok)
    }

    /// Status derived from the stage fields
    #[must_use]
    pub fn status(&self) -> LineStatus {
        if self.has_failure() {
            return LineStatus::Failed;
        }
        let media = is_ok(self.generation.as_ref());
        let audio = is_ok(self.audio_generation.as_ref());
        let skipped = self.is_audio_skipped();
        match (media, audio, skipped) {
            (true, true, _) | (true, _, true) => LineStatus::Done,
            (true, false, false) => LineStatus::MediaDone,
            (false, true, _) => LineStatus::AudioDone,
            (false, false, true) => LineStatus::AudioSkipped,
            (false, false, false) if self.decision.is_some() => LineStatus::Decided,
            _ => LineStatus::Pending,
        }
    }

    /// Value written to the document's `status` field
    #[must_use]
    pub fn status_label(&self) -> String {
        if self.regenerate {
            REGENERATE_STATUS.to_string()
        } else {
            self.status().to_string()
        }
    }

    /// Record a failure of `stage`
    pub fn record_failure(&mut self, diagnostic: Diagnostic) {
        self.diagnostic = Some(diagnostic);
    }

    /// Clear the diagnostic when it belongs to `stage`
    pub fn clear_failure(&mut self, stage: Stage) {
        if self.diagnostic.as_ref().is_some_and(|d| d.stage == stage) {
            self.diagnostic = None;
        }
    }
}

/// A project: name plus ordered script
#[derive(Debug, Clone, PartialEq)]
pub struct Project {
    pub name: String,
    pub script: Vec<ScriptLine>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    /// Top-level fields this version does not interpret, kept verbatim
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Project {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            script: Vec::new(),
            created_at: None,
            updated_at: None,
            extra: BTreeMap::new(),
        }
    }

    /// Project with one line per non-blank text, ids `L1..Ln`
    #[must_use]
    pub fn from_texts<I, S>(name: impl Into<String>, texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut project = Self::new(name);
        let now = timestamp_now();
        project.created_at = Some(now.clone());
        project.updated_at = Some(now);
        project.script = texts
            .into_iter()
            .map(|t| t.as_ref().trim().to_string())
            .filter(|t| !t.is_empty())
            .enumerate()
            .map(|(i, text)| ScriptLine::new(derived_id(i), text))
            .collect();
        project
    }

    #[must_use]
    pub fn line(&self, id: &str) -> Option<&ScriptLine> {
        self.script.iter().find(|l| l.id == id)
    }

    pub fn line_mut(&mut self, id: &str) -> Option<&mut ScriptLine> {
        self.script.iter_mut().find(|l| l.id == id)
    }

    /// Zero-based position of a line in the script
    #[must_use]
    pub fn position(&self, id: &str) -> Option<usize> {
        self.script.iter().position(|l| l.id == id)
    }

    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        self.script.iter().map(|l| l.id.clone()).collect()
    }

    /// Number of lines per derived status
    #[must_use]
    pub fn status_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for line in &self.script {
            *counts.entry(line.status().to_string()).or_insert(0) += 1;
        }
        counts
    }

    /// Stamp `updated_at` with the current time
    pub fn touch(&mut self) {
        self.updated_at = Some(timestamp_now());
    }
}

/// Id given to the line at zero-based `position` when the document has none
#[must_use]
pub fn derived_id(position: usize) -> String {
    format!("L{}", position + 1)
}

/// RFC 3339 UTC timestamp with second precision
#[must_use]
pub fn timestamp_now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok_result() -> GenerationResult {
        GenerationResult::success(["out/a.mp4"])
    }

    #[test]
    fn test_status_progression() {
        let mut line = ScriptLine::new("L1", "A");
        assert_eq!(line.status(), LineStatus::Pending);

        line.decision = Some(Decision::new("subtitle_only", 0.0, DecidedBy::Fallback));
        assert_eq!(line.status(), LineStatus::Decided);

        line.audio_skipped = Some(true);
        assert_eq!(line.status(), LineStatus::AudioSkipped);

        line.generation = Some(ok_result());
        assert_eq!(line.status(), LineStatus::Done);
    }

    #[test]
    fn test_status_audio_then_media() {
        let mut line = ScriptLine::new("L1", "A");
        line.decision = Some(Decision::manual("tts"));
        line.audio_generation = Some(ok_result());
        assert_eq!(line.status(), LineStatus::AudioDone);
        line.generation = Some(ok_result());
        assert_eq!(line.status(), LineStatus::Done);
    }

    #[test]
    fn test_media_without_audio_is_media_done() {
        let mut line = ScriptLine::new("L1", "A");
        line.decision = Some(Decision::manual("subtitle_only"));
        line.generation = Some(ok_result());
        assert_eq!(line.status(), LineStatus::MediaDone);
    }

    #[test]
    fn test_failure_wins() {
        let mut line = ScriptLine::new("L1", "A");
        line.decision = Some(Decision::manual("text_to_video"));
        line.audio_skipped = Some(true);
        line.generation = Some(GenerationResult::failure("quota_exceeded"));
        assert_eq!(line.status(), LineStatus::Failed);

        let mut routed = ScriptLine::new("L2", "B");
        routed.record_failure(Diagnostic::new(
            Stage::Decision,
            DiagnosticKind::RouterUnavailable,
            "no signal",
        ));
        assert_eq!(routed.status(), LineStatus::Failed);
        routed.clear_failure(Stage::Audio);
        assert!(routed.diagnostic.is_some());
        routed.clear_failure(Stage::Decision);
        assert_eq!(routed.status(), LineStatus::Pending);
    }

    #[test]
    fn test_is_satisfied() {
        let mut line = ScriptLine::new("L1", "A");
        assert!(!line.is_satisfied(Stage::Decision));
        line.decision = Some(Decision::manual("tts"));
        assert!(line.is_satisfied(Stage::Decision));

        line.audio_generation = Some(GenerationResult::failure("boom"));
        assert!(!line.is_satisfied(Stage::Audio));
        line.audio_skipped = Some(true);
        assert!(line.is_satisfied(Stage::Audio));
        assert!(!line.is_satisfied(Stage::Media));
    }

    #[test]
    fn test_own_diagnostic_unsatisfies_stage() {
        let mut line = ScriptLine::new("L1", "A");
        line.decision = Some(Decision::manual("subtitle_only"));
        line.audio_skipped = Some(true);
        line.generation = Some(ok_result());
        line.record_failure(Diagnostic::new(
            Stage::Media,
            DiagnosticKind::MethodError,
            "boom",
        ));

        assert!(line.has_outcome(Stage::Media));
        assert!(!line.is_satisfied(Stage::Media));
        // Other stages are not affected
        assert!(line.is_satisfied(Stage::Decision));
        assert!(line.is_satisfied(Stage::Audio));

        line.clear_failure(Stage::Media);
        assert!(line.is_satisfied(Stage::Media));
    }

    #[test]
    fn test_blank_prompt_is_absent() {
        let mut line = ScriptLine::new("L1", "A");
        line.prompt = Some("  ".to_string());
        assert_eq!(line.effective_prompt(), None);
        line.prompt = Some("a plane".to_string());
        assert_eq!(line.effective_prompt(), Some("a plane"));
    }

    #[test]
    fn test_from_texts_assigns_ids() {
        let project = Project::from_texts("demo", ["First", "", "  Second  "]);
        assert_eq!(project.ids(), vec!["L1", "L2"]);
        assert_eq!(project.script[1].text, "Second");
        assert!(project.created_at.is_some());
        assert_eq!(project.position("L2"), Some(1));
    }

    #[test]
    fn test_decided_by_accepts_legacy_llm() {
        let d: Decision =
            serde_json::from_str(r#"{"method":"x","confidence":1.0,"decided_by":"llm"}"#).unwrap();
        assert_eq!(d.decided_by, DecidedBy::Model);
        assert!(
            !serde_json::to_string(&d)
                .unwrap()
                .contains("low_confidence")
        );
    }

    #[test]
    fn test_stage_prerequisites() {
        assert_eq!(Stage::Decision.prerequisite(), None);
        assert_eq!(Stage::Audio.prerequisite(), Some(Stage::Decision));
        assert_eq!(Stage::Media.prerequisite(), Some(Stage::Decision));
        assert_eq!(Stage::Media.to_string(), "media");
    }
}
