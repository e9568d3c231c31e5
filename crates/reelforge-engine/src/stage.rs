//! Execution of one stage for one line.
//!
//! Stage functions never touch the project; they return a [`StageUpdate`]
//! that the engine applies to the line under the project mutex.

use camino::Utf8PathBuf;
use std::time::Instant;
use tracing::{debug, info, warn};

use reelforge_method_api::{
    GenerationResult, META_ERROR, MethodRequest, OutputKind, WorkdirClaims,
};
use reelforge_project::{DecidedBy, Decision, Diagnostic, DiagnosticKind, ScriptLine, Stage};
use reelforge_registry::{MethodDescriptor, MethodRegistry};
use reelforge_router::{DecisionRouter, RouteRequest};

/// A method result plus the failure it implies, if any
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Generated {
    pub result: GenerationResult,
    pub diagnostic: Option<Diagnostic>,
}

/// Change a stage wants to make to its line
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum StageUpdate {
    Decided(Decision),
    /// Nothing to record
    Unchanged,
    AudioSkipped,
    Audio(Generated),
    Media(Generated),
    /// Failure that leaves the stage's result field as it was
    Failed(Diagnostic),
}

impl StageUpdate {
    pub(crate) fn is_failure(&self) -> bool {
        match self {
            Self::Failed(_) => true,
            Self::Audio(generated) | Self::Media(generated) => generated.diagnostic.is_some(),
            Self::Decided(_) | Self::Unchanged | Self::AudioSkipped => false,
        }
    }

    pub(crate) fn apply(self, line: &mut ScriptLine) {
        match self {
            Self::Decided(decision) => {
                line.decision = Some(decision);
                line.clear_failure(Stage::Decision);
            }
            Self::Unchanged => {}
            Self::AudioSkipped => {
                line.audio_skipped = Some(true);
                if line.audio_generation.as_ref().is_some_and(|a| !a.ok) {
                    line.audio_generation = None;
                }
                line.clear_failure(Stage::Audio);
            }
            Self::Audio(generated) => {
                if generated.result.ok {
                    line.audio_skipped = None;
                }
                line.audio_generation = Some(generated.result);
                record(line, Stage::Audio, generated.diagnostic);
            }
            Self::Media(generated) => {
                line.generation = Some(generated.result);
                record(line, Stage::Media, generated.diagnostic);
            }
            Self::Failed(diagnostic) => line.record_failure(diagnostic),
        }
    }
}

fn record(line: &mut ScriptLine, stage: Stage, diagnostic: Option<Diagnostic>) {
    match diagnostic {
        Some(diagnostic) => line.record_failure(diagnostic),
        None => line.clear_failure(stage),
    }
}

/// Snapshot of a line plus where its artifacts go
#[derive(Debug)]
pub(crate) struct LineJob<'a> {
    pub project: &'a str,
    pub line: &'a ScriptLine,
    pub target: String,
    pub workdir: Utf8PathBuf,
    /// The stage is being re-run on request
    pub forced: bool,
}

pub(crate) async fn run_decision(router: &DecisionRouter, job: &LineJob<'_>) -> StageUpdate {
    if let Some(existing) = &job.line.decision
        && existing.decided_by == DecidedBy::Manual
    {
        debug!(line = %job.line.id, method = %existing.method, "Keeping manual decision");
        // Re-recording the manual choice clears a stale decision diagnostic
        return if job.line.is_satisfied(Stage::Decision) {
            StageUpdate::Unchanged
        } else {
            StageUpdate::Decided(existing.clone())
        };
    }

    let request = RouteRequest::new(job.project, &job.line.id, &job.line.text)
        .with_context(job.line.effective_context().map(str::to_string));
    match router.decide(&request).await {
        Ok(routed) => {
            info!(
                line = %job.line.id,
                method = %routed.decision.method,
                confidence = routed.decision.confidence,
                decided_by = %routed.decision.decided_by,
                "Line decided"
            );
            StageUpdate::Decided(routed.decision)
        }
        Err(e) => {
            warn!(line = %job.line.id, error = %e, "Routing failed");
            StageUpdate::Failed(Diagnostic::new(
                Stage::Decision,
                DiagnosticKind::RouterUnavailable,
                e.to_string(),
            ))
        }
    }
}

/// Audio dispatch: the dedicated audio method when configured, else the
/// decided method when it produces audio, else the line needs no audio.
pub(crate) async fn run_audio(
    registry: &MethodRegistry,
    claims: &WorkdirClaims,
    audio_method: Option<&str>,
    decision: &Decision,
    job: &LineJob<'_>,
) -> StageUpdate {
    let name = audio_method.unwrap_or(&decision.method);
    let descriptor = match registry.resolve(name) {
        Ok(descriptor) => descriptor,
        Err(e) => return unknown_method(Stage::Audio, &e.to_string()),
    };
    if audio_method.is_none() && descriptor.output_kind != OutputKind::Audio {
        debug!(line = %job.line.id, method = name, "Decided method produces no audio");
        return StageUpdate::AudioSkipped;
    }

    let prompt = job.line.effective_prompt().map_or_else(
        || descriptor.implementation.generate_prompt(&job.line.text),
        str::to_string,
    );
    invoke(descriptor, Stage::Audio, claims, job, prompt, None)
        .await
        .map_or_else(StageUpdate::Failed, StageUpdate::Audio)
}

pub(crate) fn unknown_method(stage: Stage, message: &str) -> StageUpdate {
    StageUpdate::Failed(Diagnostic::new(stage, DiagnosticKind::UnknownMethod, message))
}

/// Run `descriptor` for the line inside its claimed working directory and
/// check the result against the method contract.
pub(crate) async fn invoke(
    descriptor: &MethodDescriptor,
    stage: Stage,
    claims: &WorkdirClaims,
    job: &LineJob<'_>,
    prompt: String,
    duration_ms: Option<u64>,
) -> Result<Generated, Diagnostic> {
    let method_error = |message: String| Diagnostic::new(stage, DiagnosticKind::MethodError, message);

    let guard = claims
        .claim(job.project, &job.target, &job.workdir)
        .map_err(|e| method_error(e.to_string()))?;
    let request = MethodRequest {
        prompt,
        project: job.project.to_string(),
        target_name: job.target.clone(),
        text: job.line.text.clone(),
        workdir: guard.path().to_path_buf(),
        duration_ms,
        block: serde_json::to_value(job.line).unwrap_or(serde_json::Value::Null),
    };

    let started = Instant::now();
    let result = descriptor
        .implementation
        .run(&request)
        .await
        .map_err(|e| method_error(format!("{}: {e}", descriptor.name)))?;
    let generated = verify(stage, &descriptor.name, result);

    let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    match &generated.diagnostic {
        None => info!(
            line = %job.line.id,
            method = %descriptor.name,
            elapsed_ms,
            duration_ms = generated.result.duration_ms,
            "Stage succeeded"
        ),
        Some(diagnostic) => warn!(
            line = %job.line.id,
            method = %descriptor.name,
            elapsed_ms,
            kind = %diagnostic.kind,
            error = %diagnostic.message,
            "Stage failed"
        ),
    }
    Ok(generated)
}

/// Check an `ok = true` result's promises; a broken promise downgrades the
/// result to `ok = false` with a contract-violation diagnostic.
pub(crate) fn verify(stage: Stage, method: &str, result: GenerationResult) -> Generated {
    if !result.ok {
        let reason = result
            .error_message()
            .unwrap_or("method reported failure without a reason");
        return Generated {
            diagnostic: Some(Diagnostic::new(
                stage,
                DiagnosticKind::MethodFailed,
                format!("{method}: {reason}"),
            )),
            result,
        };
    }

    let violation = if result.artifacts.is_empty() {
        Some("reported success without artifacts".to_string())
    } else {
        let missing = result.missing_artifacts();
        (!missing.is_empty()).then(|| format!("reported missing artifacts: {}", missing.join(", ")))
    };

    match violation {
        None => Generated {
            result,
            diagnostic: None,
        },
        Some(violation) => {
            let message = format!("{method} {violation}");
            let mut result = result;
            result.ok = false;
            result
                .meta
                .insert(META_ERROR.to_string(), serde_json::Value::String(message.clone()));
            Generated {
                result,
                diagnostic: Some(Diagnostic::new(
                    stage,
                    DiagnosticKind::ContractViolation,
                    message,
                )),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_passes_failure_through() {
        let generated = verify(Stage::Media, "stub", GenerationResult::failure("quota_exceeded"));
        assert!(!generated.result.ok);
        let diagnostic = generated.diagnostic.unwrap();
        assert_eq!(diagnostic.kind, DiagnosticKind::MethodFailed);
        assert_eq!(diagnostic.message, "stub: quota_exceeded");
    }

    #[test]
    fn test_verify_downgrades_missing_artifacts() {
        let generated = verify(
            Stage::Media,
            "stub",
            GenerationResult::success(["/nonexistent/reelforge/L1.mp4"]).with_meta("k", 1),
        );
        assert!(!generated.result.ok);
        assert_eq!(generated.result.meta["k"], 1);
        assert!(
            generated
                .result
                .error_message()
                .unwrap()
                .contains("/nonexistent/reelforge/L1.mp4")
        );
        assert_eq!(
            generated.diagnostic.unwrap().kind,
            DiagnosticKind::ContractViolation
        );
    }

    #[test]
    fn test_verify_rejects_success_without_artifacts() {
        let generated = verify(Stage::Audio, "stub", GenerationResult::success(Vec::<String>::new()));
        assert!(!generated.result.ok);
        assert_eq!(
            generated.diagnostic.unwrap().kind,
            DiagnosticKind::ContractViolation
        );
    }

    #[test]
    fn test_apply_audio_skipped_clears_failed_audio() {
        let mut line = ScriptLine::new("L1", "A");
        line.decision = Some(Decision::manual("subtitle_only"));
        line.audio_generation = Some(GenerationResult::failure("boom"));
        line.record_failure(Diagnostic::new(
            Stage::Audio,
            DiagnosticKind::MethodFailed,
            "boom",
        ));

        StageUpdate::AudioSkipped.apply(&mut line);
        assert!(line.is_audio_skipped());
        assert!(line.audio_generation.is_none());
        assert!(line.diagnostic.is_none());
    }

    #[test]
    fn test_apply_failed_media_keeps_other_results() {
        let dir = tempfile::TempDir::new().unwrap();
        let audio = dir.path().join("L1.mp3");
        std::fs::write(&audio, b"x").unwrap();

        let mut line = ScriptLine::new("L1", "A");
        line.decision = Some(Decision::manual("tts"));
        line.audio_generation = Some(GenerationResult::success([audio.to_string_lossy()]));

        let update = StageUpdate::Media(verify(
            Stage::Media,
            "tts",
            GenerationResult::failure("quota_exceeded"),
        ));
        assert!(update.is_failure());
        update.apply(&mut line);

        assert!(line.audio_generation.as_ref().unwrap().ok);
        assert!(!line.generation.as_ref().unwrap().ok);
        assert_eq!(line.diagnostic.as_ref().unwrap().stage, Stage::Media);
    }
}
