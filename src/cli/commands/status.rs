//! Status command implementation
//!
//! Read-only: the document is loaded without taking the project lock, so
//! status works while a run is in progress.

use anyhow::Result;
use serde::Serialize;
use std::collections::BTreeMap;

use reelforge_config::Config;
use reelforge_project::{Diagnostic, Project, ScriptLine};
use reelforge_utils::error::ReelforgeError;
use reelforge_utils::exit_codes::ExitCode;

use super::common::{truncate, utf8_path};
use super::json_emit::emit_status_json;

#[derive(Debug, Serialize)]
struct StatusOutput {
    project: String,
    document: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    updated_at: Option<String>,
    counts: BTreeMap<String, usize>,
    lines: Vec<LineView>,
    effective_config: BTreeMap<String, ConfigValue>,
}

#[derive(Debug, Serialize)]
struct LineView {
    id: String,
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    decided_by: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    low_confidence: bool,
    artifacts: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    diagnostic: Option<Diagnostic>,
}

#[derive(Debug, Serialize)]
struct ConfigValue {
    value: String,
    source: String,
}

impl LineView {
    fn from_line(line: &ScriptLine) -> Self {
        let artifacts = line
            .audio_generation
            .iter()
            .chain(line.generation.iter())
            .filter(|g| g.ok)
            .flat_map(|g| g.artifacts.iter().cloned())
            .collect();
        Self {
            id: line.id.clone(),
            status: line.status_label(),
            method: line.decision.as_ref().map(|d| d.method.clone()),
            decided_by: line.decision.as_ref().map(|d| d.decided_by.to_string()),
            low_confidence: line.decision.as_ref().is_some_and(|d| d.is_low_confidence()),
            artifacts,
            diagnostic: line.diagnostic.clone(),
        }
    }
}

/// Execute `reelforge status`
pub fn execute_status_command(
    project_path: &std::path::Path,
    json: bool,
    config: &Config,
) -> Result<ExitCode> {
    let document = utf8_path(project_path)?;
    let project = reelforge_project::load(&document).map_err(ReelforgeError::from)?;

    if json {
        let output = status_output(&project, document.as_str(), config);
        println!("{}", emit_status_json(&output)?);
        return Ok(ExitCode::SUCCESS);
    }

    println!("Project: {} ({document})", project.name);
    if let Some(updated) = &project.updated_at {
        println!("Updated: {updated}");
    }
    println!();
    for line in &project.script {
        let view = LineView::from_line(line);
        let method = match (&view.method, view.low_confidence) {
            (Some(m), true) => format!("{m} (low confidence)"),
            (Some(m), false) => m.clone(),
            (None, _) => "-".to_string(),
        };
        print!("  {:<8} {:<14} {:<28}", view.id, view.status, method);
        if let Some(diagnostic) = &view.diagnostic {
            print!(
                " [{}] {}",
                diagnostic.kind,
                truncate(&diagnostic.message, 72)
            );
        }
        println!();
    }
    println!();
    let counts = project
        .status_counts()
        .into_iter()
        .map(|(status, n)| format!("{status}: {n}"))
        .collect::<Vec<_>>()
        .join(", ");
    println!("{} lines ({counts})", project.script.len());
    Ok(ExitCode::SUCCESS)
}

fn status_output(project: &Project, document: &str, config: &Config) -> StatusOutput {
    StatusOutput {
        project: project.name.clone(),
        document: document.to_string(),
        updated_at: project.updated_at.clone(),
        counts: project.status_counts(),
        lines: project.script.iter().map(LineView::from_line).collect(),
        effective_config: config
            .effective_config()
            .into_iter()
            .map(|(key, (value, source))| (key, ConfigValue { value, source }))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reelforge_method_api::GenerationResult;
    use reelforge_project::{Decision, DecidedBy, DiagnosticKind, Stage};

    fn sample_project() -> Project {
        let mut project = Project::from_texts("demo", ["First", "Second", "Third"]);
        let first = &mut project.script[0];
        first.decision = Some(Decision::new("subtitle_only", 0.9, DecidedBy::Model));
        first.generation = Some(GenerationResult::success(["out/L1.srt"]));
        let second = &mut project.script[1];
        second.decision =
            Some(Decision::new("text_to_video", 0.2, DecidedBy::Model).flagged_low_confidence());
        second.record_failure(Diagnostic::new(
            Stage::Media,
            DiagnosticKind::MethodFailed,
            "text_to_video: quota_exceeded",
        ));
        project
    }

    #[test]
    fn test_line_view_collects_ok_artifacts() {
        let project = sample_project();
        let view = LineView::from_line(&project.script[0]);
        assert_eq!(view.method.as_deref(), Some("subtitle_only"));
        assert_eq!(view.artifacts, vec!["out/L1.srt"]);
        assert!(!view.low_confidence);
    }

    #[test]
    fn test_status_json_shape() {
        let project = sample_project();
        let output = status_output(&project, "demo.json", &Config::builtin());
        let value = serde_json::to_value(&output).unwrap();

        assert_eq!(value["project"], "demo");
        assert_eq!(value["lines"][1]["status"], "failed");
        assert_eq!(value["lines"][1]["low_confidence"], true);
        assert_eq!(value["lines"][1]["diagnostic"]["kind"], "method_failed");
        assert_eq!(value["lines"][2]["status"], "pending");
        assert!(value["lines"][2].get("method").is_none());
        assert_eq!(value["counts"]["pending"], 1);
        assert_eq!(
            value["effective_config"]["concurrency"]["source"],
            "default"
        );
    }
}
