//! Assign command implementation
//!
//! Records a manual decision for one line. Manual decisions are never
//! replaced by the router, even when the decision stage is forced.

use anyhow::Result;
use std::path::Path;

use reelforge_config::Config;
use reelforge_project::{Decision, ProjectStore, Stage};
use reelforge_utils::error::{ProjectError, ReelforgeError, RegistryError};
use reelforge_utils::exit_codes::ExitCode;

use super::common::utf8_path;
use crate::setup;

/// Execute `reelforge assign`
pub fn execute_assign_command(
    project_path: &Path,
    line_id: &str,
    method: &str,
    force_lock: bool,
    config: &Config,
) -> Result<ExitCode> {
    let registry = setup::build_registry(config)?;
    registry
        .resolve(method)
        .map_err(|e| ReelforgeError::Registry(RegistryError::Unknown(e)))?;

    let document = utf8_path(project_path)?;
    let store = ProjectStore::open(&document, force_lock)?;
    let mut project = store.load()?;

    let Some(line) = project.line_mut(line_id) else {
        return Err(ReelforgeError::Project(ProjectError::UnknownLine {
            id: line_id.to_string(),
        })
        .into());
    };

    let decision = Decision::manual(method);
    if line.decision.as_ref() == Some(&decision) {
        println!("{line_id} is already assigned to {method}");
        return Ok(ExitCode::SUCCESS);
    }

    let previous = line.decision.replace(decision).map(|d| d.method);
    line.clear_failure(Stage::Decision);
    let has_results = line.generation.is_some() || line.audio_generation.is_some();
    project.touch();
    store.save(&project)?;

    match previous {
        Some(old) => println!("{line_id}: {old} → {method} (manual)"),
        None => println!("{line_id}: {method} (manual)"),
    }
    if has_results {
        println!(
            "Existing results were kept; regenerate with: reelforge run {document} --force audio --force media --line {line_id}"
        );
    }
    Ok(ExitCode::SUCCESS)
}
