//! Run command implementation
//!
//! Opens the project under its lock, wires the engine from config and
//! drives the requested stages, then reports a per-line summary.

use anyhow::Result;
use camino::Utf8Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use reelforge_config::Config;
use reelforge_engine::{LineOutcome, RunOptions, RunSummary, StageSet};
use reelforge_project::ProjectStore;
use reelforge_utils::error::{ProjectError, ReelforgeError};
use reelforge_utils::exit_codes::ExitCode;

use super::common::{truncate, utf8_path};
use super::json_emit::emit_run_json;
use crate::cli::args::RunArgs;
use crate::setup;

/// Execute `reelforge run`
pub async fn execute_run_command(args: &RunArgs, config: &Config) -> Result<ExitCode> {
    let document = utf8_path(&args.project)?;
    let store = ProjectStore::open(&document, args.force_lock)?;
    let mut project = store.load()?;

    // Reject unknown --line ids before anything runs
    if let Some(id) = args.lines.iter().find(|id| project.line(id).is_none()) {
        return Err(ReelforgeError::Project(ProjectError::UnknownLine { id: id.clone() }).into());
    }

    let registry = Arc::new(setup::build_registry(config)?);
    setup::check_configured_methods(&registry, config)?;
    let engine = setup::build_engine(registry, setup::build_signal(config), config);

    let cancel = CancellationToken::new();
    let watcher = spawn_interrupt_watcher(cancel.clone());

    let options = RunOptions::new(config.output_dir())
        .with_stages(StageSet::only(args.selected_stages()))
        .with_force(StageSet::only(args.force.iter().copied()))
        .with_lines(args.lines.iter().cloned())
        .with_concurrency(config.concurrency())
        .with_stage_timeout(config.stage_timeout())
        .with_cancellation(cancel);

    let result = engine.run(&mut project, &store, &options).await;
    watcher.abort();
    let summary = result?;

    if args.json {
        println!("{}", emit_run_json(&summary)?);
    } else {
        print_summary(&summary, &document);
    }

    Ok(exit_code_for(&summary))
}

/// Exit code reported for a finished run
#[must_use]
pub fn exit_code_for(summary: &RunSummary) -> ExitCode {
    if summary.interrupted {
        ExitCode::INTERRUPTED
    } else if summary.has_failures() {
        ExitCode::LINES_FAILED
    } else {
        ExitCode::SUCCESS
    }
}

fn spawn_interrupt_watcher(cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing in-flight stages");
            eprintln!("Interrupted: waiting for running stages to finish (progress is saved)");
            cancel.cancel();
        }
    })
}

fn print_summary(summary: &RunSummary, document: &Utf8Path) {
    println!("Project: {} ({document})", summary.project);
    for line in &summary.lines {
        let stages = if line.stages.is_empty() {
            "-".to_string()
        } else {
            line.stages
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(",")
        };
        let marker = match line.outcome {
            LineOutcome::Done => "✓",
            LineOutcome::Failed => "✗",
            LineOutcome::Skipped => "⊘",
            LineOutcome::Untouched => "·",
        };
        print!("  {marker} {:<8} {:<12} {:<22}", line.id, line.status.to_string(), stages);
        if let Some(diagnostic) = &line.diagnostic {
            print!(
                " {}: {}",
                diagnostic.stage,
                truncate(&diagnostic.message, 80)
            );
        }
        println!();
    }
    println!(
        "Summary: {} lines, {} done, {} failed, {} skipped, {} untouched",
        summary.total, summary.done, summary.failed, summary.skipped, summary.untouched
    );
    if summary.failing > summary.failed {
        println!("{} selected lines are still failed", summary.failing);
    }
    if summary.interrupted {
        println!("Run was interrupted; rerun the same command to resume.");
    } else if summary.has_failures() {
        println!(
            "Failed lines keep their diagnostics; rerun to retry them, or see `reelforge status {document}`."
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reelforge_engine::LineReport;
    use reelforge_project::LineStatus;

    fn report(id: &str, outcome: LineOutcome) -> LineReport {
        LineReport {
            id: id.to_string(),
            outcome,
            stages: Vec::new(),
            status: LineStatus::Pending,
            diagnostic: None,
        }
    }

    #[test]
    fn test_exit_code_success() {
        let summary = RunSummary::new(
            "demo",
            vec![report("L1", LineOutcome::Done), report("L2", LineOutcome::Untouched)],
            false,
        );
        assert_eq!(exit_code_for(&summary), ExitCode::SUCCESS);
    }

    #[test]
    fn test_exit_code_failures() {
        let summary = RunSummary::new(
            "demo",
            vec![report("L1", LineOutcome::Failed), report("L2", LineOutcome::Skipped)],
            false,
        );
        assert_eq!(exit_code_for(&summary), ExitCode::LINES_FAILED);
    }

    #[test]
    fn test_exit_code_counts_lines_still_failed() {
        // A line left failed by an earlier run and not retried by this one
        let mut stale = report("L2", LineOutcome::Untouched);
        stale.status = LineStatus::Failed;
        let summary = RunSummary::new("demo", vec![report("L1", LineOutcome::Done), stale], false);
        assert_eq!(exit_code_for(&summary), ExitCode::LINES_FAILED);
    }

    #[test]
    fn test_interruption_wins_over_failures() {
        let summary = RunSummary::new("demo", vec![report("L1", LineOutcome::Failed)], true);
        assert_eq!(exit_code_for(&summary), ExitCode::INTERRUPTED);
    }
}
