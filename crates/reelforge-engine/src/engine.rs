use futures::StreamExt;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{Instrument, debug, info, warn};

use reelforge_method_api::WorkdirClaims;
use reelforge_project::{Diagnostic, DiagnosticKind, Project, ProjectStore, ScriptLine, Stage};
use reelforge_registry::MethodRegistry;
use reelforge_router::DecisionRouter;
use reelforge_utils::error::ReelforgeError;
use reelforge_utils::logging::{run_span, stage_span};
use reelforge_utils::paths::{line_workdir, target_name};

use crate::options::{RunOptions, StageSet};
use crate::stage::{self, LineJob, StageUpdate};
use crate::summary::{LineOutcome, LineReport, RunSummary};

/// Drives the per-line state machine over a project
pub struct Engine {
    registry: Arc<MethodRegistry>,
    router: Arc<DecisionRouter>,
    audio_method: Option<String>,
    claims: WorkdirClaims,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("methods", &self.registry.names())
            .field("router", &self.router)
            .field("audio_method", &self.audio_method)
            .finish_non_exhaustive()
    }
}

impl Engine {
    #[must_use]
    pub fn new(registry: Arc<MethodRegistry>, router: Arc<DecisionRouter>) -> Self {
        Self {
            registry,
            router,
            audio_method: None,
            claims: WorkdirClaims::new(),
        }
    }

    /// Produce audio with `method` for every line, whatever was decided
    #[must_use]
    pub fn with_audio_method(mut self, method: Option<String>) -> Self {
        self.audio_method = method;
        self
    }

    #[must_use]
    pub fn registry(&self) -> &MethodRegistry {
        &self.registry
    }

    #[must_use]
    pub fn audio_method(&self) -> Option<&str> {
        self.audio_method.as_deref()
    }

    /// Bring the requested stages of every selected line to completion.
    ///
    /// Each stage that changes a line is saved through `store` before the
    /// next one starts, so an interrupted run resumes where it stopped.
    /// Line failures are recorded on the line and reported in the summary.
    ///
    /// # Errors
    ///
    /// Only when the project cannot be saved; the run stops at that point.
    pub async fn run(
        &self,
        project: &mut Project,
        store: &ProjectStore,
        options: &RunOptions,
    ) -> Result<RunSummary, ReelforgeError> {
        let name = project.name.clone();
        let span = run_span(&name, &options.stages.to_string());

        async {
            let selected: Vec<(usize, String)> = project
                .script
                .iter()
                .enumerate()
                .filter(|(_, line)| options.includes_line(&line.id))
                .map(|(position, line)| (position, line.id.clone()))
                .collect();
            info!(
                lines = selected.len(),
                concurrency = options.concurrency,
                force = %options.force,
                "Starting run"
            );

            let shared = Mutex::new(project);
            let run = LineRun {
                engine: self,
                project: &name,
                shared: &shared,
                store,
                options,
            };
            let run = &run;

            let mut reports = Vec::with_capacity(selected.len());
            let mut lines = futures::stream::iter(selected)
                .map(move |(position, id)| run.process_line(position, id))
                .buffer_unordered(options.concurrency.max(1));
            while let Some(report) = lines.next().await {
                reports.push(report?);
            }
            drop(lines);

            reports.sort_by_key(|(position, _)| *position);
            let summary = RunSummary::new(
                name.clone(),
                reports.into_iter().map(|(_, report)| report).collect(),
                options.cancel.is_cancelled(),
            );
            info!(
                total = summary.total,
                done = summary.done,
                failed = summary.failed,
                skipped = summary.skipped,
                untouched = summary.untouched,
                interrupted = summary.interrupted,
                "Run finished"
            );
            Ok(summary)
        }
        .instrument(span)
        .await
    }
}

/// State shared by the line futures of one run
struct LineRun<'a, 'p> {
    engine: &'a Engine,
    project: &'a str,
    shared: &'a Mutex<&'p mut Project>,
    store: &'a ProjectStore,
    options: &'a RunOptions,
}

impl LineRun<'_, '_> {
    async fn snapshot(&self, id: &str) -> Option<ScriptLine> {
        self.shared.lock().await.line(id).cloned()
    }

    /// Apply `change` to the line and save when it changed anything
    async fn commit<F>(&self, id: &str, change: F) -> Result<bool, ReelforgeError>
    where
        F: FnOnce(&mut ScriptLine),
    {
        let mut guard = self.shared.lock().await;
        let project: &mut Project = &mut guard;
        let changed = match project.line_mut(id) {
            None => false,
            Some(line) => {
                let before = line.clone();
                change(line);
                *line != before
            }
        };
        if changed {
            project.touch();
            self.store.save(project)?;
        }
        Ok(changed)
    }

    async fn process_line(
        &self,
        position: usize,
        id: String,
    ) -> Result<(usize, LineReport), ReelforgeError> {
        let options = self.options;
        let Some(first) = self.snapshot(&id).await else {
            return Ok((position, untouched(&id)));
        };
        let force = if first.regenerate {
            options.force.union(&options.stages)
        } else {
            options.force.clone()
        };

        let mut attempted = BTreeSet::new();
        let mut executed = Vec::new();
        let mut outcome = None;

        while !options.cancel.is_cancelled() {
            let Some(line) = self.snapshot(&id).await else {
                break;
            };
            let Some(stage) = next_stage(&line, &options.stages, &force, &attempted) else {
                break;
            };
            if let Some(prerequisite) = stage.prerequisite()
                && !line.has_outcome(prerequisite)
            {
                if !options.stages.contains(prerequisite) {
                    info!(line = %id, %stage, %prerequisite, "Skipping line without prerequisite");
                    outcome = Some(LineOutcome::Skipped);
                }
                break;
            }

            attempted.insert(stage);
            let update = self
                .execute(stage, &line, position, force.contains(stage))
                .instrument(stage_span(self.project, &id, &stage.to_string()))
                .await?;
            let failed = update.is_failure();
            if update != StageUpdate::Unchanged {
                executed.push(stage);
            }
            self.commit(&id, |line| update.apply(line)).await?;
            if failed {
                outcome = Some(LineOutcome::Failed);
                break;
            }
        }

        let finished = outcome.is_none();
        let mut line = self.snapshot(&id).await.unwrap_or(first);
        if finished
            && line.regenerate
            && options.stages.iter().all(|s| line.is_satisfied(s))
        {
            self.commit(&id, |line| line.regenerate = false).await?;
            line.regenerate = false;
        }

        let outcome = outcome.unwrap_or(if executed.is_empty() {
            LineOutcome::Untouched
        } else {
            LineOutcome::Done
        });
        debug!(line = %id, %outcome, stages = ?executed, status = %line.status(), "Line processed");
        Ok((
            position,
            LineReport {
                id,
                outcome,
                stages: executed,
                status: line.status(),
                diagnostic: line.diagnostic,
            },
        ))
    }

    async fn execute(
        &self,
        stage: Stage,
        line: &ScriptLine,
        position: usize,
        forced: bool,
    ) -> Result<StageUpdate, ReelforgeError> {
        let target = target_name(&line.id, position);
        let job = LineJob {
            project: self.project,
            line,
            workdir: line_workdir(&self.options.out_root, self.project, &target),
            target,
            forced,
        };

        let engine = self.engine;
        let work = async {
            match stage {
                Stage::Decision => Ok(stage::run_decision(&engine.router, &job).await),
                Stage::Audio => match &line.decision {
                    Some(decision) => Ok(stage::run_audio(
                        &engine.registry,
                        &engine.claims,
                        engine.audio_method.as_deref(),
                        decision,
                        &job,
                    )
                    .await),
                    None => Ok(StageUpdate::Unchanged),
                },
                Stage::Media => self.run_media(&job).await,
            }
        };

        match tokio::time::timeout(self.options.stage_timeout, work).await {
            Ok(update) => update,
            Err(_) => {
                warn!(line = %line.id, %stage, timeout = ?self.options.stage_timeout, "Stage timed out");
                Ok(StageUpdate::Failed(Diagnostic::new(
                    stage,
                    DiagnosticKind::Timeout,
                    format!(
                        "{stage} stage timed out after {:?}",
                        self.options.stage_timeout
                    ),
                )))
            }
        }
    }

    async fn run_media(&self, job: &LineJob<'_>) -> Result<StageUpdate, ReelforgeError> {
        let Some(decision) = &job.line.decision else {
            return Ok(StageUpdate::Unchanged);
        };
        let descriptor = match self.engine.registry.resolve(&decision.method) {
            Ok(descriptor) => descriptor,
            Err(e) => {
                warn!(line = %job.line.id, error = %e, "Decided method is not registered");
                return Ok(stage::unknown_method(Stage::Media, &e.to_string()));
            }
        };

        let prompt = match job.line.effective_prompt() {
            Some(prompt) => prompt.to_string(),
            None => {
                let derived = descriptor.implementation.generate_prompt(&job.line.text);
                debug!(line = %job.line.id, method = %descriptor.name, "Storing derived prompt");
                let stored = derived.clone();
                self.commit(&job.line.id, move |line| line.prompt = Some(stored))
                    .await?;
                derived
            }
        };

        let duration_ms = job
            .line
            .audio_generation
            .as_ref()
            .filter(|audio| audio.ok)
            .and_then(|audio| audio.duration_ms);

        Ok(stage::invoke(
            descriptor,
            Stage::Media,
            &self.engine.claims,
            job,
            prompt,
            duration_ms,
        )
        .await
        .map_or_else(StageUpdate::Failed, StageUpdate::Media))
    }
}

/// First requested stage not yet attempted that is forced or unsatisfied
fn next_stage(
    line: &ScriptLine,
    stages: &StageSet,
    force: &StageSet,
    attempted: &BTreeSet<Stage>,
) -> Option<Stage> {
    stages
        .iter()
        .filter(|stage| !attempted.contains(stage))
        .find(|&stage| force.contains(stage) || !line.is_satisfied(stage))
}

fn untouched(id: &str) -> LineReport {
    LineReport {
        id: id.to_string(),
        outcome: LineOutcome::Untouched,
        stages: Vec::new(),
        status: reelforge_project::LineStatus::Pending,
        diagnostic: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reelforge_project::{Decision, GenerationResult};

    #[test]
    fn test_next_stage_skips_satisfied() {
        let mut line = ScriptLine::new("L1", "A");
        line.decision = Some(Decision::manual("subtitle_only"));
        line.audio_skipped = Some(true);

        let none = BTreeSet::new();
        assert_eq!(
            next_stage(&line, &StageSet::all(), &StageSet::empty(), &none),
            Some(Stage::Media)
        );

        line.generation = Some(GenerationResult::success(["x.mp4"]));
        assert_eq!(
            next_stage(&line, &StageSet::all(), &StageSet::empty(), &none),
            None
        );
    }

    #[test]
    fn test_next_stage_honors_force_once() {
        let mut line = ScriptLine::new("L1", "A");
        line.decision = Some(Decision::manual("subtitle_only"));
        let force = StageSet::only([Stage::Decision]);
        let stages = StageSet::only([Stage::Decision]);

        let mut attempted = BTreeSet::new();
        assert_eq!(
            next_stage(&line, &stages, &force, &attempted),
            Some(Stage::Decision)
        );
        attempted.insert(Stage::Decision);
        assert_eq!(next_stage(&line, &stages, &force, &attempted), None);
    }
}
