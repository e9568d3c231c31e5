use serde::Serialize;

use reelforge_project::{Diagnostic, LineStatus, Stage};

/// What a run did to one line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LineOutcome {
    /// At least one stage ran and none failed
    Done,
    /// A stage failed; the reason is in the line's diagnostic
    Failed,
    /// A requested stage lacks its prerequisite, which was not requested
    Skipped,
    /// Nothing to do, or the run was cancelled before the line started
    Untouched,
}

/// Per-line entry of a [`RunSummary`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineReport {
    pub id: String,
    pub outcome: LineOutcome,
    /// Stages that were executed, in order
    pub stages: Vec<Stage>,
    /// Derived status after the run
    pub status: LineStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<Diagnostic>,
}

/// Result of [`crate::Engine::run`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub project: String,
    pub total: usize,
    pub done: usize,
    pub failed: usize,
    pub skipped: usize,
    pub untouched: usize,
    /// Lines whose status is `failed` after the run, whatever this run did
    pub failing: usize,
    /// Cancellation was requested before the run finished
    pub interrupted: bool,
    /// Reports in script order
    pub lines: Vec<LineReport>,
}

impl RunSummary {
    /// Summary over `lines`, which must already be in script order
    #[must_use]
    pub fn new(project: impl Into<String>, lines: Vec<LineReport>, interrupted: bool) -> Self {
        let count = |outcome: LineOutcome| lines.iter().filter(|l| l.outcome == outcome).count();
        Self {
            project: project.into(),
            total: lines.len(),
            done: count(LineOutcome::Done),
            failed: count(LineOutcome::Failed),
            skipped: count(LineOutcome::Skipped),
            untouched: count(LineOutcome::Untouched),
            failing: lines
                .iter()
                .filter(|l| l.status == LineStatus::Failed)
                .count(),
            interrupted,
            lines,
        }
    }

    /// Whether any reported line failed in this run or is still failed
    /// from an earlier one
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.failed > 0 || self.failing > 0
    }

    #[must_use]
    pub fn line(&self, id: &str) -> Option<&LineReport> {
        self.lines.iter().find(|l| l.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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
    fn test_counts() {
        let summary = RunSummary::new(
            "demo",
            vec![
                report("L1", LineOutcome::Done),
                report("L2", LineOutcome::Failed),
                report("L3", LineOutcome::Untouched),
                report("L4", LineOutcome::Done),
            ],
            false,
        );
        assert_eq!(summary.total, 4);
        assert_eq!(summary.done, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.skipped, 0);
        assert_eq!(summary.untouched, 1);
        assert!(summary.has_failures());
        assert_eq!(summary.line("L2").unwrap().outcome, LineOutcome::Failed);
    }

    #[test]
    fn test_stale_failure_counts_as_failure() {
        let mut stale = report("L1", LineOutcome::Untouched);
        stale.status = LineStatus::Failed;
        let summary = RunSummary::new("demo", vec![stale, report("L2", LineOutcome::Done)], false);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.failing, 1);
        assert!(summary.has_failures());
    }

    #[test]
    fn test_serialized_outcome() {
        let json = serde_json::to_value(report("L1", LineOutcome::Untouched)).unwrap();
        assert_eq!(json["outcome"], "untouched");
        assert_eq!(json["status"], "pending");
        assert!(json.get("diagnostic").is_none());
    }
}
