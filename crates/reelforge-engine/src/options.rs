use camino::Utf8PathBuf;
use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use reelforge_project::Stage;

/// Hard limit on a single stage invocation when none is configured
pub const DEFAULT_STAGE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Ordered set of pipeline stages
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageSet(BTreeSet<Stage>);

impl StageSet {
    /// Decision, audio and media
    #[must_use]
    pub fn all() -> Self {
        Self(Stage::ALL.into_iter().collect())
    }

    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn only<I: IntoIterator<Item = Stage>>(stages: I) -> Self {
        Self(stages.into_iter().collect())
    }

    pub fn insert(&mut self, stage: Stage) {
        self.0.insert(stage);
    }

    #[must_use]
    pub fn contains(&self, stage: Stage) -> bool {
        self.0.contains(&stage)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Stages in execution order
    pub fn iter(&self) -> impl Iterator<Item = Stage> + '_ {
        self.0.iter().copied()
    }

    #[must_use]
    pub fn union(&self, other: &StageSet) -> StageSet {
        Self(self.0.union(&other.0).copied().collect())
    }
}

impl fmt::Display for StageSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.iter().map(|s| s.to_string()).collect();
        write!(f, "{}", names.join(","))
    }
}

impl FromIterator<Stage> for StageSet {
    fn from_iter<I: IntoIterator<Item = Stage>>(iter: I) -> Self {
        Self::only(iter)
    }
}

/// Parameters of one engine run
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Stages to bring to completion
    pub stages: StageSet,
    /// Stages to re-run even when already successful
    pub force: StageSet,
    /// Restrict the run to these line ids
    pub lines: Option<BTreeSet<String>>,
    /// Lines processed at the same time
    pub concurrency: usize,
    pub stage_timeout: Duration,
    /// Root under which per-line working directories are created
    pub out_root: Utf8PathBuf,
    pub cancel: CancellationToken,
}

impl RunOptions {
    /// All stages, one line at a time, default timeout
    #[must_use]
    pub fn new(out_root: impl Into<Utf8PathBuf>) -> Self {
        Self {
            stages: StageSet::all(),
            force: StageSet::empty(),
            lines: None,
            concurrency: 1,
            stage_timeout: DEFAULT_STAGE_TIMEOUT,
            out_root: out_root.into(),
            cancel: CancellationToken::new(),
        }
    }

    /// Run `stages`; an empty set means all of them
    #[must_use]
    pub fn with_stages(mut self, stages: StageSet) -> Self {
        self.stages = if stages.is_empty() {
            StageSet::all()
        } else {
            stages
        };
        self
    }

    #[must_use]
    pub fn with_force(mut self, force: StageSet) -> Self {
        self.force = force;
        self
    }

    #[must_use]
    pub fn with_lines<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ids: BTreeSet<String> = ids.into_iter().map(Into::into).collect();
        self.lines = if ids.is_empty() { None } else { Some(ids) };
        self
    }

    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    #[must_use]
    pub fn with_stage_timeout(mut self, timeout: Duration) -> Self {
        self.stage_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Whether the line filter admits `id`
    #[must_use]
    pub fn includes_line(&self, id: &str) -> bool {
        self.lines.as_ref().is_none_or(|ids| ids.contains(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_set_is_ordered() {
        let set = StageSet::only([Stage::Media, Stage::Decision]);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![Stage::Decision, Stage::Media]);
        assert_eq!(set.to_string(), "decision,media");
        assert!(!set.contains(Stage::Audio));
        assert_eq!(StageSet::all().to_string(), "decision,audio,media");
    }

    #[test]
    fn test_empty_stage_selection_means_all() {
        let options = RunOptions::new("out").with_stages(StageSet::empty());
        assert_eq!(options.stages, StageSet::all());
    }

    #[test]
    fn test_line_filter() {
        let options = RunOptions::new("out");
        assert!(options.includes_line("L9"));

        let options = options.with_lines(["L1", "L3"]);
        assert!(options.includes_line("L1"));
        assert!(!options.includes_line("L2"));

        let options = options.with_lines(Vec::<String>::new());
        assert!(options.includes_line("L2"));
    }

    #[test]
    fn test_concurrency_is_at_least_one() {
        assert_eq!(RunOptions::new("out").with_concurrency(0).concurrency, 1);
    }
}
