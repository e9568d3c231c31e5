//! Logging and observability for reelforge
//!
//! Structured logging through `tracing`. Engine code logs with `project`,
//! `line`, `stage` and `method` fields; the subscriber installed here renders
//! them either compactly (default) or with targets and span timings
//! (verbose).

use std::io::IsTerminal;
use tracing::{Level, span};
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Check if colored output should be used.
///
/// True only when stderr is a terminal and `NO_COLOR` is not set.
fn use_color() -> bool {
    std::io::stderr().is_terminal() && std::env::var_os("NO_COLOR").is_none()
}

/// Default filter directive for the given verbosity
#[must_use]
pub fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        "reelforge=debug,info"
    } else {
        "reelforge=info,warn"
    }
}

/// Initialize the tracing subscriber.
///
/// `RUST_LOG` takes precedence over the verbosity default. Logs go to stderr
/// so that `--json` output on stdout stays machine-readable.
pub fn init_tracing(verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter(verbose)))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    if verbose {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(use_color())
                    .with_target(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .compact(),
            )
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(use_color())
                    .with_target(false)
                    .compact(),
            )
            .try_init()?;
    }

    Ok(())
}

/// Span covering one stage of one script line
#[must_use]
pub fn stage_span(project: &str, line: &str, stage: &str) -> tracing::Span {
    span!(
        Level::INFO,
        "stage",
        project = %project,
        line = %line,
        stage = %stage,
    )
}

/// Span covering a whole pipeline run
#[must_use]
pub fn run_span(project: &str, stages: &str) -> tracing::Span {
    span!(Level::INFO, "run", project = %project, stages = %stages)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter() {
        assert_eq!(default_filter(false), "reelforge=info,warn");
        assert_eq!(default_filter(true), "reelforge=debug,info");
        assert!(EnvFilter::try_new(default_filter(true)).is_ok());
    }

    #[test]
    fn test_spans_can_be_entered() {
        let span = stage_span("demo", "L1", "decision");
        let _guard = span.enter();
        let run = run_span("demo", "decision,audio,media");
        let _run_guard = run.enter();
    }
}
