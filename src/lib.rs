//! reelforge - resumable script-to-video pipeline
//!
//! A project document holds an ordered script of narration lines. For each
//! line reelforge decides which generation method to use, optionally
//! synthesizes audio, then renders media, saving the document after every
//! stage so an interrupted or partially failed run picks up where it
//! stopped.
//!
//! # Quick Start (CLI)
//!
//! ```bash
//! # Author a project from one line of narration per input line
//! printf 'A plane over the sea\nThe city at night\n' | reelforge init demo
//!
//! # Run every stage, two lines at a time
//! reelforge run demo.json --concurrency 2
//!
//! # Inspect progress without running anything
//! reelforge status demo.json --json
//!
//! # Stitch subtitles and media into playable order
//! reelforge assemble demo.json
//! ```
//!
//! # Library
//!
//! The crates behind the CLI are re-exported here. A run needs a registry
//! of methods, a router and a locked project store:
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use reelforge::{Config, ProjectStore, RunOptions, setup};
//!
//! # async fn demo() -> Result<(), reelforge::ReelforgeError> {
//! let config = Config::builtin();
//! let registry = Arc::new(setup::build_registry(&config)?);
//! let engine = setup::build_engine(registry, setup::build_signal(&config), &config);
//!
//! let store = ProjectStore::open(camino::Utf8Path::new("demo.json"), false)?;
//! let mut project = store.load()?;
//! let summary = engine
//!     .run(&mut project, &store, &RunOptions::new(config.output_dir()))
//!     .await?;
//! println!("{} done, {} failed", summary.done, summary.failed);
//! # Ok(())
//! # }
//! ```
//!
//! # JSON Output
//!
//! `--json` output is emitted in JCS (RFC 8785) canonical form via
//! [`emit_jcs`]; the project document itself is written with sorted keys and
//! two-space indentation.

pub mod cli;
pub mod setup;

pub use reelforge_config::{CliArgs, Config, ConfigSource};
pub use reelforge_engine::{
    Engine, LineOutcome, LineReport, RunOptions, RunSummary, StageSet,
};
pub use reelforge_method_api::{
    GenerationResult, Method, MethodError, MethodRequest, OutputKind,
};
pub use reelforge_project::{
    DecidedBy, Decision, Diagnostic, DiagnosticKind, LineStatus, Project, ProjectStore,
    ScriptLine, Stage,
};
pub use reelforge_registry::{MethodDescriptor, MethodRegistry, Registration};
pub use reelforge_router::{ClassificationSignal, DecisionRouter, RouterConfig};
pub use reelforge_utils::canonicalization::emit_jcs;
pub use reelforge_utils::error::{ReelforgeError, UserFriendlyError};
pub use reelforge_utils::exit_codes::ExitCode;
