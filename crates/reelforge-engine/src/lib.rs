//! Pipeline orchestration engine
//!
//! The engine turns a project's script into media, one stage at a time:
//!
//! ```text
//! pending ──decision──▶ decided ──audio──▶ audio_done | audio_skipped ──media──▶ done
//!    └───────────────────────┴──────────────────┴────────────────────────────▶ failed
//! ```
//!
//! For every selected line the requested stages are visited in order
//! (decision, audio, media). A stage whose result is already successful is
//! skipped unless it is forced, so re-running a finished project invokes no
//! method and leaves the document untouched. Each stage that changes a line
//! is applied under the project mutex and saved before the next stage
//! begins; a failed line keeps its earlier successful results and the run
//! moves on to the next line.
//!
//! Audio is produced by the dedicated audio method when one is configured,
//! otherwise by the decided method when its output kind is audio; any other
//! line is marked `audioSkipped`. Media always uses the decided method and
//! receives the audio duration when there is one.
//!
//! Lines run with bounded concurrency. Cancelling [`RunOptions::cancel`]
//! stops new stages from starting; stages already running finish and are
//! saved.

mod engine;
mod options;
mod stage;
mod summary;

pub use engine::Engine;
pub use options::{DEFAULT_STAGE_TIMEOUT, RunOptions, StageSet};
pub use summary::{LineOutcome, LineReport, RunSummary};
