//! Project state store
//!
//! A project document is the single durable record of pipeline progress:
//! field presence on each script line tells which stages are complete, so
//! there is no separate progress file. The document is always replaced
//! atomically and written in canonical form, which makes saving an
//! unchanged project byte-identical.

mod document;
mod model;
mod store;

pub use document::{load, parse, save, to_document_string};
pub use model::{
    DecidedBy, Decision, Diagnostic, DiagnosticKind, GenerationResult, LineStatus, Project,
    REGENERATE_STATUS, ScriptLine, Stage, derived_id, timestamp_now,
};
pub use store::ProjectStore;
