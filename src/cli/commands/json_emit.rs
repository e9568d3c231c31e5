//! JSON emit functions for CLI output
//!
//! All `--json` output is canonical JSON (JCS, RFC 8785) so it can be
//! diffed and hashed.

use anyhow::{Context, Result};
use serde::Serialize;

use reelforge_engine::RunSummary;
use reelforge_registry::MethodListing;

use crate::emit_jcs;

pub fn emit_run_json(summary: &RunSummary) -> Result<String> {
    emit_jcs(summary).context("Failed to emit run summary JSON")
}

pub fn emit_methods_json(methods: &[MethodListing]) -> Result<String> {
    emit_jcs(&methods).context("Failed to emit method listing JSON")
}

pub fn emit_status_json<T: Serialize>(output: &T) -> Result<String> {
    emit_jcs(output).context("Failed to emit status JSON")
}

pub fn emit_assemble_json<T: Serialize>(output: &T) -> Result<String> {
    emit_jcs(output).context("Failed to emit assemble JSON")
}

pub fn emit_check_json<T: Serialize>(output: &T) -> Result<String> {
    emit_jcs(output).context("Failed to emit check JSON")
}
