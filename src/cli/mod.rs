//! Command-line interface for reelforge
//!
//! ## Module Structure
//!
//! - `args`: clap argument definitions
//! - `run`: entry point, configuration and dispatch
//! - `commands`: command implementations

pub mod args;
mod commands;
mod run;

pub use args::{Cli, Commands, RunArgs};
pub use run::run;
