//! CLI command implementations.
//!
//! Each command returns the exit code to report; errors propagate as
//! `anyhow::Error` and are rendered by `run.rs`.

mod assemble;
mod assign;
mod check;
mod common;
mod init;
mod json_emit;
mod list_methods;
mod run_cmd;
mod status;

pub use assemble::execute_assemble_command;
pub use assign::execute_assign_command;
pub use check::execute_check_command;
pub use init::execute_init_command;
pub use list_methods::execute_list_methods_command;
pub use run_cmd::execute_run_command;
pub use status::execute_status_command;
