//! CLI entry point and dispatch logic
//!
//! `run()` parses arguments, discovers configuration, initializes tracing,
//! creates the tokio runtime and dispatches to the command handlers. It owns
//! all error output; `main.rs` only maps the returned exit code.

use clap::Parser;

use reelforge_utils::logging::init_tracing;

use super::args::{Cli, Commands};
use super::commands;
use crate::{CliArgs, Config, ExitCode, ReelforgeError};

/// Main CLI execution function.
///
/// Returns `Ok(())` on success. On failure the error has already been
/// printed and the returned code is the process exit status.
pub fn run() -> Result<(), ExitCode> {
    let cli = Cli::parse();
    let cli_args = build_cli_args(&cli);

    let config = match Config::discover(&cli_args) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("✗ [Configuration] {err:#}");
            return Err(ExitCode::CLI_ARGS);
        }
    };

    if let Err(e) = init_tracing(config.verbose()) {
        eprintln!("Warning: failed to initialize logging: {e}");
    }

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("✗ Failed to create async runtime: {e}");
            return Err(ExitCode::INTERNAL);
        }
    };

    let operation = match &cli.command {
        Commands::Run(_) => "run",
        Commands::ListMethods { .. } => "list-methods",
        Commands::Status { .. } => "status",
        Commands::Init { .. } => "init",
        Commands::Assign { .. } => "assign",
        Commands::Assemble { .. } => "assemble",
        Commands::Check { .. } => "check",
    };

    let result = rt.block_on(async {
        match &cli.command {
            Commands::Run(args) => commands::execute_run_command(args, &config).await,
            Commands::ListMethods { json } => {
                commands::execute_list_methods_command(*json, &config)
            }
            Commands::Status { project, json } => {
                commands::execute_status_command(project, *json, &config)
            }
            Commands::Init {
                name,
                out,
                from,
                force,
            } => commands::execute_init_command(name, out, from.as_deref(), *force),
            Commands::Assign {
                project,
                line,
                method,
                force_lock,
            } => commands::execute_assign_command(project, line, method, *force_lock, &config),
            Commands::Assemble { project, out, json } => {
                commands::execute_assemble_command(project, out.as_deref(), *json, &config)
            }
            Commands::Check {
                min_balance,
                offline,
                json,
            } => commands::execute_check_command(*min_balance, *offline, *json, &config).await,
        }
    });

    match result {
        Ok(code) if code == ExitCode::SUCCESS => Ok(()),
        Ok(code) => Err(code),
        Err(error) => {
            if let Some(reelforge_error) = error.downcast_ref::<ReelforgeError>() {
                eprintln!("{}", reelforge_error.display_for_user());
                return Err(reelforge_error.to_exit_code());
            }
            eprintln!("✗ Unexpected error during {operation}: {error:#}");
            eprintln!("\n  Run with --verbose for more detailed output");
            Err(ExitCode::INTERNAL)
        }
    }
}

/// Configuration overrides carried by the parsed command line
fn build_cli_args(cli: &Cli) -> CliArgs {
    let mut cli_args = CliArgs {
        config_path: cli.config.clone(),
        // Only an explicit -v overrides the file
        verbose: cli.verbose.then_some(true),
        ..CliArgs::default()
    };
    if let Commands::Run(args) = &cli.command {
        cli_args.output_dir = args.out.clone();
        cli_args.concurrency = args.concurrency;
        cli_args.stage_timeout_secs = args.stage_timeout;
        cli_args.default_method = args.default_method.clone();
        cli_args.llm_provider = args.llm_provider.clone();
        cli_args.audio_method = args.audio_method.clone();
    }
    cli_args
}
