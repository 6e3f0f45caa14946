//! CLI entry point and dispatch
//!
//! `run()` parses arguments, discovers configuration, builds the tokio
//! runtime and dispatches to the command handlers. It owns all error
//! output; `main` only turns the returned code into a process exit.

use clap::Parser;

use fabula_config::{CliArgs, Config};
use fabula_utils::error::{ConfigError, display_for_user};
use fabula_utils::exit_codes::ExitCode;
use fabula_utils::logging::init_tracing;

use super::args::{Cli, Commands, MemoryCommands};
use super::commands;
use crate::error::FabulaError;

/// Main CLI execution function.
///
/// Returns `Err(ExitCode)` after the error has already been printed.
pub fn run() -> Result<(), ExitCode> {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(cli.verbose) {
        eprintln!("warning: logging was not initialised: {e}");
    }

    let cli_args = CliArgs {
        config_path: cli.config.clone(),
        home: cli.home.clone(),
        profile: None,
        call_timeout_secs: cli.call_timeout,
    };

    let config = match load_config(&cli_args) {
        Ok(config) => config,
        Err(err) => return Err(report(&err)),
    };

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("✗ Failed to create async runtime: {e}");
            return Err(ExitCode::INTERNAL);
        }
    };

    let result = rt.block_on(async {
        match cli.command {
            Commands::Run {
                job_id,
                source,
                title,
                profile,
                json,
            } => {
                commands::execute_run_command(&job_id, &source, title, profile, json, &config)
                    .await
            }
            Commands::Resume { job_id, json } => {
                commands::execute_resume_command(&job_id, json, &config).await
            }
            Commands::Status { job_id, json } => {
                commands::execute_status_command(job_id.as_deref(), json, &config)
            }
            Commands::Memory(MemoryCommands::List { phase, limit, json }) => {
                commands::execute_memory_list_command(&phase, limit, json, &config)
            }
            Commands::Profiles { json } => commands::execute_profiles_command(json, &config),
        }
    });

    result.map_err(|err| report(&err))
}

fn load_config(cli_args: &CliArgs) -> Result<Config, FabulaError> {
    Config::discover(cli_args).map_err(|err| match err.downcast::<ConfigError>() {
        Ok(config_err) => FabulaError::Config(config_err),
        Err(other) => FabulaError::Config(ConfigError::DiscoveryFailed {
            reason: format!("{other:#}"),
        }),
    })
}

fn report(err: &FabulaError) -> ExitCode {
    eprint!("{}", display_for_user(err));
    err.to_exit_code()
}
