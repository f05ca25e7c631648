//! clockr command-line entry point
//!
//! - `clockr log`: describe the last interval (or a date range) and review
//!   the AI's project allocation in a terminal UI before it is submitted
//! - `clockr projects`, `clockr status`, `clockr config`: inspection helpers

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use clockr_logging::{init_logging, LogConfig};
use std::process::ExitCode;
use tracing::error;

mod cli;

#[derive(Parser, Debug)]
#[command(name = "clockr", version, about = "AI-assisted time entry for Clockify")]
struct Cli {
    /// Enable verbose logging (debug to the log file and stderr)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Log time for the last interval, or for a range of work days
    Log(cli::log::LogArgs),

    /// List active Clockify projects
    Projects(cli::projects::ProjectsArgs),

    /// Show entries recorded today
    Status(cli::status::StatusArgs),

    /// Show the resolved configuration
    Config(cli::config::ConfigArgs),
}

fn run_command(command: Commands) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    match command {
        Commands::Log(args) => runtime.block_on(cli::log::run(args)),
        Commands::Projects(args) => runtime.block_on(cli::projects::run(args)),
        Commands::Status(args) => runtime.block_on(cli::status::run(args)),
        Commands::Config(args) => cli::config::run(args),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // The TUI owns the terminal during `log`; keep stderr quiet.
    let tui_mode = matches!(cli.command, Commands::Log(_));
    let _log_guard = match init_logging(LogConfig {
        app_name: "clockr",
        verbose: cli.verbose,
        tui_mode,
    }) {
        Ok(guard) => Some(guard),
        Err(err) => {
            eprintln!("Warning: failed to initialize logging: {:#}", err);
            None
        }
    };

    match run_command(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %format!("{:#}", err), "Command failed");
            match err.downcast_ref::<cli::error::HelpfulError>() {
                Some(helpful) => eprint!("{}", helpful),
                None => eprintln!("ERROR: {:#}", err),
            }
            ExitCode::from(1)
        }
    }
}
