// crates/tracegate-cli/src/main.rs
// ============================================================================
// Module: Tracegate CLI Entry Point
// Description: Command dispatcher for record/run workflows.
// Purpose: Map orchestrator outcomes onto process exit codes.
// Dependencies: clap, tracegate-cli
// ============================================================================

//! ## Overview
//! The binary is a thin clap dispatcher over the orchestrator engine. Exit
//! codes follow the verdict contract: 0 for PASS, 1 for a detected
//! regression, 2 for tooling/config/spec errors.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use clap::Subcommand;
use tracegate_cli::CommandOutcome;
use tracegate_cli::EXIT_TOOLING;
use tracegate_cli::EngineError;
use tracegate_cli::init_workspace;
use tracegate_cli::list_baselines;
use tracegate_cli::record_spec;
use tracegate_cli::run_spec;
use tracegate_cli::show_report;

// ============================================================================
// SECTION: CLI Definition
// ============================================================================

/// Deterministic trajectory regression testing for AI agents.
#[derive(Debug, Parser)]
#[command(name = "tracegate", version, about)]
struct Cli {
    /// Project root containing the state directory.
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,
    /// Command to execute.
    #[command(subcommand)]
    command: CliCommand,
}

/// Tracegate subcommands.
#[derive(Debug, Subcommand)]
enum CliCommand {
    /// Initialize the state directory layout.
    Init,
    /// Execute the agent command and record a baseline.
    Record {
        /// Path to the resolved spec JSON file.
        #[arg(long)]
        spec: PathBuf,
        /// Permit baseline writes in a CI environment.
        #[arg(long)]
        allow_ci_write: bool,
    },
    /// Replay the agent command offline and evaluate the verdict.
    Run {
        /// Path to the resolved spec JSON file.
        #[arg(long)]
        spec: PathBuf,
        /// Attempt to minimize the counterexample on failure.
        #[arg(long)]
        shrink: bool,
    },
    /// List specs with a recorded baseline.
    List,
    /// Print the latest verdict report.
    Report,
}

// ============================================================================
// SECTION: Entry Point
// ============================================================================

fn main() -> ExitCode {
    let cli = Cli::parse();
    let outcome = dispatch(&cli);
    match outcome {
        Ok(outcome) => {
            emit(&outcome.messages);
            ExitCode::from(outcome.exit_code)
        }
        Err(error) => {
            emit_error(&error);
            ExitCode::from(EXIT_TOOLING)
        }
    }
}

/// Routes the parsed command to the engine.
fn dispatch(cli: &Cli) -> Result<CommandOutcome, EngineError> {
    match &cli.command {
        CliCommand::Init => init_workspace(&cli.root),
        CliCommand::Record {
            spec,
            allow_ci_write,
        } => record_spec(&cli.root, spec, *allow_ci_write),
        CliCommand::Run {
            spec,
            shrink,
        } => run_spec(&cli.root, spec, *shrink),
        CliCommand::List => list_baselines(&cli.root),
        CliCommand::Report => show_report(&cli.root),
    }
}

/// Prints outcome lines to stdout.
#[allow(clippy::print_stdout, reason = "CLI user-facing output.")]
fn emit(messages: &[String]) {
    for message in messages {
        println!("{message}");
    }
}

/// Prints an engine error to stderr.
#[allow(clippy::print_stderr, reason = "CLI user-facing output.")]
fn emit_error(error: &EngineError) {
    eprintln!("tracegate: {error}");
}
