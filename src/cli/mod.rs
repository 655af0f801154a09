//! CLI module for testrealm
//!
//! A small developer tool for looking at what a worker bootstrap does to a realm.
//!
//! ## Commands
//!
//! - `inspect` - Bootstrap a realm from a worker config and print its state
//! - `run-env` - Bootstrap a realm and run an empty body inside an environment
//!
//! ## Design
//!
//! The CLI uses clap for argument parsing with derive macros.
//! Command functions return `CliResult<T>` instead of calling `process::exit`.
//! Only the top-level `run()` function handles errors and exits.

// Enforce explicit error handling - no panicking in production code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod commands;

use std::fmt;
use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

use crate::errors::WorkerError;

// ============================================================================
// CLI Error handling
// ============================================================================

/// Exit code for CLI operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCode(pub i32);

impl ExitCode {
    pub const SUCCESS: ExitCode = ExitCode(0);
    pub const FAILURE: ExitCode = ExitCode(1);
}

/// Error type for CLI operations.
///
/// Contains a user-facing message and an exit code. The CLI entry point
/// catches these errors, prints the message, and exits with the code.
#[derive(Debug)]
pub struct CliError {
    /// User-facing error message (already formatted for display)
    pub message: String,
    /// Exit code to return to the shell
    pub exit_code: ExitCode,
}

impl CliError {
    pub fn new(message: impl Into<String>, exit_code: ExitCode) -> Self {
        Self {
            message: message.into(),
            exit_code,
        }
    }

    /// Create a failure error (exit code 1).
    pub fn failure(message: impl Into<String>) -> Self {
        Self::new(message, ExitCode::FAILURE)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

impl From<WorkerError> for CliError {
    fn from(err: WorkerError) -> Self {
        // miette's Debug output renders the full diagnostic (code, cause chain, help).
        CliError::failure(format!("{:?}", miette::Report::new(err)))
    }
}

/// Result type for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

const VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// Clap CLI definition
// ============================================================================

/// Inspect per-worker test environment bootstrap
#[derive(Parser, Debug)]
#[command(name = "testrealm")]
#[command(version = VERSION)]
#[command(about = "Inspect per-worker test environment bootstrap", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Bootstrap a realm and print its state
    Inspect {
        /// Worker config (JSON); defaults are used when omitted
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
        /// Built-in environment to bootstrap for (overrides the config)
        #[arg(short, long, value_name = "NAME")]
        environment: Option<String>,
    },

    /// Activate an environment around an empty test body
    RunEnv {
        /// Worker config (JSON); defaults are used when omitted
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
        /// Built-in environment to activate (overrides the config)
        #[arg(short, long, value_name = "NAME")]
        environment: Option<String>,
        /// Number of test files to simulate on the same worker
        #[arg(short = 'n', long, default_value_t = 1)]
        files: usize,
    },
}

// ============================================================================
// CLI entry point
// ============================================================================

/// Main CLI entry point.
///
/// This is the only place where `process::exit` is called. All command
/// implementations return `CliResult` and errors are handled here.
pub fn run() {
    let cli = Cli::parse();

    match execute(cli) {
        Ok(exit_code) => {
            if exit_code.0 != 0 {
                process::exit(exit_code.0);
            }
        }
        Err(e) => {
            if !e.message.is_empty() {
                eprintln!("{}", e.message);
            }
            process::exit(e.exit_code.0);
        }
    }
}

/// Execute the CLI command and return result.
fn execute(cli: Cli) -> CliResult<ExitCode> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| CliError::failure(format!("Error starting async runtime: {e}")))?;

    match cli.command {
        Command::Inspect { config, environment } => {
            runtime.block_on(commands::inspect(config.as_deref(), environment.as_deref()))
        }
        Command::RunEnv {
            config,
            environment,
            files,
        } => runtime.block_on(commands::run_env(config.as_deref(), environment.as_deref(), files)),
    }
}

// ============================================================================
// Tests
// ============================================================================
