//! Dispatcher - Command-line entry point.
//!
//! The main entry point for the `dispatcher` binary.

use std::process::ExitCode;

use clap::Parser;
use dispatch_core::observability::init_logging;
use dispatch_engine::EXIT_FATAL;
use dispatch_engine::metrics::register_metrics;

use dispatch_cli::{Cli, CliBackends};

fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(&cli.logging());
    register_metrics();

    match dispatch_cli::run(&cli, &CliBackends) {
        Ok(code) => {
            tracing::info!(action = %cli.action, exit_code = code, "dispatcher finished");
            ExitCode::from(code)
        }
        Err(err) => {
            tracing::error!(action = %cli.action, error = %format!("{err:#}"), "dispatcher failed");
            ExitCode::from(EXIT_FATAL)
        }
    }
}
