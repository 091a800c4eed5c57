//! Command-line interface of the BioSimulators-style adapter
//!
//! Executes every report of a COMBINE/OMEX archive and writes one CSV file per report.
//!
//! # Usage
//!
//! ```bash
//! # Run an archive
//! biosim -i model.omex -o results/
//!
//! # Show progress
//! RUST_LOG=info biosim --archive model.omex --out-dir results/
//! ```

use std::process::ExitCode;

use clap::Parser;
use colored::Colorize;
use env_logger::Env;

use biosim::cli::{run, Cli};

/// Main entry point for the CLI application
pub fn main() -> ExitCode {
    let cli = Cli::parse();

    env_logger::Builder::from_env(Env::default().default_filter_or("warn")).init();

    match run(&cli) {
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {}", "error:".bold().red(), err);
            ExitCode::FAILURE
        }
    }
}
