//! Command-line arguments of the adapter
//!
//! ```bash
//! biosim -i experiment.omex -o out/
//! biosim --archive experiment.omex --out-dir out/
//! biosim -v
//! ```
//!
//! `-v`/`--version` and `-h`/`--help` print to standard output and exit with status 0;
//! missing required arguments are a usage error with status 2.

use std::path::PathBuf;

use clap::{ArgAction, Parser};

use crate::error::AdapterError;
use crate::pipeline::DefaultPipeline;

/// Execute the time-course simulations of a COMBINE/OMEX archive and write CSV reports
#[derive(Parser, Debug, Clone)]
#[command(name = "biosim", version, about, long_about = None, disable_version_flag = true)]
pub struct Cli {
    /// Path to the COMBINE/OMEX archive to execute
    #[arg(short = 'i', long = "archive", value_name = "PATH")]
    pub archive: PathBuf,

    /// Directory to write the reports to; created if absent
    #[arg(short = 'o', long = "out-dir", value_name = "PATH")]
    pub out_dir: PathBuf,

    /// Print version
    #[arg(short = 'v', long = "version", action = ArgAction::Version)]
    version: Option<bool>,
}

/// Runs the default pipeline for the given arguments
///
/// Returns the paths of the written report files.
pub fn run(cli: &Cli) -> Result<Vec<PathBuf>, AdapterError> {
    DefaultPipeline::default().run(&cli.archive, &cli.out_dir)
}

#[cfg(test)]
mod tests {
    use clap::error::ErrorKind;
    use clap::CommandFactory;

    use super::*;
    use crate::error::ErrorKind as AdapterErrorKind;

    #[test]
    fn test_command_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_short_and_long_flags() {
        let short = Cli::try_parse_from(["biosim", "-i", "a.omex", "-o", "out"]).unwrap();
        let long =
            Cli::try_parse_from(["biosim", "--archive", "a.omex", "--out-dir", "out"]).unwrap();

        assert_eq!(short.archive, PathBuf::from("a.omex"));
        assert_eq!(short.out_dir, long.out_dir);
        assert_eq!(short.archive, long.archive);
    }

    #[test]
    fn test_version_and_help() {
        let version = Cli::try_parse_from(["biosim", "-v"]).unwrap_err();
        assert_eq!(version.kind(), ErrorKind::DisplayVersion);

        let version = Cli::try_parse_from(["biosim", "--version"]).unwrap_err();
        assert_eq!(version.kind(), ErrorKind::DisplayVersion);

        let help = Cli::try_parse_from(["biosim", "-h"]).unwrap_err();
        assert_eq!(help.kind(), ErrorKind::DisplayHelp);
    }

    #[test]
    fn test_missing_required() {
        let err = Cli::try_parse_from(["biosim", "-i", "a.omex"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_run_missing_archive() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");

        let cli = Cli {
            archive: dir.path().join("missing.omex"),
            out_dir: out.clone(),
            version: None,
        };

        let err = run(&cli).unwrap_err();
        assert_eq!(err.kind(), AdapterErrorKind::Archive);
        assert!(!out.exists());
    }
}
