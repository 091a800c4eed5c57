//! Top-level error type of the adapter
//!
//! Every stage has its own error enum; [`AdapterError`] collects them so that the
//! pipeline can propagate any failure with `?`, and [`AdapterError::kind`] maps each
//! failure onto the adapter's error classes.

use std::path::PathBuf;

use thiserror::Error;

use crate::combine::error::ArchiveError;
use crate::report::error::ReportError;
use crate::sbml::error::SBMLError;
use crate::sedml::error::SedmlError;
use crate::simulation::error::SimulationError;

/// Classes of failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The archive is missing, unreadable or not a zip container
    Archive,
    /// The archive does not describe a simulation this adapter can run
    Parse,
    /// The simulation failed or uses unsupported model features
    Simulation,
    /// Output could not be written
    Io,
}

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error("Failed to read simulation experiment '{location}': {source}")]
    Experiment {
        location: String,
        #[source]
        source: SedmlError,
    },

    #[error("Simulation of report '{report}' failed: {source}")]
    Simulation {
        report: String,
        #[source]
        source: SimulationError,
    },

    #[error("Failed to write report '{report}': {source}")]
    Report {
        report: String,
        #[source]
        source: ReportError,
    },

    #[error("Failed to create output directory '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl AdapterError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AdapterError::Archive(
                ArchiveError::NotFound(_) | ArchiveError::Unreadable { .. } | ArchiveError::Zip(_),
            ) => ErrorKind::Archive,
            AdapterError::Archive(_) => ErrorKind::Parse,
            AdapterError::Experiment { source, .. } => match source {
                // A model that parses but cannot be changed as requested is a model error
                SedmlError::ModelError {
                    source: SBMLError::UnknownTarget(_) | SBMLError::UnsupportedChange { .. },
                    ..
                } => ErrorKind::Simulation,
                SedmlError::Unsupported(_) => ErrorKind::Simulation,
                _ => ErrorKind::Parse,
            },
            AdapterError::Simulation { .. } => ErrorKind::Simulation,
            AdapterError::Report {
                source: ReportError::Invalid { .. },
                ..
            } => ErrorKind::Simulation,
            AdapterError::Report { .. } | AdapterError::Io { .. } => ErrorKind::Io,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        let missing = AdapterError::from(ArchiveError::NotFound(PathBuf::from("x.omex")));
        assert_eq!(missing.kind(), ErrorKind::Archive);

        let empty = AdapterError::from(ArchiveError::NoSimulationExperiment);
        assert_eq!(empty.kind(), ErrorKind::Parse);

        let no_tasks = AdapterError::from(ArchiveError::NoSimulationTask);
        assert_eq!(no_tasks.kind(), ErrorKind::Parse);

        let unsupported = AdapterError::Experiment {
            location: "sim.sedml".to_string(),
            source: SedmlError::Unsupported("steadyState".to_string()),
        };
        assert_eq!(unsupported.kind(), ErrorKind::Simulation);

        let numeric = AdapterError::Simulation {
            report: "r".to_string(),
            source: SimulationError::NonFinite { time: 1.0 },
        };
        assert_eq!(numeric.kind(), ErrorKind::Simulation);

        let io = AdapterError::Io {
            path: PathBuf::from("/out"),
            source: std::io::Error::other("denied"),
        };
        assert_eq!(io.kind(), ErrorKind::Io);
    }
}
