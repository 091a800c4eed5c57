use std::path::PathBuf;
use std::string::FromUtf8Error;

use thiserror::Error;

/// Errors that can occur while opening and reading a COMBINE/OMEX archive
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// The archive path does not exist or is not a regular file
    #[error("Archive not found: {0}")]
    NotFound(PathBuf),

    /// The archive exists but could not be read
    #[error("Failed to read archive {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not a valid zip container
    #[error("Failed to open COMBINE archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// The manifest could not be deserialized
    #[error("Failed to parse manifest.xml: {0}")]
    Manifest(#[from] quick_xml::DeError),

    /// An entry referenced by the manifest or a SED-ML document is missing
    #[error("Missing file in archive: {0}")]
    MissingEntry(String),

    /// An entry is not valid UTF-8 text
    #[error("Archive entry {location} is not valid UTF-8: {source}")]
    NotText {
        location: String,
        #[source]
        source: FromUtf8Error,
    },

    /// The archive does not contain any SED-ML document
    #[error("Archive does not contain a SED-ML simulation experiment")]
    NoSimulationExperiment,

    /// The SED-ML documents of the archive do not describe any simulation task
    #[error("Archive does not describe any simulation task")]
    NoSimulationTask,
}
