use std::path::PathBuf;

use polars::error::PolarsError;
use thiserror::Error;

/// Errors raised when a report violates its invariants or cannot be written
#[derive(Debug, Error)]
pub enum ReportError {
    /// The report is inconsistent (ragged columns, uneven time grid, duplicate names)
    #[error("Report '{id}' is invalid: {reason}")]
    Invalid { id: String, reason: String },

    /// An output file or directory could not be created or written
    #[error("Failed to write '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The report table could not be serialized
    #[error("Failed to serialize report '{id}': {source}")]
    Serialization {
        id: String,
        #[source]
        source: PolarsError,
    },
}
