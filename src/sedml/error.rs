use thiserror::Error;

use crate::combine::error::ArchiveError;
use crate::math::MathError;
use crate::sbml::error::SBMLError;
use crate::simulation::task::TimeCourseError;
use crate::xml::XmlError;

/// Errors that can occur while reading a SED-ML document or turning it into tasks
#[derive(Debug, Error)]
pub enum SedmlError {
    /// Error when the SED-ML document is not well-formed XML
    #[error("Failed to read SED-ML document: {0}")]
    XmlError(#[from] XmlError),

    /// Error when the root element is not `<sedML>`
    #[error("Not a SED-ML document: root element is <{0}>")]
    NotSedml(String),

    /// Error when a required attribute is missing on an element
    #[error("Missing attribute '{attribute}' on <{element}>")]
    MissingAttribute {
        element: &'static str,
        attribute: &'static str,
    },

    /// Error when a numeric attribute cannot be parsed
    #[error("Invalid value '{value}' for attribute '{attribute}' of '{id}'")]
    InvalidAttribute {
        id: String,
        attribute: String,
        value: String,
    },

    /// Error when a data generator's math cannot be read
    #[error("Invalid math in data generator '{id}': {source}")]
    MathError {
        id: String,
        #[source]
        source: MathError,
    },

    /// Error when the document uses a SED-ML feature this adapter does not execute
    #[error("Unsupported SED-ML feature: {0}")]
    Unsupported(String),

    /// Error when a uniform time course is inconsistent
    #[error("Invalid time course '{id}': {source}")]
    InvalidTimeCourse {
        id: String,
        #[source]
        source: TimeCourseError,
    },

    /// Error when a reference points to an element that does not exist
    #[error("Unknown {kind} '{id}'")]
    UnknownReference { kind: &'static str, id: String },

    /// Error when a target XPath cannot be resolved to a model element
    #[error("Unsupported target '{0}'")]
    InvalidTarget(String),

    /// Error when the data sets of one report come from different tasks
    #[error("Report '{0}' combines outputs of several tasks")]
    MixedTasks(String),

    /// Error when two reports share an id
    #[error("Duplicate report id '{0}'")]
    DuplicateReport(String),

    /// Error when a report id cannot be used as a directory name
    #[error("Report id '{0}' cannot be used as an output directory name")]
    InvalidReportId(String),

    /// Error when a referenced model cannot be read or changed
    #[error("Model '{model}': {source}")]
    ModelError {
        model: String,
        #[source]
        source: SBMLError,
    },

    /// Error when a referenced model is not present in the archive
    #[error("Model '{model}': {source}")]
    ModelEntry {
        model: String,
        #[source]
        source: ArchiveError,
    },
}
