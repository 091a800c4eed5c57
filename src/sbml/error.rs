use thiserror::Error;

use crate::math::MathError;
use crate::xml::XmlError;

/// Errors that can occur while reading an SBML model or applying changes to it
#[derive(Debug, Error)]
pub enum SBMLError {
    /// Error when the SBML document is not well-formed XML
    #[error("Failed to read SBML document: {0}")]
    XmlError(#[from] XmlError),

    /// Error when the root element is not `<sbml>`
    #[error("Not an SBML document: root element is <{0}>")]
    NotSBML(String),

    /// Error when the SBML document doesn't contain a model
    #[error("SBML document does not contain a model")]
    MissingModel,

    /// Error when a required attribute is missing on an element
    #[error("Missing attribute '{attribute}' on <{element}>")]
    MissingAttribute {
        element: &'static str,
        attribute: &'static str,
    },

    /// Error when a numeric or boolean attribute cannot be parsed
    #[error("Invalid value '{value}' for attribute '{attribute}' of '{id}'")]
    InvalidAttribute {
        id: String,
        attribute: String,
        value: String,
    },

    /// Error when an identifier is declared twice
    #[error("Duplicate SBML identifier '{0}'")]
    DuplicateId(String),

    /// Error when a mathematical expression cannot be read
    #[error("Invalid math in '{id}': {source}")]
    MathError {
        id: String,
        #[source]
        source: MathError,
    },

    /// Error when a change targets an element that does not exist
    #[error("Change targets unknown model element '{0}'")]
    UnknownTarget(String),

    /// Error when a change targets an attribute that cannot be changed
    #[error("Attribute '{attribute}' of '{id}' cannot be changed")]
    UnsupportedChange { id: String, attribute: String },
}
