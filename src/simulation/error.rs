//! Simulation Error Module
//!
//! This module provides the error type for compiling and integrating ODE systems.
//!
//! # Key Error Types
//!
//! The [`SimulationError`] enum covers the failure points of task execution:
//! - Model features the engine cannot simulate
//! - Unresolvable symbols and output targets
//! - Cyclic or missing initial values
//! - Unsupported algorithms and algorithm parameters
//! - Expression evaluation and integration failures, non-finite states
//! - Reports violating their invariants

use evalexpr::EvalexprError;
use thiserror::Error;

use crate::math::MathError;
use crate::report::error::ReportError;

#[derive(Error, Debug)]
pub enum SimulationError {
    #[error("Model uses a feature the ODE engine does not support: {0}")]
    Unsupported(String),
    #[error("Invalid math for '{id}': {source}")]
    MathError {
        id: String,
        #[source]
        source: MathError,
    },
    #[error("Cyclic dependency between assignments involving '{0}'")]
    Cycle(String),
    #[error("No value for '{0}'")]
    MissingValue(String),
    #[error("Species '{species}' refers to unknown compartment '{compartment}'")]
    UnknownCompartment { species: String, compartment: String },
    #[error("Output '{output}' refers to unknown model element '{target}'")]
    UnresolvedTarget { output: String, target: String },
    #[error("Unsupported algorithm '{0}': only deterministic ODE methods are available")]
    UnsupportedAlgorithm(String),
    #[error("Invalid value '{value}' for algorithm parameter '{kisao_id}'")]
    InvalidAlgorithmParameter { kisao_id: String, value: String },
    #[error("Error evaluating expression at t = {time}: {source}")]
    EvalExpressionError {
        time: f64,
        #[source]
        source: EvalexprError,
    },
    #[error("Integration failed at t = {time}: {message}")]
    IntegrationError { time: f64, message: String },
    #[error("Crossing a gap of {gap} needs {steps} integration steps, more than the limit")]
    TooManySteps { gap: f64, steps: f64 },
    #[error("State became non-finite at t = {time}")]
    NonFinite { time: f64 },
    #[error("Invalid report: {0}")]
    InvalidReport(#[from] ReportError),
}
