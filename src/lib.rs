//! BioSimulators-style simulation adapter
//!
//! This library executes the time-course simulations described by a COMBINE/OMEX
//! archive and writes the declared reports as CSV files:
//! - Reading COMBINE/OMEX archives and their manifest
//! - Parsing SBML models and SED-ML simulation experiments
//! - Compiling SBML models into ODE systems and integrating them
//! - Writing reports as `<out-dir>/<report-id>/<report-id>.csv`
//!
//! The three stages (archive reading, simulation, report writing) are connected by
//! plain data and can be exercised independently; [`pipeline::Pipeline`] strings them
//! together and [`cli`] exposes them on the command line.

#![warn(unused_imports)]

/// Commonly used types and functionality re-exported for convenience
pub mod prelude {
    pub use crate::error::{AdapterError, ErrorKind};
    pub use crate::pipeline::{ArchiveReader, DefaultPipeline, OmexReader, Pipeline};
    pub use crate::report::writer::{CsvReportWriter, ReportWriter};
    pub use crate::simulation::result::{Report, ReportColumn};
    pub use crate::simulation::runner::{OdeExecutor, SimulationExecutor};
    pub use crate::simulation::setup::{EngineSettings, EngineSettingsBuilder, Integrator};
    pub use crate::simulation::task::{
        Algorithm, Observable, OutputVariable, SimulationTask, TimeCourse,
    };
}

/// Generic XML element tree
pub mod xml;

/// MathML expressions
pub mod math;

/// COMBINE/OMEX archive access
pub mod combine {
    pub use crate::combine::archive::CombineArchive;

    /// Reading archives into memory
    pub mod archive;
    /// Error types for archive access
    pub mod error;
    /// The `manifest.xml` of an archive
    pub mod manifest;
}

/// SBML model reading and changes
pub mod sbml {
    /// Error types for SBML reading
    pub mod error;
    /// SBML model data types
    pub mod model;
    /// SBML document reader
    pub mod reader;
}

/// SED-ML simulation experiments
pub mod sedml {
    /// SED-ML document data types
    pub mod document;
    /// Error types for SED-ML reading
    pub mod error;
    /// SED-ML document reader
    pub mod reader;
    /// XPath targets of variables and changes
    pub mod target;
    /// Simulation task construction
    pub mod tasks;
}

/// Simulation of time courses
pub mod simulation {
    pub use peroxide::fuga::{ODEIntegrator, ODEProblem, RK4, RK5};

    /// Error types for simulation failures
    pub mod error;
    /// Simulation result data structures
    pub mod result;
    /// ODE execution
    pub mod runner;
    /// Engine configuration
    pub mod setup;
    /// Core ODE system implementation
    pub mod system;
    /// Simulation tasks and time courses
    pub mod task;
}

/// Report output
pub mod report {
    /// Error types for report output
    pub mod error;
    /// Report writers
    pub mod writer;
}

/// Archive-to-report pipeline
pub mod pipeline;

/// Top-level error type
pub mod error;

/// Command-line arguments
pub mod cli;
