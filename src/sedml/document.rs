//! SED-ML document representation
//!
//! The subset of SED-ML Level 1 needed to run uniform time courses: models with
//! attribute changes, simulations, tasks, data generators and reports.

use crate::math::MathExpr;
use crate::simulation::task::{Algorithm, TimeCourse};

/// A SED-ML document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SedDocument {
    pub level: u32,
    pub version: u32,
    pub models: Vec<SedModel>,
    pub simulations: Vec<SedSimulation>,
    pub tasks: Vec<SedTask>,
    pub data_generators: Vec<DataGenerator>,
    pub reports: Vec<SedReport>,
}

/// A model and the changes applied to it before simulation
#[derive(Debug, Clone, PartialEq)]
pub struct SedModel {
    pub id: String,
    pub source: String,
    pub language: Option<String>,
    pub changes: Vec<AttributeChange>,
}

/// A `changeAttribute` change
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeChange {
    pub target: String,
    pub new_value: f64,
}

/// A uniform time course simulation
#[derive(Debug, Clone, PartialEq)]
pub struct SedSimulation {
    pub id: String,
    pub time_course: TimeCourse,
    pub algorithm: Algorithm,
}

/// A task binding a model to a simulation
#[derive(Debug, Clone, PartialEq)]
pub struct SedTask {
    pub id: String,
    pub model_reference: String,
    pub simulation_reference: String,
}

/// A variable of a data generator
#[derive(Debug, Clone, PartialEq)]
pub struct SedVariable {
    pub id: String,
    pub task_reference: Option<String>,
    pub target: Option<String>,
    pub symbol: Option<String>,
}

/// A data generator: math over task variables and constant parameters
#[derive(Debug, Clone, PartialEq)]
pub struct DataGenerator {
    pub id: String,
    pub name: Option<String>,
    pub variables: Vec<SedVariable>,
    pub parameters: Vec<(String, f64)>,
    pub math: MathExpr,
}

/// A data set of a report
#[derive(Debug, Clone, PartialEq)]
pub struct DataSet {
    pub id: String,
    pub label: Option<String>,
    pub data_reference: String,
}

impl DataSet {
    /// Column name: the label, or the id when there is no label
    pub fn column_name(&self) -> &str {
        self.label
            .as_deref()
            .filter(|label| !label.trim().is_empty())
            .unwrap_or(&self.id)
    }
}

/// A report
#[derive(Debug, Clone, PartialEq)]
pub struct SedReport {
    pub id: String,
    pub name: Option<String>,
    pub data_sets: Vec<DataSet>,
}

impl SedDocument {
    pub fn model(&self, id: &str) -> Option<&SedModel> {
        self.models.iter().find(|model| model.id == id)
    }

    pub fn simulation(&self, id: &str) -> Option<&SedSimulation> {
        self.simulations.iter().find(|simulation| simulation.id == id)
    }

    pub fn task(&self, id: &str) -> Option<&SedTask> {
        self.tasks.iter().find(|task| task.id == id)
    }

    pub fn data_generator(&self, id: &str) -> Option<&DataGenerator> {
        self.data_generators.iter().find(|generator| generator.id == id)
    }
}
