//! Turning a SED-ML document into simulation tasks
//!
//! Every report becomes one [`SimulationTask`]. A document without reports gets one
//! default report per task that records every species and every time-varying
//! compartment and parameter of the model.

use std::collections::HashMap;

use log::debug;

use crate::sbml::model::SBMLModel;
use crate::simulation::task::{Observable, OutputVariable, SimulationTask};

use super::document::{AttributeChange, SedDocument, SedModel, SedReport, SedTask};
use super::error::SedmlError;
use super::target::{is_time_symbol, Target};

impl SedDocument {
    /// Builds the simulation tasks of this document, one per report, in declared order
    ///
    /// `load_model` reads the SBML model a [`SedModel`] refers to. It is called at most
    /// once per model; the model's changes are applied afterwards. `stem` is the file
    /// stem of the document and names the default reports.
    ///
    /// # Errors
    ///
    /// Returns a [`SedmlError`] for dangling references, unsupported model sources,
    /// reports mixing several tasks and report ids that cannot name a directory.
    pub fn simulation_tasks<F>(
        &self,
        stem: &str,
        mut load_model: F,
    ) -> Result<Vec<SimulationTask>, SedmlError>
    where
        F: FnMut(&SedModel) -> Result<SBMLModel, SedmlError>,
    {
        let mut models: HashMap<&str, SBMLModel> = HashMap::new();
        let mut tasks = Vec::new();

        let mut model_for = |task: &SedTask| -> Result<SBMLModel, SedmlError> {
            let sed_model = self
                .model(&task.model_reference)
                .ok_or_else(|| SedmlError::UnknownReference {
                    kind: "model",
                    id: task.model_reference.clone(),
                })?;

            if let Some(model) = models.get(sed_model.id.as_str()) {
                return Ok(model.clone());
            }

            check_model_source(sed_model)?;
            let mut model = load_model(sed_model)?;
            apply_changes(&mut model, &sed_model.id, &sed_model.changes)?;
            models.insert(sed_model.id.as_str(), model.clone());

            Ok(model)
        };

        if self.reports.is_empty() {
            for task in &self.tasks {
                let id = match self.tasks.len() {
                    1 => stem.to_string(),
                    _ => format!("{}_{}", stem, task.id),
                };
                let model = model_for(task)?;
                let outputs = model
                    .default_observables()
                    .into_iter()
                    .map(OutputVariable::element)
                    .collect();

                tasks.push(self.build_task(id, task, model, outputs)?);
            }
        } else {
            for report in &self.reports {
                let (task, outputs) = self.report_outputs(report)?;
                let model = model_for(task)?;

                tasks.push(self.build_task(report.id.clone(), task, model, outputs)?);
            }
        }

        Ok(tasks)
    }

    fn build_task(
        &self,
        id: String,
        task: &SedTask,
        model: SBMLModel,
        outputs: Vec<OutputVariable>,
    ) -> Result<SimulationTask, SedmlError> {
        validate_report_id(&id)?;

        let simulation = self.simulation(&task.simulation_reference).ok_or_else(|| {
            SedmlError::UnknownReference {
                kind: "simulation",
                id: task.simulation_reference.clone(),
            }
        })?;

        let model_source = self
            .model(&task.model_reference)
            .map(|model| model.source.clone())
            .unwrap_or_default();

        debug!(
            "Report '{}': task '{}' on '{}' with {} output(s)",
            id,
            task.id,
            model_source,
            outputs.len()
        );

        Ok(SimulationTask {
            id,
            model_source,
            model,
            time_course: simulation.time_course,
            algorithm: simulation.algorithm.clone(),
            outputs,
        })
    }

    /// Resolves the data sets of a report to its task and output columns
    fn report_outputs(
        &self,
        report: &SedReport,
    ) -> Result<(&SedTask, Vec<OutputVariable>), SedmlError> {
        let mut task_id: Option<&str> = None;
        let mut outputs = Vec::new();

        for data_set in &report.data_sets {
            let generator = self.data_generator(&data_set.data_reference).ok_or_else(|| {
                SedmlError::UnknownReference {
                    kind: "data generator",
                    id: data_set.data_reference.clone(),
                }
            })?;

            let mut variables = Vec::with_capacity(generator.variables.len());
            for variable in &generator.variables {
                let reference =
                    variable
                        .task_reference
                        .as_deref()
                        .ok_or(SedmlError::MissingAttribute {
                            element: "variable",
                            attribute: "taskReference",
                        })?;

                match task_id {
                    None => task_id = Some(reference),
                    Some(existing) if existing != reference => {
                        return Err(SedmlError::MixedTasks(report.id.clone()))
                    }
                    Some(_) => {}
                }

                let observable = match (&variable.symbol, &variable.target) {
                    (Some(symbol), _) if is_time_symbol(symbol) => Observable::Time,
                    (Some(symbol), _) => {
                        return Err(SedmlError::Unsupported(format!("symbol '{}'", symbol)))
                    }
                    (None, Some(target)) => {
                        let target = Target::parse(target)?;
                        if target.attribute.is_some() {
                            return Err(SedmlError::InvalidTarget(
                                variable.target.clone().unwrap_or_default(),
                            ));
                        }
                        Observable::Element(target.id)
                    }
                    (None, None) => {
                        return Err(SedmlError::MissingAttribute {
                            element: "variable",
                            attribute: "target",
                        })
                    }
                };

                variables.push((variable.id.clone(), observable));
            }

            let output = OutputVariable {
                id: data_set.column_name().to_string(),
                math: generator.math.clone(),
                variables,
                parameters: generator.parameters.clone(),
            };

            // Time is always the first column
            if !output.is_time() {
                outputs.push(output);
            }
        }

        let task_id = task_id.ok_or_else(|| {
            SedmlError::Unsupported(format!("report '{}' without task outputs", report.id))
        })?;

        let task = self.task(task_id).ok_or_else(|| SedmlError::UnknownReference {
            kind: "task",
            id: task_id.to_string(),
        })?;

        Ok((task, outputs))
    }
}

/// Only SBML models stored inside the archive can be simulated
fn check_model_source(model: &SedModel) -> Result<(), SedmlError> {
    if let Some(language) = &model.language {
        if !language.to_ascii_lowercase().contains("sbml") {
            return Err(SedmlError::Unsupported(format!(
                "model language '{}' of model '{}'",
                language, model.id
            )));
        }
    }

    let source = model.source.trim();
    let external = source.starts_with("urn:")
        || source.starts_with("http://")
        || source.starts_with("https://")
        || source.starts_with('#');

    if external {
        return Err(SedmlError::Unsupported(format!(
            "model source '{}' of model '{}'",
            source, model.id
        )));
    }

    Ok(())
}

/// Applies `changeAttribute` changes to a model
pub fn apply_changes(
    model: &mut SBMLModel,
    model_id: &str,
    changes: &[AttributeChange],
) -> Result<(), SedmlError> {
    for change in changes {
        let target = Target::parse(&change.target)?;
        let attribute = target
            .attribute
            .ok_or_else(|| SedmlError::InvalidTarget(change.target.clone()))?;

        model
            .set_attribute(&target.id, &attribute, change.new_value)
            .map_err(|source| SedmlError::ModelError {
                model: model_id.to_string(),
                source,
            })?;
    }

    Ok(())
}

/// Report ids name a directory and a file below the output directory
pub fn validate_report_id(id: &str) -> Result<(), SedmlError> {
    let invalid = id.trim().is_empty()
        || id == "."
        || id == ".."
        || id.contains(['/', '\\', '\0']);

    if invalid {
        return Err(SedmlError::InvalidReportId(id.to_string()));
    }

    Ok(())
}
