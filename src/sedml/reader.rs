//! SED-ML Document Reader
//!
//! Reads a SED-ML Level 1 document into a [`SedDocument`]. Constructs outside the
//! supported subset are rejected with [`SedmlError::Unsupported`] rather than skipped,
//! since skipping them would silently run a different experiment. Plots are the one
//! exception: they do not change what is simulated and are ignored with a warning.

use log::warn;

use crate::math::MathExpr;
use crate::simulation::task::{Algorithm, AlgorithmParameter, TimeCourse, MAX_POINTS};
use crate::xml::{parse_document, XmlElement};

use super::document::{
    AttributeChange, DataGenerator, DataSet, SedDocument, SedModel, SedReport, SedSimulation,
    SedTask, SedVariable,
};
use super::error::SedmlError;

/// Reads a SED-ML document from its XML text
pub fn read_sedml(xml: &str) -> Result<SedDocument, SedmlError> {
    let document = parse_document(xml)?;
    SedDocument::try_from(&document)
}

impl TryFrom<&XmlElement> for SedDocument {
    type Error = SedmlError;

    fn try_from(root: &XmlElement) -> Result<Self, Self::Error> {
        if root.name != "sedML" {
            return Err(SedmlError::NotSedml(root.name.clone()));
        }

        let models = root
            .list_of("listOfModels", "model")
            .map(SedModel::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        let simulations = children_of(root, "listOfSimulations")
            .map(|simulation| match simulation.name.as_str() {
                "uniformTimeCourse" => SedSimulation::try_from(simulation),
                other => Err(SedmlError::Unsupported(format!(
                    "<{}> simulation '{}'",
                    other,
                    simulation.attr("id").unwrap_or_default()
                ))),
            })
            .collect::<Result<Vec<_>, _>>()?;

        let tasks = children_of(root, "listOfTasks")
            .map(|task| match task.name.as_str() {
                "task" => SedTask::try_from(task),
                other => Err(SedmlError::Unsupported(format!(
                    "<{}> '{}'",
                    other,
                    task.attr("id").unwrap_or_default()
                ))),
            })
            .collect::<Result<Vec<_>, _>>()?;

        let data_generators = root
            .list_of("listOfDataGenerators", "dataGenerator")
            .map(DataGenerator::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        let mut reports = Vec::new();
        for output in children_of(root, "listOfOutputs") {
            match output.name.as_str() {
                "report" => reports.push(SedReport::try_from(output)?),
                other => warn!(
                    "Skipping <{}> output '{}': only reports are written",
                    other,
                    output.attr("id").unwrap_or_default()
                ),
            }
        }

        Ok(SedDocument {
            level: unsigned(root, "level").unwrap_or(1),
            version: unsigned(root, "version").unwrap_or(1),
            models,
            simulations,
            tasks,
            data_generators,
            reports,
        })
    }
}

impl TryFrom<&XmlElement> for SedModel {
    type Error = SedmlError;

    fn try_from(element: &XmlElement) -> Result<Self, Self::Error> {
        let id = required(element, "model", "id")?;

        let changes = children_of(element, "listOfChanges")
            .map(|change| match change.name.as_str() {
                "changeAttribute" => Ok(AttributeChange {
                    target: required(change, "changeAttribute", "target")?,
                    new_value: required_f64(change, &id, "changeAttribute", "newValue")?,
                }),
                other => Err(SedmlError::Unsupported(format!(
                    "<{}> change of model '{}'",
                    other, id
                ))),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(SedModel {
            source: required(element, "model", "source")?,
            language: element.attr("language").map(str::to_string),
            changes,
            id,
        })
    }
}

impl TryFrom<&XmlElement> for SedSimulation {
    type Error = SedmlError;

    fn try_from(element: &XmlElement) -> Result<Self, Self::Error> {
        let id = required(element, "uniformTimeCourse", "id")?;

        let initial_time = required_f64(element, &id, "uniformTimeCourse", "initialTime")?;
        let output_start_time =
            required_f64(element, &id, "uniformTimeCourse", "outputStartTime")?;
        let output_end_time = required_f64(element, &id, "uniformTimeCourse", "outputEndTime")?;

        // Level 1 Version 4 renamed numberOfPoints to numberOfSteps
        let points_attribute = if element.attr("numberOfSteps").is_some() {
            "numberOfSteps"
        } else {
            "numberOfPoints"
        };
        let points = required_f64(element, &id, "uniformTimeCourse", points_attribute)?;
        if points < 0.0 || points.fract() != 0.0 || points > MAX_POINTS as f64 {
            return Err(SedmlError::InvalidAttribute {
                id,
                attribute: points_attribute.to_string(),
                value: points.to_string(),
            });
        }

        let time_course =
            TimeCourse::new(initial_time, output_start_time, output_end_time, points as usize)
                .map_err(|source| SedmlError::InvalidTimeCourse {
                    id: id.clone(),
                    source,
                })?;

        let algorithm = element
            .child("algorithm")
            .ok_or(SedmlError::MissingAttribute {
                element: "uniformTimeCourse",
                attribute: "algorithm",
            })?;

        Ok(SedSimulation {
            id,
            time_course,
            algorithm: read_algorithm(algorithm)?,
        })
    }
}

fn read_algorithm(element: &XmlElement) -> Result<Algorithm, SedmlError> {
    let mut algorithm = Algorithm::new(required(element, "algorithm", "kisaoID")?);

    for parameter in element.list_of("listOfAlgorithmParameters", "algorithmParameter") {
        algorithm.parameters.push(AlgorithmParameter {
            kisao_id: required(parameter, "algorithmParameter", "kisaoID")?,
            value: required(parameter, "algorithmParameter", "value")?,
        });
    }

    Ok(algorithm)
}

impl TryFrom<&XmlElement> for SedTask {
    type Error = SedmlError;

    fn try_from(element: &XmlElement) -> Result<Self, Self::Error> {
        Ok(SedTask {
            id: required(element, "task", "id")?,
            model_reference: required(element, "task", "modelReference")?,
            simulation_reference: required(element, "task", "simulationReference")?,
        })
    }
}

impl TryFrom<&XmlElement> for DataGenerator {
    type Error = SedmlError;

    fn try_from(element: &XmlElement) -> Result<Self, Self::Error> {
        let id = required(element, "dataGenerator", "id")?;

        let variables = element
            .list_of("listOfVariables", "variable")
            .map(|variable| {
                Ok(SedVariable {
                    id: required(variable, "variable", "id")?,
                    task_reference: variable.attr("taskReference").map(str::to_string),
                    target: variable.attr("target").map(str::to_string),
                    symbol: variable.attr("symbol").map(str::to_string),
                })
            })
            .collect::<Result<Vec<_>, SedmlError>>()?;

        let parameters = element
            .list_of("listOfParameters", "parameter")
            .map(|parameter| {
                let parameter_id = required(parameter, "parameter", "id")?;
                let value = required_f64(parameter, &parameter_id, "parameter", "value")?;
                Ok((parameter_id, value))
            })
            .collect::<Result<Vec<_>, SedmlError>>()?;

        let math = element
            .child("math")
            .ok_or(SedmlError::MissingAttribute {
                element: "dataGenerator",
                attribute: "math",
            })
            .and_then(|math| {
                MathExpr::from_math(math).map_err(|source| SedmlError::MathError {
                    id: id.clone(),
                    source,
                })
            })?;

        Ok(DataGenerator {
            name: element.attr("name").map(str::to_string),
            id,
            variables,
            parameters,
            math,
        })
    }
}

impl TryFrom<&XmlElement> for SedReport {
    type Error = SedmlError;

    fn try_from(element: &XmlElement) -> Result<Self, Self::Error> {
        let data_sets = element
            .list_of("listOfDataSets", "dataSet")
            .map(|data_set| {
                Ok(DataSet {
                    id: required(data_set, "dataSet", "id")?,
                    label: data_set.attr("label").map(str::to_string),
                    data_reference: required(data_set, "dataSet", "dataReference")?,
                })
            })
            .collect::<Result<Vec<_>, SedmlError>>()?;

        Ok(SedReport {
            id: required(element, "report", "id")?,
            name: element.attr("name").map(str::to_string),
            data_sets,
        })
    }
}

/// All element children of the container `name`
fn children_of<'a>(element: &'a XmlElement, name: &str) -> impl Iterator<Item = &'a XmlElement> {
    element
        .child(name)
        .into_iter()
        .flat_map(|list| list.children.iter())
        .filter(|child| !matches!(child.name.as_str(), "notes" | "annotation"))
}

fn required(
    element: &XmlElement,
    name: &'static str,
    attribute: &'static str,
) -> Result<String, SedmlError> {
    element
        .attr(attribute)
        .map(str::to_string)
        .ok_or(SedmlError::MissingAttribute {
            element: name,
            attribute,
        })
}

fn required_f64(
    element: &XmlElement,
    id: &str,
    name: &'static str,
    attribute: &'static str,
) -> Result<f64, SedmlError> {
    let value = element.attr(attribute).ok_or(SedmlError::MissingAttribute {
        element: name,
        attribute,
    })?;

    value
        .trim()
        .parse::<f64>()
        .map_err(|_| SedmlError::InvalidAttribute {
            id: id.to_string(),
            attribute: attribute.to_string(),
            value: value.to_string(),
        })
}

fn unsigned(element: &XmlElement, attribute: &str) -> Option<u32> {
    element.attr(attribute).and_then(|value| value.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const SEDML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<sedML xmlns="http://sed-ml.org/sed-ml/level1/version3" level="1" version="3"
       xmlns:sbml="http://www.sbml.org/sbml/level2/version4">
  <listOfSimulations>
    <uniformTimeCourse id="sim" initialTime="0" outputStartTime="0" outputEndTime="10" numberOfPoints="100">
      <algorithm kisaoID="KISAO:0000019">
        <listOfAlgorithmParameters>
          <algorithmParameter kisaoID="KISAO:0000467" value="0.05"/>
        </listOfAlgorithmParameters>
      </algorithm>
    </uniformTimeCourse>
  </listOfSimulations>
  <listOfModels>
    <model id="model" language="urn:sedml:language:sbml" source="model.xml">
      <listOfChanges>
        <changeAttribute target="/sbml:sbml/sbml:model/sbml:listOfParameters/sbml:parameter[@id='k']/@value" newValue="0.25"/>
      </listOfChanges>
    </model>
  </listOfModels>
  <listOfTasks>
    <task id="task1" modelReference="model" simulationReference="sim"/>
  </listOfTasks>
  <listOfDataGenerators>
    <dataGenerator id="dg_time">
      <listOfVariables>
        <variable id="t" symbol="urn:sedml:symbol:time" taskReference="task1"/>
      </listOfVariables>
      <math xmlns="http://www.w3.org/1998/Math/MathML"><ci>t</ci></math>
    </dataGenerator>
    <dataGenerator id="dg_A">
      <listOfVariables>
        <variable id="A" target="/sbml:sbml/sbml:model/sbml:listOfSpecies/sbml:species[@id='A']" taskReference="task1"/>
      </listOfVariables>
      <listOfParameters><parameter id="scale" value="2"/></listOfParameters>
      <math xmlns="http://www.w3.org/1998/Math/MathML"><apply><times/><ci>scale</ci><ci>A</ci></apply></math>
    </dataGenerator>
  </listOfDataGenerators>
  <listOfOutputs>
    <plot2D id="plot"/>
    <report id="simulation_1">
      <listOfDataSets>
        <dataSet id="ds_time" label="time" dataReference="dg_time"/>
        <dataSet id="ds_A" label="A" dataReference="dg_A"/>
      </listOfDataSets>
    </report>
  </listOfOutputs>
</sedML>"#;

    #[test]
    fn test_read_document() {
        let document = read_sedml(SEDML).unwrap();

        assert_eq!(document.level, 1);
        assert_eq!(document.version, 3);

        let model = &document.models[0];
        assert_eq!(model.source, "model.xml");
        assert_eq!(model.changes[0].new_value, 0.25);

        let simulation = &document.simulations[0];
        assert_eq!(simulation.time_course.number_of_points(), 100);
        assert_eq!(simulation.algorithm.kisao_id, "KISAO:0000019");
        assert_eq!(simulation.algorithm.parameter("KISAO_0000467"), Some("0.05"));

        assert_eq!(document.tasks[0].model_reference, "model");

        let generator = document.data_generator("dg_A").unwrap();
        assert_eq!(generator.parameters, vec![("scale".to_string(), 2.0)]);
        assert_eq!(generator.math.to_string(), "(scale * A)");

        assert_eq!(document.reports.len(), 1);
        assert_eq!(document.reports[0].data_sets[1].column_name(), "A");
    }

    #[test]
    fn test_unsupported_simulation() {
        let xml = r#"<sedML level="1" version="3">
            <listOfSimulations><steadyState id="ss"><algorithm kisaoID="KISAO:0000407"/></steadyState></listOfSimulations>
        </sedML>"#;

        assert!(matches!(read_sedml(xml), Err(SedmlError::Unsupported(_))));
    }

    #[test]
    fn test_unsupported_task_and_change() {
        let repeated = r#"<sedML><listOfTasks><repeatedTask id="r"/></listOfTasks></sedML>"#;
        assert!(matches!(read_sedml(repeated), Err(SedmlError::Unsupported(_))));

        let change = r#"<sedML><listOfModels>
            <model id="m" source="m.xml"><listOfChanges><removeXML target="/x"/></listOfChanges></model>
        </listOfModels></sedML>"#;
        assert!(matches!(read_sedml(change), Err(SedmlError::Unsupported(_))));
    }

    #[test]
    fn test_invalid_time_course() {
        let xml = r#"<sedML><listOfSimulations>
            <uniformTimeCourse id="s" initialTime="0" outputStartTime="5" outputEndTime="1" numberOfPoints="10">
                <algorithm kisaoID="KISAO:0000019"/>
            </uniformTimeCourse>
        </listOfSimulations></sedML>"#;

        assert!(matches!(
            read_sedml(xml),
            Err(SedmlError::InvalidTimeCourse { .. })
        ));
    }

    #[test]
    fn test_too_many_points() {
        let xml = r#"<sedML><listOfSimulations>
            <uniformTimeCourse id="s" initialTime="0" outputStartTime="0" outputEndTime="1" numberOfPoints="1e12">
                <algorithm kisaoID="KISAO:0000019"/>
            </uniformTimeCourse>
        </listOfSimulations></sedML>"#;

        assert!(matches!(
            read_sedml(xml),
            Err(SedmlError::InvalidAttribute { attribute, .. }) if attribute == "numberOfPoints"
        ));
    }

    #[test]
    fn test_not_sedml() {
        assert!(matches!(read_sedml("<sbml/>"), Err(SedmlError::NotSedml(_))));
    }
}
