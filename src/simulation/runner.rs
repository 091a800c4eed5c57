//! Simulation runner
//!
//! The [`SimulationExecutor`] trait is the seam between the archive reader and the
//! report writer: it turns a [`SimulationTask`] into a [`Report`]. [`OdeExecutor`]
//! implements it by compiling the task's model into an [`OdeSystem`] and stepping it
//! with one of `peroxide`'s fixed-step Runge-Kutta integrators.

use log::{debug, info};
use peroxide::fuga::{ODEIntegrator, RK4, RK5};

use evalexpr::EvalexprError;

use crate::math::{CompiledExpr, MathError, Scope};

use super::error::SimulationError;
use super::result::Report;
use super::setup::{EngineSettings, Integrator};
use super::system::OdeSystem;
use super::task::{Observable, OutputVariable, SimulationTask};

/// Executes simulation tasks
pub trait SimulationExecutor {
    /// Runs `task` and returns its validated report
    fn execute(&self, task: &SimulationTask) -> Result<Report, SimulationError>;
}

/// Deterministic ODE executor
#[derive(Debug, Clone, Default)]
pub struct OdeExecutor {
    settings: EngineSettings,
}

impl OdeExecutor {
    pub fn new(settings: EngineSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }
}

impl SimulationExecutor for OdeExecutor {
    fn execute(&self, task: &SimulationTask) -> Result<Report, SimulationError> {
        let settings = self.settings.for_algorithm(&task.algorithm)?;
        let system = OdeSystem::new(&task.model, task.time_course.initial_time())?;

        let outputs = task
            .outputs
            .iter()
            .map(|output| CompiledOutput::new(output, &system))
            .collect::<Result<Vec<_>, _>>()?;

        info!(
            "Simulating '{}' ({} state variables, {:?})",
            task.id,
            system.initial_state().len(),
            settings.integrator
        );

        let time = task.time_course.time_points();
        let values = match settings.integrator {
            Integrator::Rk4 => integrate(&system, RK4::default(), &settings, task, &time)?,
            Integrator::Rk5 => integrate(&system, RK5::default(), &settings, task, &time)?,
        };

        let mut report = Report::new(task.id.clone(), time.clone());
        for (output, compiled) in task.outputs.iter().zip(&outputs) {
            let column = time
                .iter()
                .zip(&values)
                .map(|(&t, values)| {
                    compiled
                        .eval(values, t)
                        .map_err(|source| SimulationError::EvalExpressionError { time: t, source })
                })
                .collect::<Result<Vec<_>, _>>()?;
            report.push_column(output.id.clone(), column);
        }

        report.validate()?;
        Ok(report)
    }
}

/// Integrates `system` over the task's time course
///
/// Returns all slot values at every output time point.
fn integrate<S: ODEIntegrator>(
    system: &OdeSystem,
    solver: S,
    settings: &EngineSettings,
    task: &SimulationTask,
    time_points: &[f64],
) -> Result<Vec<Vec<f64>>, SimulationError> {
    let mut t = task.time_course.initial_time();
    let mut y = system.initial_state();
    let mut recorded = Vec::with_capacity(time_points.len());
    let mut steps = 0usize;

    for &t_out in time_points {
        let gap = t_out - t;

        if gap > 0.0 && !y.is_empty() {
            let substeps = settings.substeps(gap)?;
            let dt = gap / substeps as f64;

            for i in 0..substeps {
                let t_step = t + dt * i as f64;
                solver
                    .step(system, t_step, &mut y, dt)
                    .map_err(|err| SimulationError::IntegrationError {
                        time: t_step,
                        message: err.to_string(),
                    })?;

                if y.iter().any(|value| !value.is_finite()) {
                    return Err(SimulationError::NonFinite { time: t_step + dt });
                }
            }
            steps += substeps;
        }

        // Land exactly on the output point
        t = t_out;
        let values = system
            .values(t, &y)
            .map_err(|source| SimulationError::EvalExpressionError { time: t, source })?;
        recorded.push(values);
    }

    debug!("'{}' finished after {} integration steps", task.id, steps);

    Ok(recorded)
}

/// Where a data generator variable takes its value from
#[derive(Debug, Clone)]
enum Source {
    Time,
    Slot(usize),
    Constant(f64),
}

/// A report column compiled against an [`OdeSystem`]
#[derive(Debug, Clone)]
struct CompiledOutput {
    sources: Vec<Source>,
    expr: CompiledExpr,
}

impl CompiledOutput {
    fn new(output: &OutputVariable, system: &OdeSystem) -> Result<Self, SimulationError> {
        let mut names: Vec<&str> = Vec::new();
        let mut sources = Vec::new();

        for (id, observable) in &output.variables {
            let source = match observable {
                Observable::Time => Source::Time,
                Observable::Element(target) => Source::Slot(system.slot(target).ok_or_else(
                    || SimulationError::UnresolvedTarget {
                        output: output.id.clone(),
                        target: target.clone(),
                    },
                )?),
            };
            names.push(id.as_str());
            sources.push(source);
        }

        for (id, value) in &output.parameters {
            names.push(id.as_str());
            sources.push(Source::Constant(*value));
        }

        let resolve = |name: &str| names.iter().position(|candidate| *candidate == name);
        let expr = output
            .math
            .compile(&resolve)
            .map_err(|source: MathError| SimulationError::MathError {
                id: output.id.clone(),
                source,
            })?;

        Ok(Self { sources, expr })
    }

    fn eval(&self, values: &[f64], t: f64) -> Result<f64, EvalexprError> {
        let locals: Vec<f64> = self
            .sources
            .iter()
            .map(|source| match source {
                Source::Time => t,
                Source::Slot(slot) => values[*slot],
                Source::Constant(value) => *value,
            })
            .collect();

        self.expr.eval(&Scope::new(&locals, t)?)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use crate::math::MathExpr;
    use crate::sbml::reader::read_sbml;
    use crate::simulation::setup::EngineSettingsBuilder;
    use crate::simulation::task::{Algorithm, AlgorithmParameter, TimeCourse};

    use super::*;

    const MODEL: &str = r#"<sbml level="3" version="1"><model id="decay">
        <listOfCompartments><compartment id="cell" size="1" constant="true"/></listOfCompartments>
        <listOfSpecies>
          <species id="A" compartment="cell" initialConcentration="10" hasOnlySubstanceUnits="false" boundaryCondition="false" constant="false"/>
          <species id="B" compartment="cell" initialConcentration="0" hasOnlySubstanceUnits="false" boundaryCondition="false" constant="false"/>
        </listOfSpecies>
        <listOfParameters><parameter id="k" value="0.5" constant="true"/></listOfParameters>
        <listOfReactions>
          <reaction id="R1" reversible="false">
            <listOfReactants><speciesReference species="A" stoichiometry="1"/></listOfReactants>
            <listOfProducts><speciesReference species="B" stoichiometry="1"/></listOfProducts>
            <kineticLaw><math xmlns="http://www.w3.org/1998/Math/MathML">
              <apply><times/><ci>cell</ci><ci>k</ci><ci>A</ci></apply>
            </math></kineticLaw>
          </reaction>
        </listOfReactions>
    </model></sbml>"#;

    fn task(kisao: &str, outputs: Vec<OutputVariable>) -> SimulationTask {
        SimulationTask {
            id: "simulation_1".to_string(),
            model_source: "model.xml".to_string(),
            model: read_sbml(MODEL).unwrap(),
            time_course: TimeCourse::new(0.0, 0.0, 10.0, 20).unwrap(),
            algorithm: Algorithm::new(kisao),
            outputs,
        }
    }

    #[test]
    fn test_exponential_decay() {
        let outputs = vec![OutputVariable::element("A"), OutputVariable::element("B")];
        let report = OdeExecutor::default()
            .execute(&task("KISAO_0000019", outputs))
            .unwrap();

        assert_eq!(report.header(), vec!["time", "A", "B"]);
        assert_eq!(report.time.len(), 21);

        let a = report.column("A").unwrap();
        let b = report.column("B").unwrap();
        for (i, &t) in report.time.iter().enumerate() {
            assert_relative_eq!(a[i], 10.0 * (-0.5 * t).exp(), epsilon = 1e-8);
            assert_relative_eq!(a[i] + b[i], 10.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_rk4_with_data_generator_math() {
        let scaled = OutputVariable {
            id: "twice_A".to_string(),
            math: MathExpr::Apply(
                crate::math::Operator::Times,
                vec![
                    MathExpr::Symbol("scale".to_string()),
                    MathExpr::Symbol("a".to_string()),
                ],
            ),
            variables: vec![("a".to_string(), Observable::Element("A".to_string()))],
            parameters: vec![("scale".to_string(), 2.0)],
        };

        let settings = EngineSettingsBuilder::default()
            .max_step(0.05)
            .build()
            .unwrap();
        let report = OdeExecutor::new(settings)
            .execute(&task("KISAO:0000032", vec![scaled]))
            .unwrap();

        let column = report.column("twice_A").unwrap();
        assert_relative_eq!(column[0], 20.0);
        assert_relative_eq!(column[20], 20.0 * (-5.0f64).exp(), epsilon = 1e-6);
    }

    #[test]
    fn test_reaction_flux_output() {
        let report = OdeExecutor::default()
            .execute(&task("KISAO_0000019", vec![OutputVariable::element("R1")]))
            .unwrap();

        assert_relative_eq!(report.column("R1").unwrap()[0], 5.0);
    }

    #[test]
    fn test_unresolved_target() {
        let result = OdeExecutor::default()
            .execute(&task("KISAO_0000019", vec![OutputVariable::element("nope")]));

        assert!(matches!(
            result,
            Err(SimulationError::UnresolvedTarget { .. })
        ));
    }

    #[test]
    fn test_stochastic_algorithm_rejected() {
        let result = OdeExecutor::default().execute(&task("KISAO_0000029", Vec::new()));
        assert!(matches!(
            result,
            Err(SimulationError::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn test_step_limit() {
        let mut task = task("KISAO_0000019", vec![OutputVariable::element("A")]);
        task.algorithm.parameters.push(AlgorithmParameter {
            kisao_id: "KISAO_0000467".to_string(),
            value: "1e-9".to_string(),
        });

        assert!(matches!(
            OdeExecutor::default().execute(&task),
            Err(SimulationError::TooManySteps { .. })
        ));
    }

    #[test]
    fn test_non_finite_state() {
        let mut task = task("KISAO_0000019", vec![OutputVariable::element("A")]);
        // Explosive growth: dA/dt = A^3
        task.model.reactions[0].kinetic_law.as_mut().unwrap().math = MathExpr::Apply(
            crate::math::Operator::Times,
            vec![
                MathExpr::Number(-1.0),
                MathExpr::Apply(
                    crate::math::Operator::Power,
                    vec![MathExpr::Symbol("A".to_string()), MathExpr::Number(3.0)],
                ),
            ],
        );

        assert!(matches!(
            OdeExecutor::default().execute(&task),
            Err(SimulationError::NonFinite { .. } | SimulationError::IntegrationError { .. })
        ));
    }
}
