//! Simulation tasks
//!
//! A [`SimulationTask`] is the plain-data hand-over between the archive reader and the
//! simulation executor: the (already changed) SBML model, the uniform time course, the
//! requested algorithm and the outputs of one report.

use thiserror::Error;

use crate::math::MathExpr;
use crate::sbml::model::SBMLModel;

/// Reasons a time course is rejected
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TimeCourseError {
    #[error("time course bounds must be finite")]
    NotFinite,
    #[error("number of points must be at least 1")]
    NoPoints,
    #[error("number of points {0} exceeds the limit of {limit}", limit = MAX_POINTS)]
    TooManyPoints(usize),
    #[error("initial time {initial} is after output start time {start}")]
    StartBeforeInitial { initial: f64, start: f64 },
    #[error("output end time {end} is before output start time {start}")]
    EndBeforeStart { start: f64, end: f64 },
}

/// Largest number of output intervals a time course may request
pub const MAX_POINTS: usize = 1_000_000;

/// A uniform time course
///
/// The model is integrated from `initial_time`; output is recorded at
/// `number_of_points + 1` evenly spaced points from `output_start_time` to
/// `output_end_time`, both inclusive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeCourse {
    initial_time: f64,
    output_start_time: f64,
    output_end_time: f64,
    number_of_points: usize,
}

impl TimeCourse {
    /// Creates a validated time course
    pub fn new(
        initial_time: f64,
        output_start_time: f64,
        output_end_time: f64,
        number_of_points: usize,
    ) -> Result<Self, TimeCourseError> {
        if !(initial_time.is_finite() && output_start_time.is_finite() && output_end_time.is_finite())
        {
            return Err(TimeCourseError::NotFinite);
        }
        if number_of_points == 0 {
            return Err(TimeCourseError::NoPoints);
        }
        if number_of_points > MAX_POINTS {
            return Err(TimeCourseError::TooManyPoints(number_of_points));
        }
        if initial_time > output_start_time {
            return Err(TimeCourseError::StartBeforeInitial {
                initial: initial_time,
                start: output_start_time,
            });
        }
        if output_start_time > output_end_time {
            return Err(TimeCourseError::EndBeforeStart {
                start: output_start_time,
                end: output_end_time,
            });
        }

        Ok(Self {
            initial_time,
            output_start_time,
            output_end_time,
            number_of_points,
        })
    }

    pub fn initial_time(&self) -> f64 {
        self.initial_time
    }

    pub fn output_start_time(&self) -> f64 {
        self.output_start_time
    }

    pub fn output_end_time(&self) -> f64 {
        self.output_end_time
    }

    pub fn number_of_points(&self) -> usize {
        self.number_of_points
    }

    /// The output time grid
    ///
    /// First and last points are exactly `output_start_time` and `output_end_time`.
    pub fn time_points(&self) -> Vec<f64> {
        let n = self.number_of_points;
        let span = self.output_end_time - self.output_start_time;

        (0..=n)
            .map(|i| match i {
                0 => self.output_start_time,
                i if i == n => self.output_end_time,
                i => self.output_start_time + span * (i as f64) / (n as f64),
            })
            .collect()
    }
}

/// A KiSAO algorithm parameter
#[derive(Debug, Clone, PartialEq)]
pub struct AlgorithmParameter {
    pub kisao_id: String,
    pub value: String,
}

/// The algorithm requested for a simulation
#[derive(Debug, Clone, PartialEq)]
pub struct Algorithm {
    pub kisao_id: String,
    pub parameters: Vec<AlgorithmParameter>,
}

impl Algorithm {
    pub fn new(kisao_id: impl Into<String>) -> Self {
        Self {
            kisao_id: kisao_id.into(),
            parameters: Vec::new(),
        }
    }

    /// Value of the parameter with the given KiSAO id
    pub fn parameter(&self, kisao_id: &str) -> Option<&str> {
        let wanted = normalize_kisao(kisao_id);
        self.parameters
            .iter()
            .find(|parameter| normalize_kisao(&parameter.kisao_id) == wanted)
            .map(|parameter| parameter.value.as_str())
    }
}

/// Normalizes `KISAO:0000019` and `kisao_0000019` to `KISAO_0000019`
pub fn normalize_kisao(id: &str) -> String {
    id.trim().to_ascii_uppercase().replace(':', "_")
}

/// What a data generator variable observes
#[derive(Debug, Clone, PartialEq)]
pub enum Observable {
    /// Simulation time
    Time,
    /// Value of a compartment, species, parameter or the flux of a reaction
    Element(String),
}

/// A column of the report: a data generator evaluated over its variables
#[derive(Debug, Clone, PartialEq)]
pub struct OutputVariable {
    /// Column name
    pub id: String,
    /// Data generator math over variable and parameter ids
    pub math: MathExpr,
    /// Variables by id
    pub variables: Vec<(String, Observable)>,
    /// Data generator parameters by id
    pub parameters: Vec<(String, f64)>,
}

impl OutputVariable {
    /// Output that reports a model element as-is
    pub fn element(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            math: MathExpr::Symbol(id.clone()),
            variables: vec![(id.clone(), Observable::Element(id.clone()))],
            parameters: Vec::new(),
            id,
        }
    }

    /// Whether this output is nothing but simulation time
    pub fn is_time(&self) -> bool {
        match &self.math {
            MathExpr::Time => true,
            MathExpr::Symbol(symbol) => self
                .variables
                .iter()
                .any(|(id, observable)| id == symbol && *observable == Observable::Time),
            _ => false,
        }
    }
}

/// Everything needed to simulate one report
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationTask {
    /// Report id; names the output directory and file
    pub id: String,
    /// Archive location of the model
    pub model_source: String,
    pub model: SBMLModel,
    pub time_course: TimeCourse,
    pub algorithm: Algorithm,
    /// Report columns besides time, in declaration order
    pub outputs: Vec<OutputVariable>,
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn test_time_points() {
        let course = TimeCourse::new(0.0, 0.0, 10.0, 100).unwrap();
        let points = course.time_points();

        assert_eq!(points.len(), 101);
        assert_eq!(points[0], 0.0);
        assert_eq!(points[100], 10.0);
        assert_relative_eq!(points[37], 3.7, epsilon = 1e-12);
    }

    #[test]
    fn test_time_points_with_output_start() {
        let course = TimeCourse::new(0.0, 5.0, 10.0, 5).unwrap();
        assert_eq!(course.time_points(), vec![5.0, 6.0, 7.0, 8.0, 9.0, 10.0]);
    }

    #[test]
    fn test_invalid_time_courses() {
        assert_eq!(TimeCourse::new(0.0, 0.0, 1.0, 0), Err(TimeCourseError::NoPoints));
        assert_eq!(
            TimeCourse::new(0.0, 0.0, 1.0, MAX_POINTS + 1),
            Err(TimeCourseError::TooManyPoints(MAX_POINTS + 1))
        );
        assert!(TimeCourse::new(0.0, 0.0, 1.0, MAX_POINTS).is_ok());
        assert!(matches!(
            TimeCourse::new(1.0, 0.0, 1.0, 10),
            Err(TimeCourseError::StartBeforeInitial { .. })
        ));
        assert!(matches!(
            TimeCourse::new(0.0, 2.0, 1.0, 10),
            Err(TimeCourseError::EndBeforeStart { .. })
        ));
        assert_eq!(
            TimeCourse::new(0.0, 0.0, f64::INFINITY, 10),
            Err(TimeCourseError::NotFinite)
        );
    }

    #[test]
    fn test_algorithm_parameter_lookup() {
        let mut algorithm = Algorithm::new("KISAO_0000019");
        algorithm.parameters.push(AlgorithmParameter {
            kisao_id: "KISAO:0000467".to_string(),
            value: "0.5".to_string(),
        });

        assert_eq!(algorithm.parameter("KISAO_0000467"), Some("0.5"));
        assert_eq!(algorithm.parameter("KISAO_0000209"), None);
    }
}
