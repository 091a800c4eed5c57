//! Setup module for configuring the ODE engine.
//!
//! This module provides the [`EngineSettings`] struct and its builder for configuring
//! the numerical integration used to execute simulation tasks. It handles:
//!
//! - Integrator selection (4th or 5th order Runge-Kutta)
//! - Maximum internal step size
//! - Minimum number of internal steps between two output points
//!
//! Settings can be created programmatically and are refined per task from the KiSAO
//! algorithm requested by the simulation experiment.

use derive_builder::Builder;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::error::SimulationError;
use super::task::{normalize_kisao, Algorithm};

/// KiSAO id of the explicit fourth-order Runge-Kutta method
pub const KISAO_RK4: &str = "KISAO_0000032";

/// KiSAO id of the "maximum step size" algorithm parameter
pub const KISAO_MAX_STEP: &str = "KISAO_0000467";

/// Largest number of internal steps between two output points
pub const MAX_SUBSTEPS: usize = 10_000_000;

/// KiSAO ids of deterministic ODE methods that are run with the default integrator
const DETERMINISTIC_ODE_METHODS: &[&str] = &[
    "KISAO_0000019", // CVODE
    "KISAO_0000030", // Euler forward
    "KISAO_0000064", // Runge-Kutta based method
    "KISAO_0000086", // Fehlberg
    "KISAO_0000087", // Dormand-Prince
    "KISAO_0000088", // LSODA
    "KISAO_0000089", // LSODAR
    "KISAO_0000280", // Adams-Moulton
    "KISAO_0000288", // BDF
    "KISAO_0000304", // Radau IIA
    "KISAO_0000560", // LSODA/LSODAR hybrid
    "KISAO_0000694", // ODE solver
];

/// Fixed-step integrators provided by `peroxide`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Integrator {
    /// Classical 4th order Runge-Kutta
    Rk4,
    /// 5th order Runge-Kutta
    Rk5,
}

impl Integrator {
    /// Picks the integrator for a KiSAO algorithm id
    ///
    /// # Errors
    ///
    /// Returns [`SimulationError::UnsupportedAlgorithm`] for stochastic, steady-state
    /// and unknown algorithms.
    pub fn from_kisao(kisao_id: &str, default: Integrator) -> Result<Self, SimulationError> {
        let id = normalize_kisao(kisao_id);

        if id == KISAO_RK4 {
            return Ok(Integrator::Rk4);
        }

        if DETERMINISTIC_ODE_METHODS.contains(&id.as_str()) {
            info!(
                "Algorithm {} is executed with the {:?} integrator",
                id, default
            );
            return Ok(default);
        }

        Err(SimulationError::UnsupportedAlgorithm(kisao_id.to_string()))
    }
}

/// Configuration of the ODE engine
///
/// # Fields
///
/// * `integrator` - Integration method (default: RK5)
/// * `max_step` - Largest internal step size (default: 0.01)
/// * `min_substeps` - Fewest internal steps between two output points (default: 1)
///
/// # Examples
///
/// ```
/// use biosim::simulation::setup::{EngineSettingsBuilder, Integrator};
///
/// let settings = EngineSettingsBuilder::default()
///     .integrator(Integrator::Rk4)
///     .max_step(0.001)
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Clone, Builder, Serialize, Deserialize, PartialEq)]
pub struct EngineSettings {
    #[builder(default = "Integrator::Rk5")]
    pub integrator: Integrator,
    #[builder(default = "0.01")]
    pub max_step: f64,
    #[builder(default = "1")]
    pub min_substeps: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            integrator: Integrator::Rk5,
            max_step: 0.01,
            min_substeps: 1,
        }
    }
}

impl EngineSettings {
    /// Settings for one task: integrator and step size follow the requested algorithm
    ///
    /// # Errors
    ///
    /// Returns [`SimulationError::UnsupportedAlgorithm`] for algorithms that are not
    /// deterministic ODE methods and [`SimulationError::InvalidAlgorithmParameter`]
    /// for a maximum step size that is not a positive number.
    pub fn for_algorithm(&self, algorithm: &Algorithm) -> Result<Self, SimulationError> {
        let mut settings = self.clone();
        settings.integrator = Integrator::from_kisao(&algorithm.kisao_id, self.integrator)?;

        for parameter in &algorithm.parameters {
            if normalize_kisao(&parameter.kisao_id) == KISAO_MAX_STEP {
                let max_step = parameter
                    .value
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .filter(|step| step.is_finite() && *step > 0.0)
                    .ok_or_else(|| SimulationError::InvalidAlgorithmParameter {
                        kisao_id: parameter.kisao_id.clone(),
                        value: parameter.value.clone(),
                    })?;
                settings.max_step = max_step;
            } else {
                debug!(
                    "Ignoring algorithm parameter {} = {} for fixed-step integration",
                    parameter.kisao_id, parameter.value
                );
            }
        }

        Ok(settings)
    }

    /// Number of internal steps used to cross a gap between two output points
    ///
    /// # Errors
    ///
    /// Returns [`SimulationError::TooManySteps`] if the gap needs more than
    /// [`MAX_SUBSTEPS`] steps.
    pub fn substeps(&self, gap: f64) -> Result<usize, SimulationError> {
        let by_size = if gap > 0.0 && self.max_step > 0.0 {
            // Rounding noise must not add a step
            (gap / self.max_step - 1e-9).ceil()
        } else {
            0.0
        };
        let steps = by_size.max(self.min_substeps as f64).max(1.0);

        if steps.is_nan() || steps > MAX_SUBSTEPS as f64 {
            return Err(SimulationError::TooManySteps { gap, steps });
        }

        Ok(steps as usize)
    }
}

#[cfg(test)]
mod tests {
    use crate::simulation::task::AlgorithmParameter;

    use super::*;

    #[test]
    fn test_builder_defaults() {
        let settings = EngineSettingsBuilder::default().build().unwrap();
        assert_eq!(settings, EngineSettings::default());
        assert_eq!(settings.integrator, Integrator::Rk5);
    }

    #[test]
    fn test_algorithm_mapping() {
        let settings = EngineSettings::default();

        let rk4 = settings.for_algorithm(&Algorithm::new("KISAO:0000032")).unwrap();
        assert_eq!(rk4.integrator, Integrator::Rk4);

        let cvode = settings.for_algorithm(&Algorithm::new("KISAO:0000019")).unwrap();
        assert_eq!(cvode.integrator, Integrator::Rk5);

        let gillespie = settings.for_algorithm(&Algorithm::new("KISAO:0000029"));
        assert!(matches!(
            gillespie,
            Err(SimulationError::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn test_max_step_parameter() {
        let mut algorithm = Algorithm::new("KISAO_0000019");
        algorithm.parameters.push(AlgorithmParameter {
            kisao_id: "KISAO:0000467".to_string(),
            value: "0.5".to_string(),
        });

        let settings = EngineSettings::default().for_algorithm(&algorithm).unwrap();
        assert_eq!(settings.max_step, 0.5);

        algorithm.parameters[0].value = "-1".to_string();
        assert!(matches!(
            EngineSettings::default().for_algorithm(&algorithm),
            Err(SimulationError::InvalidAlgorithmParameter { .. })
        ));
    }

    #[test]
    fn test_substeps() {
        let settings = EngineSettings::default();
        assert_eq!(settings.substeps(0.1).unwrap(), 10);
        assert_eq!(settings.substeps(0.0).unwrap(), 1);

        let coarse = EngineSettingsBuilder::default()
            .max_step(1.0)
            .min_substeps(4)
            .build()
            .unwrap();
        assert_eq!(coarse.substeps(0.5).unwrap(), 4);
    }

    #[test]
    fn test_substeps_are_bounded() {
        let tiny = EngineSettingsBuilder::default().max_step(1e-12).build().unwrap();
        assert!(matches!(
            tiny.substeps(1.0),
            Err(SimulationError::TooManySteps { .. })
        ));

        let mut algorithm = Algorithm::new("KISAO_0000019");
        algorithm.parameters.push(AlgorithmParameter {
            kisao_id: "KISAO_0000467".to_string(),
            value: "1e-300".to_string(),
        });
        let settings = EngineSettings::default().for_algorithm(&algorithm).unwrap();
        assert!(settings.substeps(10.0).is_err());
        assert_eq!(settings.substeps(0.0).unwrap(), 1);
    }
}
