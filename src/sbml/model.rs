//! SBML model representation
//!
//! Plain data types for the subset of SBML core the ODE engine understands. The reader
//! in [`super::reader`] produces an [`SBMLModel`]; the simulation module compiles it
//! into an ODE system. Constructs the engine cannot simulate (events, algebraic rules,
//! `stoichiometryMath`) are still recorded here so that the engine can reject the model
//! with a precise error instead of silently simulating something else.

use std::collections::HashMap;

use crate::math::{Lambda, MathExpr};

use super::error::SBMLError;

/// A reaction compartment
#[derive(Debug, Clone, PartialEq)]
pub struct Compartment {
    pub id: String,
    pub name: Option<String>,
    pub size: Option<f64>,
    pub constant: bool,
}

/// A chemical species
#[derive(Debug, Clone, PartialEq)]
pub struct Species {
    pub id: String,
    pub name: Option<String>,
    pub compartment: String,
    pub initial_amount: Option<f64>,
    pub initial_concentration: Option<f64>,
    pub has_only_substance_units: bool,
    pub boundary_condition: bool,
    pub constant: bool,
}

/// A global parameter or a reaction-local parameter
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub id: String,
    pub name: Option<String>,
    pub value: Option<f64>,
    pub constant: bool,
}

/// Participation of a species in a reaction
#[derive(Debug, Clone, PartialEq)]
pub struct SpeciesReference {
    pub species: String,
    pub stoichiometry: f64,
    /// Set when the stoichiometry is given by `stoichiometryMath`
    pub has_stoichiometry_math: bool,
}

/// Rate law of a reaction, with its locally scoped parameters
#[derive(Debug, Clone, PartialEq)]
pub struct KineticLaw {
    pub math: MathExpr,
    pub local_parameters: Vec<Parameter>,
}

/// A reaction
#[derive(Debug, Clone, PartialEq)]
pub struct Reaction {
    pub id: String,
    pub reactants: Vec<SpeciesReference>,
    pub products: Vec<SpeciesReference>,
    pub kinetic_law: Option<KineticLaw>,
}

/// Kind of an SBML rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    Assignment,
    Rate,
    Algebraic,
}

/// An assignment, rate or algebraic rule
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub kind: RuleKind,
    /// Target symbol; `None` for algebraic rules
    pub variable: Option<String>,
    pub math: MathExpr,
}

/// An initial assignment
#[derive(Debug, Clone, PartialEq)]
pub struct InitialAssignment {
    pub symbol: String,
    pub math: MathExpr,
}

/// A user-defined function
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDefinition {
    pub id: String,
    pub lambda: Lambda,
}

/// An SBML model
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SBMLModel {
    pub id: Option<String>,
    pub name: Option<String>,
    pub level: u32,
    pub function_definitions: Vec<FunctionDefinition>,
    pub compartments: Vec<Compartment>,
    pub species: Vec<Species>,
    pub parameters: Vec<Parameter>,
    pub initial_assignments: Vec<InitialAssignment>,
    pub rules: Vec<Rule>,
    pub reactions: Vec<Reaction>,
    /// Number of `<event>` elements in the model
    pub events: usize,
}

impl SBMLModel {
    /// Function definitions by id, ready for [`MathExpr::expand_functions`]
    pub fn functions(&self) -> HashMap<String, Lambda> {
        self.function_definitions
            .iter()
            .map(|function| (function.id.clone(), function.lambda.clone()))
            .collect()
    }

    /// The assignment or rate rule targeting `id`, if any
    pub fn rule_for(&self, id: &str) -> Option<&Rule> {
        self.rules
            .iter()
            .find(|rule| rule.variable.as_deref() == Some(id))
    }

    /// Whether the value of `id` changes over time
    ///
    /// Species vary unless constant or boundary species without a rule; compartments
    /// and parameters vary when they are declared non-constant or are ruled.
    pub fn is_variable(&self, id: &str) -> bool {
        if self.rule_for(id).is_some() {
            return true;
        }
        if let Some(species) = self.species.iter().find(|s| s.id == id) {
            return !species.constant && !species.boundary_condition;
        }
        if let Some(compartment) = self.compartments.iter().find(|c| c.id == id) {
            return !compartment.constant;
        }
        self.parameters
            .iter()
            .find(|p| p.id == id)
            .is_some_and(|p| !p.constant)
    }

    /// Identifiers reported when an experiment does not declare its own outputs:
    /// every species, followed by every time-varying compartment and parameter.
    pub fn default_observables(&self) -> Vec<String> {
        let species = self.species.iter().map(|s| s.id.clone());
        let compartments = self
            .compartments
            .iter()
            .filter(|c| self.is_variable(&c.id))
            .map(|c| c.id.clone());
        let parameters = self
            .parameters
            .iter()
            .filter(|p| self.is_variable(&p.id))
            .map(|p| p.id.clone());

        species.chain(compartments).chain(parameters).collect()
    }

    /// Sets an attribute of a compartment, species or parameter
    ///
    /// Supported attributes are `size` (compartments), `initialConcentration` and
    /// `initialAmount` (species) and `value` (parameters). Setting one of the two species
    /// initial values clears the other one.
    ///
    /// # Errors
    ///
    /// Returns [`SBMLError::UnknownTarget`] for unknown identifiers and
    /// [`SBMLError::UnsupportedChange`] for attributes that cannot be changed.
    pub fn set_attribute(&mut self, id: &str, attribute: &str, value: f64) -> Result<(), SBMLError> {
        let unsupported = || SBMLError::UnsupportedChange {
            id: id.to_string(),
            attribute: attribute.to_string(),
        };

        if let Some(compartment) = self.compartments.iter_mut().find(|c| c.id == id) {
            return match attribute {
                "size" | "volume" => {
                    compartment.size = Some(value);
                    Ok(())
                }
                _ => Err(unsupported()),
            };
        }

        if let Some(species) = self.species.iter_mut().find(|s| s.id == id) {
            return match attribute {
                "initialConcentration" => {
                    species.initial_concentration = Some(value);
                    species.initial_amount = None;
                    Ok(())
                }
                "initialAmount" => {
                    species.initial_amount = Some(value);
                    species.initial_concentration = None;
                    Ok(())
                }
                _ => Err(unsupported()),
            };
        }

        if let Some(parameter) = self.parameters.iter_mut().find(|p| p.id == id) {
            return match attribute {
                "value" => {
                    parameter.value = Some(value);
                    Ok(())
                }
                _ => Err(unsupported()),
            };
        }

        Err(SBMLError::UnknownTarget(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> SBMLModel {
        SBMLModel {
            compartments: vec![Compartment {
                id: "cell".to_string(),
                name: None,
                size: Some(1.0),
                constant: true,
            }],
            species: vec![Species {
                id: "S".to_string(),
                name: None,
                compartment: "cell".to_string(),
                initial_amount: None,
                initial_concentration: Some(10.0),
                has_only_substance_units: false,
                boundary_condition: false,
                constant: false,
            }],
            parameters: vec![
                Parameter {
                    id: "k".to_string(),
                    name: None,
                    value: Some(0.1),
                    constant: true,
                },
                Parameter {
                    id: "total".to_string(),
                    name: None,
                    value: None,
                    constant: false,
                },
            ],
            ..Default::default()
        }
    }

    #[test]
    fn test_default_observables() {
        assert_eq!(model().default_observables(), vec!["S", "total"]);
    }

    #[test]
    fn test_set_attribute() {
        let mut model = model();
        model.set_attribute("k", "value", 2.0).unwrap();
        model.set_attribute("S", "initialAmount", 3.0).unwrap();

        assert_eq!(model.parameters[0].value, Some(2.0));
        assert_eq!(model.species[0].initial_amount, Some(3.0));
        assert_eq!(model.species[0].initial_concentration, None);

        assert!(matches!(
            model.set_attribute("k", "constant", 0.0),
            Err(SBMLError::UnsupportedChange { .. })
        ));
        assert!(matches!(
            model.set_attribute("nope", "value", 0.0),
            Err(SBMLError::UnknownTarget(_))
        ));
    }
}
