//! SBML Document Reader
//!
//! Converts an SBML Level 2 or Level 3 document into an [`SBMLModel`]. The document is
//! first read into an [`XmlElement`] tree, then each `listOf…` container of the model is
//! converted element by element through `TryFrom` implementations.
//!
//! ## Defaults
//!
//! Attribute defaults follow SBML Level 2 where Level 3 makes attributes mandatory:
//! species are non-constant, non-boundary and measured in concentration; compartments
//! and parameters are constant; stoichiometries are `1`.
//!
//! Level 2 kinetic laws declare their local parameters in `listOfParameters`, Level 3
//! in `listOfLocalParameters`; both are accepted.

use std::collections::HashSet;

use crate::math::{parse_lambda, MathExpr};
use crate::xml::{parse_document, XmlElement};

use super::error::SBMLError;
use super::model::{
    Compartment, FunctionDefinition, InitialAssignment, KineticLaw, Parameter, Reaction, Rule,
    RuleKind, SBMLModel, Species, SpeciesReference,
};

/// Reads an SBML document from its XML text
///
/// # Errors
///
/// Returns an [`SBMLError`] if the XML is malformed, the document has no model, an
/// attribute cannot be parsed, an identifier is declared twice, or a math element
/// cannot be read.
pub fn read_sbml(xml: &str) -> Result<SBMLModel, SBMLError> {
    let document = parse_document(xml)?;
    SBMLModel::try_from(&document)
}

impl TryFrom<&XmlElement> for SBMLModel {
    type Error = SBMLError;

    fn try_from(document: &XmlElement) -> Result<Self, Self::Error> {
        if document.name != "sbml" {
            return Err(SBMLError::NotSBML(document.name.clone()));
        }

        let level = document
            .attr("level")
            .and_then(|level| level.parse().ok())
            .unwrap_or(3);
        let model = document.child("model").ok_or(SBMLError::MissingModel)?;

        let function_definitions = model
            .list_of("listOfFunctionDefinitions", "functionDefinition")
            .map(FunctionDefinition::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        let compartments = model
            .list_of("listOfCompartments", "compartment")
            .map(Compartment::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        let species = model
            .list_of("listOfSpecies", "species")
            .map(Species::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        let parameters = model
            .list_of("listOfParameters", "parameter")
            .map(|parameter| read_parameter(parameter, true))
            .collect::<Result<Vec<_>, _>>()?;

        let initial_assignments = model
            .list_of("listOfInitialAssignments", "initialAssignment")
            .map(InitialAssignment::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        let rules = model
            .child("listOfRules")
            .into_iter()
            .flat_map(|list| list.children.iter())
            .filter(|rule| {
                matches!(
                    rule.name.as_str(),
                    "assignmentRule" | "rateRule" | "algebraicRule"
                )
            })
            .map(Rule::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        let reactions = model
            .list_of("listOfReactions", "reaction")
            .map(Reaction::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        let events = model.list_of("listOfEvents", "event").count();

        let sbml_model = SBMLModel {
            id: model.attr("id").map(str::to_string),
            name: model.attr("name").map(str::to_string),
            level,
            function_definitions,
            compartments,
            species,
            parameters,
            initial_assignments,
            rules,
            reactions,
            events,
        };

        check_unique_ids(&sbml_model)?;

        Ok(sbml_model)
    }
}

impl TryFrom<&XmlElement> for FunctionDefinition {
    type Error = SBMLError;

    fn try_from(element: &XmlElement) -> Result<Self, Self::Error> {
        let id = required(element, "functionDefinition", "id")?;
        let math = element.child("math").ok_or(SBMLError::MissingAttribute {
            element: "functionDefinition",
            attribute: "math",
        })?;
        let lambda = parse_lambda(math).map_err(|source| SBMLError::MathError {
            id: id.clone(),
            source,
        })?;

        Ok(FunctionDefinition { id, lambda })
    }
}

impl TryFrom<&XmlElement> for Compartment {
    type Error = SBMLError;

    fn try_from(element: &XmlElement) -> Result<Self, Self::Error> {
        let id = required(element, "compartment", "id")?;

        // Level 1 and 2 call the size `volume`
        let size = optional_f64(element, &id, "size")?.or(optional_f64(element, &id, "volume")?);

        Ok(Compartment {
            name: element.attr("name").map(str::to_string),
            size,
            constant: optional_bool(element, &id, "constant")?.unwrap_or(true),
            id,
        })
    }
}

impl TryFrom<&XmlElement> for Species {
    type Error = SBMLError;

    fn try_from(element: &XmlElement) -> Result<Self, Self::Error> {
        let id = required(element, "species", "id")?;

        Ok(Species {
            name: element.attr("name").map(str::to_string),
            compartment: required(element, "species", "compartment")?,
            initial_amount: optional_f64(element, &id, "initialAmount")?,
            initial_concentration: optional_f64(element, &id, "initialConcentration")?,
            has_only_substance_units: optional_bool(element, &id, "hasOnlySubstanceUnits")?
                .unwrap_or(false),
            boundary_condition: optional_bool(element, &id, "boundaryCondition")?.unwrap_or(false),
            constant: optional_bool(element, &id, "constant")?.unwrap_or(false),
            id,
        })
    }
}

/// Reads a global (`parameter`) or local (`localParameter`) parameter
///
/// Local parameters are always constant; global ones default to constant.
fn read_parameter(element: &XmlElement, global: bool) -> Result<Parameter, SBMLError> {
    let id = required(element, "parameter", "id")?;
    let constant = if global {
        optional_bool(element, &id, "constant")?.unwrap_or(true)
    } else {
        true
    };

    Ok(Parameter {
        name: element.attr("name").map(str::to_string),
        value: optional_f64(element, &id, "value")?,
        constant,
        id,
    })
}

impl TryFrom<&XmlElement> for InitialAssignment {
    type Error = SBMLError;

    fn try_from(element: &XmlElement) -> Result<Self, Self::Error> {
        let symbol = required(element, "initialAssignment", "symbol")?;
        let math = read_math(element, &symbol)?;
        Ok(InitialAssignment { symbol, math })
    }
}

impl TryFrom<&XmlElement> for Rule {
    type Error = SBMLError;

    fn try_from(element: &XmlElement) -> Result<Self, Self::Error> {
        let kind = match element.name.as_str() {
            "assignmentRule" => RuleKind::Assignment,
            "rateRule" => RuleKind::Rate,
            _ => RuleKind::Algebraic,
        };

        let variable = match kind {
            RuleKind::Algebraic => None,
            _ => Some(required(element, "rule", "variable")?),
        };

        let context = variable.clone().unwrap_or_else(|| element.name.clone());
        let math = read_math(element, &context)?;

        Ok(Rule {
            kind,
            variable,
            math,
        })
    }
}

impl TryFrom<&XmlElement> for Reaction {
    type Error = SBMLError;

    fn try_from(element: &XmlElement) -> Result<Self, Self::Error> {
        let id = required(element, "reaction", "id")?;

        let reactants = element
            .list_of("listOfReactants", "speciesReference")
            .map(|reference| read_species_reference(reference, &id))
            .collect::<Result<Vec<_>, _>>()?;

        let products = element
            .list_of("listOfProducts", "speciesReference")
            .map(|reference| read_species_reference(reference, &id))
            .collect::<Result<Vec<_>, _>>()?;

        let kinetic_law = element
            .child("kineticLaw")
            .map(|law| read_kinetic_law(law, &id))
            .transpose()?;

        Ok(Reaction {
            id,
            reactants,
            products,
            kinetic_law,
        })
    }
}

fn read_species_reference(
    element: &XmlElement,
    reaction_id: &str,
) -> Result<SpeciesReference, SBMLError> {
    Ok(SpeciesReference {
        species: required(element, "speciesReference", "species")?,
        stoichiometry: optional_f64(element, reaction_id, "stoichiometry")?.unwrap_or(1.0),
        has_stoichiometry_math: element.child("stoichiometryMath").is_some(),
    })
}

fn read_kinetic_law(element: &XmlElement, reaction_id: &str) -> Result<KineticLaw, SBMLError> {
    let math = read_math(element, reaction_id)?;

    let local_parameters = element
        .list_of("listOfLocalParameters", "localParameter")
        .chain(element.list_of("listOfParameters", "parameter"))
        .map(|parameter| read_parameter(parameter, false))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(KineticLaw {
        math,
        local_parameters,
    })
}

fn read_math(element: &XmlElement, id: &str) -> Result<MathExpr, SBMLError> {
    let math = element.child("math").ok_or(SBMLError::MissingAttribute {
        element: "math container",
        attribute: "math",
    })?;

    MathExpr::from_math(math).map_err(|source| SBMLError::MathError {
        id: id.to_string(),
        source,
    })
}

fn required(
    element: &XmlElement,
    name: &'static str,
    attribute: &'static str,
) -> Result<String, SBMLError> {
    element
        .attr(attribute)
        .map(str::to_string)
        .ok_or(SBMLError::MissingAttribute {
            element: name,
            attribute,
        })
}

fn optional_f64(element: &XmlElement, id: &str, attribute: &str) -> Result<Option<f64>, SBMLError> {
    element
        .attr(attribute)
        .map(|value| {
            value.trim().parse::<f64>().map_err(|_| SBMLError::InvalidAttribute {
                id: id.to_string(),
                attribute: attribute.to_string(),
                value: value.to_string(),
            })
        })
        .transpose()
}

fn optional_bool(
    element: &XmlElement,
    id: &str,
    attribute: &str,
) -> Result<Option<bool>, SBMLError> {
    element
        .attr(attribute)
        .map(|value| match value.trim() {
            "true" | "1" => Ok(true),
            "false" | "0" => Ok(false),
            _ => Err(SBMLError::InvalidAttribute {
                id: id.to_string(),
                attribute: attribute.to_string(),
                value: value.to_string(),
            }),
        })
        .transpose()
}

/// Compartments, species, parameters, reactions and function definitions share one
/// identifier namespace.
fn check_unique_ids(model: &SBMLModel) -> Result<(), SBMLError> {
    let ids = model
        .function_definitions
        .iter()
        .map(|f| &f.id)
        .chain(model.compartments.iter().map(|c| &c.id))
        .chain(model.species.iter().map(|s| &s.id))
        .chain(model.parameters.iter().map(|p| &p.id))
        .chain(model.reactions.iter().map(|r| &r.id));

    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id.as_str()) {
            return Err(SBMLError::DuplicateId(id.clone()));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const MODEL: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<sbml xmlns="http://www.sbml.org/sbml/level2/version4" level="2" version="4">
  <model id="decay" name="Decay">
    <listOfFunctionDefinitions>
      <functionDefinition id="mass_action">
        <math xmlns="http://www.w3.org/1998/Math/MathML">
          <lambda><bvar><ci>k</ci></bvar><bvar><ci>s</ci></bvar>
            <apply><times/><ci>k</ci><ci>s</ci></apply>
          </lambda>
        </math>
      </functionDefinition>
    </listOfFunctionDefinitions>
    <listOfCompartments>
      <compartment id="cell" size="2"/>
    </listOfCompartments>
    <listOfSpecies>
      <species id="A" compartment="cell" initialConcentration="10"/>
      <species id="B" compartment="cell" initialAmount="0" hasOnlySubstanceUnits="true"/>
    </listOfSpecies>
    <listOfParameters>
      <parameter id="total" constant="false"/>
    </listOfParameters>
    <listOfRules>
      <assignmentRule variable="total">
        <math xmlns="http://www.w3.org/1998/Math/MathML">
          <apply><plus/><ci>A</ci><ci>B</ci></apply>
        </math>
      </assignmentRule>
    </listOfRules>
    <listOfReactions>
      <reaction id="R1" reversible="false">
        <listOfReactants><speciesReference species="A" stoichiometry="2"/></listOfReactants>
        <listOfProducts><speciesReference species="B"/></listOfProducts>
        <kineticLaw>
          <math xmlns="http://www.w3.org/1998/Math/MathML">
            <apply><times/><ci>cell</ci><apply><ci>mass_action</ci><ci>k</ci><ci>A</ci></apply></apply>
          </math>
          <listOfParameters><parameter id="k" value="0.5"/></listOfParameters>
        </kineticLaw>
      </reaction>
    </listOfReactions>
  </model>
</sbml>"#;

    #[test]
    fn test_read_level2_model() {
        let model = read_sbml(MODEL).unwrap();

        assert_eq!(model.id.as_deref(), Some("decay"));
        assert_eq!(model.level, 2);
        assert_eq!(model.compartments[0].size, Some(2.0));
        assert!(model.compartments[0].constant);
        assert_eq!(model.species.len(), 2);
        assert_eq!(model.species[0].initial_concentration, Some(10.0));
        assert!(model.species[1].has_only_substance_units);
        assert_eq!(model.rules[0].kind, RuleKind::Assignment);
        assert_eq!(model.rules[0].variable.as_deref(), Some("total"));

        let reaction = &model.reactions[0];
        assert_eq!(reaction.reactants[0].stoichiometry, 2.0);
        assert_eq!(reaction.products[0].stoichiometry, 1.0);

        let law = reaction.kinetic_law.as_ref().unwrap();
        assert_eq!(law.local_parameters[0].id, "k");
        assert_eq!(law.local_parameters[0].value, Some(0.5));
        assert_eq!(law.math.to_string(), "(cell * mass_action(k, A))");

        assert_eq!(model.default_observables(), vec!["A", "B", "total"]);
    }

    #[test]
    fn test_rejects_non_sbml() {
        assert!(matches!(
            read_sbml("<sedML/>"),
            Err(SBMLError::NotSBML(_))
        ));
        assert!(matches!(
            read_sbml("<sbml level=\"3\"/>"),
            Err(SBMLError::MissingModel)
        ));
    }

    #[test]
    fn test_duplicate_ids() {
        let xml = r#"<sbml><model>
            <listOfCompartments><compartment id="x"/></listOfCompartments>
            <listOfParameters><parameter id="x" value="1"/></listOfParameters>
        </model></sbml>"#;

        assert!(matches!(read_sbml(xml), Err(SBMLError::DuplicateId(id)) if id == "x"));
    }

    #[test]
    fn test_invalid_attribute() {
        let xml = r#"<sbml><model>
            <listOfParameters><parameter id="k" value="fast"/></listOfParameters>
        </model></sbml>"#;

        assert!(matches!(
            read_sbml(xml),
            Err(SBMLError::InvalidAttribute { .. })
        ));
    }
}
