//! ODE system compiled from an SBML model
//!
//! [`OdeSystem`] flattens a model into a vector of value *slots*: one per compartment,
//! species, global parameter, reaction (holding its flux) and reaction-local parameter.
//! All math is compiled against these slots into evalexpr operator trees, which are
//! evaluated in a [`Scope`] holding the current slot values.
//!
//! Evaluation at `(t, y)`:
//!
//! 1. the state vector `y` is copied into the state slots,
//! 2. assignment rules and reaction fluxes are evaluated in dependency order,
//! 3. each derivative is either a rate rule or the stoichiometry-weighted sum of the
//!    fluxes that change a species.
//!
//! Species are handled in the unit they appear in within math: concentration, unless
//! the species has only substance units. Fluxes are extents per time, so the change of
//! a concentration species is divided by the size of its compartment.

use std::collections::{HashMap, HashSet};

use evalexpr::EvalexprError;
use log::{debug, warn};
use peroxide::fuga::ODEProblem;

use crate::math::{CompiledExpr, Lambda, MathError, MathExpr, Operator, Scope};
use crate::sbml::model::{RuleKind, SBMLModel, Species};

use super::error::SimulationError;

/// Right-hand side of one state variable
#[derive(Debug, Clone)]
enum Derivative {
    /// Rate rule
    Rate(CompiledExpr),
    /// Sum of `stoichiometry * flux`, divided by the compartment size for
    /// concentration species
    Reactions {
        terms: Vec<(usize, f64)>,
        compartment: Option<usize>,
    },
}

/// A value computed from other slots: an assignment rule or a reaction flux
#[derive(Debug, Clone)]
struct Assignment {
    slot: usize,
    expr: CompiledExpr,
}

/// Compiled ODE system of an SBML model
#[derive(Debug, Clone)]
pub struct OdeSystem {
    /// Symbol names by slot; reaction-local parameters are named `reaction.parameter`
    names: Vec<String>,
    /// Global symbols to slots
    slots: HashMap<String, usize>,
    /// Slot values at the initial time
    initial_values: Vec<f64>,
    /// Slots integrated by the ODE solver, in state-vector order
    state_slots: Vec<usize>,
    derivatives: Vec<Derivative>,
    /// Assignment rules and fluxes in evaluation order
    assignments: Vec<Assignment>,
}

impl OdeSystem {
    /// Compiles `model` and computes its initial values at `initial_time`
    ///
    /// # Errors
    ///
    /// * [`SimulationError::Unsupported`] for events, algebraic rules,
    ///   `stoichiometryMath` and reactions without kinetic law
    /// * [`SimulationError::MathError`] for unknown symbols or functions
    /// * [`SimulationError::Cycle`] for cyclic assignments
    /// * [`SimulationError::MissingValue`] for symbols left without a value
    pub fn new(model: &SBMLModel, initial_time: f64) -> Result<Self, SimulationError> {
        check_supported(model)?;

        let mut builder = SystemBuilder::new(model);
        builder.declare_slots()?;

        let initial_values = builder.initial_values(initial_time)?;
        let (state_slots, derivatives) = builder.derivatives()?;
        let assignments = builder.runtime_assignments()?;

        debug!(
            "Compiled model with {} slots, {} state variables and {} assignments",
            builder.names.len(),
            state_slots.len(),
            assignments.len()
        );

        Ok(Self {
            names: builder.names,
            slots: builder.slots,
            initial_values,
            state_slots,
            derivatives,
            assignments,
        })
    }

    /// Initial state vector
    pub fn initial_state(&self) -> Vec<f64> {
        self.state_slots
            .iter()
            .map(|&slot| self.initial_values[slot])
            .collect()
    }

    /// Names of the state variables, in state-vector order
    pub fn state_names(&self) -> Vec<&str> {
        self.state_slots
            .iter()
            .map(|&slot| self.names[slot].as_str())
            .collect()
    }

    /// Slot of a global symbol
    pub fn slot(&self, id: &str) -> Option<usize> {
        self.slots.get(id).copied()
    }

    /// All slot values at `(t, y)`
    pub fn values(&self, t: f64, y: &[f64]) -> Result<Vec<f64>, EvalexprError> {
        self.evaluate(t, y).map(|(values, _)| values)
    }

    /// Slot values at `(t, y)` together with the scope they were computed in
    fn evaluate(&self, t: f64, y: &[f64]) -> Result<(Vec<f64>, Scope), EvalexprError> {
        let mut values = self.initial_values.clone();
        for (&slot, &value) in self.state_slots.iter().zip(y) {
            values[slot] = value;
        }

        let mut scope = Scope::new(&values, t)?;
        for assignment in &self.assignments {
            let value = assignment.expr.eval(&scope)?;
            values[assignment.slot] = value;
            scope.set(assignment.slot, value)?;
        }

        Ok((values, scope))
    }
}

impl ODEProblem for OdeSystem {
    fn rhs(&self, t: f64, y: &[f64], dy: &mut [f64]) -> anyhow::Result<()> {
        let (values, scope) = self.evaluate(t, y)?;

        for (derivative, dy) in self.derivatives.iter().zip(dy.iter_mut()) {
            *dy = match derivative {
                Derivative::Rate(expr) => expr.eval(&scope)?,
                Derivative::Reactions { terms, compartment } => {
                    let change: f64 = terms
                        .iter()
                        .map(|&(flux, stoichiometry)| stoichiometry * values[flux])
                        .sum();
                    match compartment {
                        Some(slot) => change / values[*slot],
                        None => change,
                    }
                }
            };
        }

        Ok(())
    }
}

fn check_supported(model: &SBMLModel) -> Result<(), SimulationError> {
    if model.events > 0 {
        return Err(SimulationError::Unsupported(format!(
            "{} event(s)",
            model.events
        )));
    }

    if model
        .rules
        .iter()
        .any(|rule| rule.kind == RuleKind::Algebraic)
    {
        return Err(SimulationError::Unsupported("algebraic rules".to_string()));
    }

    for reaction in &model.reactions {
        let mut references = reaction.reactants.iter().chain(&reaction.products);
        if references.any(|r| r.has_stoichiometry_math) {
            return Err(SimulationError::Unsupported(format!(
                "stoichiometryMath in reaction '{}'",
                reaction.id
            )));
        }
        if reaction.kinetic_law.is_none() {
            return Err(SimulationError::Unsupported(format!(
                "reaction '{}' without kinetic law",
                reaction.id
            )));
        }
    }

    Ok(())
}

/// Intermediate state while compiling a model
struct SystemBuilder<'a> {
    model: &'a SBMLModel,
    functions: HashMap<String, Lambda>,
    names: Vec<String>,
    slots: HashMap<String, usize>,
    /// Local parameter slots per reaction
    local_slots: HashMap<&'a str, HashMap<String, usize>>,
}

impl<'a> SystemBuilder<'a> {
    fn new(model: &'a SBMLModel) -> Self {
        Self {
            model,
            functions: model.functions(),
            names: Vec::new(),
            slots: HashMap::new(),
            local_slots: HashMap::new(),
        }
    }

    fn declare(&mut self, name: String) -> usize {
        let slot = self.names.len();
        self.names.push(name);
        slot
    }

    fn declare_slots(&mut self) -> Result<(), SimulationError> {
        let model = self.model;
        let globals = model
            .compartments
            .iter()
            .map(|c| &c.id)
            .chain(model.species.iter().map(|s| &s.id))
            .chain(model.parameters.iter().map(|p| &p.id))
            .chain(model.reactions.iter().map(|r| &r.id));

        for id in globals {
            let slot = self.declare(id.clone());
            self.slots.insert(id.clone(), slot);
        }

        for reaction in &model.reactions {
            let mut locals = HashMap::new();
            if let Some(law) = &reaction.kinetic_law {
                for parameter in &law.local_parameters {
                    let slot = self.declare(format!("{}.{}", reaction.id, parameter.id));
                    locals.insert(parameter.id.clone(), slot);
                }
            }
            self.local_slots.insert(reaction.id.as_str(), locals);
        }

        for species in &model.species {
            if !self.slots.contains_key(&species.compartment) {
                return Err(SimulationError::UnknownCompartment {
                    species: species.id.clone(),
                    compartment: species.compartment.clone(),
                });
            }
        }

        Ok(())
    }

    /// Expands function calls and resolves symbols, reaction-local scope first
    fn compile(
        &self,
        id: &str,
        expr: &MathExpr,
        reaction: Option<&str>,
    ) -> Result<CompiledExpr, SimulationError> {
        let wrap = |source: MathError| SimulationError::MathError {
            id: id.to_string(),
            source,
        };

        let locals = reaction.and_then(|reaction| self.local_slots.get(reaction));
        let resolve = |name: &str| {
            locals
                .and_then(|locals| locals.get(name))
                .or_else(|| self.slots.get(name))
                .copied()
        };

        expr.expand_functions(&self.functions)
            .and_then(|expanded| expanded.compile(&resolve))
            .map_err(wrap)
    }

    /// Size of a compartment as declared, before any assignment
    fn declared_size(&self, compartment: &str) -> f64 {
        self.model
            .compartments
            .iter()
            .find(|c| c.id == compartment)
            .and_then(|c| c.size)
            .unwrap_or(1.0)
    }

    fn species_value(&self, species: &Species) -> Option<f64> {
        let size = self.declared_size(&species.compartment);
        match (
            species.has_only_substance_units,
            species.initial_amount,
            species.initial_concentration,
        ) {
            (true, Some(amount), _) => Some(amount),
            (true, None, Some(concentration)) => Some(concentration * size),
            (false, _, Some(concentration)) => Some(concentration),
            (false, Some(amount), None) => Some(amount / size),
            (_, None, None) => None,
        }
    }

    /// Initial value of a species given in the other unit, as math over its compartment
    fn converted_initial_value(species: &Species) -> Option<MathExpr> {
        let compartment = MathExpr::Symbol(species.compartment.clone());
        match (
            species.has_only_substance_units,
            species.initial_amount,
            species.initial_concentration,
        ) {
            (true, None, Some(concentration)) => Some(MathExpr::Apply(
                Operator::Times,
                vec![MathExpr::Number(concentration), compartment],
            )),
            (false, Some(amount), None) => Some(MathExpr::Apply(
                Operator::Divide,
                vec![MathExpr::Number(amount), compartment],
            )),
            _ => None,
        }
    }

    /// Attribute values, then initial assignments, assignment rules and fluxes in
    /// dependency order
    fn initial_values(&self, initial_time: f64) -> Result<Vec<f64>, SimulationError> {
        let model = self.model;
        let mut values: Vec<Option<f64>> = vec![None; self.names.len()];

        for compartment in &model.compartments {
            let size = compartment.size.unwrap_or_else(|| {
                let assigned = model
                    .initial_assignments
                    .iter()
                    .any(|ia| ia.symbol == compartment.id)
                    || model.rule_for(&compartment.id).is_some();
                if !assigned {
                    warn!("Compartment '{}' has no size; assuming 1", compartment.id);
                }
                1.0
            });
            values[self.slots[&compartment.id]] = Some(size);
        }

        for species in &model.species {
            values[self.slots[&species.id]] = self.species_value(species);
        }

        for parameter in &model.parameters {
            values[self.slots[&parameter.id]] = parameter.value;
        }

        for reaction in &model.reactions {
            if let Some(law) = &reaction.kinetic_law {
                let locals = &self.local_slots[reaction.id.as_str()];
                for parameter in &law.local_parameters {
                    values[locals[&parameter.id]] = parameter.value;
                }
            }
        }

        let mut pending = Vec::new();
        let mut targeted = HashSet::new();

        for assignment in &model.initial_assignments {
            let slot = self.global_slot(&assignment.symbol)?;
            if targeted.insert(slot) {
                pending.push(Assignment {
                    slot,
                    expr: self.compile(&assignment.symbol, &assignment.math, None)?,
                });
            }
        }

        for rule in &model.rules {
            if let (RuleKind::Assignment, Some(variable)) = (rule.kind, &rule.variable) {
                let slot = self.global_slot(variable)?;
                if targeted.insert(slot) {
                    pending.push(Assignment {
                        slot,
                        expr: self.compile(variable, &rule.math, None)?,
                    });
                }
            }
        }

        // Unit conversions must see compartment sizes set by assignments
        for species in &model.species {
            let slot = self.slots[&species.id];
            if !targeted.contains(&self.slots[&species.compartment]) || targeted.contains(&slot) {
                continue;
            }
            if let Some(math) = Self::converted_initial_value(species) {
                targeted.insert(slot);
                pending.push(Assignment {
                    slot,
                    expr: self.compile(&species.id, &math, None)?,
                });
            }
        }

        pending.extend(self.fluxes()?);

        let ordered = order_assignments(pending, &self.names)?;
        let computed: HashSet<usize> = ordered.iter().map(|a| a.slot).collect();

        // Everything an assignment reads must be known before it is evaluated
        for assignment in &ordered {
            for &slot in assignment.expr.slots() {
                if values[slot].is_none() && !computed.contains(&slot) {
                    return Err(SimulationError::MissingValue(self.names[slot].clone()));
                }
            }
        }

        let evaluation = |source| SimulationError::EvalExpressionError {
            time: initial_time,
            source,
        };

        let mut resolved: Vec<f64> = values.iter().map(|v| v.unwrap_or(f64::NAN)).collect();
        let mut scope = Scope::new(&resolved, initial_time).map_err(evaluation)?;
        for assignment in &ordered {
            let value = assignment.expr.eval(&scope).map_err(evaluation)?;
            resolved[assignment.slot] = value;
            scope.set(assignment.slot, value).map_err(evaluation)?;
        }

        let read = self.read_slots()?;
        if let Some(slot) = (0..values.len())
            .find(|&slot| values[slot].is_none() && !computed.contains(&slot) && read.contains(&slot))
        {
            return Err(SimulationError::MissingValue(self.names[slot].clone()));
        }

        Ok(resolved)
    }

    /// Slots whose value matters to the simulation: species, rule targets and
    /// everything read by compiled math
    fn read_slots(&self) -> Result<HashSet<usize>, SimulationError> {
        let model = self.model;
        let mut read: HashSet<usize> = model
            .species
            .iter()
            .map(|species| self.slots[&species.id])
            .collect();

        for rule in &model.rules {
            let id = rule.variable.as_deref().unwrap_or_default();
            if let Some(variable) = &rule.variable {
                read.insert(self.global_slot(variable)?);
            }
            read.extend(self.compile(id, &rule.math, None)?.slots());
        }

        for assignment in &model.initial_assignments {
            read.extend(self.compile(&assignment.symbol, &assignment.math, None)?.slots());
        }

        for flux in self.fluxes()? {
            read.extend(flux.expr.slots());
        }

        Ok(read)
    }

    fn global_slot(&self, id: &str) -> Result<usize, SimulationError> {
        self.slots.get(id).copied().ok_or_else(|| SimulationError::MathError {
            id: id.to_string(),
            source: MathError::UnknownSymbol(id.to_string()),
        })
    }

    fn fluxes(&self) -> Result<Vec<Assignment>, SimulationError> {
        self.model
            .reactions
            .iter()
            .filter_map(|reaction| reaction.kinetic_law.as_ref().map(|law| (reaction, law)))
            .map(|(reaction, law)| {
                Ok(Assignment {
                    slot: self.slots[&reaction.id],
                    expr: self.compile(&reaction.id, &law.math, Some(&reaction.id))?,
                })
            })
            .collect()
    }

    /// Assignment rules and fluxes evaluated at every right-hand side call
    fn runtime_assignments(&self) -> Result<Vec<Assignment>, SimulationError> {
        let mut assignments = Vec::new();
        for rule in &self.model.rules {
            if let (RuleKind::Assignment, Some(variable)) = (rule.kind, &rule.variable) {
                assignments.push(Assignment {
                    slot: self.global_slot(variable)?,
                    expr: self.compile(variable, &rule.math, None)?,
                });
            }
        }
        assignments.extend(self.fluxes()?);

        order_assignments(assignments, &self.names)
    }

    /// State variables with their derivatives
    ///
    /// Rate rules come first in declaration order, then species changed by reactions.
    fn derivatives(&self) -> Result<(Vec<usize>, Vec<Derivative>), SimulationError> {
        let model = self.model;
        let mut state_slots = Vec::new();
        let mut derivatives = Vec::new();

        for rule in &model.rules {
            if let (RuleKind::Rate, Some(variable)) = (rule.kind, &rule.variable) {
                state_slots.push(self.global_slot(variable)?);
                derivatives.push(Derivative::Rate(self.compile(variable, &rule.math, None)?));
            }
        }

        for species in &model.species {
            if species.constant || species.boundary_condition || model.rule_for(&species.id).is_some()
            {
                continue;
            }

            let mut terms = Vec::new();
            for reaction in &model.reactions {
                let flux = self.slots[&reaction.id];
                let consumed = reaction.reactants.iter().map(|r| (r, -1.0));
                let produced = reaction.products.iter().map(|r| (r, 1.0));

                for (reference, sign) in consumed.chain(produced) {
                    if reference.species == species.id {
                        terms.push((flux, sign * reference.stoichiometry));
                    }
                }
            }

            if terms.is_empty() {
                continue;
            }

            let compartment = match species.has_only_substance_units {
                true => None,
                false => Some(self.slots[&species.compartment]),
            };

            state_slots.push(self.slots[&species.id]);
            derivatives.push(Derivative::Reactions { terms, compartment });
        }

        for reaction in &model.reactions {
            for reference in reaction.reactants.iter().chain(&reaction.products) {
                if !self.slots.contains_key(&reference.species) {
                    return Err(SimulationError::MathError {
                        id: reaction.id.clone(),
                        source: MathError::UnknownSymbol(reference.species.clone()),
                    });
                }
            }
        }

        Ok((state_slots, derivatives))
    }
}

/// Sorts assignments so that every assignment comes after the ones it reads
///
/// Declaration order is kept among independent assignments.
fn order_assignments(
    assignments: Vec<Assignment>,
    names: &[String],
) -> Result<Vec<Assignment>, SimulationError> {
    let assigned: HashSet<usize> = assignments.iter().map(|a| a.slot).collect();
    let mut remaining: Vec<(Assignment, HashSet<usize>)> = assignments
        .into_iter()
        .map(|assignment| {
            let dependencies = assignment
                .expr
                .slots()
                .iter()
                .copied()
                .filter(|slot| assigned.contains(slot) && *slot != assignment.slot)
                .collect();
            (assignment, dependencies)
        })
        .collect();

    let mut ordered: Vec<Assignment> = Vec::with_capacity(remaining.len());
    let mut done: HashSet<usize> = HashSet::new();

    while !remaining.is_empty() {
        let ready = remaining
            .iter()
            .position(|(_, dependencies)| dependencies.is_subset(&done))
            .ok_or_else(|| SimulationError::Cycle(names[remaining[0].0.slot].clone()))?;

        let (assignment, _) = remaining.remove(ready);
        done.insert(assignment.slot);
        ordered.push(assignment);
    }

    // An assignment reading its own target is circular as well
    if let Some(assignment) = ordered
        .iter()
        .find(|a| a.expr.slots().contains(&a.slot))
    {
        return Err(SimulationError::Cycle(names[assignment.slot].clone()));
    }

    Ok(ordered)
}
