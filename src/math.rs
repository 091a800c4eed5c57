//! MathML expressions
//!
//! SBML kinetic laws, rules and initial assignments as well as SED-ML data generators
//! carry their mathematics as content MathML. This module turns such a `<math>` element
//! into a [`MathExpr`] tree and expands user-defined functions. Evaluation is left to
//! `evalexpr`: [`MathExpr::compile`] lowers the tree to an evalexpr operator tree whose
//! variables are the slots of a flat value vector (`s0`, `s1`, ...) plus `time`, and
//! a [`Scope`] binds those variables for one evaluation.
//!
//! Relational and logical operators yield truth values; where MathML uses them as
//! numbers they become `1.0` / `0.0`.

use std::collections::{BTreeSet, HashMap};
use std::fmt::{self, Display};

use evalexpr::{
    build_operator_tree, ContextWithMutableFunctions, ContextWithMutableVariables,
    EvalexprError, EvalexprResult, Function, HashMapContext, Node, Value,
};
use thiserror::Error;

use crate::xml::XmlElement;

/// Maximum nesting of function definitions calling each other
const MAX_EXPANSION_DEPTH: usize = 64;

/// Errors raised while reading, expanding or compiling MathML
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MathError {
    #[error("Empty <math> element")]
    Empty,
    #[error("Unsupported MathML element <{0}>")]
    UnsupportedElement(String),
    #[error("Unsupported MathML csymbol '{0}'")]
    UnsupportedCsymbol(String),
    #[error("Invalid MathML number '{0}'")]
    InvalidNumber(String),
    #[error("Operator '{operator}' expects {expected} argument(s), found {found}")]
    Arity {
        operator: Operator,
        expected: &'static str,
        found: usize,
    },
    #[error("Unknown function '{0}'")]
    UnknownFunction(String),
    #[error("Function '{function}' expects {expected} argument(s), found {found}")]
    FunctionArity {
        function: String,
        expected: usize,
        found: usize,
    },
    #[error("Function definitions nest deeper than {0} levels")]
    ExpansionTooDeep(usize),
    #[error("Unknown symbol '{0}'")]
    UnknownSymbol(String),
    #[error("Failed to build expression '{expression}': {message}")]
    Expression { expression: String, message: String },
}

/// MathML operators understood by the evaluator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Plus,
    Minus,
    Times,
    Divide,
    Power,
    Root,
    Exp,
    Ln,
    Log,
    Abs,
    Floor,
    Ceiling,
    Factorial,
    Quotient,
    Rem,
    Min,
    Max,
    Sin,
    Cos,
    Tan,
    Sec,
    Csc,
    Cot,
    Sinh,
    Cosh,
    Tanh,
    Arcsin,
    Arccos,
    Arctan,
    Arcsinh,
    Arccosh,
    Arctanh,
    Eq,
    Neq,
    Gt,
    Lt,
    Geq,
    Leq,
    And,
    Or,
    Xor,
    Not,
}

impl Operator {
    /// Maps a MathML element name to its operator
    fn from_element(name: &str) -> Option<Self> {
        let operator = match name {
            "plus" => Self::Plus,
            "minus" => Self::Minus,
            "times" => Self::Times,
            "divide" => Self::Divide,
            "power" => Self::Power,
            "root" => Self::Root,
            "exp" => Self::Exp,
            "ln" => Self::Ln,
            "log" => Self::Log,
            "abs" => Self::Abs,
            "floor" => Self::Floor,
            "ceiling" => Self::Ceiling,
            "factorial" => Self::Factorial,
            "quotient" => Self::Quotient,
            "rem" => Self::Rem,
            "min" => Self::Min,
            "max" => Self::Max,
            "sin" => Self::Sin,
            "cos" => Self::Cos,
            "tan" => Self::Tan,
            "sec" => Self::Sec,
            "csc" => Self::Csc,
            "cot" => Self::Cot,
            "sinh" => Self::Sinh,
            "cosh" => Self::Cosh,
            "tanh" => Self::Tanh,
            "arcsin" => Self::Arcsin,
            "arccos" => Self::Arccos,
            "arctan" => Self::Arctan,
            "arcsinh" => Self::Arcsinh,
            "arccosh" => Self::Arccosh,
            "arctanh" => Self::Arctanh,
            "eq" => Self::Eq,
            "neq" => Self::Neq,
            "gt" => Self::Gt,
            "lt" => Self::Lt,
            "geq" => Self::Geq,
            "leq" => Self::Leq,
            "and" => Self::And,
            "or" => Self::Or,
            "xor" => Self::Xor,
            "not" => Self::Not,
            _ => return None,
        };
        Some(operator)
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Plus => "plus",
            Self::Minus => "minus",
            Self::Times => "times",
            Self::Divide => "divide",
            Self::Power => "power",
            Self::Root => "root",
            Self::Exp => "exp",
            Self::Ln => "ln",
            Self::Log => "log",
            Self::Abs => "abs",
            Self::Floor => "floor",
            Self::Ceiling => "ceiling",
            Self::Factorial => "factorial",
            Self::Quotient => "quotient",
            Self::Rem => "rem",
            Self::Min => "min",
            Self::Max => "max",
            Self::Sin => "sin",
            Self::Cos => "cos",
            Self::Tan => "tan",
            Self::Sec => "sec",
            Self::Csc => "csc",
            Self::Cot => "cot",
            Self::Sinh => "sinh",
            Self::Cosh => "cosh",
            Self::Tanh => "tanh",
            Self::Arcsin => "arcsin",
            Self::Arccos => "arccos",
            Self::Arctan => "arctan",
            Self::Arcsinh => "arcsinh",
            Self::Arccosh => "arccosh",
            Self::Arctanh => "arctanh",
            Self::Eq => "eq",
            Self::Neq => "neq",
            Self::Gt => "gt",
            Self::Lt => "lt",
            Self::Geq => "geq",
            Self::Leq => "leq",
            Self::And => "and",
            Self::Or => "or",
            Self::Xor => "xor",
            Self::Not => "not",
        }
    }

    /// Validates the number of operands; `Root` and `Log` are checked after their
    /// qualifier has been prepended.
    fn check_arity(self, found: usize) -> Result<(), MathError> {
        let (ok, expected) = match self {
            Self::Plus | Self::Times | Self::And | Self::Or | Self::Xor => (true, "any number of"),
            Self::Min | Self::Max => (found >= 1, "at least 1"),
            Self::Minus => (found == 1 || found == 2, "1 or 2"),
            Self::Eq | Self::Gt | Self::Lt | Self::Geq | Self::Leq => (found >= 2, "at least 2"),
            Self::Neq
            | Self::Divide
            | Self::Power
            | Self::Root
            | Self::Log
            | Self::Quotient
            | Self::Rem => (found == 2, "2"),
            _ => (found == 1, "1"),
        };

        if ok {
            Ok(())
        } else {
            Err(MathError::Arity {
                operator: self,
                expected,
                found,
            })
        }
    }

    /// Whether the operator yields a truth value
    fn is_boolean(self) -> bool {
        matches!(
            self,
            Self::Eq
                | Self::Neq
                | Self::Gt
                | Self::Lt
                | Self::Geq
                | Self::Leq
                | Self::And
                | Self::Or
                | Self::Xor
                | Self::Not
        )
    }

    /// Name of the context function implementing the operator, if any
    fn function(self) -> Option<&'static str> {
        match self {
            Self::Exp
            | Self::Ln
            | Self::Abs
            | Self::Floor
            | Self::Ceiling
            | Self::Factorial
            | Self::Sin
            | Self::Cos
            | Self::Tan
            | Self::Sec
            | Self::Csc
            | Self::Cot
            | Self::Sinh
            | Self::Cosh
            | Self::Tanh
            | Self::Arcsin
            | Self::Arccos
            | Self::Arctan
            | Self::Arcsinh
            | Self::Arccosh
            | Self::Arctanh
            | Self::Quotient
            | Self::Rem
            | Self::Min
            | Self::Max => Some(self.name()),
            _ => None,
        }
    }
}

impl Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Largest argument whose factorial is finite
const MAX_FACTORIAL: f64 = 170.0;

fn factorial(x: f64) -> f64 {
    if x < 0.0 || x.fract() != 0.0 {
        return f64::NAN;
    }
    if x > MAX_FACTORIAL {
        return f64::INFINITY;
    }
    (1..=(x as u64)).fold(1.0, |acc, k| acc * k as f64)
}

/// A MathML expression tree
#[derive(Debug, Clone, PartialEq)]
pub enum MathExpr {
    /// Numeric literal (`<cn>` and the MathML constants)
    Number(f64),
    /// Reference to a model or data generator symbol (`<ci>`)
    Symbol(String),
    /// Simulation time (`csymbol …/time`)
    Time,
    /// Operator application
    Apply(Operator, Vec<MathExpr>),
    /// Call of a user-defined function
    Call(String, Vec<MathExpr>),
    /// `<piecewise>` with its `(value, condition)` pieces and optional `<otherwise>`
    Piecewise {
        pieces: Vec<(MathExpr, MathExpr)>,
        otherwise: Option<Box<MathExpr>>,
    },
}

/// A user-defined function (`lambda`), as found in SBML function definitions
#[derive(Debug, Clone, PartialEq)]
pub struct Lambda {
    pub parameters: Vec<String>,
    pub body: MathExpr,
}

impl MathExpr {
    /// Reads the expression contained in a `<math>` element
    pub fn from_math(math: &XmlElement) -> Result<Self, MathError> {
        let node = math.children.first().ok_or(MathError::Empty)?;
        Self::from_node(node)
    }

    /// Reads a single content MathML node
    pub fn from_node(node: &XmlElement) -> Result<Self, MathError> {
        match node.name.as_str() {
            "cn" => parse_number(node).map(MathExpr::Number),
            "ci" => Ok(MathExpr::Symbol(node.text.trim().to_string())),
            "csymbol" => parse_csymbol(node),
            "true" => Ok(MathExpr::Number(1.0)),
            "false" => Ok(MathExpr::Number(0.0)),
            "pi" => Ok(MathExpr::Number(std::f64::consts::PI)),
            "exponentiale" => Ok(MathExpr::Number(std::f64::consts::E)),
            "infinity" => Ok(MathExpr::Number(f64::INFINITY)),
            "notanumber" => Ok(MathExpr::Number(f64::NAN)),
            "apply" => parse_apply(node),
            "piecewise" => parse_piecewise(node),
            "semantics" => node
                .children
                .first()
                .ok_or(MathError::Empty)
                .and_then(Self::from_node),
            other => Err(MathError::UnsupportedElement(other.to_string())),
        }
    }

    /// Replaces calls of user-defined functions by their bodies
    ///
    /// # Errors
    ///
    /// Fails on calls of unknown functions, argument count mismatches and on
    /// (mutually) recursive definitions.
    pub fn expand_functions(
        &self,
        functions: &HashMap<String, Lambda>,
    ) -> Result<MathExpr, MathError> {
        self.expand(functions, 0)
    }

    fn expand(
        &self,
        functions: &HashMap<String, Lambda>,
        depth: usize,
    ) -> Result<MathExpr, MathError> {
        if depth > MAX_EXPANSION_DEPTH {
            return Err(MathError::ExpansionTooDeep(MAX_EXPANSION_DEPTH));
        }

        match self {
            MathExpr::Call(name, args) => {
                let lambda = functions
                    .get(name)
                    .ok_or_else(|| MathError::UnknownFunction(name.clone()))?;
                if lambda.parameters.len() != args.len() {
                    return Err(MathError::FunctionArity {
                        function: name.clone(),
                        expected: lambda.parameters.len(),
                        found: args.len(),
                    });
                }

                let bindings = lambda
                    .parameters
                    .iter()
                    .cloned()
                    .zip(
                        args.iter()
                            .map(|arg| arg.expand(functions, depth))
                            .collect::<Result<Vec<_>, _>>()?,
                    )
                    .collect::<HashMap<_, _>>();

                lambda.body.substitute(&bindings).expand(functions, depth + 1)
            }
            MathExpr::Apply(operator, args) => Ok(MathExpr::Apply(
                *operator,
                args.iter()
                    .map(|arg| arg.expand(functions, depth))
                    .collect::<Result<_, _>>()?,
            )),
            MathExpr::Piecewise { pieces, otherwise } => Ok(MathExpr::Piecewise {
                pieces: pieces
                    .iter()
                    .map(|(value, condition)| {
                        Ok((
                            value.expand(functions, depth)?,
                            condition.expand(functions, depth)?,
                        ))
                    })
                    .collect::<Result<_, MathError>>()?,
                otherwise: otherwise
                    .as_ref()
                    .map(|other| other.expand(functions, depth).map(Box::new))
                    .transpose()?,
            }),
            MathExpr::Number(_) | MathExpr::Symbol(_) | MathExpr::Time => Ok(self.clone()),
        }
    }

    /// Substitutes symbols by expressions (used to bind lambda parameters)
    fn substitute(&self, bindings: &HashMap<String, MathExpr>) -> MathExpr {
        match self {
            MathExpr::Symbol(name) => bindings.get(name).cloned().unwrap_or_else(|| self.clone()),
            MathExpr::Apply(operator, args) => MathExpr::Apply(
                *operator,
                args.iter().map(|arg| arg.substitute(bindings)).collect(),
            ),
            MathExpr::Call(name, args) => MathExpr::Call(
                name.clone(),
                args.iter().map(|arg| arg.substitute(bindings)).collect(),
            ),
            MathExpr::Piecewise { pieces, otherwise } => MathExpr::Piecewise {
                pieces: pieces
                    .iter()
                    .map(|(value, condition)| {
                        (value.substitute(bindings), condition.substitute(bindings))
                    })
                    .collect(),
                otherwise: otherwise
                    .as_ref()
                    .map(|other| Box::new(other.substitute(bindings))),
            },
            MathExpr::Number(_) | MathExpr::Time => self.clone(),
        }
    }

    /// Lowers the expression to an evalexpr operator tree whose variables are slots
    ///
    /// Symbols are resolved to slot indices with `resolve`. Function calls must have
    /// been expanded beforehand.
    pub fn compile<F>(&self, resolve: &F) -> Result<CompiledExpr, MathError>
    where
        F: Fn(&str) -> Option<usize>,
    {
        let source = self.lower(resolve, Kind::Number)?;
        let node = build_operator_tree(&source).map_err(|err| MathError::Expression {
            expression: source.clone(),
            message: err.to_string(),
        })?;

        let slots = node
            .iter_variable_identifiers()
            .filter_map(slot_of_identifier)
            .collect();

        Ok(CompiledExpr {
            source,
            node,
            slots,
        })
    }

    fn is_boolean(&self) -> bool {
        matches!(self, MathExpr::Apply(operator, _) if operator.is_boolean())
    }

    /// Writes the expression as evalexpr source of the requested kind
    fn lower<F>(&self, resolve: &F, kind: Kind) -> Result<String, MathError>
    where
        F: Fn(&str) -> Option<usize>,
    {
        let natural = if self.is_boolean() {
            Kind::Boolean
        } else {
            Kind::Number
        };
        let source = self.lower_natural(resolve)?;

        Ok(match (natural, kind) {
            (Kind::Boolean, Kind::Number) => format!("{}({}, 1.0, 0.0)", PIECEWISE, source),
            (Kind::Number, Kind::Boolean) => format!("({} != 0.0)", source),
            _ => source,
        })
    }

    fn lower_natural<F>(&self, resolve: &F) -> Result<String, MathError>
    where
        F: Fn(&str) -> Option<usize>,
    {
        Ok(match self {
            MathExpr::Number(value) => number_literal(*value),
            MathExpr::Time => TIME_IDENTIFIER.to_string(),
            MathExpr::Symbol(name) => slot_identifier(
                resolve(name).ok_or_else(|| MathError::UnknownSymbol(name.clone()))?,
            ),
            MathExpr::Call(name, _) => return Err(MathError::UnknownFunction(name.clone())),
            MathExpr::Piecewise { pieces, otherwise } => {
                if pieces.is_empty() && otherwise.is_none() {
                    return Ok(number_literal(f64::NAN));
                }

                let mut arguments = Vec::with_capacity(pieces.len() * 2 + 1);
                for (value, condition) in pieces {
                    arguments.push(condition.lower(resolve, Kind::Boolean)?);
                    arguments.push(value.lower(resolve, Kind::Number)?);
                }
                if let Some(otherwise) = otherwise {
                    arguments.push(otherwise.lower(resolve, Kind::Number)?);
                }
                format!("{}({})", PIECEWISE, arguments.join(", "))
            }
            MathExpr::Apply(operator, args) => {
                operator.check_arity(args.len())?;
                lower_apply(*operator, args, resolve)?
            }
        })
    }
}

/// Lowers an operator application whose arity has been checked
fn lower_apply<F>(operator: Operator, args: &[MathExpr], resolve: &F) -> Result<String, MathError>
where
    F: Fn(&str) -> Option<usize>,
{
    let lower_all = |kind: Kind| {
        args.iter()
            .map(|arg| arg.lower(resolve, kind))
            .collect::<Result<Vec<_>, MathError>>()
    };
    let infix = |operands: Vec<String>, symbol: &str, empty: &str| match operands.len() {
        0 => empty.to_string(),
        _ => format!("({})", operands.join(symbol)),
    };
    // a < b < c is read as a < b && b < c
    let chain = |symbol: &str| -> Result<String, MathError> {
        let pairs = lower_all(Kind::Number)?
            .windows(2)
            .map(|pair| format!("({} {} {})", pair[0], symbol, pair[1]))
            .collect::<Vec<_>>();
        Ok(infix(pairs, " && ", "true"))
    };

    let numbers = || lower_all(Kind::Number);
    Ok(match operator {
        Operator::Plus => infix(numbers()?, " + ", "0.0"),
        Operator::Times => infix(numbers()?, " * ", "1.0"),
        Operator::Minus if args.len() == 1 => format!("(-{})", numbers()?[0]),
        Operator::Minus => infix(numbers()?, " - ", "0.0"),
        Operator::Divide => infix(numbers()?, " / ", "1.0"),
        Operator::Power => infix(numbers()?, " ^ ", "1.0"),
        Operator::Root => {
            let operands = numbers()?;
            format!("({} ^ (1.0 / {}))", operands[1], operands[0])
        }
        Operator::Log => {
            let operands = numbers()?;
            format!("({}({}) / {}({}))", Operator::Ln, operands[1], Operator::Ln, operands[0])
        }
        Operator::Min | Operator::Max if args.len() == 1 => numbers()?.remove(0),
        Operator::Eq => chain("==")?,
        Operator::Neq => chain("!=")?,
        Operator::Gt => chain(">")?,
        Operator::Lt => chain("<")?,
        Operator::Geq => chain(">=")?,
        Operator::Leq => chain("<=")?,
        Operator::And => infix(lower_all(Kind::Boolean)?, " && ", "true"),
        Operator::Or => infix(lower_all(Kind::Boolean)?, " || ", "false"),
        // Exclusive or of truth values is their inequality
        Operator::Xor => lower_all(Kind::Boolean)?
            .into_iter()
            .reduce(|acc, operand| format!("({} != {})", acc, operand))
            .unwrap_or_else(|| "false".to_string()),
        Operator::Not => format!("(!{})", lower_all(Kind::Boolean)?[0]),
        other => match other.function() {
            Some(function) => format!("{}({})", function, numbers()?.join(", ")),
            None => return Err(MathError::UnsupportedElement(other.to_string())),
        },
    })
}

impl Display for MathExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MathExpr::Number(value) => write!(f, "{}", value),
            MathExpr::Symbol(name) => f.write_str(name),
            MathExpr::Time => f.write_str("time"),
            MathExpr::Apply(operator, args) => {
                let infix = match operator {
                    Operator::Plus => Some(" + "),
                    Operator::Minus if args.len() == 2 => Some(" - "),
                    Operator::Times => Some(" * "),
                    Operator::Divide => Some(" / "),
                    Operator::Power => Some("^"),
                    _ => None,
                };
                match infix {
                    Some(separator) => {
                        let parts = args.iter().map(|arg| arg.to_string()).collect::<Vec<_>>();
                        write!(f, "({})", parts.join(separator))
                    }
                    None if *operator == Operator::Minus => write!(f, "-{}", args[0]),
                    None => {
                        let parts = args.iter().map(|arg| arg.to_string()).collect::<Vec<_>>();
                        write!(f, "{}({})", operator, parts.join(", "))
                    }
                }
            }
            MathExpr::Call(name, args) => {
                let parts = args.iter().map(|arg| arg.to_string()).collect::<Vec<_>>();
                write!(f, "{}({})", name, parts.join(", "))
            }
            MathExpr::Piecewise { pieces, otherwise } => {
                f.write_str("piecewise(")?;
                for (value, condition) in pieces {
                    write!(f, "{}, {}, ", value, condition)?;
                }
                match otherwise {
                    Some(other) => write!(f, "{})", other),
                    None => f.write_str("nan)"),
                }
            }
        }
    }
}

/// Kind of value an expression is lowered to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Number,
    Boolean,
}

/// Variable holding the simulation time in compiled expressions
const TIME_IDENTIFIER: &str = "time";

/// Context function selecting the value of the first piece whose condition holds
const PIECEWISE: &str = "piecewise";

fn slot_identifier(slot: usize) -> String {
    format!("s{}", slot)
}

fn slot_of_identifier(identifier: &str) -> Option<usize> {
    identifier.strip_prefix('s')?.parse().ok()
}

/// Formats a number so that evalexpr reads it as a float
fn number_literal(value: f64) -> String {
    if value.is_nan() {
        return "(0.0 / 0.0)".to_string();
    }
    if value.is_infinite() {
        return match value > 0.0 {
            true => "(1.0 / 0.0)".to_string(),
            false => "(-1.0 / 0.0)".to_string(),
        };
    }

    // Display never uses exponent notation
    let mut literal = value.abs().to_string();
    if !literal.contains('.') {
        literal.push_str(".0");
    }
    match value.is_sign_negative() {
        true => format!("(-{})", literal),
        false => literal,
    }
}

/// An expression lowered to an evalexpr operator tree over slot variables
#[derive(Debug, Clone)]
pub struct CompiledExpr {
    source: String,
    node: Node,
    slots: BTreeSet<usize>,
}

impl CompiledExpr {
    /// The evalexpr source the expression was built from
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Slots this expression reads from
    pub fn slots(&self) -> &BTreeSet<usize> {
        &self.slots
    }

    /// Evaluates the expression in `scope`
    ///
    /// A piecewise expression without a matching piece and without `<otherwise>`
    /// evaluates to NaN, which the integrator reports as a numerical failure.
    pub fn eval(&self, scope: &Scope) -> EvalexprResult<f64> {
        self.node.eval_number_with_context(&scope.context)
    }
}

/// Slot values and time that compiled expressions are evaluated against
pub struct Scope {
    context: HashMapContext,
}

impl Scope {
    /// Creates a scope at time `t` holding `values` in slots `0..values.len()`
    pub fn new(values: &[f64], t: f64) -> EvalexprResult<Self> {
        let mut context = HashMapContext::new();
        context.set_value(TIME_IDENTIFIER.into(), Value::Float(t))?;
        register_functions(&mut context)?;

        let mut scope = Self { context };
        for (slot, value) in values.iter().enumerate() {
            scope.set(slot, *value)?;
        }
        Ok(scope)
    }

    /// Sets the value of a slot
    pub fn set(&mut self, slot: usize, value: f64) -> EvalexprResult<()> {
        self.context
            .set_value(slot_identifier(slot), Value::Float(value))
    }
}

/// Registers the MathML functions evalexpr has no operator for
fn register_functions(context: &mut HashMapContext) -> EvalexprResult<()> {
    let unary: [(Operator, fn(f64) -> f64); 21] = [
        (Operator::Exp, f64::exp),
        (Operator::Ln, f64::ln),
        (Operator::Abs, f64::abs),
        (Operator::Floor, f64::floor),
        (Operator::Ceiling, f64::ceil),
        (Operator::Factorial, factorial),
        (Operator::Sin, f64::sin),
        (Operator::Cos, f64::cos),
        (Operator::Tan, f64::tan),
        (Operator::Sec, |x| 1.0 / x.cos()),
        (Operator::Csc, |x| 1.0 / x.sin()),
        (Operator::Cot, |x| 1.0 / x.tan()),
        (Operator::Sinh, f64::sinh),
        (Operator::Cosh, f64::cosh),
        (Operator::Tanh, f64::tanh),
        (Operator::Arcsin, f64::asin),
        (Operator::Arccos, f64::acos),
        (Operator::Arctan, f64::atan),
        (Operator::Arcsinh, f64::asinh),
        (Operator::Arccosh, f64::acosh),
        (Operator::Arctanh, f64::atanh),
    ];

    for (operator, function) in unary {
        context.set_function(
            operator.name().into(),
            Function::new(move |argument: &Value| Ok(Value::Float(function(argument.as_number()?)))),
        )?;
    }

    let binary: [(Operator, fn(f64, f64) -> f64); 2] = [
        (Operator::Quotient, |a, b| (a / b).trunc()),
        (Operator::Rem, |a, b| a % b),
    ];

    for (operator, function) in binary {
        context.set_function(
            operator.name().into(),
            Function::new(move |argument: &Value| match arguments(argument)?.as_slice() {
                [a, b] => Ok(Value::Float(function(a.as_number()?, b.as_number()?))),
                other => Err(EvalexprError::CustomMessage(format!(
                    "'{}' expects 2 arguments, found {}",
                    operator,
                    other.len()
                ))),
            }),
        )?;
    }

    let folds: [(Operator, f64, fn(f64, f64) -> f64); 2] = [
        (Operator::Min, f64::INFINITY, f64::min),
        (Operator::Max, f64::NEG_INFINITY, f64::max),
    ];

    for (operator, initial, function) in folds {
        context.set_function(
            operator.name().into(),
            Function::new(move |argument: &Value| {
                arguments(argument)?
                    .iter()
                    .try_fold(initial, |acc, value| {
                        Ok::<f64, EvalexprError>(function(acc, value.as_number()?))
                    })
                    .map(Value::Float)
            }),
        )?;
    }

    context.set_function(
        PIECEWISE.into(),
        Function::new(|argument: &Value| {
            let values = arguments(argument)?;
            let mut rest = values.as_slice();

            while let [condition, value, tail @ ..] = rest {
                if condition.as_boolean()? {
                    return Ok(Value::Float(value.as_number()?));
                }
                rest = tail;
            }

            match rest {
                [otherwise] => Ok(Value::Float(otherwise.as_number()?)),
                _ => Ok(Value::Float(f64::NAN)),
            }
        }),
    )
}

/// The arguments of a context function call as a list
fn arguments(argument: &Value) -> EvalexprResult<Vec<Value>> {
    match argument {
        Value::Tuple(values) => Ok(values.clone()),
        value => Ok(vec![value.clone()]),
    }
}

/// Reads a `<lambda>` element (the body of an SBML function definition)
pub fn parse_lambda(math: &XmlElement) -> Result<Lambda, MathError> {
    let lambda = if math.name == "lambda" {
        math
    } else {
        math.child("lambda")
            .or_else(|| math.child("semantics").and_then(|s| s.child("lambda")))
            .ok_or_else(|| MathError::UnsupportedElement(math.name.clone()))?
    };

    let parameters = lambda
        .children_named("bvar")
        .filter_map(|bvar| bvar.child("ci"))
        .map(|ci| ci.text.trim().to_string())
        .collect();

    let body = lambda
        .children
        .iter()
        .rfind(|child| child.name != "bvar")
        .ok_or(MathError::Empty)?;

    Ok(Lambda {
        parameters,
        body: MathExpr::from_node(body)?,
    })
}

fn parse_number(node: &XmlElement) -> Result<f64, MathError> {
    let text = node.text.trim();
    let invalid = || MathError::InvalidNumber(text.to_string());
    let parse = |s: &str| s.trim().parse::<f64>().map_err(|_| invalid());

    match node.attr("type").unwrap_or("real") {
        "e-notation" | "rational" => {
            let mut parts = text.split_whitespace();
            let (first, second) = (parts.next().ok_or_else(invalid)?, parts.next().ok_or_else(invalid)?);
            let (a, b) = (parse(first)?, parse(second)?);
            if node.attr("type") == Some("rational") {
                Ok(a / b)
            } else {
                Ok(a * 10f64.powf(b))
            }
        }
        _ => match text {
            "INF" | "inf" => Ok(f64::INFINITY),
            "-INF" | "-inf" => Ok(f64::NEG_INFINITY),
            "NaN" => Ok(f64::NAN),
            _ => parse(text),
        },
    }
}

fn parse_csymbol(node: &XmlElement) -> Result<MathExpr, MathError> {
    let url = node.attr("definitionURL").unwrap_or_default();
    match url.rsplit('/').next() {
        Some("time") => Ok(MathExpr::Time),
        Some("avogadro") => Ok(MathExpr::Number(6.02214076e23)),
        _ => Err(MathError::UnsupportedCsymbol(url.to_string())),
    }
}

fn parse_apply(node: &XmlElement) -> Result<MathExpr, MathError> {
    let (head, rest) = node.children.split_first().ok_or(MathError::Empty)?;

    let qualifier = |name: &str| {
        rest.iter()
            .find(|child| child.name == name)
            .and_then(|q| q.children.first())
            .map(MathExpr::from_node)
            .transpose()
    };
    let operands = rest
        .iter()
        .filter(|child| !matches!(child.name.as_str(), "degree" | "logbase" | "bvar"))
        .map(MathExpr::from_node)
        .collect::<Result<Vec<_>, _>>()?;

    if head.name == "ci" {
        return Ok(MathExpr::Call(head.text.trim().to_string(), operands));
    }

    let operator = Operator::from_element(&head.name)
        .ok_or_else(|| MathError::UnsupportedElement(head.name.clone()))?;

    let mut args = operands;
    match operator {
        Operator::Root => args.insert(0, qualifier("degree")?.unwrap_or(MathExpr::Number(2.0))),
        Operator::Log => args.insert(0, qualifier("logbase")?.unwrap_or(MathExpr::Number(10.0))),
        _ => {}
    }
    operator.check_arity(args.len())?;

    Ok(MathExpr::Apply(operator, args))
}

fn parse_piecewise(node: &XmlElement) -> Result<MathExpr, MathError> {
    let pieces = node
        .children_named("piece")
        .map(|piece| match piece.children.as_slice() {
            [value, condition] => Ok((MathExpr::from_node(value)?, MathExpr::from_node(condition)?)),
            _ => Err(MathError::UnsupportedElement("piece".to_string())),
        })
        .collect::<Result<Vec<_>, _>>()?;

    let otherwise = node
        .child("otherwise")
        .and_then(|other| other.children.first())
        .map(|expr| MathExpr::from_node(expr).map(Box::new))
        .transpose()?;

    Ok(MathExpr::Piecewise { pieces, otherwise })
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::xml::parse_document;

    fn read(xml: &str) -> MathExpr {
        MathExpr::from_math(&parse_document(xml).unwrap()).unwrap()
    }

    fn compile(expr: &MathExpr, names: &[&str]) -> CompiledExpr {
        expr.compile(&|name: &str| names.iter().position(|n| *n == name))
            .unwrap()
    }

    fn eval(expr: &MathExpr, symbols: &[(&str, f64)], t: f64) -> f64 {
        let names: Vec<&str> = symbols.iter().map(|(name, _)| *name).collect();
        let values: Vec<f64> = symbols.iter().map(|(_, value)| *value).collect();
        let scope = Scope::new(&values, t).unwrap();
        compile(expr, &names).eval(&scope).unwrap()
    }

    #[test]
    fn test_mass_action_law() {
        let expr = read(
            r#"<math xmlns="http://www.w3.org/1998/Math/MathML">
                <apply><times/><ci> compartment </ci><ci>k1</ci><ci>S</ci></apply>
            </math>"#,
        );

        assert_eq!(expr.to_string(), "(compartment * k1 * S)");

        let compiled = compile(&expr, &["S", "compartment", "k1"]);
        assert_eq!(compiled.source(), "(s1 * s2 * s0)");
        assert_eq!(compiled.slots().iter().copied().collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_relative_eq!(eval(&expr, &[("compartment", 2.0), ("k1", 0.5), ("S", 3.0)], 0.0), 3.0);
    }

    #[test]
    fn test_numbers_and_qualifiers() {
        let expr = read(
            r#"<math>
                <apply><plus/>
                    <cn type="e-notation">1.5<sep/>2</cn>
                    <cn type="rational">1<sep/>4</cn>
                    <apply><root/><degree><cn>3</cn></degree><cn>27</cn></apply>
                    <apply><log/><logbase><cn>2</cn></logbase><cn>8</cn></apply>
                    <apply><log/><cn>100</cn></apply>
                </apply>
            </math>"#,
        );

        assert_relative_eq!(eval(&expr, &[], 0.0), 150.0 + 0.25 + 3.0 + 3.0 + 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_piecewise_with_time() {
        let expr = read(
            r#"<math>
                <piecewise>
                    <piece><cn>1</cn><apply><lt/><csymbol definitionURL="http://www.sbml.org/sbml/symbols/time">t</csymbol><cn>5</cn></apply></piece>
                    <otherwise><ci>x</ci></otherwise>
                </piecewise>
            </math>"#,
        );

        assert_eq!(eval(&expr, &[("x", 7.0)], 1.0), 1.0);
        assert_eq!(eval(&expr, &[("x", 7.0)], 6.0), 7.0);
    }

    #[test]
    fn test_function_expansion() {
        let lambda = parse_lambda(
            &parse_document(
                r#"<math><lambda>
                    <bvar><ci>a</ci></bvar><bvar><ci>b</ci></bvar>
                    <apply><divide/><ci>a</ci><ci>b</ci></apply>
                </lambda></math>"#,
            )
            .unwrap(),
        )
        .unwrap();
        let functions = HashMap::from([("ratio".to_string(), lambda)]);

        let expr = read(r#"<math><apply><ci>ratio</ci><ci>x</ci><cn>4</cn></apply></math>"#);
        let expanded = expr.expand_functions(&functions).unwrap();

        assert_eq!(expanded.to_string(), "(x / 4)");
        assert_eq!(eval(&expanded, &[("x", 10.0)], 0.0), 2.5);
    }

    #[test]
    fn test_recursive_function_is_rejected() {
        let lambda = Lambda {
            parameters: vec!["a".to_string()],
            body: MathExpr::Call("f".to_string(), vec![MathExpr::Symbol("a".to_string())]),
        };
        let functions = HashMap::from([("f".to_string(), lambda)]);
        let expr = MathExpr::Call("f".to_string(), vec![MathExpr::Number(1.0)]);

        assert_eq!(
            expr.expand_functions(&functions),
            Err(MathError::ExpansionTooDeep(MAX_EXPANSION_DEPTH))
        );
    }

    #[test]
    fn test_unsupported_constructs() {
        let doc = parse_document(
            r#"<math><apply><csymbol definitionURL="http://www.sbml.org/sbml/symbols/delay"/><ci>x</ci><cn>1</cn></apply></math>"#,
        )
        .unwrap();
        assert!(MathExpr::from_math(&doc).is_err());

        let doc = parse_document(r#"<math><apply><divide/><cn>1</cn></apply></math>"#).unwrap();
        assert!(matches!(
            MathExpr::from_math(&doc),
            Err(MathError::Arity { .. })
        ));
    }

    #[test]
    fn test_unknown_symbol() {
        let expr = MathExpr::Symbol("missing".to_string());
        assert!(matches!(
            expr.compile(&|_: &str| None),
            Err(MathError::UnknownSymbol(name)) if name == "missing"
        ));
    }

    #[test]
    fn test_logic_and_relations() {
        let expr = read(
            r#"<math>
                <apply><plus/>
                    <apply><and/>
                        <apply><lt/><cn>1</cn><ci>x</ci><cn>3</cn></apply>
                        <apply><not/><apply><eq/><ci>x</ci><cn>0</cn></apply></apply>
                    </apply>
                    <apply><xor/><true/><false/><true/></apply>
                </apply>
            </math>"#,
        );

        // Truth values used as numbers count as 1 and 0
        assert_eq!(eval(&expr, &[("x", 2.0)], 0.0), 1.0);
        assert_eq!(eval(&expr, &[("x", 5.0)], 0.0), 0.0);
    }

    #[test]
    fn test_functions() {
        let expr = read(
            r#"<math>
                <apply><plus/>
                    <apply><exp/><cn>0</cn></apply>
                    <apply><abs/><cn>-2.5</cn></apply>
                    <apply><max/><cn>1</cn><ci>x</ci><cn>3</cn></apply>
                    <apply><min/><ci>x</ci></apply>
                    <apply><quotient/><cn>7</cn><cn>2</cn></apply>
                    <apply><rem/><cn>7</cn><cn>2</cn></apply>
                    <apply><factorial/><cn>4</cn></apply>
                </apply>
            </math>"#,
        );

        assert_relative_eq!(
            eval(&expr, &[("x", 5.0)], 0.0),
            1.0 + 2.5 + 5.0 + 5.0 + 3.0 + 1.0 + 24.0
        );
    }

    #[test]
    fn test_non_finite_literals() {
        let expr = MathExpr::Apply(
            Operator::Plus,
            vec![MathExpr::Number(f64::INFINITY), MathExpr::Number(-1e-300)],
        );
        assert_eq!(eval(&expr, &[], 0.0), f64::INFINITY);

        let nan = MathExpr::Number(f64::NAN);
        assert!(eval(&nan, &[], 0.0).is_nan());

        let tiny = MathExpr::Number(1e-20);
        assert_relative_eq!(eval(&tiny, &[], 0.0), 1e-20);
    }

    #[test]
    fn test_factorial_is_bounded() {
        assert_eq!(factorial(5.0), 120.0);
        assert_eq!(factorial(1e18), f64::INFINITY);
        assert!(factorial(-1.0).is_nan());
    }
}
