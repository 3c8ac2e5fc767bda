//! Relationship variants and their case analysis.

use crate::variables::VariableId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Denominators smaller than this are treated as zero.
pub const ZERO_EPSILON: f64 = 1e-12;

/// Handle into the system's relationship arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RelationshipId(pub u32);

impl fmt::Display for RelationshipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// A pure n-ary function backing a custom relationship.
pub type CustomFn = Arc<dyn Fn(&[f64]) -> f64 + Send + Sync>;

/// Outcome of one solve attempt
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Derivation {
    /// Write `value` into `target`
    Derived { target: VariableId, value: f64 },
    /// Not enough operands are known yet
    Pending,
}

/// Failure while deriving; the caller attaches the relationship text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeriveError {
    DivisionByZero,
    /// The arithmetic overflowed or a custom function returned NaN/infinity.
    NonFinite,
}

/// A multi-directional constraint between its operands.
#[derive(Clone)]
pub enum Relation {
    /// `left = right`
    Equality { left: VariableId, right: VariableId },
    /// `sum = augend + addend`
    Addition {
        sum: VariableId,
        augend: VariableId,
        addend: VariableId,
    },
    /// `difference = minuend - subtrahend`
    Subtraction {
        difference: VariableId,
        minuend: VariableId,
        subtrahend: VariableId,
    },
    /// `product = multiplicand * multiplier`
    Multiplication {
        product: VariableId,
        multiplicand: VariableId,
        multiplier: VariableId,
    },
    /// `quotient = dividend / divisor`
    Division {
        quotient: VariableId,
        dividend: VariableId,
        divisor: VariableId,
    },
    /// `output = name(inputs...)`, forward only
    Custom {
        name: String,
        function: CustomFn,
        inputs: Vec<VariableId>,
        output: VariableId,
    },
}

impl Relation {
    /// Every variable the relation touches, result first.
    pub fn operands(&self) -> Vec<VariableId> {
        match self {
            Self::Equality { left, right } => vec![*left, *right],
            Self::Addition { sum, augend, addend } => vec![*sum, *augend, *addend],
            Self::Subtraction {
                difference,
                minuend,
                subtrahend,
            } => vec![*difference, *minuend, *subtrahend],
            Self::Multiplication {
                product,
                multiplicand,
                multiplier,
            } => vec![*product, *multiplicand, *multiplier],
            Self::Division {
                quotient,
                dividend,
                divisor,
            } => vec![*quotient, *dividend, *divisor],
            Self::Custom { inputs, output, .. } => {
                let mut all = Vec::with_capacity(inputs.len() + 1);
                all.push(*output);
                all.extend_from_slice(inputs);
                all
            }
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Equality { .. } => "Equality",
            Self::Addition { .. } => "Addition",
            Self::Subtraction { .. } => "Subtraction",
            Self::Multiplication { .. } => "Multiplication",
            Self::Division { .. } => "Division",
            Self::Custom { .. } => "Custom",
        }
    }

    pub fn result(&self) -> VariableId {
        self.operands()[0]
    }

    /// Infix symbol for the arithmetic variants.
    pub fn symbol(&self) -> Option<&'static str> {
        match self {
            Self::Addition { .. } => Some("+"),
            Self::Subtraction { .. } => Some("-"),
            Self::Multiplication { .. } => Some("*"),
            Self::Division { .. } => Some("/"),
            Self::Equality { .. } | Self::Custom { .. } => None,
        }
    }

    /// Pick the first case whose inputs are known and compute its target.
    ///
    /// `known` reports a variable's value for the current digest.
    pub fn derive<F>(&self, known: F) -> Result<Derivation, DeriveError>
    where
        F: Fn(VariableId) -> Option<f64>,
    {
        match self.case_analysis(known)? {
            Derivation::Derived { value, .. } if !value.is_finite() => Err(DeriveError::NonFinite),
            derivation => Ok(derivation),
        }
    }

    fn case_analysis<F>(&self, known: F) -> Result<Derivation, DeriveError>
    where
        F: Fn(VariableId) -> Option<f64>,
    {
        match self {
            Self::Equality { left, right } => Ok(match (known(*left), known(*right)) {
                (_, Some(r)) => derived(*left, r),
                (Some(l), None) => derived(*right, l),
                (None, None) => Derivation::Pending,
            }),

            Self::Addition { sum, augend, addend } => {
                Ok(match (known(*augend), known(*addend), known(*sum)) {
                    (Some(a), Some(b), _) => derived(*sum, a + b),
                    (Some(a), None, Some(s)) => derived(*addend, s - a),
                    (None, Some(b), Some(s)) => derived(*augend, s - b),
                    _ => Derivation::Pending,
                })
            }

            Self::Subtraction {
                difference,
                minuend,
                subtrahend,
            } => Ok(match (known(*minuend), known(*subtrahend), known(*difference)) {
                (Some(m), Some(s), _) => derived(*difference, m - s),
                (Some(m), None, Some(d)) => derived(*subtrahend, m - d),
                (None, Some(s), Some(d)) => derived(*minuend, d + s),
                _ => Derivation::Pending,
            }),

            Self::Multiplication {
                product,
                multiplicand,
                multiplier,
            } => match (known(*multiplicand), known(*multiplier), known(*product)) {
                (Some(a), Some(b), _) => Ok(derived(*product, a * b)),
                (Some(a), None, Some(p)) => quotient_into(*multiplier, p, a),
                (None, Some(b), Some(p)) => quotient_into(*multiplicand, p, b),
                _ => Ok(Derivation::Pending),
            },

            Self::Division {
                quotient,
                dividend,
                divisor,
            } => match (known(*dividend), known(*divisor), known(*quotient)) {
                (Some(n), Some(d), _) => quotient_into(*quotient, n, d),
                (None, Some(d), Some(q)) => Ok(derived(*dividend, q * d)),
                (Some(n), None, Some(q)) => quotient_into(*divisor, n, q),
                _ => Ok(Derivation::Pending),
            },

            Self::Custom {
                function,
                inputs,
                output,
                ..
            } => {
                let mut args = Vec::with_capacity(inputs.len());
                for input in inputs {
                    match known(*input) {
                        Some(v) => args.push(v),
                        None => return Ok(Derivation::Pending),
                    }
                }
                Ok(derived(*output, function(&args)))
            }
        }
    }
}

fn derived(target: VariableId, value: f64) -> Derivation {
    Derivation::Derived { target, value }
}

/// `target = numerator / denominator` under the zero-division policy:
/// 0/0 leaves the target undetermined, x/0 is an error.
fn quotient_into(target: VariableId, numerator: f64, denominator: f64) -> Result<Derivation, DeriveError> {
    if denominator.abs() < ZERO_EPSILON {
        if numerator.abs() < ZERO_EPSILON {
            return Ok(Derivation::Pending);
        }
        return Err(DeriveError::DivisionByZero);
    }
    Ok(derived(target, numerator / denominator))
}

impl fmt::Debug for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Custom {
                name,
                inputs,
                output,
                ..
            } => f
                .debug_struct("Custom")
                .field("name", name)
                .field("inputs", inputs)
                .field("output", output)
                .finish(),
            other => {
                let ops = other.operands();
                write!(f, "{}({}, {}", other.kind_name(), ops[0], ops[1])?;
                for op in &ops[2..] {
                    write!(f, ", {}", op)?;
                }
                write!(f, ")")
            }
        }
    }
}

/// A relation plus its per-digest cycle guard.
#[derive(Debug, Clone)]
pub struct Relationship {
    pub relation: Relation,
    solved_digest: Option<u64>,
}

impl Relationship {
    pub fn new(relation: Relation) -> Self {
        Self {
            relation,
            solved_digest: None,
        }
    }

    pub fn is_solved_for(&self, digest: u64) -> bool {
        self.solved_digest == Some(digest)
    }

    /// Record a successful derivation, returning the previous marker.
    pub fn mark_solved(&mut self, digest: u64) -> Option<u64> {
        self.solved_digest.replace(digest)
    }

    pub fn restore(&mut self, previous: Option<u64>) {
        self.solved_digest = previous;
    }

    pub fn reset(&mut self) {
        self.solved_digest = None;
    }
}
