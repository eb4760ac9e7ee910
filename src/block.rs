//! Block nodes: identity, kind, parameters and per-kind transfer rules.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::algebra::TransferAlgebra;
use crate::error::{ParseError, ReduceError};
use crate::expr::parse_coefficients;

/// Stable identifier of a block within a diagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockId(pub u32);

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The seven block kinds, each carrying only the parameters it needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    /// `in0 + in1`
    Sum,
    /// `in0 - in1`
    Subtract,
    Gain {
        value: f64,
    },
    /// `1/s`
    Integrator,
    /// `num(s)/den(s)`, coefficients highest power first.
    TransferFunction {
        numerator: Vec<f64>,
        denominator: Vec<f64>,
    },
    /// System input; a graph source.
    Input,
    /// System output; a graph sink.
    Output,
}

impl BlockKind {
    pub fn gain(value: f64) -> Self {
        Self::Gain { value }
    }

    pub fn transfer_function(numerator: Vec<f64>, denominator: Vec<f64>) -> Self {
        Self::TransferFunction {
            numerator,
            denominator,
        }
    }

    /// A custom block as first placed in the editor: `1/(s+1)`.
    pub fn default_transfer_function() -> Self {
        Self::transfer_function(vec![1.0], vec![1.0, 1.0])
    }

    /// Parse text such as `10/(s^2 + 2s + 10)` into a custom block.
    pub fn transfer_function_from_expr(text: &str) -> Result<Self, ParseError> {
        let (numerator, denominator) = parse_coefficients(text)?;
        Ok(Self::transfer_function(numerator, denominator))
    }

    /// Short lowercase tag, also used for default block names.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Sum => "sum",
            Self::Subtract => "subtract",
            Self::Gain { .. } => "gain",
            Self::Integrator => "integrator",
            Self::TransferFunction { .. } => "transfer_function",
            Self::Input => "input",
            Self::Output => "output",
        }
    }

    pub fn input_arity(&self) -> usize {
        match self {
            Self::Sum | Self::Subtract => 2,
            Self::Input => 0,
            Self::Gain { .. } | Self::Integrator | Self::TransferFunction { .. } | Self::Output => 1,
        }
    }

    pub fn output_arity(&self) -> usize {
        match self {
            Self::Output => 0,
            _ => 1,
        }
    }

    /// Sum and Subtract: the only blocks allowed to close a feedback loop.
    pub fn is_junction(&self) -> bool {
        matches!(self, Self::Sum | Self::Subtract)
    }

    /// True when `other` is the same variant, so ports and arity agree.
    pub fn same_variant(&self, other: &BlockKind) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

/// A block in a diagram.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub id: BlockId,
    pub kind: BlockKind,
    /// Display name; not required to be unique.
    pub name: String,
}

impl Block {
    pub fn new(id: BlockId, kind: BlockKind, name: impl Into<String>) -> Self {
        Self {
            id,
            kind,
            name: name.into(),
        }
    }

    /// Name and id, as used in diagnostics.
    pub fn label(&self) -> String {
        format!("{} ({})", self.name, self.id)
    }

    /// The block's own series factor: `k`, `1/s`, `num/den`, or `1` for
    /// junctions and terminals.
    pub fn local_transfer<A: TransferAlgebra>(&self, alg: &A) -> Result<A::Value, ParseError> {
        match &self.kind {
            BlockKind::Gain { value } => Ok(alg.constant(*value)),
            BlockKind::Integrator => alg.parse(&[1.0], &[1.0, 0.0]),
            BlockKind::TransferFunction {
                numerator,
                denominator,
            } => alg.parse(numerator, denominator),
            BlockKind::Sum | BlockKind::Subtract | BlockKind::Input | BlockKind::Output => {
                Ok(alg.constant(1.0))
            }
        }
    }

    /// Apply this block's rule to the values arriving on its input ports, in
    /// port order.
    pub fn effective_transfer_function<A: TransferAlgebra>(
        &self,
        alg: &A,
        inputs: &[A::Value],
    ) -> Result<A::Value, ReduceError> {
        let arity_error = |expected| ReduceError::Arity {
            block: self.label(),
            expected,
            found: inputs.len(),
        };
        match &self.kind {
            BlockKind::Sum | BlockKind::Subtract => {
                let [a, b, ..] = inputs else {
                    return Err(arity_error(2));
                };
                Ok(if self.kind == BlockKind::Sum {
                    alg.add(a, b)
                } else {
                    alg.sub(a, b)
                })
            }
            BlockKind::Input => Ok(alg.constant(1.0)),
            BlockKind::Output => inputs.first().cloned().ok_or_else(|| arity_error(1)),
            BlockKind::Gain { .. } | BlockKind::Integrator | BlockKind::TransferFunction { .. } => {
                let input = inputs.first().ok_or_else(|| arity_error(1))?;
                let own = self.local_transfer(alg)?;
                Ok(alg.mul(input, &own))
            }
        }
    }
}
