//! Two-system interconnections: series, parallel and feedback.

use crate::algebra::{FeedbackSign, TransferAlgebra};
use crate::error::ReduceError;

/// How two systems are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interconnection {
    /// `g1 * g2`
    Series,
    /// `g1 + g2`
    Parallel,
    /// `g1 / (1 -+ g1 * g2)`, with `g2` in the feedback path.
    Feedback(FeedbackSign),
}

/// Output of `g1` feeds `g2`.
pub fn series<A: TransferAlgebra>(alg: &A, g1: &A::Value, g2: &A::Value) -> A::Value {
    alg.mul(g1, g2)
}

/// Both systems driven by the same input, outputs summed.
pub fn parallel<A: TransferAlgebra>(alg: &A, g1: &A::Value, g2: &A::Value) -> A::Value {
    alg.add(g1, g2)
}

/// Close a loop around `g` through `h`.
pub fn feedback<A: TransferAlgebra>(
    alg: &A,
    g: &A::Value,
    h: &A::Value,
    sign: FeedbackSign,
) -> Result<A::Value, ReduceError> {
    alg.feedback(g, h, sign).ok_or(ReduceError::SingularFeedback)
}

pub fn combine<A: TransferAlgebra>(
    alg: &A,
    how: Interconnection,
    g1: &A::Value,
    g2: &A::Value,
) -> Result<A::Value, ReduceError> {
    match how {
        Interconnection::Series => Ok(series(alg, g1, g2)),
        Interconnection::Parallel => Ok(parallel(alg, g1, g2)),
        Interconnection::Feedback(sign) => feedback(alg, g1, g2, sign),
    }
}
