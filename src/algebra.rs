//! The arithmetic capability the reducer is written against.
//!
//! [`TransferAlgebra`] is the seam between graph reduction and whatever
//! represents a transfer function. [`RationalAlgebra`] is the built-in
//! backend over [`RationalFunction`].

use std::fmt;

use crate::config::{DEFAULT_TOLERANCE, DisplayOptions};
use crate::error::ParseError;
use crate::rational::RationalFunction;

/// Sign of the signal fed back in a closed loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeedbackSign {
    /// `g / (1 + g*h)`
    #[default]
    Negative,
    /// `g / (1 - g*h)`
    Positive,
}

/// Operations on transfer-function values.
pub trait TransferAlgebra {
    type Value: Clone + fmt::Debug;

    fn constant(&self, k: f64) -> Self::Value;

    /// Build `num(s)/den(s)` from coefficients, highest power first.
    fn parse(&self, numerator: &[f64], denominator: &[f64]) -> Result<Self::Value, ParseError>;

    fn add(&self, a: &Self::Value, b: &Self::Value) -> Self::Value;
    fn sub(&self, a: &Self::Value, b: &Self::Value) -> Self::Value;
    fn mul(&self, a: &Self::Value, b: &Self::Value) -> Self::Value;

    /// `a / b`, or `None` when `b` is zero.
    fn div(&self, a: &Self::Value, b: &Self::Value) -> Option<Self::Value>;

    fn is_zero(&self, v: &Self::Value) -> bool;

    fn to_display_string(&self, v: &Self::Value) -> String;

    /// Closed loop around forward path `g` with feedback path `h`.
    fn feedback(&self, g: &Self::Value, h: &Self::Value, sign: FeedbackSign) -> Option<Self::Value> {
        let one = self.constant(1.0);
        let loop_gain = self.mul(g, h);
        let den = match sign {
            FeedbackSign::Negative => self.add(&one, &loop_gain),
            FeedbackSign::Positive => self.sub(&one, &loop_gain),
        };
        if self.is_zero(&den) {
            return None;
        }
        self.div(g, &den)
    }
}

/// [`TransferAlgebra`] over [`RationalFunction`].
#[derive(Debug, Clone, PartialEq)]
pub struct RationalAlgebra {
    tolerance: f64,
    display: DisplayOptions,
}

impl Default for RationalAlgebra {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
            display: DisplayOptions::default(),
        }
    }
}

impl RationalAlgebra {
    pub fn new() -> Self {
        Self::default()
    }

    /// Relative tolerance for cancellation in sums: a coefficient of `a + b`
    /// that is within `tolerance` of the larger term becomes zero.
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_display(mut self, display: DisplayOptions) -> Self {
        self.display = display;
        self
    }

    pub fn display(&self) -> &DisplayOptions {
        &self.display
    }
}

impl TransferAlgebra for RationalAlgebra {
    type Value = RationalFunction;

    fn constant(&self, k: f64) -> RationalFunction {
        RationalFunction::constant(k)
    }

    fn parse(&self, numerator: &[f64], denominator: &[f64]) -> Result<RationalFunction, ParseError> {
        RationalFunction::from_coefficients(numerator, denominator)
    }

    fn add(&self, a: &RationalFunction, b: &RationalFunction) -> RationalFunction {
        a.sum_with(b, self.tolerance)
    }

    fn sub(&self, a: &RationalFunction, b: &RationalFunction) -> RationalFunction {
        a.sum_with(&-b, self.tolerance)
    }

    fn mul(&self, a: &RationalFunction, b: &RationalFunction) -> RationalFunction {
        a * b
    }

    fn div(&self, a: &RationalFunction, b: &RationalFunction) -> Option<RationalFunction> {
        if self.is_zero(b) {
            return None;
        }
        a.checked_div(b)
    }

    fn is_zero(&self, v: &RationalFunction) -> bool {
        v.is_zero()
    }

    fn to_display_string(&self, v: &RationalFunction) -> String {
        v.to_display_string(&self.display)
    }

    /// `n1*d2 / (d1*d2 +- n1*n2)`, which keeps `d1` from appearing twice.
    fn feedback(
        &self,
        g: &RationalFunction,
        h: &RationalFunction,
        sign: FeedbackSign,
    ) -> Option<RationalFunction> {
        let (n1, d1) = (g.numerator(), g.denominator());
        let (n2, d2) = (h.numerator(), h.denominator());
        let open = n1 * n2;
        let base = d1 * d2;
        let den = match sign {
            FeedbackSign::Negative => base.add_with(&open, self.tolerance),
            FeedbackSign::Positive => base.sub_with(&open, self.tolerance),
        };
        if den.is_zero() {
            return None;
        }
        RationalFunction::new(n1 * d2, den)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let alg = RationalAlgebra::new();
        let g = alg.parse(&[10.0], &[1.0, 2.0, 10.0]).unwrap();
        assert_eq!(alg.to_display_string(&g), "10 / (s^2 + 2*s + 10)");
    }

    #[test]
    fn test_div_by_zero_is_none() {
        let alg = RationalAlgebra::new();
        assert!(alg.div(&alg.constant(1.0), &alg.constant(0.0)).is_none());
    }

    #[test]
    fn test_feedback_matches_generic_formula() {
        let alg = RationalAlgebra::new();
        let g = alg.parse(&[10.0], &[1.0, 2.0, 10.0]).unwrap();
        let h = alg.parse(&[5.0], &[1.0, 0.0, 5.0]).unwrap();
        let direct = alg.feedback(&g, &h, FeedbackSign::Negative).unwrap();
        assert_eq!(direct.numerator().descending(), vec![10.0, 0.0, 50.0]);
        assert_eq!(
            direct.denominator().descending(),
            vec![1.0, 2.0, 15.0, 10.0, 100.0]
        );

        let one = alg.constant(1.0);
        let generic = alg.div(&g, &alg.add(&one, &alg.mul(&g, &h))).unwrap();
        for s in [0.5, 1.0, 3.0] {
            approx::assert_relative_eq!(direct.eval(s), generic.eval(s), epsilon = 1e-9);
        }
    }

    #[test]
    fn test_singular_positive_feedback() {
        let alg = RationalAlgebra::new();
        let one = alg.constant(1.0);
        assert!(alg.feedback(&one, &one, FeedbackSign::Positive).is_none());
    }
}
