//! Rational functions `num(s) / den(s)`, the value type of transfer functions.
//!
//! Every value is kept normalized: the denominator is never zero, its leading
//! coefficient is positive, a constant denominator is folded into the
//! numerator, and common factors of numerator and denominator are cancelled.

use std::fmt;
use std::ops::{Add, Mul, Neg, Sub};

use serde::{Deserialize, Serialize};

use crate::config::{CANCEL_TOLERANCE, DEFAULT_TOLERANCE, DisplayOptions};
use crate::error::ParseError;
use crate::polynomial::Polynomial;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RationalFunction {
    num: Polynomial,
    den: Polynomial,
}

impl RationalFunction {
    /// Returns `None` if the denominator is the zero polynomial or any
    /// coefficient is not finite.
    pub fn new(num: Polynomial, den: Polynomial) -> Option<Self> {
        if den.is_zero() || !num.is_finite() || !den.is_finite() {
            return None;
        }
        Some(Self { num, den }.normalized())
    }

    /// Build from coefficient sequences, highest power first.
    pub fn from_coefficients(numerator: &[f64], denominator: &[f64]) -> Result<Self, ParseError> {
        let text = format!("{:?} / {:?}", numerator, denominator);
        if numerator.is_empty() {
            return Err(ParseError::new(text, 0, "numerator has no coefficients"));
        }
        if denominator.is_empty() {
            return Err(ParseError::new(text, 0, "denominator has no coefficients"));
        }
        let num = Polynomial::from_descending(numerator);
        let den = Polynomial::from_descending(denominator);
        if !num.is_finite() || !den.is_finite() {
            return Err(ParseError::new(text, 0, "coefficients must be finite"));
        }
        if den.is_zero() {
            return Err(ParseError::new(text, 0, "division by the zero polynomial"));
        }
        Ok(Self { num, den }.normalized())
    }

    pub fn constant(k: f64) -> Self {
        Self {
            num: Polynomial::constant(k),
            den: Polynomial::one(),
        }
    }

    pub fn zero() -> Self {
        Self::constant(0.0)
    }

    pub fn one() -> Self {
        Self::constant(1.0)
    }

    /// The formal variable `s`.
    pub fn s() -> Self {
        Self {
            num: Polynomial::s(),
            den: Polynomial::one(),
        }
    }

    /// `1/s`.
    pub fn integrator() -> Self {
        Self {
            num: Polynomial::one(),
            den: Polynomial::s(),
        }
    }

    pub fn numerator(&self) -> &Polynomial {
        &self.num
    }

    pub fn denominator(&self) -> &Polynomial {
        &self.den
    }

    /// Evaluate at a real point of the formal variable.
    pub fn eval(&self, s: f64) -> f64 {
        self.num.eval(s) / self.den.eval(s)
    }

    /// True only for the zero function. Arithmetic turns cancelled
    /// coefficients into exact zeros, so no magnitude threshold applies here.
    pub fn is_zero(&self) -> bool {
        self.num.is_zero()
    }

    /// `self + rhs`, with coefficients that cancel to within `tol` of their
    /// terms set to zero.
    pub fn sum_with(&self, rhs: &RationalFunction, tol: f64) -> RationalFunction {
        if self.den == rhs.den {
            return RationalFunction {
                num: self.num.add_with(&rhs.num, tol),
                den: self.den.clone(),
            }
            .normalized();
        }
        RationalFunction {
            num: (&self.num * &rhs.den).add_with(&(&rhs.num * &self.den), tol),
            den: &self.den * &rhs.den,
        }
        .normalized()
    }

    /// The value of a constant (degree-0 over degree-0) function.
    pub fn as_constant(&self) -> Option<f64> {
        let n = self.num.as_constant()?;
        let d = self.den.as_constant()?;
        Some(n / d)
    }

    /// `self / other`, or `None` when `other` is the zero function.
    pub fn checked_div(&self, other: &RationalFunction) -> Option<Self> {
        if other.num.is_zero() {
            return None;
        }
        Self::new(&self.num * &other.den, &self.den * &other.num)
    }

    pub fn recip(&self) -> Option<Self> {
        Self::one().checked_div(self)
    }

    /// Integer power; negative exponents invert.
    pub fn powi(&self, n: i32) -> Option<Self> {
        let base = if n < 0 { self.recip()? } else { self.clone() };
        let k = n.unsigned_abs();
        Self::new(base.num.pow(k), base.den.pow(k))
    }

    fn normalized(self) -> Self {
        let Self { num, den } = self;
        if num.is_zero() {
            return Self::zero();
        }

        let shared = num.low_order_zeros().min(den.low_order_zeros());
        let (mut num, mut den) = (num.shift_down(shared), den.shift_down(shared));

        if num.degree().unwrap_or(0) > 0 && den.degree().unwrap_or(0) > 0 {
            let g = num.gcd(&den, CANCEL_TOLERANCE);
            if g.degree().unwrap_or(0) > 0 {
                if let (Some((qn, rn)), Some((qd, rd))) = (num.div_rem(&g), den.div_rem(&g)) {
                    let exact = rn.max_abs() <= CANCEL_TOLERANCE * num.max_abs()
                        && rd.max_abs() <= CANCEL_TOLERANCE * den.max_abs();
                    if exact && !qd.is_zero() {
                        num = qn;
                        den = qd;
                    }
                }
            }
        }

        if let Some(c) = den.as_constant() {
            return Self {
                num: num.scale(1.0 / c),
                den: Polynomial::one(),
            };
        }
        if den.leading() < 0.0 {
            num = -&num;
            den = -&den;
        }
        Self { num, den }
    }

    /// Single-line form that the expression parser accepts back, e.g.
    /// `10 / (s^2 + 2*s + 10)`.
    pub fn to_display_string(&self, opts: &DisplayOptions) -> String {
        let n = self.num.format(opts);
        if self.den == Polynomial::one() {
            return n;
        }
        let n = if self.num.term_count() > 1 {
            format!("({n})")
        } else {
            n
        };
        let d = self.den.format(opts);
        let d = if self.den.term_count() > 1 || d.contains('*') || d.starts_with('-') {
            format!("({d})")
        } else {
            d
        };
        format!("{n} / {d}")
    }

    /// Numerator over a fraction bar over the denominator.
    pub fn to_pretty_string(&self, opts: &DisplayOptions) -> String {
        let n = self.num.format(opts);
        if self.den == Polynomial::one() {
            return n;
        }
        let d = self.den.format(opts);
        let width = n.len().max(d.len());
        let center = |text: &str| {
            let pad = (width - text.len()) / 2;
            format!("{}{}", " ".repeat(pad), text)
        };
        format!("{}\n{}\n{}", center(&n), "-".repeat(width), center(&d))
    }
}

impl fmt::Display for RationalFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_display_string(&DisplayOptions::default()))
    }
}

impl Add for &RationalFunction {
    type Output = RationalFunction;
    fn add(self, rhs: &RationalFunction) -> RationalFunction {
        self.sum_with(rhs, DEFAULT_TOLERANCE)
    }
}

impl Sub for &RationalFunction {
    type Output = RationalFunction;
    fn sub(self, rhs: &RationalFunction) -> RationalFunction {
        self + &(-rhs)
    }
}

impl Mul for &RationalFunction {
    type Output = RationalFunction;
    fn mul(self, rhs: &RationalFunction) -> RationalFunction {
        RationalFunction {
            num: &self.num * &rhs.num,
            den: &self.den * &rhs.den,
        }
        .normalized()
    }
}

impl Neg for &RationalFunction {
    type Output = RationalFunction;
    fn neg(self) -> RationalFunction {
        RationalFunction {
            num: -&self.num,
            den: self.den.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn tf(num: &[f64], den: &[f64]) -> RationalFunction {
        RationalFunction::from_coefficients(num, den).unwrap()
    }

    #[test]
    fn test_zero_denominator_rejected() {
        let err = RationalFunction::from_coefficients(&[1.0], &[0.0, 0.0]).unwrap_err();
        assert!(err.message.contains("zero polynomial"));
        assert!(RationalFunction::from_coefficients(&[1.0], &[]).is_err());
        assert!(RationalFunction::from_coefficients(&[f64::NAN], &[1.0]).is_err());
    }

    #[test]
    fn test_constant_denominator_folded() {
        let g = tf(&[10.0], &[2.0]);
        assert_eq!(g.as_constant(), Some(5.0));
        assert_eq!(g.to_string(), "5");
    }

    #[test]
    fn test_series_of_gain_and_integrator() {
        let g = &RationalFunction::constant(3.0) * &RationalFunction::integrator();
        assert_eq!(g.to_string(), "3 / s");
        assert_relative_eq!(g.eval(2.0), 1.5);
    }

    #[test]
    fn test_common_factor_cancelled() {
        // (s + 1) / ((s + 1)(s + 2)) == 1 / (s + 2)
        let g = tf(&[1.0, 1.0], &[1.0, 3.0, 2.0]);
        assert_eq!(g.denominator().descending(), vec![1.0, 2.0]);
        assert_eq!(g.to_string(), "1 / (s + 2)");
    }

    #[test]
    fn test_negative_leading_denominator_flipped() {
        let g = tf(&[1.0], &[-1.0, -1.0]);
        assert_eq!(g.to_string(), "-1 / (s + 1)");
    }

    #[test]
    fn test_add_and_sub() {
        let a = RationalFunction::constant(2.0);
        let b = RationalFunction::constant(3.0);
        assert_eq!((&a + &b).as_constant(), Some(5.0));
        assert_eq!((&b - &a).as_constant(), Some(1.0));
        assert!((&a - &a).is_zero());
    }

    #[test]
    fn test_small_values_are_not_zero() {
        let k = RationalFunction::constant(1e-13);
        assert!(!k.is_zero());
        assert_eq!((&k * &RationalFunction::one()).as_constant(), Some(1e-13));

        let tiny = &RationalFunction::constant(1e-7) * &RationalFunction::constant(1e-7);
        assert_relative_eq!(tiny.as_constant().unwrap(), 1e-14, max_relative = 1e-12);

        // The pole at s = -1e13 is kept.
        let fast = tf(&[1.0], &[1e-13, 1.0]);
        assert_eq!(fast.denominator().degree(), Some(1));
        assert_eq!(fast.to_string(), "1 / (0.0000000000001*s + 1)");
    }

    #[test]
    fn test_rounding_residue_is_zero() {
        let a = RationalFunction::constant(0.1 + 0.2);
        let b = RationalFunction::constant(0.3);
        assert!((&a - &b).is_zero());
    }

    #[test]
    fn test_checked_div() {
        let g = RationalFunction::integrator();
        let one_plus_g = &RationalFunction::one() + &g;
        let closed = g.checked_div(&one_plus_g).unwrap();
        assert_eq!(closed.to_string(), "1 / (s + 1)");
        assert!(g.checked_div(&RationalFunction::zero()).is_none());
    }

    #[test]
    fn test_powi() {
        let g = RationalFunction::s().powi(-2).unwrap();
        assert_eq!(g.to_string(), "1 / s^2");
        assert!(RationalFunction::zero().powi(-1).is_none());
    }

    #[test]
    fn test_pretty_string() {
        let g = tf(&[10.0], &[1.0, 2.0, 10.0]);
        assert_eq!(
            g.to_pretty_string(&DisplayOptions::default()),
            "      10\n--------------\ns^2 + 2*s + 10"
        );
    }
}
