//! Real polynomials in the Laplace variable.
//!
//! Coefficients are stored lowest power first. The public boundary also speaks
//! the "highest power first" convention used by control toolboxes, see
//! [`Polynomial::from_descending`] and [`Polynomial::descending`].

use std::ops::{Add, Mul, Neg, Sub};

use serde::{Deserialize, Serialize};

use crate::config::{DEFAULT_TOLERANCE, DisplayOptions};

/// A real polynomial. The zero polynomial has no coefficients and the highest
/// stored coefficient is never exactly zero.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Polynomial {
    coeffs: Vec<f64>,
}

impl Polynomial {
    pub fn zero() -> Self {
        Self { coeffs: Vec::new() }
    }

    pub fn one() -> Self {
        Self::constant(1.0)
    }

    pub fn constant(c: f64) -> Self {
        Self::from_ascending(vec![c])
    }

    /// The formal variable `s`.
    pub fn s() -> Self {
        Self::monomial(1.0, 1)
    }

    /// `c * s^power`.
    pub fn monomial(c: f64, power: usize) -> Self {
        let mut coeffs = vec![0.0; power + 1];
        coeffs[power] = c;
        Self::from_ascending(coeffs)
    }

    /// Build from coefficients ordered lowest power first.
    pub fn from_ascending(mut coeffs: Vec<f64>) -> Self {
        while coeffs.last() == Some(&0.0) {
            coeffs.pop();
        }
        Self { coeffs }
    }

    /// Build from coefficients ordered highest power first, e.g.
    /// `[1.0, 2.0, 10.0]` is `s^2 + 2*s + 10`.
    pub fn from_descending(coeffs: &[f64]) -> Self {
        Self::from_ascending(coeffs.iter().rev().copied().collect())
    }

    /// Coefficients, lowest power first.
    pub fn coefficients(&self) -> &[f64] {
        &self.coeffs
    }

    /// Coefficients, highest power first. The zero polynomial yields `[0.0]`.
    pub fn descending(&self) -> Vec<f64> {
        if self.coeffs.is_empty() {
            return vec![0.0];
        }
        self.coeffs.iter().rev().copied().collect()
    }

    pub fn degree(&self) -> Option<usize> {
        self.coeffs.len().checked_sub(1)
    }

    pub fn is_zero(&self) -> bool {
        self.coeffs.is_empty()
    }

    /// Returns the value if this polynomial has degree 0 (or is zero).
    pub fn as_constant(&self) -> Option<f64> {
        match self.coeffs.as_slice() {
            [] => Some(0.0),
            [c] => Some(*c),
            _ => None,
        }
    }

    pub fn leading(&self) -> f64 {
        self.coeffs.last().copied().unwrap_or(0.0)
    }

    pub fn max_abs(&self) -> f64 {
        self.coeffs.iter().fold(0.0, |m, c| m.max(c.abs()))
    }

    /// Number of non-zero terms.
    pub fn term_count(&self) -> usize {
        self.coeffs.iter().filter(|c| **c != 0.0).count()
    }

    pub fn is_finite(&self) -> bool {
        self.coeffs.iter().all(|c| c.is_finite())
    }

    /// Horner evaluation at `x`.
    pub fn eval(&self, x: f64) -> f64 {
        self.coeffs.iter().rev().fold(0.0, |acc, c| acc * x + c)
    }

    pub fn scale(&self, k: f64) -> Self {
        Self::from_ascending(self.coeffs.iter().map(|c| c * k).collect())
    }

    pub fn pow(&self, n: u32) -> Self {
        let mut out = Self::one();
        for _ in 0..n {
            out = &out * self;
        }
        out
    }

    /// Scale so that the leading coefficient is 1.
    pub fn monic(&self) -> Self {
        let lead = self.leading();
        if lead == 0.0 {
            return self.clone();
        }
        self.scale(1.0 / lead)
    }

    /// Drop high-order coefficients whose magnitude is at most `threshold`.
    fn trim_high(mut self, threshold: f64) -> Self {
        while self.coeffs.last().is_some_and(|c| c.abs() <= threshold) {
            self.coeffs.pop();
        }
        self
    }

    /// `self + other`. A coefficient that cancels to within `tol` of the
    /// larger of the two terms becomes exactly zero.
    pub fn add_with(&self, other: &Polynomial, tol: f64) -> Polynomial {
        self.zip_with(other, |a, b| cancel(a + b, a.abs().max(b.abs()), tol))
    }

    pub fn sub_with(&self, other: &Polynomial, tol: f64) -> Polynomial {
        self.zip_with(other, |a, b| cancel(a - b, a.abs().max(b.abs()), tol))
    }

    /// `self * other`, cancelling each coefficient against the magnitude of
    /// the products summed into it.
    pub fn mul_with(&self, other: &Polynomial, tol: f64) -> Polynomial {
        if self.is_zero() || other.is_zero() {
            return Polynomial::zero();
        }
        let len = self.coeffs.len() + other.coeffs.len() - 1;
        let mut sums = vec![0.0; len];
        let mut mags = vec![0.0; len];
        for (i, a) in self.coeffs.iter().enumerate() {
            for (j, b) in other.coeffs.iter().enumerate() {
                sums[i + j] += a * b;
                mags[i + j] += (a * b).abs();
            }
        }
        let coeffs = sums
            .into_iter()
            .zip(mags)
            .map(|(sum, mag)| cancel(sum, mag, tol))
            .collect();
        Polynomial::from_ascending(coeffs)
    }

    /// Number of exactly-zero low-order coefficients, i.e. the largest `k`
    /// such that `s^k` divides this polynomial.
    pub fn low_order_zeros(&self) -> usize {
        self.coeffs.iter().take_while(|c| **c == 0.0).count()
    }

    /// Divide by `s^k`, discarding the lowest `k` coefficients.
    pub fn shift_down(&self, k: usize) -> Self {
        Self::from_ascending(self.coeffs.iter().skip(k).copied().collect())
    }

    /// Polynomial long division. Returns `None` when `divisor` is zero.
    pub fn div_rem(&self, divisor: &Polynomial) -> Option<(Polynomial, Polynomial)> {
        let d = divisor.degree()?;
        let n = match self.degree() {
            Some(n) if n >= d => n,
            _ => return Some((Self::zero(), self.clone())),
        };
        let lead = divisor.leading();
        let mut rem = self.coeffs.clone();
        let mut quot = vec![0.0; n - d + 1];
        for i in (0..=n - d).rev() {
            let c = rem[i + d] / lead;
            quot[i] = c;
            for (j, dc) in divisor.coeffs.iter().enumerate() {
                rem[i + j] -= c * dc;
            }
        }
        rem.truncate(d);
        Some((Self::from_ascending(quot), Self::from_ascending(rem)))
    }

    /// Monic greatest common divisor by the Euclidean algorithm. Remainders
    /// smaller than `tol` relative to the inputs count as zero.
    pub fn gcd(&self, other: &Polynomial, tol: f64) -> Polynomial {
        let (mut a, mut b) = if self.degree() >= other.degree() {
            (self.clone(), other.clone())
        } else {
            (other.clone(), self.clone())
        };
        let scale = a.max_abs().max(b.max_abs());
        while !b.is_zero() && b.max_abs() > tol * scale {
            let Some((_, r)) = a.div_rem(&b) else { break };
            a = std::mem::replace(&mut b, r.trim_high(tol * scale));
        }
        a.monic()
    }

    /// Render as `s^2 + 2*s + 10`.
    pub fn format(&self, opts: &DisplayOptions) -> String {
        let var = opts.variable;
        let mut out = String::new();
        for (power, &c) in self.coeffs.iter().enumerate().rev() {
            if c == 0.0 {
                continue;
            }
            let mag = opts.format_number(c.abs());
            if mag == "0" {
                continue;
            }
            let body = match (power, mag.as_str()) {
                (0, _) => mag.clone(),
                (1, "1") => var.to_string(),
                (1, _) => format!("{mag}*{var}"),
                (p, "1") => format!("{var}^{p}"),
                (p, _) => format!("{mag}*{var}^{p}"),
            };
            if out.is_empty() {
                if c < 0.0 {
                    out.push('-');
                }
            } else {
                out.push_str(if c < 0.0 { " - " } else { " + " });
            }
            out.push_str(&body);
        }
        if out.is_empty() {
            out.push('0');
        }
        out
    }

    fn zip_with(&self, other: &Polynomial, f: impl Fn(f64, f64) -> f64) -> Polynomial {
        let len = self.coeffs.len().max(other.coeffs.len());
        let get = |p: &Polynomial, i: usize| p.coeffs.get(i).copied().unwrap_or(0.0);
        Self::from_ascending((0..len).map(|i| f(get(self, i), get(other, i))).collect())
    }
}

/// `value` if it is not small relative to `magnitude`, else exactly zero.
fn cancel(value: f64, magnitude: f64, tol: f64) -> f64 {
    if value.abs() <= tol * magnitude { 0.0 } else { value }
}

impl Add for &Polynomial {
    type Output = Polynomial;
    fn add(self, rhs: &Polynomial) -> Polynomial {
        self.add_with(rhs, DEFAULT_TOLERANCE)
    }
}

impl Sub for &Polynomial {
    type Output = Polynomial;
    fn sub(self, rhs: &Polynomial) -> Polynomial {
        self.sub_with(rhs, DEFAULT_TOLERANCE)
    }
}

impl Mul for &Polynomial {
    type Output = Polynomial;
    fn mul(self, rhs: &Polynomial) -> Polynomial {
        self.mul_with(rhs, DEFAULT_TOLERANCE)
    }
}

impl Neg for &Polynomial {
    type Output = Polynomial;
    fn neg(self) -> Polynomial {
        self.scale(-1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn p(desc: &[f64]) -> Polynomial {
        Polynomial::from_descending(desc)
    }

    #[test]
    fn test_construction_trims_leading_zeros() {
        let poly = p(&[0.0, 0.0, 1.0, 2.0]);
        assert_eq!(poly.degree(), Some(1));
        assert_eq!(poly.descending(), vec![1.0, 2.0]);
        assert_eq!(Polynomial::zero().descending(), vec![0.0]);
        assert_eq!(p(&[0.0]).degree(), None);
    }

    #[test]
    fn test_arithmetic() {
        let a = p(&[1.0, 1.0]); // s + 1
        let b = p(&[1.0, 2.0]); // s + 2
        assert_eq!((&a * &b).descending(), vec![1.0, 3.0, 2.0]);
        assert_eq!((&a + &b).descending(), vec![2.0, 3.0]);
        assert!((&a - &a).is_zero());
        assert_eq!((-&a).descending(), vec![-1.0, -1.0]);
        assert_eq!(a.pow(2).descending(), vec![1.0, 2.0, 1.0]);
    }

    #[test]
    fn test_tiny_coefficients_survive_arithmetic() {
        let small = p(&[1e-13, 1.0]);
        let scaled = &small * &Polynomial::constant(1e-7);
        assert_eq!(scaled.degree(), Some(1));
        assert_relative_eq!(scaled.leading(), 1e-20, max_relative = 1e-12);
        assert_eq!((&small + &Polynomial::zero()).descending(), vec![1e-13, 1.0]);
        assert_eq!(Polynomial::constant(1e-30).scale(1e-30).as_constant(), Some(1e-60));
    }

    #[test]
    fn test_rounding_residue_cancels() {
        let a = Polynomial::constant(0.1 + 0.2);
        let b = Polynomial::constant(0.3);
        assert!((&a - &b).is_zero());
        // (s + 0.1)(s - 0.1) has no s term.
        let prod = &p(&[1.0, 0.1]) * &p(&[1.0, -0.1]);
        assert_eq!(prod.degree(), Some(2));
        assert_eq!(prod.coefficients()[1], 0.0);
    }

    #[test]
    fn test_eval() {
        let poly = p(&[1.0, 2.0, 10.0]);
        assert_relative_eq!(poly.eval(0.0), 10.0);
        assert_relative_eq!(poly.eval(2.0), 18.0);
    }

    #[test]
    fn test_div_rem() {
        let num = p(&[1.0, 3.0, 2.0]);
        let (q, r) = num.div_rem(&p(&[1.0, 1.0])).unwrap();
        assert_eq!(q.descending(), vec![1.0, 2.0]);
        assert!(r.max_abs() < 1e-12);
        assert!(num.div_rem(&Polynomial::zero()).is_none());
    }

    #[test]
    fn test_gcd_finds_common_factor() {
        let a = &p(&[1.0, 1.0]) * &p(&[1.0, 2.0]);
        let b = &p(&[1.0, 1.0]) * &p(&[1.0, 3.0]);
        let g = a.gcd(&b, 1e-9);
        assert_eq!(g.degree(), Some(1));
        assert_relative_eq!(g.coefficients()[0], 1.0, epsilon = 1e-9);
        assert_relative_eq!(g.coefficients()[1], 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_gcd_of_coprime_is_constant() {
        let g = p(&[1.0, 1.0]).gcd(&p(&[1.0, 2.0]), 1e-9);
        assert_eq!(g.degree(), Some(0));
    }

    #[test]
    fn test_low_order_zeros() {
        let poly = p(&[3.0, 0.0, 0.0]);
        assert_eq!(poly.low_order_zeros(), 2);
        assert_eq!(poly.shift_down(2).descending(), vec![3.0]);
    }

    #[test]
    fn test_format() {
        let opts = DisplayOptions::default();
        assert_eq!(p(&[1.0, 2.0, 10.0]).format(&opts), "s^2 + 2*s + 10");
        assert_eq!(p(&[-1.0, 0.0, -3.5]).format(&opts), "-s^2 - 3.5");
        assert_eq!(p(&[2.0, 0.0]).format(&opts), "2*s");
        assert_eq!(Polynomial::zero().format(&opts), "0");
    }
}
