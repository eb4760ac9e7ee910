//! Rendering and numeric settings shared by the algebra and the CLI.

use serde::{Deserialize, Serialize};

/// Relative cancellation tolerance: a coefficient of a sum becomes exactly
/// zero when it is this small compared with the terms it was summed from.
pub const DEFAULT_TOLERANCE: f64 = 1e-12;

/// Relative tolerance used when cancelling common polynomial factors.
pub const CANCEL_TOLERANCE: f64 = 1e-9;

/// Precision beyond this adds no digits to an `f64`.
pub const MAX_PRECISION: usize = 17;

/// How rational functions are rendered to text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayOptions {
    /// Round coefficients to this many decimal places. `None` prints the
    /// shortest representation that round-trips.
    pub precision: Option<usize>,
    /// Name of the formal variable.
    pub variable: char,
}

impl Default for DisplayOptions {
    fn default() -> Self {
        Self {
            precision: None,
            variable: 's',
        }
    }
}

impl DisplayOptions {
    pub fn with_precision(mut self, precision: Option<usize>) -> Self {
        self.precision = precision;
        self
    }

    /// Format one coefficient magnitude according to `precision`.
    pub fn format_number(&self, value: f64) -> String {
        let rounded = match self.precision {
            Some(p) => {
                let factor = 10f64.powi(p.min(MAX_PRECISION) as i32);
                let scaled = value * factor;
                if scaled.is_finite() {
                    scaled.round() / factor
                } else {
                    value
                }
            }
            None => value,
        };
        // Avoid printing "-0".
        let rounded = if rounded == 0.0 { 0.0 } else { rounded };
        format!("{}", rounded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_number() {
        let opts = DisplayOptions::default();
        assert_eq!(opts.format_number(10.0), "10");
        assert_eq!(opts.format_number(2.5), "2.5");
        assert_eq!(opts.format_number(-0.0), "0");

        let opts = opts.with_precision(Some(2));
        assert_eq!(opts.format_number(1.0 / 3.0), "0.33");
        assert_eq!(opts.format_number(0.001), "0");
    }

    #[test]
    fn test_huge_precision_is_clamped() {
        let opts = DisplayOptions::default().with_precision(Some(usize::MAX));
        assert_eq!(opts.format_number(2.5), "2.5");
        assert_eq!(opts.format_number(1e300), format!("{}", 1e300));
        let opts = DisplayOptions::default().with_precision(Some(4_294_967_297));
        assert_eq!(opts.format_number(0.125), "0.125");
    }
}
