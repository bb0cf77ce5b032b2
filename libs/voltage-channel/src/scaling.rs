//! Channel-level scaling: power-of-ten multiplier, negation and delta

use serde::{Deserialize, Serialize};

/// Multiply `value` by `10^exponent`
///
/// Negative exponents divide by the positive power so that decimal
/// values like `4370 * 10^-2` come out as the nearest `f64` to `43.70`.
pub fn scale_pow10(value: f64, exponent: i32) -> f64 {
    if exponent >= 0 {
        value * 10f64.powi(exponent)
    } else {
        value / 10f64.powi(-exponent)
    }
}

/// Scaling applied to every raw value before it is stored
///
/// `stored = raw * 10^multiplier * (negate ? -1 : 1) - delta`,
/// rounded for integer channels.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Scaling {
    #[serde(default)]
    pub multiplier: i32,
    #[serde(default)]
    pub delta: f64,
    #[serde(default)]
    pub negate: bool,
}

impl Scaling {
    pub fn is_identity(&self) -> bool {
        self.multiplier == 0 && self.delta == 0.0 && !self.negate
    }

    /// Raw device value to channel value (unrounded)
    pub fn apply(&self, raw: f64) -> f64 {
        let sign = if self.negate { -1.0 } else { 1.0 };
        scale_pow10(raw, self.multiplier) * sign
    }

    /// Channel value back to raw device value (unrounded)
    ///
    /// Inverse of [`Scaling::apply`] followed by the delta subtraction.
    pub fn remove(&self, value: f64) -> f64 {
        let sign = if self.negate { -1.0 } else { 1.0 };
        scale_pow10((value + self.delta) * sign, -self.multiplier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_pow10() {
        assert_eq!(scale_pow10(4370.0, -2), 43.70);
        assert_eq!(scale_pow10(40.0, 2), 4000.0);
        assert_eq!(scale_pow10(7.0, 0), 7.0);
    }

    #[test]
    fn test_apply_and_remove() {
        let scaling = Scaling {
            multiplier: 1,
            delta: 5.0,
            negate: true,
        };
        // apply does not subtract delta; the caller rounds first
        assert_eq!(scaling.apply(3.0), -30.0);
        assert_eq!(scaling.remove(-35.0), 3.0);
        assert!(Scaling::default().is_identity());
    }
}
