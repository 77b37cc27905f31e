//! Whole-number rendering of observed values.
//!
//! The controller only accepts integers. Small positive floats are reported
//! as `1` so that a real but tiny signal is never confused with zero.

use std::fmt;

/// A raw numeric observation read from a stats snapshot
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Observation {
    /// Integer-valued counter
    Int(i64),
    /// Floating-point counter
    Float(f64),
}

impl Observation {
    /// Whether the value can be rendered at all
    pub fn is_finite(&self) -> bool {
        match self {
            Observation::Int(_) => true,
            Observation::Float(v) => v.is_finite(),
        }
    }
}

impl From<i64> for Observation {
    fn from(v: i64) -> Self {
        Observation::Int(v)
    }
}

impl From<i32> for Observation {
    fn from(v: i32) -> Self {
        Observation::Int(v as i64)
    }
}

impl From<i16> for Observation {
    fn from(v: i16) -> Self {
        Observation::Int(v as i64)
    }
}

impl From<f64> for Observation {
    fn from(v: f64) -> Self {
        Observation::Float(v)
    }
}

impl From<f32> for Observation {
    fn from(v: f32) -> Self {
        Observation::Float(v as f64)
    }
}

impl fmt::Display for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&to_whole_number_string(*self))
    }
}

/// Render an observation as the controller's whole-number string.
///
/// Floats in the open interval `(0, 1)` become `"1"`. Other floats round
/// half up, so `-2.5` becomes `-2`. Integers pass through unchanged. Callers must reject
/// non-finite floats before formatting.
pub fn to_whole_number_string(value: Observation) -> String {
    match value {
        Observation::Int(v) => v.to_string(),
        Observation::Float(v) if v > 0.0 && v < 1.0 => "1".to_string(),
        Observation::Float(v) => {
            let mut rounded = v.round();
            if v - v.trunc() == -0.5 {
                rounded += 1.0;
            }
            if rounded >= i64::MIN as f64 && rounded <= i64::MAX as f64 {
                (rounded as i64).to_string()
            } else {
                format!("{:.0}", rounded)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_positive_floats_report_one() {
        for v in [0.0001, 0.25, 0.5, 0.9999] {
            assert_eq!(to_whole_number_string(Observation::Float(v)), "1");
        }
        assert_eq!(to_whole_number_string(Observation::Float(0.3f32.into())), "1");
    }

    #[test]
    fn test_zero_and_one_are_not_bumped() {
        assert_eq!(to_whole_number_string(Observation::Float(0.0)), "0");
        assert_eq!(to_whole_number_string(Observation::Float(1.0)), "1");
    }

    #[test]
    fn test_round_half_up() {
        assert_eq!(to_whole_number_string(Observation::Float(1.5)), "2");
        assert_eq!(to_whole_number_string(Observation::Float(2.49)), "2");
        assert_eq!(to_whole_number_string(Observation::Float(99.5)), "100");
        assert_eq!(to_whole_number_string(Observation::Float(-0.4)), "0");
        assert_eq!(to_whole_number_string(Observation::Float(-2.5)), "-2");
        assert_eq!(to_whole_number_string(Observation::Float(-0.5)), "0");
        assert_eq!(to_whole_number_string(Observation::Float(-2.6)), "-3");
    }

    #[test]
    fn test_integers_pass_through() {
        for n in [0i64, 1, 42, -7, i64::MAX, i64::MIN] {
            assert_eq!(to_whole_number_string(Observation::Int(n)), n.to_string());
        }
        assert_eq!(Observation::from(4i16).to_string(), "4");
    }

    #[test]
    fn test_is_finite() {
        assert!(Observation::Int(3).is_finite());
        assert!(!Observation::Float(f64::NAN).is_finite());
        assert!(!Observation::Float(f64::INFINITY).is_finite());
    }
}
