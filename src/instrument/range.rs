//! Per-channel numeric bounds.
//!
//! A non-negative maximum describes the range `0 ..= max`. A negative maximum
//! describes a negative-only output, `max ..= 0`. Out-of-range values are
//! rejected, never clamped.

use crate::error::{IviError, IviResult};
use serde::{Deserialize, Serialize};

/// Immutable bounds for one channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RangeSpec {
    /// Voltage bound in volts. Negative for a negative-only output.
    pub voltage_max: f64,
    /// Current limit bound in amps.
    pub current_max: f64,
    /// Over-voltage protection bound in volts.
    pub ovp_max: f64,
}

impl RangeSpec {
    /// Bounds from three signed maxima.
    pub const fn new(voltage_max: f64, current_max: f64, ovp_max: f64) -> Self {
        Self {
            voltage_max,
            current_max,
            ovp_max,
        }
    }
}

/// Check `value` against the signed range ending at `max`.
pub fn check_bounds(attribute: &'static str, value: f64, max: f64) -> IviResult<()> {
    let (min, max) = if max >= 0.0 { (0.0, max) } else { (max, 0.0) };
    // NaN fails both comparisons, so test for containment instead of exclusion
    if value >= min && value <= max {
        Ok(())
    } else {
        Err(IviError::OutOfRange {
            attribute,
            value,
            min,
            max,
        })
    }
}

/// Check `value` against an explicit closed interval.
pub fn check_between(attribute: &'static str, value: f64, min: f64, max: f64) -> IviResult<()> {
    if value >= min && value <= max {
        Ok(())
    } else {
        Err(IviError::OutOfRange {
            attribute,
            value,
            min,
            max,
        })
    }
}

/// Voltage level check, reported as `voltage_level`.
pub fn check_voltage(spec: &RangeSpec, value: f64) -> IviResult<()> {
    check_bounds("voltage_level", value, spec.voltage_max)
}

/// Current limit check.
pub fn check_current(spec: &RangeSpec, value: f64) -> IviResult<()> {
    check_bounds("current_limit", value, spec.current_max)
}

/// OVP limit check. Applied even on models that cannot write the limit.
pub fn check_ovp(spec: &RangeSpec, value: f64) -> IviResult<()> {
    check_bounds("ovp_limit", value, spec.ovp_max)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn test_positive_range() {
        let spec = RangeSpec::new(30.0, 5.0, 30.0);
        assert!(check_voltage(&spec, 0.0).is_ok());
        assert!(check_voltage(&spec, 15.0).is_ok());
        assert!(check_voltage(&spec, 30.0).is_ok());
        assert!(check_voltage(&spec, 30.0 + EPS).is_err());
        assert!(check_voltage(&spec, -EPS).is_err());

        assert!(check_current(&spec, 5.0).is_ok());
        assert!(check_current(&spec, 5.0 + EPS).is_err());
    }

    #[test]
    fn test_negative_only_range() {
        let spec = RangeSpec::new(-20.0, -1.0, -20.0);
        assert!(check_voltage(&spec, -20.0).is_ok());
        assert!(check_voltage(&spec, -7.5).is_ok());
        assert!(check_voltage(&spec, 0.0).is_ok());
        assert!(check_voltage(&spec, EPS).is_err());
        assert!(check_voltage(&spec, -20.0 - EPS).is_err());

        assert!(check_current(&spec, -0.5).is_ok());
        assert!(check_current(&spec, 0.5).is_err());
    }

    #[test]
    fn test_nan_rejected() {
        let spec = RangeSpec::new(30.0, 5.0, 30.0);
        assert!(check_voltage(&spec, f64::NAN).is_err());
    }

    #[test]
    fn test_error_carries_bounds() {
        let spec = RangeSpec::new(-20.0, 1.0, 20.0);
        match check_voltage(&spec, 3.0) {
            Err(IviError::OutOfRange { min, max, .. }) => {
                assert_eq!(min, -20.0);
                assert_eq!(max, 0.0);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
