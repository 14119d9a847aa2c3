//! Measurement qualification rule
//!
//! A data point is qualified when its value lies inside the inclusive
//! standard range. The flag is only derived when the value and both
//! bounds are present; otherwise it stays unknown.

use serde::{Deserialize, Serialize};

use super::ValidationError;

/// Inclusive standard range for a measurement
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StandardRange {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl StandardRange {
    /// Build a range, rejecting `min > max` and non-finite bounds.
    pub fn new(min: Option<f64>, max: Option<f64>) -> Result<Self, ValidationError> {
        let range = Self { min, max };
        range.validate()?;
        Ok(range)
    }

    /// Range with both bounds set.
    pub fn between(min: f64, max: f64) -> Result<Self, ValidationError> {
        Self::new(Some(min), Some(max))
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        for (field, bound) in [("standard_min", self.min), ("standard_max", self.max)] {
            if let Some(value) = bound {
                if !value.is_finite() {
                    return Err(ValidationError::InvalidFormat {
                        field,
                        reason: "must be a finite number",
                    });
                }
            }
        }
        if let (Some(min), Some(max)) = (self.min, self.max) {
            if min > max {
                return Err(ValidationError::OutOfRange {
                    field: "standard_min",
                    value: min,
                    min: f64::NEG_INFINITY,
                    max,
                });
            }
        }
        Ok(())
    }

    pub fn is_bounded(&self) -> bool {
        self.min.is_some() && self.max.is_some()
    }

    /// Derive `is_qualified` for a measured value.
    pub fn qualifies(&self, value: Option<f64>) -> Option<bool> {
        match (value, self.min, self.max) {
            (Some(v), Some(min), Some(max)) => Some(min <= v && v <= max),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn qualifies_inside_inclusive_range() {
        let range = StandardRange::between(95.0, 100.0).unwrap();
        assert_eq!(range.qualifies(Some(98.5)), Some(true));
        assert_eq!(range.qualifies(Some(101.2)), Some(false));
        assert_eq!(range.qualifies(Some(95.0)), Some(true));
        assert_eq!(range.qualifies(Some(100.0)), Some(true));
    }

    #[test]
    fn unknown_without_value_or_bounds() {
        let range = StandardRange::new(Some(1.0), None).unwrap();
        assert_eq!(range.qualifies(Some(2.0)), None);
        let range = StandardRange::between(1.0, 2.0).unwrap();
        assert_eq!(range.qualifies(None), None);
    }

    #[test]
    fn rejects_inverted_range() {
        assert!(StandardRange::between(100.0, 95.0).is_err());
        assert!(StandardRange::new(Some(f64::NAN), None).is_err());
        assert!(StandardRange::between(5.0, 5.0).is_ok());
    }

    proptest! {
        #[test]
        fn qualified_iff_between_bounds(
            a in -1.0e6f64..1.0e6,
            b in -1.0e6f64..1.0e6,
            v in -1.0e6f64..1.0e6,
        ) {
            let (min, max) = if a <= b { (a, b) } else { (b, a) };
            let range = StandardRange::between(min, max).unwrap();
            prop_assert_eq!(range.qualifies(Some(v)), Some(min <= v && v <= max));
        }
    }
}
