//! Validation errors and field checks shared by every write path

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

/// Config keys are dotted lowercase paths such as `experiment.default_status`.
static CONFIG_KEY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z][a-z0-9_]*(\.[a-z0-9_]+)*$").expect("invalid config key regex")
});

/// Maximum length of a `system_config.config_key`.
pub const MAX_CONFIG_KEY_LEN: usize = 100;

/// Validation error for domain values
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Field is empty when it shouldn't be
    Empty { field: &'static str },

    /// Field exceeds maximum length
    TooLong { field: &'static str, max: usize },

    /// String doesn't match required format
    InvalidFormat { field: &'static str, reason: &'static str },

    /// Value outside a closed set
    InvalidVariant { field: &'static str, value: String },

    /// Numeric value outside its permitted range
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    /// Requested state change is not permitted from the current state
    InvalidTransition {
        field: &'static str,
        from: String,
        to: String,
    },

    /// Value refused with a message built at runtime (bad column names,
    /// values the database could not represent)
    Rejected { field: &'static str, reason: String },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty { field } => write!(f, "{} cannot be empty", field),
            Self::TooLong { field, max } => {
                write!(f, "{} exceeds maximum length of {} characters", field, max)
            }
            Self::InvalidFormat { field, reason } => {
                write!(f, "{}: {}", field, reason)
            }
            Self::InvalidVariant { field, value } => {
                write!(f, "invalid {} value: '{}'", field, value)
            }
            Self::OutOfRange {
                field,
                value,
                min,
                max,
            } => write!(f, "{} = {} is outside [{}, {}]", field, value, min, max),
            Self::InvalidTransition { field, from, to } => {
                write!(f, "{} cannot change from '{}' to '{}'", field, from, to)
            }
            Self::Rejected { field, reason } => write!(f, "{}: {}", field, reason),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Reject empty or whitespace-only required text.
pub fn require_text(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::Empty { field });
    }
    Ok(())
}

/// Reject text longer than `max` characters.
pub fn check_len(field: &'static str, value: &str, max: usize) -> Result<(), ValidationError> {
    if value.chars().count() > max {
        return Err(ValidationError::TooLong { field, max });
    }
    Ok(())
}

/// Confidence scores live in the closed unit interval.
pub fn check_unit_interval(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ValidationError::OutOfRange {
            field,
            value,
            min: 0.0,
            max: 1.0,
        });
    }
    Ok(())
}

/// Reject negative counters and durations.
pub fn check_non_negative(field: &'static str, value: i64) -> Result<(), ValidationError> {
    if value < 0 {
        return Err(ValidationError::OutOfRange {
            field,
            value: value as f64,
            min: 0.0,
            max: f64::INFINITY,
        });
    }
    Ok(())
}

/// Validate a `system_config` key.
pub fn validate_config_key(key: &str) -> Result<(), ValidationError> {
    require_text("config_key", key)?;
    check_len("config_key", key, MAX_CONFIG_KEY_LEN)?;
    if !CONFIG_KEY_RE.is_match(key) {
        return Err(ValidationError::InvalidFormat {
            field: "config_key",
            reason: "must be lowercase dotted segments of [a-z0-9_]",
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ValidationError::TooLong {
            field: "employee_no",
            max: 20,
        };
        assert_eq!(
            err.to_string(),
            "employee_no exceeds maximum length of 20 characters"
        );

        let err = ValidationError::InvalidVariant {
            field: "status",
            value: "done".into(),
        };
        assert_eq!(err.to_string(), "invalid status value: 'done'");
    }

    #[test]
    fn required_text() {
        assert!(require_text("name", "张三").is_ok());
        assert_eq!(
            require_text("name", "   "),
            Err(ValidationError::Empty { field: "name" })
        );
    }

    #[test]
    fn length_counts_characters_not_bytes() {
        // 4 characters, 12 bytes
        assert!(check_len("name", "中国药典", 4).is_ok());
        assert!(check_len("name", "中国药典", 3).is_err());
    }

    #[test]
    fn unit_interval_bounds() {
        assert!(check_unit_interval("confidence_score", 0.0).is_ok());
        assert!(check_unit_interval("confidence_score", 1.0).is_ok());
        assert!(check_unit_interval("confidence_score", 1.01).is_err());
        assert!(check_unit_interval("confidence_score", -0.1).is_err());
        assert!(check_unit_interval("confidence_score", f64::NAN).is_err());
    }

    #[test]
    fn config_keys() {
        assert!(validate_config_key("system.name").is_ok());
        assert!(validate_config_key("experiment.default_status").is_ok());
        assert!(validate_config_key("System.Name").is_err());
        assert!(validate_config_key("system..name").is_err());
        assert!(validate_config_key("").is_err());
        assert!(validate_config_key(&"a".repeat(101)).is_err());
    }
}
