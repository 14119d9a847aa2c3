//! Closed sets for experiment records
//!
//! Stored as text columns guarded by CHECK constraints; the Rust side
//! rejects anything outside the set before a statement is issued.
//! Parsing also accepts the Chinese labels used by the bulk-loaded data.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::ValidationError;

/// Lifecycle state of an experiment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExperimentStatus {
    #[default]
    InProgress,
    Completed,
    Abnormal,
}

impl ExperimentStatus {
    pub const ALL: [Self; 3] = [Self::InProgress, Self::Completed, Self::Abnormal];

    /// Get string representation as persisted.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "in-progress",
            Self::Completed => "completed",
            Self::Abnormal => "abnormal",
        }
    }

    /// Label used by the original data set.
    pub fn label_cn(&self) -> &'static str {
        match self {
            Self::InProgress => "进行中",
            Self::Completed => "已完成",
            Self::Abnormal => "异常",
        }
    }

    /// No further transitions happen from a terminal state.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::InProgress)
    }
}

impl FromStr for ExperimentStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "in-progress" | "进行中" => Ok(Self::InProgress),
            "completed" | "已完成" => Ok(Self::Completed),
            "abnormal" | "异常" => Ok(Self::Abnormal),
            other => Err(ValidationError::InvalidVariant {
                field: "status",
                value: other.to_owned(),
            }),
        }
    }
}

impl TryFrom<String> for ExperimentStatus {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for ExperimentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of an experiment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExperimentResult {
    Qualified,
    Unqualified,
    Pending,
}

impl ExperimentResult {
    pub const ALL: [Self; 3] = [Self::Qualified, Self::Unqualified, Self::Pending];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Qualified => "qualified",
            Self::Unqualified => "unqualified",
            Self::Pending => "pending",
        }
    }

    pub fn label_cn(&self) -> &'static str {
        match self {
            Self::Qualified => "合格",
            Self::Unqualified => "不合格",
            Self::Pending => "待定",
        }
    }
}

impl FromStr for ExperimentResult {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "qualified" | "合格" => Ok(Self::Qualified),
            "unqualified" | "不合格" => Ok(Self::Unqualified),
            "pending" | "待定" => Ok(Self::Pending),
            other => Err(ValidationError::InvalidVariant {
                field: "result",
                value: other.to_owned(),
            }),
        }
    }
}

impl TryFrom<String> for ExperimentResult {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for ExperimentResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parses_persisted_and_legacy_forms() {
        for status in ExperimentStatus::ALL {
            assert_eq!(status.as_str().parse::<ExperimentStatus>().unwrap(), status);
            assert_eq!(status.label_cn().parse::<ExperimentStatus>().unwrap(), status);
        }
    }

    #[test]
    fn status_rejects_values_outside_set() {
        let err = "done".parse::<ExperimentStatus>().unwrap_err();
        assert_eq!(
            err,
            ValidationError::InvalidVariant {
                field: "status",
                value: "done".into()
            }
        );
        assert!("In-Progress".parse::<ExperimentStatus>().is_err());
    }

    #[test]
    fn default_status_is_in_progress() {
        assert_eq!(ExperimentStatus::default(), ExperimentStatus::InProgress);
        assert!(!ExperimentStatus::InProgress.is_terminal());
        assert!(ExperimentStatus::Completed.is_terminal());
    }

    #[test]
    fn result_parses_persisted_and_legacy_forms() {
        for result in ExperimentResult::ALL {
            assert_eq!(ExperimentResult::try_from(result.as_str().to_owned()).unwrap(), result);
            assert_eq!(result.label_cn().parse::<ExperimentResult>().unwrap(), result);
        }
        assert!("passed".parse::<ExperimentResult>().is_err());
    }

    #[test]
    fn serde_uses_persisted_form() {
        assert_eq!(serialized(ExperimentStatus::InProgress), "in-progress");
        assert_eq!(serialized(ExperimentStatus::Abnormal), "abnormal");
    }

    fn serialized(status: ExperimentStatus) -> String {
        #[derive(Serialize)]
        struct Wrap {
            status: ExperimentStatus,
        }
        let text = toml::to_string(&Wrap { status }).unwrap();
        text.trim()
            .trim_start_matches("status = ")
            .trim_matches('"')
            .to_owned()
    }
}
