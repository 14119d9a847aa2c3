//! Message sender closed set

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::ValidationError;

/// Who wrote a conversation message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SenderType {
    Inspector,
    System,
}

impl SenderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inspector => "inspector",
            Self::System => "system",
        }
    }
}

impl FromStr for SenderType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "inspector" => Ok(Self::Inspector),
            "system" => Ok(Self::System),
            other => Err(ValidationError::InvalidVariant {
                field: "sender_type",
                value: other.to_owned(),
            }),
        }
    }
}

impl TryFrom<String> for SenderType {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for SenderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_closed_set() {
        assert_eq!("inspector".parse::<SenderType>().unwrap(), SenderType::Inspector);
        assert_eq!("system".parse::<SenderType>().unwrap(), SenderType::System);
    }

    #[test]
    fn rejects_unknown_sender() {
        assert!("assistant".parse::<SenderType>().is_err());
        assert!("".parse::<SenderType>().is_err());
    }
}
