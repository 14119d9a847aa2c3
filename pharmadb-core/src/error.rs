//! Structured error types for pharmadb-core.
//!
//! The store crate wraps validation failures into its own taxonomy;
//! configuration loading reports through this type.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::models::ValidationError;

/// Main error type for pharmadb-core operations
#[derive(Error, Debug)]
pub enum CoreError {
    /// I/O operation failed
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },

    /// Config file is not valid TOML for the expected layout
    #[error("invalid config file {path:?}: {source}")]
    Toml {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// Configuration value rejected
    #[error("Configuration error: {reason}")]
    Config { reason: String },

    /// Domain value rejected
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Result type alias for pharmadb-core operations
pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    /// Create a config error
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    /// Create a TOML parse error for `path`
    pub fn toml(path: impl Into<PathBuf>, source: toml::de::Error) -> Self {
        Self::Toml {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::config("min_connections exceeds max_connections");
        assert_eq!(
            err.to_string(),
            "Configuration error: min_connections exceeds max_connections"
        );

        let err: CoreError = ValidationError::Empty { field: "name" }.into();
        assert_eq!(err.to_string(), "name cannot be empty");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: CoreError = io_err.into();

        assert!(matches!(err, CoreError::Io { .. }));
    }
}
