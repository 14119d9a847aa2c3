//! Store error taxonomy
//!
//! Every `sqlx::Error` crosses into this type through one `From` impl,
//! so callers match on outcomes (duplicate key, referenced row, pool
//! exhausted) instead of SQLSTATE codes.

use std::fmt;
use std::time::Duration;

use pharmadb_core::ValidationError;

/// Why a transaction was rolled back by the store rather than the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// The session deadline expired while the body was running
    DeadlineExceeded,
    /// SQLSTATE 40001
    SerializationFailure,
    /// SQLSTATE 40P01
    Deadlock,
    /// SQLSTATE 57014, raised by `statement_timeout`
    StatementCancelled,
    /// COMMIT itself failed
    CommitFailed,
    /// The session lost its connection state after an earlier abort
    SessionAbandoned,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::DeadlineExceeded => "deadline exceeded",
            Self::SerializationFailure => "serialization failure",
            Self::Deadlock => "deadlock detected",
            Self::StatementCancelled => "statement cancelled",
            Self::CommitFailed => "commit failed",
            Self::SessionAbandoned => "session abandoned after an earlier abort",
        };
        f.write_str(text)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("not found: {resource} '{id}'")]
    NotFound { resource: &'static str, id: String },

    #[error("duplicate key violates {constraint}")]
    DuplicateKey { constraint: String },

    #[error("constraint {constraint} violated: {detail}")]
    ConstraintViolation { constraint: String, detail: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(#[from] ValidationError),

    #[error("config key '{key}' is not editable")]
    NotEditable { key: String },

    #[error("connection pool exhausted after waiting {waited:?}")]
    ResourceExhausted { waited: Option<Duration> },

    #[error("transaction aborted: {reason}")]
    TransactionAborted {
        reason: AbortReason,
        #[source]
        source: Option<sqlx::Error>,
    },

    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    pub fn not_found(resource: &'static str, id: impl fmt::Display) -> Self {
        Self::NotFound {
            resource,
            id: id.to_string(),
        }
    }

    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument(ValidationError::Rejected {
            field,
            reason: reason.into(),
        })
    }

    pub fn aborted(reason: AbortReason) -> Self {
        Self::TransactionAborted {
            reason,
            source: None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Serialization failures and deadlocks succeed when the whole
    /// transaction is run again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TransactionAborted {
                reason: AbortReason::SerializationFailure | AbortReason::Deadlock,
                ..
            }
        )
    }
}

/// SQLSTATE families the store distinguishes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SqlState {
    UniqueViolation,
    ForeignKeyViolation,
    CheckViolation,
    NotNullViolation,
    DataException,
    SerializationFailure,
    Deadlock,
    QueryCanceled,
    Other,
}

impl SqlState {
    pub(crate) fn classify(code: &str) -> Self {
        match code {
            "23505" => Self::UniqueViolation,
            "23503" => Self::ForeignKeyViolation,
            "23514" => Self::CheckViolation,
            "23502" => Self::NotNullViolation,
            "40001" => Self::SerializationFailure,
            "40P01" => Self::Deadlock,
            "57014" => Self::QueryCanceled,
            code if code.starts_with("22") => Self::DataException,
            _ => Self::Other,
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                Self::ResourceExhausted { waited: None }
            }
            sqlx::Error::Database(ref db) => {
                let state = db
                    .code()
                    .map(|code| SqlState::classify(&code))
                    .unwrap_or(SqlState::Other);
                let constraint = db.constraint().unwrap_or("unnamed").to_owned();
                let detail = db.message().to_owned();

                match state {
                    SqlState::UniqueViolation => Self::DuplicateKey { constraint },
                    SqlState::ForeignKeyViolation
                    | SqlState::CheckViolation
                    | SqlState::NotNullViolation => Self::ConstraintViolation { constraint, detail },
                    SqlState::DataException => Self::invalid("value", detail),
                    SqlState::SerializationFailure => Self::TransactionAborted {
                        reason: AbortReason::SerializationFailure,
                        source: Some(err),
                    },
                    SqlState::Deadlock => Self::TransactionAborted {
                        reason: AbortReason::Deadlock,
                        source: Some(err),
                    },
                    SqlState::QueryCanceled => Self::TransactionAborted {
                        reason: AbortReason::StatementCancelled,
                        source: Some(err),
                    },
                    SqlState::Other => Self::Database(err),
                }
            }
            other => Self::Database(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_integrity_codes() {
        assert_eq!(SqlState::classify("23505"), SqlState::UniqueViolation);
        assert_eq!(SqlState::classify("23503"), SqlState::ForeignKeyViolation);
        assert_eq!(SqlState::classify("23514"), SqlState::CheckViolation);
        assert_eq!(SqlState::classify("23502"), SqlState::NotNullViolation);
    }

    #[test]
    fn classifies_data_and_concurrency_codes() {
        assert_eq!(SqlState::classify("22001"), SqlState::DataException);
        assert_eq!(SqlState::classify("22P02"), SqlState::DataException);
        assert_eq!(SqlState::classify("40001"), SqlState::SerializationFailure);
        assert_eq!(SqlState::classify("40P01"), SqlState::Deadlock);
        assert_eq!(SqlState::classify("57014"), SqlState::QueryCanceled);
        assert_eq!(SqlState::classify("42P01"), SqlState::Other);
    }

    #[test]
    fn pool_timeout_is_resource_exhausted() {
        let err: StoreError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, StoreError::ResourceExhausted { .. }));
    }

    #[test]
    fn row_not_found_stays_a_database_error() {
        let err: StoreError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, StoreError::Database(_)));
        assert!(!err.is_not_found());
    }

    #[test]
    fn validation_becomes_invalid_argument() {
        let err: StoreError = ValidationError::InvalidVariant {
            field: "sender_type",
            value: "bot".into(),
        }
        .into();
        assert_eq!(
            err.to_string(),
            "invalid argument: invalid sender_type value: 'bot'"
        );
    }

    #[test]
    fn invalid_argument_keeps_the_validation_cause() {
        let err: StoreError = ValidationError::TooLong {
            field: "employee_no",
            max: 20,
        }
        .into();
        match err {
            StoreError::InvalidArgument(ValidationError::TooLong { field, max }) => {
                assert_eq!((field, max), ("employee_no", 20));
            }
            other => panic!("unexpected {other:?}"),
        }

        let err = StoreError::invalid("value", "value too long for type character varying(20)");
        assert_eq!(
            err.to_string(),
            "invalid argument: value: value too long for type character varying(20)"
        );
    }

    #[test]
    fn only_serialization_and_deadlock_retry() {
        assert!(StoreError::aborted(AbortReason::SerializationFailure).is_retryable());
        assert!(StoreError::aborted(AbortReason::Deadlock).is_retryable());
        assert!(!StoreError::aborted(AbortReason::DeadlineExceeded).is_retryable());
        assert!(!StoreError::not_found("inspector", 7).is_retryable());
    }
}
