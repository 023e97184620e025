//! Error taxonomy surfaced to callers of the register

use rusqlite::ErrorCode;
use thiserror::Error;

use crate::database::DatabaseError;
use crate::model::LabelError;

#[derive(Error, Debug)]
pub enum RegisterError {
    #[error("invalid {field}: {message}")]
    Validation { field: &'static str, message: String },
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },
    #[error("{entity} constraint violated: {message}")]
    Constraint { entity: &'static str, message: String },
    #[error("{entity} {id} was modified concurrently (expected version {expected}, found {actual})")]
    Conflict {
        entity: &'static str,
        id: i64,
        expected: i64,
        actual: i64,
    },
    #[error("persistence error: {0}")]
    Persistence(#[from] DatabaseError),
}

impl RegisterError {
    pub(crate) fn validation(field: &'static str, message: impl Into<String>) -> Self {
        RegisterError::Validation {
            field,
            message: message.into(),
        }
    }

    pub(crate) fn not_found(entity: &'static str, id: i64) -> Self {
        RegisterError::NotFound { entity, id }
    }

    /// Whether retrying the same call could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RegisterError::Conflict { .. } | RegisterError::Persistence(_)
        )
    }
}

impl From<rusqlite::Error> for RegisterError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(code, message)
                if code.code == ErrorCode::ConstraintViolation =>
            {
                RegisterError::Constraint {
                    entity: "record",
                    message: message.clone().unwrap_or_else(|| err.to_string()),
                }
            }
            _ => RegisterError::Persistence(DatabaseError::Sqlite(err)),
        }
    }
}

impl From<LabelError> for RegisterError {
    fn from(err: LabelError) -> Self {
        RegisterError::Validation {
            field: err.field,
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RegisterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_error_becomes_validation() {
        let err: RegisterError = "Sometimes".parse::<crate::model::ImpactLevel>().unwrap_err().into();
        match err {
            RegisterError::Validation { field, .. } => assert_eq!(field, "impact"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_retryable_errors() {
        let conflict = RegisterError::Conflict {
            entity: "risk",
            id: 1,
            expected: 1,
            actual: 2,
        };
        assert!(conflict.is_retryable());
        assert!(!RegisterError::not_found("risk", 7).is_retryable());
        assert_eq!(RegisterError::not_found("risk", 7).to_string(), "risk 7 not found");
    }
}
