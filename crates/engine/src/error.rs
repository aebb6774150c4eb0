//! The module contains the errors the engine can return.
//!
//! Every error carries a human readable message and maps to a stable
//! machine readable [`ErrorKind`] through [`EngineError::kind`], so callers
//! can build their own presentation layer on top of it.
//!
//! - [`Validation`] malformed or out-of-range input.
//! - [`InvalidStateTransition`] the record is not in the state the operation
//!   requires; re-fetch and retry.
//! - [`NotFound`] a referenced member, loan or record is absent.
//! - [`IntegrityViolation`] stored data breaks an engine invariant.
//!
//!  [`Validation`]: EngineError::Validation
//!  [`InvalidStateTransition`]: EngineError::InvalidStateTransition
//!  [`NotFound`]: EngineError::NotFound
//!  [`IntegrityViolation`]: EngineError::IntegrityViolation
use sea_orm::DbErr;
use serde::Serialize;
use thiserror::Error;

/// Engine custom errors.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),
    #[error("\"{0}\" not found!")]
    NotFound(String),
    #[error("Integrity violation: {0}")]
    IntegrityViolation(String),
    #[error("Invalid id: {0}")]
    InvalidId(String),
    #[error(transparent)]
    Database(#[from] DbErr),
}

/// Stable, machine readable error classification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    InvalidAmount,
    InvalidStateTransition,
    NotFound,
    IntegrityViolation,
    InvalidId,
    Database,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation_error",
            Self::InvalidAmount => "invalid_amount",
            Self::InvalidStateTransition => "invalid_state_transition",
            Self::NotFound => "not_found",
            Self::IntegrityViolation => "integrity_violation",
            Self::InvalidId => "invalid_id",
            Self::Database => "database",
        }
    }
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::InvalidAmount(_) => ErrorKind::InvalidAmount,
            Self::InvalidStateTransition(_) => ErrorKind::InvalidStateTransition,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::IntegrityViolation(_) => ErrorKind::IntegrityViolation,
            Self::InvalidId(_) => ErrorKind::InvalidId,
            Self::Database(_) => ErrorKind::Database,
        }
    }
}

impl PartialEq for EngineError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Validation(a), Self::Validation(b)) => a == b,
            (Self::InvalidAmount(a), Self::InvalidAmount(b)) => a == b,
            (Self::InvalidStateTransition(a), Self::InvalidStateTransition(b)) => a == b,
            (Self::NotFound(a), Self::NotFound(b)) => a == b,
            (Self::IntegrityViolation(a), Self::IntegrityViolation(b)) => a == b,
            (Self::InvalidId(a), Self::InvalidId(b)) => a == b,
            (Self::Database(a), Self::Database(b)) => a.to_string() == b.to_string(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable_codes() {
        let err = EngineError::InvalidStateTransition("loan is active".to_string());
        assert_eq!(err.kind(), ErrorKind::InvalidStateTransition);
        assert_eq!(err.kind().as_str(), "invalid_state_transition");
        assert_eq!(
            err.to_string(),
            "Invalid state transition: loan is active"
        );
    }

    #[test]
    fn database_errors_are_classified() {
        let err = EngineError::from(DbErr::Custom("boom".to_string()));
        assert_eq!(err.kind().as_str(), "database");
    }
}
