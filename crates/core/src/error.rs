//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// missing items, uniqueness conflicts, identifier exhaustion). Infrastructure
/// concerns belong elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. empty barcode list, missing issuer).
    #[error("validation failed: {0}")]
    Validation(String),

    /// An identifier was invalid (e.g. parse failure, outside the id range).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A referenced item does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A uniqueness conflict (barcode or system id already taken).
    #[error("conflict: {0}")]
    Conflict(String),

    /// The fixed system id space is exhausted.
    #[error("overflow: {0}")]
    Overflow(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn overflow(msg: impl Into<String>) -> Self {
        Self::Overflow(msg.into())
    }
}
