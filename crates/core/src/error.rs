//! Domain error model.

use thiserror::Error;

use crate::entity::{EntityType, OperationKind};

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// invariants, unsupported operations). Infrastructure concerns belong elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A record failed validation (e.g. empty name, negative quantity).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested record or snapshot was not found (domain-level).
    #[error("not found")]
    NotFound,

    /// The operation kind is not part of the entity's applicable set.
    #[error("{entity} does not support {kind}")]
    UnsupportedOperation {
        entity: EntityType,
        kind: OperationKind,
    },

    /// A record of one entity type was handed to another type's partition.
    #[error("entity mismatch: expected {expected}, got {actual}")]
    EntityMismatch {
        expected: EntityType,
        actual: EntityType,
    },
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }
}
