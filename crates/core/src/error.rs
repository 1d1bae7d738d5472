//! Domain error model.

use thiserror::Error;

use crate::level::ApprovalLevel;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// invariants, workflow ordering). Collaborator failures belong elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (missing field, malformed date range, ...).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A second line item for the same service was added to a shipment group.
    #[error("service '{service}' is already billed on shipment {shipment}")]
    DuplicateService { service: String, shipment: String },

    /// The line item is locked by a validation level.
    #[error("{item} is locked by {level} validation")]
    ImmutableRecord { item: String, level: ApprovalLevel },

    /// A workflow transition was attempted before its prerequisite.
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested resource was not found (domain-level).
    #[error("not found: {0}")]
    NotFound(String),

    /// The requested state is already reached.
    #[error("conflict: {0}")]
    Conflict(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn duplicate_service(service: impl Into<String>, shipment: impl Into<String>) -> Self {
        Self::DuplicateService {
            service: service.into(),
            shipment: shipment.into(),
        }
    }

    pub fn immutable(item: impl Into<String>, level: ApprovalLevel) -> Self {
        Self::ImmutableRecord {
            item: item.into(),
            level,
        }
    }

    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::Precondition(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }
}
