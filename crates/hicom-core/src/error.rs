//! Domain-specific error types following panic-free policy.

use thiserror::Error;

/// Errors that can occur in domain operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Text that does not parse as an IPv4 or IPv6 address
    #[error("Invalid peer address: {value:?}")]
    InvalidAddress { value: String },
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
