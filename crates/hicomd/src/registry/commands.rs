//! Registry actor commands and errors.
//!
//! This module defines the message types for communicating with the `RegistryActor`:
//! - `RegistryCommand`: Commands sent to the actor
//! - `RegistryError`: Errors that can occur during registry operations
//! - `RemovalReason`: Why a record left the registry

use thiserror::Error;
use tokio::sync::oneshot;

use hicom_core::{Classification, ClientId, ClientView, PeerAddress};

// ============================================================================
// Registry Commands
// ============================================================================

/// Commands sent to the registry actor.
///
/// Each command uses a oneshot channel for the response, enabling
/// request-response patterns in async code without blocking.
#[derive(Debug)]
pub enum RegistryCommand {
    /// Create the record for a newly accepted connection.
    ///
    /// # Errors
    /// - `RegistryError::RegistryFull` if at capacity and no disconnected
    ///   record can be evicted
    Insert {
        /// Remote address of the accepted connection
        address: PeerAddress,
        /// Channel to send the assigned id
        respond_to: oneshot::Sender<Result<ClientId, RegistryError>>,
    },

    /// Apply a payload classification to a record.
    ///
    /// # Errors
    /// - `RegistryError::ClientNotFound` if the record does not exist
    Update {
        id: ClientId,
        classification: Classification,
        respond_to: oneshot::Sender<Result<(), RegistryError>>,
    },

    /// Mark a record's session as ended.
    ///
    /// # Errors
    /// - `RegistryError::ClientNotFound` if the record does not exist
    MarkDisconnected {
        id: ClientId,
        respond_to: oneshot::Sender<Result<(), RegistryError>>,
    },

    /// Find the most recent record for an address.
    Find {
        address: PeerAddress,
        respond_to: oneshot::Sender<Option<ClientView>>,
    },

    /// Get a record by id.
    Get {
        id: ClientId,
        respond_to: oneshot::Sender<Option<ClientView>>,
    },

    /// Get every record, oldest first.
    GetAll {
        respond_to: oneshot::Sender<Vec<ClientView>>,
    },

    /// Count records.
    Count { respond_to: oneshot::Sender<usize> },

    /// Remove disconnected records past the retention period.
    ///
    /// This is a fire-and-forget command used by the cleanup task.
    CleanupStale,
}

// ============================================================================
// Registry Errors
// ============================================================================

/// Errors that can occur during registry operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The registry is at capacity and every record belongs to a live session.
    #[error("registry is full (max: {max} records)")]
    RegistryFull {
        /// Maximum number of records allowed
        max: usize,
    },

    /// The requested record was not found.
    #[error("client not found: {0}")]
    ClientNotFound(ClientId),

    /// The response channel was closed before receiving a response.
    ///
    /// This typically indicates the actor was shut down.
    #[error("response channel closed")]
    ChannelClosed,
}

/// Reason why a record was removed from the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalReason {
    /// Disconnected longer than the retention period.
    Stale,

    /// Evicted to make room for a new connection.
    Evicted,
}

impl std::fmt::Display for RemovalReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stale => write!(f, "retention period elapsed"),
            Self::Evicted => write!(f, "registry capacity reached"),
        }
    }
}
