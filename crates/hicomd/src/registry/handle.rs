//! Client interface for interacting with the RegistryActor.
//!
//! The `RegistryHandle` provides a cheap-to-clone interface for sending
//! commands to the registry actor.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Channel errors are mapped to `RegistryError::ChannelClosed`

use tokio::sync::{mpsc, oneshot};

use hicom_core::{Classification, ClientId, ClientView, PeerAddress};

use super::commands::{RegistryCommand, RegistryError};

// ============================================================================
// Registry Handle
// ============================================================================

/// Handle for interacting with the registry actor.
///
/// This is a cheap-to-clone handle that can be shared across tasks.
/// All methods are async and communicate with the actor via channels.
///
/// # Usage
///
/// ```ignore
/// let id = handle.insert(peer).await?;
/// handle.update(id, Classification::Match).await?;
/// let view = handle.find(peer).await?;
/// ```
#[derive(Clone)]
pub struct RegistryHandle {
    /// Command sender to the actor
    sender: mpsc::Sender<RegistryCommand>,
}

impl RegistryHandle {
    /// Create a new registry handle.
    pub fn new(sender: mpsc::Sender<RegistryCommand>) -> Self {
        Self { sender }
    }

    /// Sends a command built around a fresh oneshot and awaits the reply.
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> RegistryCommand,
    ) -> Result<T, RegistryError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(build(tx))
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;

        rx.await.map_err(|_| RegistryError::ChannelClosed)
    }

    /// Create the record for an accepted connection.
    ///
    /// # Errors
    ///
    /// - `RegistryError::RegistryFull` if the registry is at capacity
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn insert(&self, address: PeerAddress) -> Result<ClientId, RegistryError> {
        self.request(|respond_to| RegistryCommand::Insert {
            address,
            respond_to,
        })
        .await?
    }

    /// Apply a payload classification to a record.
    ///
    /// # Errors
    ///
    /// - `RegistryError::ClientNotFound` if the record doesn't exist
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn update(
        &self,
        id: ClientId,
        classification: Classification,
    ) -> Result<(), RegistryError> {
        self.request(|respond_to| RegistryCommand::Update {
            id,
            classification,
            respond_to,
        })
        .await?
    }

    /// Mark a record's session as ended.
    ///
    /// # Errors
    ///
    /// - `RegistryError::ClientNotFound` if the record doesn't exist
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn mark_disconnected(&self, id: ClientId) -> Result<(), RegistryError> {
        self.request(|respond_to| RegistryCommand::MarkDisconnected { id, respond_to })
            .await?
    }

    /// Find the most recent record for an address.
    ///
    /// `Ok(None)` means the peer is unknown.
    ///
    /// # Errors
    ///
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn find(&self, address: PeerAddress) -> Result<Option<ClientView>, RegistryError> {
        self.request(|respond_to| RegistryCommand::Find {
            address,
            respond_to,
        })
        .await
    }

    /// Get a record by id.
    ///
    /// Returns `None` if the record doesn't exist or if communication
    /// with the actor fails.
    pub async fn get(&self, id: ClientId) -> Option<ClientView> {
        self.request(|respond_to| RegistryCommand::Get { id, respond_to })
            .await
            .ok()
            .flatten()
    }

    /// Get all records, oldest first.
    ///
    /// Returns an empty vector if communication with the actor fails.
    pub async fn all(&self) -> Vec<ClientView> {
        self.request(|respond_to| RegistryCommand::GetAll { respond_to })
            .await
            .unwrap_or_default()
    }

    /// Count records.
    ///
    /// Returns 0 if communication with the actor fails.
    pub async fn len(&self) -> usize {
        self.request(|respond_to| RegistryCommand::Count { respond_to })
            .await
            .unwrap_or(0)
    }

    /// Trigger cleanup of stale records.
    ///
    /// This is a fire-and-forget operation - it does not wait for
    /// the cleanup to complete or return any result.
    pub async fn cleanup_stale(&self) {
        // Fire-and-forget: ignore send errors (actor may be shutting down)
        let _ = self.sender.send(RegistryCommand::CleanupStale).await;
    }

    /// Check if the actor is still running.
    ///
    /// Returns `true` if the command channel is still open.
    pub fn is_connected(&self) -> bool {
        !self.sender.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_handle() -> (RegistryHandle, mpsc::Receiver<RegistryCommand>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        (RegistryHandle::new(cmd_tx), cmd_rx)
    }

    fn addr(s: &str) -> PeerAddress {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_insert_sends_command() {
        let (handle, mut rx) = create_test_handle();

        let cmd_handler = tokio::spawn(async move {
            if let Some(RegistryCommand::Insert {
                address,
                respond_to,
            }) = rx.recv().await
            {
                assert_eq!(address.to_string(), "10.0.0.1");
                let _ = respond_to.send(Ok(ClientId::new(1)));
                return true;
            }
            false
        });

        let result = handle.insert(addr("10.0.0.1")).await;
        assert_eq!(result, Ok(ClientId::new(1)));
        assert!(cmd_handler.await.unwrap());
    }

    #[tokio::test]
    async fn test_insert_channel_closed_error() {
        let (handle, rx) = create_test_handle();
        drop(rx);

        let result = handle.insert(addr("10.0.0.1")).await;
        assert_eq!(result, Err(RegistryError::ChannelClosed));
    }

    #[tokio::test]
    async fn test_update_sends_classification() {
        let (handle, mut rx) = create_test_handle();

        let cmd_handler = tokio::spawn(async move {
            if let Some(RegistryCommand::Update {
                id,
                classification,
                respond_to,
            }) = rx.recv().await
            {
                assert_eq!(id, ClientId::new(3));
                assert!(!classification.is_match());
                let _ = respond_to.send(Ok(()));
                return true;
            }
            false
        });

        let result = handle
            .update(
                ClientId::new(3),
                Classification::Mismatch {
                    description: "garbage".to_string(),
                },
            )
            .await;
        assert!(result.is_ok());
        assert!(cmd_handler.await.unwrap());
    }

    #[tokio::test]
    async fn test_find_distinguishes_closed_from_unknown() {
        let (handle, mut rx) = create_test_handle();

        tokio::spawn(async move {
            if let Some(RegistryCommand::Find { respond_to, .. }) = rx.recv().await {
                let _ = respond_to.send(None);
            }
        });
        assert_eq!(handle.find(addr("10.0.0.1")).await, Ok(None));

        let (handle, rx) = create_test_handle();
        drop(rx);
        assert_eq!(
            handle.find(addr("10.0.0.1")).await,
            Err(RegistryError::ChannelClosed)
        );
    }

    #[tokio::test]
    async fn test_reads_default_on_channel_close() {
        let (handle, rx) = create_test_handle();
        drop(rx);

        assert!(handle.get(ClientId::new(1)).await.is_none());
        assert!(handle.all().await.is_empty());
        assert_eq!(handle.len().await, 0);
    }

    #[tokio::test]
    async fn test_dropped_reply_is_channel_closed() {
        let (handle, mut rx) = create_test_handle();

        tokio::spawn(async move {
            // Receive and drop without answering
            let _ = rx.recv().await;
        });

        let result = handle.mark_disconnected(ClientId::new(1)).await;
        assert_eq!(result, Err(RegistryError::ChannelClosed));
    }

    #[tokio::test]
    async fn test_cleanup_stale_ignores_closed_channel() {
        let (handle, rx) = create_test_handle();
        drop(rx);

        // Should not panic or error
        handle.cleanup_stale().await;
    }

    #[tokio::test]
    async fn test_is_connected() {
        let (handle, rx) = create_test_handle();
        assert!(handle.is_connected());

        drop(rx);
        assert!(!handle.is_connected());
    }
}
