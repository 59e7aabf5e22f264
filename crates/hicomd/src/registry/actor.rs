//! Registry actor - owns all client records and processes commands.
//!
//! The RegistryActor is the single owner of client state in the system.
//! It receives commands via an mpsc channel and answers over oneshot
//! channels.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Reply send failures are ignored (the caller gave up waiting)

use std::collections::{BTreeMap, HashMap};

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use hicom_core::{Classification, ClientId, ClientRecord, ClientView, PeerAddress};

use super::commands::{RegistryCommand, RegistryError, RemovalReason};
use super::RegistryConfig;

/// Default maximum number of records the registry can hold.
pub const DEFAULT_MAX_RECORDS: usize = 1024;

// ============================================================================
// Registry Actor
// ============================================================================

/// The registry actor - owns all client records.
///
/// # Ownership
///
/// - `records`: every record keyed by id. Ids are assigned in insertion
///   order, so iteration is oldest-first.
/// - `by_address`: ids per peer address, ascending. A peer that reconnects
///   has several records; the last id is the most recent connection and is
///   the one `Find` returns.
pub struct RegistryActor {
    /// Command receiver
    receiver: mpsc::Receiver<RegistryCommand>,

    records: BTreeMap<ClientId, ClientRecord>,

    by_address: HashMap<PeerAddress, Vec<ClientId>>,

    /// Id handed to the next insert
    next_id: ClientId,

    max_records: usize,

    retention: chrono::Duration,
}

impl RegistryActor {
    /// Creates a new registry actor.
    pub fn new(receiver: mpsc::Receiver<RegistryCommand>, config: &RegistryConfig) -> Self {
        let retention =
            chrono::Duration::from_std(config.retention).unwrap_or(chrono::Duration::MAX);

        Self {
            receiver,
            records: BTreeMap::new(),
            by_address: HashMap::new(),
            next_id: ClientId::new(1),
            max_records: config.max_records,
            retention,
        }
    }

    /// Runs the actor event loop.
    ///
    /// Processes commands until the channel closes (all senders dropped).
    pub async fn run(mut self) {
        info!(max_records = self.max_records, "Registry actor starting");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        info!(records = self.records.len(), "Registry actor stopped");
    }

    /// Dispatches a command to the appropriate handler.
    fn handle_command(&mut self, cmd: RegistryCommand) {
        match cmd {
            RegistryCommand::Insert {
                address,
                respond_to,
            } => {
                let result = self.handle_insert(address);
                // Ignore send error - client may have dropped the receiver
                let _ = respond_to.send(result);
            }
            RegistryCommand::Update {
                id,
                classification,
                respond_to,
            } => {
                let result = self.handle_update(id, classification);
                let _ = respond_to.send(result);
            }
            RegistryCommand::MarkDisconnected { id, respond_to } => {
                let result = self.handle_mark_disconnected(id);
                let _ = respond_to.send(result);
            }
            RegistryCommand::Find {
                address,
                respond_to,
            } => {
                let _ = respond_to.send(self.handle_find(&address));
            }
            RegistryCommand::Get { id, respond_to } => {
                let _ = respond_to.send(self.records.get(&id).map(ClientView::from_record));
            }
            RegistryCommand::GetAll { respond_to } => {
                let _ = respond_to.send(self.handle_get_all());
            }
            RegistryCommand::Count { respond_to } => {
                let _ = respond_to.send(self.records.len());
            }
            RegistryCommand::CleanupStale => {
                self.handle_cleanup_stale();
            }
        }
    }

    // ========================================================================
    // Command Handlers
    // ========================================================================

    /// Handles record creation for an accepted connection.
    fn handle_insert(&mut self, address: PeerAddress) -> Result<ClientId, RegistryError> {
        if self.records.len() >= self.max_records {
            match self.oldest_disconnected() {
                Some(victim) => self.remove(victim, RemovalReason::Evicted),
                None => {
                    warn!(
                        peer = %address,
                        current = self.records.len(),
                        max = self.max_records,
                        "Registry is full, rejecting connection"
                    );
                    return Err(RegistryError::RegistryFull {
                        max: self.max_records,
                    });
                }
            }
        }

        let id = self.next_id;
        self.next_id = id.next();

        self.records.insert(id, ClientRecord::new(id, address));
        self.by_address.entry(address).or_default().push(id);

        info!(
            client = %id,
            peer = %address,
            total_records = self.records.len(),
            "Client registered"
        );

        Ok(id)
    }

    /// Handles a payload classification for a record.
    fn handle_update(
        &mut self,
        id: ClientId,
        classification: Classification,
    ) -> Result<(), RegistryError> {
        let record = self
            .records
            .get_mut(&id)
            .ok_or(RegistryError::ClientNotFound(id))?;

        let was_healthy = record.healthy;
        record.apply(classification);

        if was_healthy != record.healthy {
            info!(
                client = %id,
                peer = %record.address,
                healthy = record.healthy,
                last_error = %record.last_error,
                "Client health changed"
            );
        } else {
            debug!(client = %id, healthy = record.healthy, "Client updated");
        }

        Ok(())
    }

    fn handle_mark_disconnected(&mut self, id: ClientId) -> Result<(), RegistryError> {
        let record = self
            .records
            .get_mut(&id)
            .ok_or(RegistryError::ClientNotFound(id))?;

        record.mark_disconnected();
        debug!(client = %id, peer = %record.address, "Client marked disconnected");

        Ok(())
    }

    /// Handles lookup by address: the most recent record wins.
    fn handle_find(&self, address: &PeerAddress) -> Option<ClientView> {
        self.by_address
            .get(address)
            .and_then(|ids| ids.last())
            .and_then(|id| self.records.get(id))
            .map(ClientView::from_record)
    }

    fn handle_get_all(&self) -> Vec<ClientView> {
        self.records.values().map(ClientView::from_record).collect()
    }

    /// Handles removal of disconnected records past the retention period.
    fn handle_cleanup_stale(&mut self) {
        let now = Utc::now();

        let stale: Vec<ClientId> = self
            .records
            .values()
            .filter(|record| record.is_stale(now, self.retention))
            .map(|record| record.id)
            .collect();

        if stale.is_empty() {
            return;
        }

        for id in &stale {
            self.remove(*id, RemovalReason::Stale);
        }

        info!(
            removed = stale.len(),
            remaining = self.records.len(),
            "Stale client cleanup complete"
        );
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn oldest_disconnected(&self) -> Option<ClientId> {
        self.records
            .values()
            .find(|record| !record.is_connected())
            .map(|record| record.id)
    }

    fn remove(&mut self, id: ClientId, reason: RemovalReason) {
        let Some(record) = self.records.remove(&id) else {
            return;
        };

        if let Some(ids) = self.by_address.get_mut(&record.address) {
            ids.retain(|other| *other != id);
            if ids.is_empty() {
                self.by_address.remove(&record.address);
            }
        }

        debug!(
            client = %id,
            peer = %record.address,
            reason = %reason,
            "Client record removed"
        );
    }

    /// Returns the current number of records (for testing).
    #[cfg(test)]
    pub fn record_count(&self) -> usize {
        self.records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::oneshot;

    fn create_actor(max_records: usize, retention: Duration) -> RegistryActor {
        let (_tx, rx) = mpsc::channel(16);
        let config = RegistryConfig {
            max_records,
            retention,
            cleanup_interval: Duration::from_secs(30),
        };
        RegistryActor::new(rx, &config)
    }

    fn addr(s: &str) -> PeerAddress {
        s.parse().unwrap()
    }

    async fn insert(actor: &mut RegistryActor, address: &str) -> Result<ClientId, RegistryError> {
        let (tx, rx) = oneshot::channel();
        actor.handle_command(RegistryCommand::Insert {
            address: addr(address),
            respond_to: tx,
        });
        rx.await.unwrap()
    }

    async fn find(actor: &mut RegistryActor, address: &str) -> Option<ClientView> {
        let (tx, rx) = oneshot::channel();
        actor.handle_command(RegistryCommand::Find {
            address: addr(address),
            respond_to: tx,
        });
        rx.await.unwrap()
    }

    async fn update(
        actor: &mut RegistryActor,
        id: ClientId,
        classification: Classification,
    ) -> Result<(), RegistryError> {
        let (tx, rx) = oneshot::channel();
        actor.handle_command(RegistryCommand::Update {
            id,
            classification,
            respond_to: tx,
        });
        rx.await.unwrap()
    }

    async fn disconnect(actor: &mut RegistryActor, id: ClientId) {
        let (tx, rx) = oneshot::channel();
        actor.handle_command(RegistryCommand::MarkDisconnected { id, respond_to: tx });
        rx.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_insert_creates_healthy_record() {
        let mut actor = create_actor(10, Duration::from_secs(60));

        let id = insert(&mut actor, "10.0.0.1").await.unwrap();
        assert_eq!(actor.record_count(), 1);

        let view = find(&mut actor, "10.0.0.1").await.unwrap();
        assert_eq!(view.id, id);
        assert!(view.healthy);
        assert!(view.last_error.is_empty());
        assert!(view.connected);
    }

    #[tokio::test]
    async fn test_ids_increase() {
        let mut actor = create_actor(10, Duration::from_secs(60));

        let first = insert(&mut actor, "10.0.0.1").await.unwrap();
        let second = insert(&mut actor, "10.0.0.2").await.unwrap();
        assert!(second > first);
    }

    #[tokio::test]
    async fn test_update_mismatch_then_match() {
        let mut actor = create_actor(10, Duration::from_secs(60));
        let id = insert(&mut actor, "10.0.0.1").await.unwrap();

        update(
            &mut actor,
            id,
            Classification::Mismatch {
                description: "garbage".to_string(),
            },
        )
        .await
        .unwrap();

        let view = find(&mut actor, "10.0.0.1").await.unwrap();
        assert!(!view.healthy);
        assert_eq!(view.last_error, "garbage");

        update(&mut actor, id, Classification::Match).await.unwrap();
        let view = find(&mut actor, "10.0.0.1").await.unwrap();
        assert!(view.healthy);
        assert_eq!(view.payloads, 2);
    }

    #[tokio::test]
    async fn test_update_unknown_client_fails() {
        let mut actor = create_actor(10, Duration::from_secs(60));

        let result = update(&mut actor, ClientId::new(99), Classification::Match).await;
        assert_eq!(result, Err(RegistryError::ClientNotFound(ClientId::new(99))));
    }

    #[tokio::test]
    async fn test_find_unknown_address() {
        let mut actor = create_actor(10, Duration::from_secs(60));
        insert(&mut actor, "10.0.0.2").await.unwrap();

        assert!(find(&mut actor, "10.0.0.1").await.is_none());
    }

    #[tokio::test]
    async fn test_find_returns_most_recent_duplicate() {
        let mut actor = create_actor(10, Duration::from_secs(60));

        let old = insert(&mut actor, "10.0.0.1").await.unwrap();
        update(
            &mut actor,
            old,
            Classification::Mismatch {
                description: "old failure".to_string(),
            },
        )
        .await
        .unwrap();
        disconnect(&mut actor, old).await;

        let new = insert(&mut actor, "10.0.0.1").await.unwrap();
        assert_eq!(actor.record_count(), 2);

        let view = find(&mut actor, "10.0.0.1").await.unwrap();
        assert_eq!(view.id, new);
        assert!(view.healthy);
        assert!(view.last_error.is_empty());
    }

    #[tokio::test]
    async fn test_disconnected_record_still_found() {
        let mut actor = create_actor(10, Duration::from_secs(60));
        let id = insert(&mut actor, "10.0.0.1").await.unwrap();
        disconnect(&mut actor, id).await;

        let view = find(&mut actor, "10.0.0.1").await.unwrap();
        assert!(!view.connected);
    }

    #[tokio::test]
    async fn test_full_registry_evicts_oldest_disconnected() {
        let mut actor = create_actor(2, Duration::from_secs(60));

        let first = insert(&mut actor, "10.0.0.1").await.unwrap();
        let _second = insert(&mut actor, "10.0.0.2").await.unwrap();
        disconnect(&mut actor, first).await;

        let third = insert(&mut actor, "10.0.0.3").await.unwrap();
        assert_eq!(actor.record_count(), 2);
        assert!(find(&mut actor, "10.0.0.1").await.is_none());
        assert_eq!(find(&mut actor, "10.0.0.3").await.unwrap().id, third);
    }

    #[tokio::test]
    async fn test_full_registry_of_live_sessions_rejects() {
        let mut actor = create_actor(2, Duration::from_secs(60));

        insert(&mut actor, "10.0.0.1").await.unwrap();
        insert(&mut actor, "10.0.0.2").await.unwrap();

        let result = insert(&mut actor, "10.0.0.3").await;
        assert_eq!(result, Err(RegistryError::RegistryFull { max: 2 }));
        assert_eq!(actor.record_count(), 2);
    }

    #[tokio::test]
    async fn test_eviction_keeps_newer_duplicate_findable() {
        let mut actor = create_actor(2, Duration::from_secs(60));

        let old = insert(&mut actor, "10.0.0.1").await.unwrap();
        disconnect(&mut actor, old).await;
        let new = insert(&mut actor, "10.0.0.1").await.unwrap();

        // Evicts `old`, the only disconnected record
        insert(&mut actor, "10.0.0.2").await.unwrap();

        assert_eq!(find(&mut actor, "10.0.0.1").await.unwrap().id, new);
    }

    #[tokio::test]
    async fn test_cleanup_stale_removes_only_expired_disconnected() {
        let mut actor = create_actor(10, Duration::ZERO);

        let gone = insert(&mut actor, "10.0.0.1").await.unwrap();
        insert(&mut actor, "10.0.0.2").await.unwrap();
        disconnect(&mut actor, gone).await;

        // Zero retention: anything disconnected in the past is stale
        tokio::time::sleep(Duration::from_millis(5)).await;
        actor.handle_command(RegistryCommand::CleanupStale);

        assert_eq!(actor.record_count(), 1);
        assert!(find(&mut actor, "10.0.0.1").await.is_none());
        assert!(find(&mut actor, "10.0.0.2").await.is_some());
    }

    #[tokio::test]
    async fn test_cleanup_stale_keeps_recent() {
        let mut actor = create_actor(10, Duration::from_secs(3600));

        let id = insert(&mut actor, "10.0.0.1").await.unwrap();
        disconnect(&mut actor, id).await;
        actor.handle_command(RegistryCommand::CleanupStale);

        assert_eq!(actor.record_count(), 1);
    }

    #[tokio::test]
    async fn test_get_all_oldest_first() {
        let mut actor = create_actor(10, Duration::from_secs(60));
        insert(&mut actor, "10.0.0.3").await.unwrap();
        insert(&mut actor, "10.0.0.1").await.unwrap();

        let (tx, rx) = oneshot::channel();
        actor.handle_command(RegistryCommand::GetAll { respond_to: tx });
        let all = rx.await.unwrap();

        let addresses: Vec<String> = all.iter().map(|v| v.address.to_string()).collect();
        assert_eq!(addresses, ["10.0.0.3", "10.0.0.1"]);
    }
}
