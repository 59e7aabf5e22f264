//! Client registry using Actor pattern.
//!
//! The registry is the single owner of every peer's health record. Sessions
//! and probes talk to it through a cheap-to-clone `RegistryHandle`; the
//! actor processes commands one at a time, so concurrent inserts, updates
//! and lookups are serialized without any lock.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐                    ┌─────────────────┐
//! │  HealthServer   │──── Insert ───────▶│                 │
//! └─────────────────┘                    │                 │
//! ┌─────────────────┐                    │  RegistryActor  │
//! │ SessionHandler  │──── Update ───────▶│                 │
//! └─────────────────┘  MarkDisconnected  │ BTreeMap<Id,    │
//! ┌─────────────────┐                    │  ClientRecord>  │
//! │ QueryInterface  │──── Find ─────────▶│                 │
//! └─────────────────┘  (oneshot reply)   └─────────────────┘
//! ```
//!
//! # Retention
//!
//! Records are never removed when a session ends; they are marked
//! disconnected so probes keep reporting the last known state. A background
//! task sweeps disconnected records older than the retention period, and an
//! insert at capacity evicts the oldest disconnected record.
//!
//! # Panic-Free Guarantees
//!
//! All operations in this module follow the panic-free policy:
//! - No `.unwrap()` or `.expect()` in production code
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::debug;

mod actor;
mod commands;
mod handle;

pub use actor::{RegistryActor, DEFAULT_MAX_RECORDS};
pub use commands::{RegistryCommand, RegistryError, RemovalReason};
pub use handle::RegistryHandle;

/// Channel buffer size
const COMMAND_BUFFER: usize = 100;

/// Shortest period accepted for the cleanup ticker
const MIN_CLEANUP_INTERVAL: Duration = Duration::from_millis(1);

/// Limits applied by the registry actor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Maximum number of records held at once
    pub max_records: usize,

    /// How long a disconnected record is kept
    pub retention: Duration,

    /// Interval between stale record sweeps (clamped to at least 1 ms)
    pub cleanup_interval: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_records: DEFAULT_MAX_RECORDS,
            retention: Duration::from_secs(3600),
            cleanup_interval: Duration::from_secs(30),
        }
    }
}

/// Spawn the registry actor and return a handle for interaction.
///
/// This function:
/// 1. Creates the command channel
/// 2. Spawns the RegistryActor on a tokio task
/// 3. Spawns a background cleanup task
/// 4. Returns a RegistryHandle for client use
///
/// The actor stops once every handle has been dropped; the cleanup task
/// only holds a weak sender and does not keep it alive.
///
/// # Example
///
/// ```no_run
/// use hicomd::registry::{spawn_registry, RegistryConfig};
///
/// #[tokio::main]
/// async fn main() {
///     let handle = spawn_registry(RegistryConfig::default());
///
///     let records = handle.all().await;
/// }
/// ```
pub fn spawn_registry(config: RegistryConfig) -> RegistryHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);

    let actor = RegistryActor::new(cmd_rx, &config);
    tokio::spawn(actor.run());

    spawn_cleanup_task(cmd_tx.downgrade(), config.cleanup_interval);

    RegistryHandle::new(cmd_tx)
}

/// Spawn a background task that triggers periodic stale record cleanup.
fn spawn_cleanup_task(sender: mpsc::WeakSender<RegistryCommand>, period: Duration) {
    let period = period.max(MIN_CLEANUP_INTERVAL);

    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;

            let Some(sender) = sender.upgrade() else {
                debug!("Cleanup task stopping: registry handles dropped");
                break;
            };

            // Fire-and-forget cleanup command
            if sender.send(RegistryCommand::CleanupStale).await.is_err() {
                debug!("Cleanup task stopping: registry channel closed");
                break;
            }
        }
    });
}
