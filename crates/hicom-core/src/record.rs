//! Per-peer health records and their read-only views.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::peer::{ClientId, PeerAddress};

// ============================================================================
// Classification
// ============================================================================

/// Outcome of checking one received payload against the health signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Classification {
    /// The payload contained the signature.
    Match,

    /// The payload did not contain the signature.
    Mismatch {
        /// Human-readable description of the offending payload
        description: String,
    },
}

impl Classification {
    /// Returns true if this is a signature match.
    #[must_use]
    pub fn is_match(&self) -> bool {
        matches!(self, Self::Match)
    }
}

// ============================================================================
// Client Record
// ============================================================================

/// Health state of one accepted connection.
///
/// Created healthy with an empty `last_error` when the listener accepts
/// the connection, updated on every classified payload, and marked
/// disconnected (never deleted) when the session ends. Removal is the
/// registry's retention policy's business.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientRecord {
    pub id: ClientId,
    pub address: PeerAddress,

    /// True until a payload without the signature is observed
    pub healthy: bool,

    /// Description of the most recent payload that failed classification
    pub last_error: String,

    pub connected_at: DateTime<Utc>,

    /// Last time a payload was classified (or the connect time)
    pub last_seen: DateTime<Utc>,

    /// Set once the session has ended
    pub disconnected_at: Option<DateTime<Utc>>,

    /// Number of payloads classified
    pub payloads: u64,

    /// Number of payloads that failed classification
    pub failures: u64,
}

impl ClientRecord {
    /// Creates the record for a freshly accepted connection.
    pub fn new(id: ClientId, address: PeerAddress) -> Self {
        let now = Utc::now();
        Self {
            id,
            address,
            healthy: true,
            last_error: String::new(),
            connected_at: now,
            last_seen: now,
            disconnected_at: None,
            payloads: 0,
            failures: 0,
        }
    }

    /// Applies a payload classification.
    ///
    /// A match sets `healthy` and leaves `last_error` untouched; a mismatch
    /// clears `healthy` and replaces `last_error`.
    pub fn apply(&mut self, classification: Classification) {
        self.payloads = self.payloads.saturating_add(1);
        self.last_seen = Utc::now();

        match classification {
            Classification::Match => {
                self.healthy = true;
            }
            Classification::Mismatch { description } => {
                self.healthy = false;
                self.failures = self.failures.saturating_add(1);
                self.last_error = description;
            }
        }
    }

    /// Marks the session as ended. Idempotent: the first timestamp wins.
    pub fn mark_disconnected(&mut self) {
        if self.disconnected_at.is_none() {
            self.disconnected_at = Some(Utc::now());
        }
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.disconnected_at.is_none()
    }

    /// Returns true if the session ended more than `retention` ago.
    ///
    /// Live records are never stale.
    #[must_use]
    pub fn is_stale(&self, now: DateTime<Utc>, retention: Duration) -> bool {
        match self.disconnected_at {
            Some(at) => now.signed_duration_since(at) > retention,
            None => false,
        }
    }
}

// ============================================================================
// Client View
// ============================================================================

/// Read-only snapshot of a `ClientRecord`, handed out by registry queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientView {
    pub id: ClientId,
    pub address: PeerAddress,
    pub healthy: bool,
    pub last_error: String,
    pub connected: bool,
    pub connected_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub payloads: u64,
    pub failures: u64,
}

impl ClientView {
    pub fn from_record(record: &ClientRecord) -> Self {
        Self {
            id: record.id,
            address: record.address,
            healthy: record.healthy,
            last_error: record.last_error.clone(),
            connected: record.is_connected(),
            connected_at: record.connected_at,
            last_seen: record.last_seen,
            payloads: record.payloads,
            failures: record.failures,
        }
    }
}
