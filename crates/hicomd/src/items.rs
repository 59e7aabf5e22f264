//! Item key table.
//!
//! The host agent polls the extension through item keys. `ItemTable`
//! publishes the supported keys and dispatches requests to them:
//!
//! | key            | params | value                                   |
//! |----------------|--------|-----------------------------------------|
//! | `dummy.ping`   | -      | `1`                                     |
//! | `dummy.echo`   | 1      | the parameter                           |
//! | `dummy.random` | 2      | random integer in `[from, to]`          |
//! | `hicom.status` | 1      | `1` healthy, `0` unhealthy              |
//! | `hicom.error`  | 1      | last error text                         |
//! | `hicom.peers`  | -      | low-level discovery JSON of known peers |
//!
//! Probe lookups honor the item timeout set by the host.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde_json::json;
use thiserror::Error;
use tokio::time::timeout;
use tracing::debug;

use hicom_protocol::{ItemParseError, ItemRequest, ItemValue};

use crate::query::{ProbeError, QueryInterface};

/// Description of one supported item key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemDescriptor {
    pub key: &'static str,

    /// Whether the key accepts parameters
    pub has_params: bool,

    /// Parameters the host may use to test the key
    pub test_params: Option<&'static str>,
}

/// Every key served by the extension.
pub const ITEM_KEYS: &[ItemDescriptor] = &[
    ItemDescriptor {
        key: "dummy.ping",
        has_params: false,
        test_params: None,
    },
    ItemDescriptor {
        key: "dummy.echo",
        has_params: true,
        test_params: Some("a message"),
    },
    ItemDescriptor {
        key: "dummy.random",
        has_params: true,
        test_params: Some("1,1000"),
    },
    ItemDescriptor {
        key: "hicom.status",
        has_params: true,
        test_params: Some("127.0.0.1"),
    },
    ItemDescriptor {
        key: "hicom.error",
        has_params: true,
        test_params: Some("127.0.0.1"),
    },
    ItemDescriptor {
        key: "hicom.peers",
        has_params: false,
        test_params: None,
    },
];

/// Dispatcher for item requests.
pub struct ItemTable {
    query: QueryInterface,

    /// Host item timeout in seconds, 0 = none
    item_timeout_secs: AtomicU64,
}

impl ItemTable {
    pub fn new(query: QueryInterface) -> Self {
        Self {
            query,
            item_timeout_secs: AtomicU64::new(0),
        }
    }

    /// Returns the supported keys.
    pub fn keys(&self) -> &'static [ItemDescriptor] {
        ITEM_KEYS
    }

    /// Records the host's item processing timeout (0 disables it).
    pub fn set_item_timeout(&self, secs: u64) {
        self.item_timeout_secs.store(secs, Ordering::Relaxed);
        debug!(secs, "Item timeout set");
    }

    pub fn item_timeout(&self) -> Option<Duration> {
        match self.item_timeout_secs.load(Ordering::Relaxed) {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Parses and processes a full item key such as `hicom.status[10.0.0.1]`.
    ///
    /// # Errors
    ///
    /// Returns `ItemError::Parse` for a malformed key, otherwise as `process`.
    pub async fn process_key(&self, key: &str) -> Result<ItemValue, ItemError> {
        let request = ItemRequest::parse(key)?;
        self.process(&request).await
    }

    /// Processes a parsed item request.
    ///
    /// # Errors
    ///
    /// Returns the `ItemError` describing why the item is not supported.
    pub async fn process(&self, request: &ItemRequest) -> Result<ItemValue, ItemError> {
        debug!(key = %request, "Processing item");

        match request.key() {
            "dummy.ping" => Ok(ItemValue::Unsigned(1)),
            "dummy.echo" => echo(request),
            "dummy.random" => random(request),
            "hicom.status" => {
                let healthy = self.bounded(self.query.status(request.params())).await??;
                Ok(ItemValue::from(healthy))
            }
            "hicom.error" => {
                let text = self.bounded(self.query.last_error(request.params())).await??;
                Ok(ItemValue::Text(text))
            }
            "hicom.peers" => {
                let peers = self.bounded(self.query.known_peers()).await??;
                Ok(ItemValue::Text(discovery_json(&peers)))
            }
            other => Err(ItemError::UnsupportedKey(other.to_string())),
        }
    }

    /// Applies the item timeout to a registry-backed probe.
    async fn bounded<F, T>(&self, probe: F) -> Result<T, ItemError>
    where
        F: std::future::Future<Output = T>,
    {
        match self.item_timeout() {
            Some(limit) => timeout(limit, probe).await.map_err(|_| ItemError::Timeout {
                secs: limit.as_secs(),
            }),
            None => Ok(probe.await),
        }
    }
}

fn echo(request: &ItemRequest) -> Result<ItemValue, ItemError> {
    match request.params() {
        [param] => Ok(ItemValue::Text(param.clone())),
        _ => Err(ItemError::InvalidParameterCount),
    }
}

fn random(request: &ItemRequest) -> Result<ItemValue, ItemError> {
    let [from, to] = request.params() else {
        return Err(ItemError::InvalidParameterCount);
    };

    // Lenient like atoi: "12abc" is 12, "abc" is 0
    let from = parse_leading_int(from);
    let to = parse_leading_int(to);

    if from > to {
        return Err(ItemError::InvalidRange);
    }

    let mut bytes = [0u8; 8];
    getrandom::getrandom(&mut bytes).map_err(|e| ItemError::Entropy(e.to_string()))?;

    Ok(ItemValue::Integer(pick_in_range(from, to, u64::from_le_bytes(bytes))))
}

/// Maps `random` onto `[from, to]`. Requires `from <= to`.
fn pick_in_range(from: i64, to: i64, random: u64) -> i64 {
    let span = (i128::from(to) - i128::from(from) + 1) as u128;
    let offset = u128::from(random) % span;
    (i128::from(from) + offset as i128) as i64
}

/// Parses an optional sign and leading digits, ignoring the rest.
/// Saturates instead of overflowing.
fn parse_leading_int(text: &str) -> i64 {
    let text = text.trim_start();
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };

    let mut value: i64 = 0;
    for digit in digits.chars().map_while(|c| c.to_digit(10)) {
        let digit = i64::from(digit);
        value = if negative {
            value.saturating_mul(10).saturating_sub(digit)
        } else {
            value.saturating_mul(10).saturating_add(digit)
        };
    }
    value
}

/// Builds the low-level discovery document for the host agent.
fn discovery_json(peers: &[hicom_core::PeerAddress]) -> String {
    let data: Vec<_> = peers
        .iter()
        .map(|peer| json!({ "{#PEER}": peer.to_string() }))
        .collect();
    json!({ "data": data }).to_string()
}

/// Reasons an item could not be processed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ItemError {
    #[error("Unsupported item key.")]
    UnsupportedKey(String),

    #[error("Invalid number of parameters.")]
    InvalidParameterCount,

    #[error("Invalid range specified.")]
    InvalidRange,

    #[error("Cannot parse item key: {0}")]
    Parse(#[from] ItemParseError),

    #[error("{0}")]
    Probe(#[from] ProbeError),

    #[error("Timeout while processing item ({secs}s).")]
    Timeout { secs: u64 },

    #[error("Cannot obtain random value: {0}")]
    Entropy(String),
}
