//! Health probes answered from the client registry.
//!
//! Both probes take exactly one parameter, the peer address as text. The
//! address is parsed into a `PeerAddress`, which canonicalizes it the same
//! way the server does for accepted connections. When a peer has several
//! records (it reconnected), the most recent one answers.
//!
//! Outcomes are kept distinct:
//! - `Ok(true)` / `Ok(false)`: peer known, healthy or not
//! - `ProbeError::PeerUnknown`: no record for that address
//! - `ProbeError::InvalidParameterCount` / `MalformedAddress`: bad request

use tracing::debug;

use hicom_core::{ClientView, PeerAddress};

use crate::registry::RegistryHandle;

/// Read-only query surface over the client registry.
#[derive(Clone)]
pub struct QueryInterface {
    registry: RegistryHandle,
}

impl QueryInterface {
    pub fn new(registry: RegistryHandle) -> Self {
        Self { registry }
    }

    /// Reports whether the peer's most recent record is healthy.
    ///
    /// # Errors
    ///
    /// See the module documentation for the distinct failure outcomes.
    pub async fn status<S: AsRef<str>>(&self, params: &[S]) -> Result<bool, ProbeError> {
        self.lookup(params).await.map(|view| view.healthy)
    }

    /// Returns the peer's last error text (empty if it never failed).
    ///
    /// # Errors
    ///
    /// See the module documentation for the distinct failure outcomes.
    pub async fn last_error<S: AsRef<str>>(&self, params: &[S]) -> Result<String, ProbeError> {
        self.lookup(params).await.map(|view| view.last_error)
    }

    /// Returns every distinct peer address currently held, sorted.
    ///
    /// # Errors
    ///
    /// Returns `ProbeError::Unavailable` if the registry has shut down.
    pub async fn known_peers(&self) -> Result<Vec<PeerAddress>, ProbeError> {
        if !self.registry.is_connected() {
            return Err(ProbeError::Unavailable);
        }

        let mut peers: Vec<PeerAddress> = self
            .registry
            .all()
            .await
            .into_iter()
            .map(|view| view.address)
            .collect();
        peers.sort();
        peers.dedup();
        Ok(peers)
    }

    async fn lookup<S: AsRef<str>>(&self, params: &[S]) -> Result<ClientView, ProbeError> {
        let address = single_address(params)?;

        let view = self
            .registry
            .find(address)
            .await
            .map_err(|_| ProbeError::Unavailable)?;

        match view {
            Some(view) => Ok(view),
            None => {
                debug!(peer = %address, "Probe for unknown peer");
                Err(ProbeError::PeerUnknown(address))
            }
        }
    }
}

/// Extracts the single address parameter of a probe.
fn single_address<S: AsRef<str>>(params: &[S]) -> Result<PeerAddress, ProbeError> {
    let [param] = params else {
        return Err(ProbeError::InvalidParameterCount {
            expected: 1,
            got: params.len(),
        });
    };

    let text = param.as_ref();
    text.parse().map_err(|_| ProbeError::MalformedAddress {
        value: text.to_string(),
    })
}

/// Failure outcomes of a probe.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProbeError {
    #[error("Invalid number of parameters: expected {expected}, got {got}")]
    InvalidParameterCount { expected: usize, got: usize },

    #[error("Malformed peer address: {value:?}")]
    MalformedAddress { value: String },

    #[error("Peer unknown: {0}")]
    PeerUnknown(PeerAddress),

    #[error("Client registry unavailable")]
    Unavailable,
}

impl ProbeError {
    /// Returns true for failures caused by the request itself.
    #[must_use]
    pub fn is_bad_parameter(&self) -> bool {
        matches!(
            self,
            Self::InvalidParameterCount { .. } | Self::MalformedAddress { .. }
        )
    }
}
