//! Peer identity: network addresses and registry record identifiers.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

// ============================================================================
// Peer Address
// ============================================================================

/// Network address of a remote peer.
///
/// Always held in canonical form: an IPv4-mapped IPv6 address
/// (`::ffff:10.0.0.1`) collapses to plain IPv4, so a peer accepted on a
/// dual-stack socket and a probe parameter written as a dotted quad resolve
/// to the same registry key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerAddress(IpAddr);

impl PeerAddress {
    /// Creates a peer address, canonicalizing IPv4-mapped IPv6.
    pub fn new(ip: IpAddr) -> Self {
        Self(ip.to_canonical())
    }

    /// Creates a peer address from the remote end of an accepted connection.
    ///
    /// The port is dropped: peers are identified by host only.
    pub fn from_socket_addr(addr: &SocketAddr) -> Self {
        Self::new(addr.ip())
    }

    /// Creates a peer address from a 32-bit IPv4 value (host byte order).
    pub fn from_ipv4_bits(bits: u32) -> Self {
        Self(IpAddr::V4(Ipv4Addr::from(bits)))
    }

    /// Returns the 32-bit IPv4 value, if this is an IPv4 peer.
    pub fn to_ipv4_bits(&self) -> Option<u32> {
        match self.0 {
            IpAddr::V4(v4) => Some(u32::from(v4)),
            IpAddr::V6(_) => None,
        }
    }

    /// Returns the underlying IP address.
    pub fn ip(&self) -> IpAddr {
        self.0
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PeerAddress {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<IpAddr>()
            .map(Self::new)
            .map_err(|_| DomainError::InvalidAddress {
                value: s.to_string(),
            })
    }
}

impl From<IpAddr> for PeerAddress {
    fn from(ip: IpAddr) -> Self {
        Self::new(ip)
    }
}

impl From<Ipv4Addr> for PeerAddress {
    fn from(ip: Ipv4Addr) -> Self {
        Self(IpAddr::V4(ip))
    }
}

// ============================================================================
// Client Id
// ============================================================================

/// Registry-assigned identifier for one accepted connection's record.
///
/// Ids increase monotonically in insertion order, so the highest id for an
/// address is its most recent connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(u64);

impl ClientId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// Returns the id that follows this one.
    #[must_use]
    pub fn next(&self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}
