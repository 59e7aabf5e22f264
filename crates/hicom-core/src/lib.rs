//! hicom-mon Core - Shared types for peer health monitoring
//!
//! This crate provides the domain types shared between the service
//! (hicomd) and anything that reads its state.
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod error;
pub mod peer;
pub mod record;

// Re-exports for convenience
pub use error::{DomainError, DomainResult};
pub use peer::{ClientId, PeerAddress};
pub use record::{Classification, ClientRecord, ClientView};
