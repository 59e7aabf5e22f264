//! hicom-mon Protocol - Wire and item-key conventions
//!
//! This crate provides the conventions shared by the peer-facing TCP
//! listener and the host agent's item interface:
//! - `frame` - chunk-level rules of the echo protocol
//! - `item` - parsing of item keys such as `hicom.status[10.0.0.1]`
//! - `value` - item result values

pub mod frame;
pub mod item;
pub mod value;

pub use frame::{describe_payload, is_termination, DEFAULT_BUFFER_SIZE, TERMINATION_TOKEN};
pub use item::{ItemParseError, ItemRequest};
pub use value::ItemValue;
