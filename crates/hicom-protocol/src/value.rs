//! Item result values.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Value returned to the host agent for a successfully processed item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ItemValue {
    /// Unsigned integer (e.g. `1` for ping, `0`/`1` for health)
    Unsigned(u64),

    /// Signed integer
    Integer(i64),

    /// Free text
    Text(String),
}

impl ItemValue {
    /// Returns the value as text if it is a `Text` value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the value as an unsigned integer if it is an `Unsigned` value.
    pub fn as_unsigned(&self) -> Option<u64> {
        match self {
            Self::Unsigned(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for ItemValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unsigned(v) => write!(f, "{v}"),
            Self::Integer(v) => write!(f, "{v}"),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<bool> for ItemValue {
    fn from(value: bool) -> Self {
        Self::Unsigned(u64::from(value))
    }
}
