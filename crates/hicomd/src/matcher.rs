//! Health signature matching.
//!
//! The signature is compiled once when the service initializes and shared
//! by every session through an `Arc`. Matching only reads the compiled
//! automaton, so no lock is involved.

use regex::bytes::Regex;
use thiserror::Error;

use hicom_core::Classification;
use hicom_protocol::describe_payload;

/// Signature a healthy peer's payload must contain.
pub const DEFAULT_SIGNATURE: &str = "N2580";

/// Compiled health signature.
#[derive(Debug, Clone)]
pub struct PatternMatcher {
    regex: Regex,
}

impl PatternMatcher {
    /// Compiles `signature` as a regular expression over raw bytes.
    ///
    /// # Errors
    ///
    /// - `MatcherError::EmptySignature` if `signature` is empty (it would
    ///   match every payload)
    /// - `MatcherError::Compile` if the expression is invalid
    pub fn compile(signature: &str) -> Result<Self, MatcherError> {
        if signature.is_empty() {
            return Err(MatcherError::EmptySignature);
        }

        let regex = Regex::new(signature).map_err(|e| MatcherError::Compile {
            signature: signature.to_string(),
            error: e.to_string(),
        })?;

        Ok(Self { regex })
    }

    /// Returns true if the signature occurs anywhere in `payload`.
    pub fn matches(&self, payload: &[u8]) -> bool {
        self.regex.is_match(payload)
    }

    /// Classifies a payload for the client registry.
    pub fn classify(&self, payload: &[u8]) -> Classification {
        if self.matches(payload) {
            Classification::Match
        } else {
            Classification::Mismatch {
                description: describe_payload(payload),
            }
        }
    }

    /// Returns the source signature.
    pub fn signature(&self) -> &str {
        self.regex.as_str()
    }
}

/// Errors raised while compiling the health signature.
#[derive(Debug, Clone, Error)]
pub enum MatcherError {
    #[error("health signature is empty")]
    EmptySignature,

    #[error("failed to compile health signature {signature:?}: {error}")]
    Compile { signature: String, error: String },
}
