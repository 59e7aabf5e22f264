//! Item key parsing.
//!
//! The host agent addresses probes by item key: a dotted name optionally
//! followed by a bracketed, comma-separated parameter list.
//!
//! ```text
//! dummy.ping
//! dummy.echo[a message]
//! dummy.random[1,1000]
//! hicom.status[10.0.0.1]
//! dummy.echo["quoted, with comma"]
//! ```
//!
//! Parameters may be double-quoted to carry `,` or `]`; inside quotes `\"`
//! is a literal quote. Leading spaces before a parameter are skipped.
//! `key[]` has a single empty parameter, `key` has none.

use std::fmt;
use std::iter::Peekable;
use std::str::{CharIndices, FromStr};

use thiserror::Error;

/// A parsed item key with its parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemRequest {
    key: String,
    params: Vec<String>,
}

impl ItemRequest {
    /// Creates a request from an already-split key and parameters.
    pub fn new(key: impl Into<String>, params: Vec<String>) -> Self {
        Self {
            key: key.into(),
            params,
        }
    }

    /// Parses an item key such as `dummy.random[1,1000]`.
    ///
    /// # Errors
    ///
    /// Returns an `ItemParseError` describing the first offending position.
    pub fn parse(input: &str) -> Result<Self, ItemParseError> {
        let (key, rest) = match input.split_once('[') {
            Some((key, rest)) => (key, Some(rest)),
            None => (input, None),
        };

        if key.is_empty() {
            return Err(ItemParseError::EmptyKey);
        }

        if let Some((pos, ch)) = key.char_indices().find(|(_, c)| !is_key_char(*c)) {
            return Err(ItemParseError::InvalidKeyChar { ch, pos });
        }

        let params = match rest {
            Some(rest) => parse_params(rest, key.len() + 1)?,
            None => Vec::new(),
        };

        Ok(Self {
            key: key.to_string(),
            params,
        })
    }

    /// Returns the key without parameters.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }

    pub fn param_count(&self) -> usize {
        self.params.len()
    }

    /// Returns the parameter at `index`, if present.
    pub fn param(&self, index: usize) -> Option<&str> {
        self.params.get(index).map(String::as_str)
    }
}

impl FromStr for ItemRequest {
    type Err = ItemParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ItemRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key)?;
        if self.params.is_empty() {
            return Ok(());
        }

        write!(f, "[")?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            if needs_quoting(param) {
                write!(f, "\"{}\"", param.replace('"', "\\\""))?;
            } else {
                write!(f, "{param}")?;
            }
        }
        write!(f, "]")
    }
}

/// Errors produced while parsing an item key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ItemParseError {
    #[error("item key is empty")]
    EmptyKey,

    #[error("invalid character {ch:?} in item key at position {pos}")]
    InvalidKeyChar { ch: char, pos: usize },

    #[error("unexpected character {ch:?} at position {pos}")]
    UnexpectedChar { ch: char, pos: usize },

    #[error("parameter list is not terminated by ']'")]
    UnterminatedParams,

    #[error("quoted parameter is not terminated")]
    UnterminatedQuote,

    #[error("unexpected characters after parameter list at position {pos}")]
    TrailingCharacters { pos: usize },
}

fn is_key_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')
}

fn needs_quoting(param: &str) -> bool {
    param.starts_with([' ', '[', '"']) || param.contains([',', ']'])
}

fn skip_spaces(chars: &mut Peekable<CharIndices<'_>>) {
    while let Some(&(_, ' ')) = chars.peek() {
        chars.next();
    }
}

/// Parses everything after the opening `[`. `offset` is the byte position
/// of `rest` within the full key, for error reporting.
fn parse_params(rest: &str, offset: usize) -> Result<Vec<String>, ItemParseError> {
    let mut params = Vec::new();
    let mut chars = rest.char_indices().peekable();

    loop {
        skip_spaces(&mut chars);
        let mut param = String::new();

        match chars.peek().copied() {
            None => return Err(ItemParseError::UnterminatedParams),
            Some((_, '"')) => {
                chars.next();
                let mut closed = false;
                while let Some((_, c)) = chars.next() {
                    match c {
                        '\\' if matches!(chars.peek(), Some(&(_, '"'))) => {
                            chars.next();
                            param.push('"');
                        }
                        '"' => {
                            closed = true;
                            break;
                        }
                        other => param.push(other),
                    }
                }
                if !closed {
                    return Err(ItemParseError::UnterminatedQuote);
                }
                skip_spaces(&mut chars);
            }
            // Nested arrays are not supported
            Some((pos, '[')) => {
                return Err(ItemParseError::UnexpectedChar {
                    ch: '[',
                    pos: offset + pos,
                });
            }
            Some(_) => {
                while let Some(&(_, c)) = chars.peek() {
                    if c == ',' || c == ']' {
                        break;
                    }
                    param.push(c);
                    chars.next();
                }
            }
        }

        params.push(param);

        match chars.next() {
            Some((_, ',')) => continue,
            Some((_, ']')) => {
                if let Some((pos, _)) = chars.next() {
                    return Err(ItemParseError::TrailingCharacters { pos: offset + pos });
                }
                return Ok(params);
            }
            Some((pos, ch)) => {
                return Err(ItemParseError::UnexpectedChar {
                    ch,
                    pos: offset + pos,
                });
            }
            None => return Err(ItemParseError::UnterminatedParams),
        }
    }
}
