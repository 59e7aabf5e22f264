//! Chunk-level rules of the peer echo protocol.
//!
//! There is no framing: a peer writes raw bytes, the service reads them in
//! chunks of at most the buffer size and echoes each chunk verbatim.

/// Default size of the per-session receive buffer.
pub const DEFAULT_BUFFER_SIZE: usize = 1024;

/// A chunk starting with these bytes ends the session.
pub const TERMINATION_TOKEN: &[u8] = b"bye\r";

/// Returns true if the first four bytes of `chunk` are the termination token.
pub fn is_termination(chunk: &[u8]) -> bool {
    chunk.starts_with(TERMINATION_TOKEN)
}

/// Describes a payload for a record's `last_error`.
///
/// Lossy UTF-8 text of the chunk with trailing line terminators removed,
/// so `"garbage\r\n"` from a line-oriented client reads as `garbage`.
/// A chunk made only of line terminators is escaped instead, keeping the
/// description non-empty.
pub fn describe_payload(chunk: &[u8]) -> String {
    let text = String::from_utf8_lossy(chunk);
    let trimmed = text.trim_end_matches(['\r', '\n']);
    if trimmed.is_empty() {
        text.escape_debug().to_string()
    } else {
        trimmed.to_string()
    }
}
