//! Session handler for individual peer connections.
//!
//! Each accepted connection gets its own `SessionHandler` that:
//! - Reads raw chunks of up to the buffer size
//! - Classifies each chunk against the health signature
//! - Records the outcome in the client registry
//! - Echoes the exact chunk back to the peer
//!
//! A chunk starting with `bye\r` is echoed and ends the session without
//! being classified. The handler owns the stream, so every exit path drops
//! it exactly once.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Session errors are logged and end only the affected session

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use hicom_core::{ClientId, PeerAddress};
use hicom_protocol::{is_termination, DEFAULT_BUFFER_SIZE};

use crate::matcher::PatternMatcher;
use crate::registry::RegistryHandle;

/// Per-session I/O settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Maximum bytes read per chunk
    pub buffer_size: usize,

    /// Idle read deadline (None = wait forever)
    pub read_timeout: Option<Duration>,

    /// Deadline for echoing a chunk
    pub write_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            read_timeout: Some(Duration::from_secs(300)),
            write_timeout: Duration::from_secs(10),
        }
    }
}

/// How a session ended.
#[derive(Debug)]
pub enum SessionEnd {
    /// The peer closed its side (zero-byte read).
    PeerClosed,

    /// The peer sent the termination token.
    Terminated,

    /// No data arrived within the read deadline.
    TimedOut,

    /// The service is shutting down.
    Shutdown,

    /// An I/O or registry error aborted the session.
    Failed(SessionError),
}

/// Session handler for a single peer connection.
pub struct SessionHandler<S> {
    stream: S,

    /// Remote address, for logging
    peer: PeerAddress,

    /// Registry record created when the connection was accepted
    client_id: ClientId,

    registry: RegistryHandle,

    matcher: Arc<PatternMatcher>,

    config: SessionConfig,

    cancel_token: CancellationToken,
}

impl<S> SessionHandler<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a new session handler.
    ///
    /// # Arguments
    ///
    /// * `stream` - The accepted connection
    /// * `peer` - Remote address of the connection
    /// * `client_id` - Registry record already created for this connection
    /// * `registry` - Handle to the client registry
    /// * `matcher` - Shared compiled health signature
    /// * `config` - Buffer size and deadlines
    /// * `cancel_token` - Service-wide shutdown signal
    pub fn new(
        stream: S,
        peer: PeerAddress,
        client_id: ClientId,
        registry: RegistryHandle,
        matcher: Arc<PatternMatcher>,
        config: SessionConfig,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            stream,
            peer,
            client_id,
            registry,
            matcher,
            config,
            cancel_token,
        }
    }

    /// Runs the session until it ends, then marks the record disconnected.
    ///
    /// The stream is dropped when this returns.
    pub async fn run(mut self) -> SessionEnd {
        debug!(client = %self.client_id, peer = %self.peer, "Session started");

        let end = match self.process_chunks().await {
            Ok(end) => end,
            Err(SessionError::ReadTimeout) => SessionEnd::TimedOut,
            Err(e) => SessionEnd::Failed(e),
        };

        match &end {
            SessionEnd::Failed(e) => {
                warn!(client = %self.client_id, peer = %self.peer, error = %e, "Session aborted");
            }
            other => {
                info!(client = %self.client_id, peer = %self.peer, end = ?other, "Session ended");
            }
        }

        if let Err(e) = self.registry.mark_disconnected(self.client_id).await {
            debug!(client = %self.client_id, error = %e, "Could not mark client disconnected");
        }

        end
    }

    /// Main read/classify/echo loop.
    async fn process_chunks(&mut self) -> Result<SessionEnd, SessionError> {
        let cancel_token = self.cancel_token.clone();
        let mut buffer = vec![0u8; self.config.buffer_size.max(1)];

        loop {
            let bytes_read = tokio::select! {
                _ = cancel_token.cancelled() => return Ok(SessionEnd::Shutdown),
                result = self.read_chunk(&mut buffer) => result?,
            };

            if bytes_read == 0 {
                return Ok(SessionEnd::PeerClosed);
            }

            let chunk = buffer.get(..bytes_read).unwrap_or_default();

            if is_termination(chunk) {
                self.write_chunk(chunk).await?;
                return Ok(SessionEnd::Terminated);
            }

            let classification = self.matcher.classify(chunk);
            debug!(
                client = %self.client_id,
                bytes = bytes_read,
                matched = classification.is_match(),
                "Classified payload"
            );

            // The echo goes out only after the registry has applied the
            // classification, so a peer that saw its echo can rely on probes
            // reflecting it.
            self.registry
                .update(self.client_id, classification)
                .await
                .map_err(|e| SessionError::Registry(e.to_string()))?;

            self.write_chunk(chunk).await?;
        }
    }

    /// Reads one chunk, honoring the read deadline.
    async fn read_chunk(&mut self, buffer: &mut [u8]) -> Result<usize, SessionError> {
        let read = self.stream.read(buffer);

        match self.config.read_timeout {
            Some(limit) => match timeout(limit, read).await {
                Ok(result) => result.map_err(|e| SessionError::Io(e.to_string())),
                Err(_) => Err(SessionError::ReadTimeout),
            },
            None => read.await.map_err(|e| SessionError::Io(e.to_string())),
        }
    }

    /// Writes a chunk back to the peer, honoring the write deadline.
    async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), SessionError> {
        let stream = &mut self.stream;

        match timeout(self.config.write_timeout, async {
            stream.write_all(chunk).await?;
            stream.flush().await?;
            Ok::<(), std::io::Error>(())
        })
        .await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(SessionError::Io(e.to_string())),
            Err(_) => Err(SessionError::WriteTimeout),
        }
    }

    /// Returns the id of this session's registry record.
    pub fn client_id(&self) -> ClientId {
        self.client_id
    }
}

/// Errors that can occur during a session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Read timeout")]
    ReadTimeout,

    #[error("Write timeout")]
    WriteTimeout,

    #[error("Registry error: {0}")]
    Registry(String),
}
