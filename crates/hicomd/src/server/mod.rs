//! TCP server for peer connections.
//!
//! The server:
//! - Listens on a TCP socket with a bounded backlog
//! - Creates a registry record for each accepted connection
//! - Spawns a SessionHandler per connection
//! - Supports graceful shutdown via CancellationToken
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  HealthServer   │
//! │                 │
//! │  TcpListener    │
//! └───────┬─────────┘
//!         │ accept()
//!         ▼
//! ┌─────────────────┐     ┌─────────────────┐
//! │ SessionHandler  │────▶│  RegistryHandle │
//! │   (per peer)    │     │                 │
//! └───────┬─────────┘     └─────────────────┘
//!         │
//!         ▼
//! ┌─────────────────┐
//! │ PatternMatcher  │
//! │ (shared, r/o)   │
//! └─────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Accept errors are logged and allow continued operation

mod session;

pub use session::{SessionConfig, SessionEnd, SessionError, SessionHandler};

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use hicom_core::PeerAddress;

use crate::matcher::PatternMatcher;
use crate::registry::RegistryHandle;

/// Pause after a failed accept, so fd exhaustion does not spin the loop.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Binds a listening socket with the given backlog.
///
/// Must be called from within a tokio runtime.
///
/// # Errors
///
/// Returns `ServerError::Bind` if the socket cannot be created, bound,
/// or put into listening state.
pub fn bind_listener(addr: SocketAddr, backlog: u32) -> Result<TcpListener, ServerError> {
    let bind_error = |e: std::io::Error| ServerError::Bind {
        addr,
        error: e.to_string(),
    };

    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()
    } else {
        TcpSocket::new_v6()
    }
    .map_err(bind_error)?;

    // Allow a quick restart while old connections sit in TIME_WAIT
    #[cfg(unix)]
    socket.set_reuseaddr(true).map_err(bind_error)?;

    socket.bind(addr).map_err(bind_error)?;
    socket.listen(backlog).map_err(bind_error)
}

/// TCP server accepting peer connections.
pub struct HealthServer {
    listener: TcpListener,

    /// Handle to the client registry
    registry: RegistryHandle,

    /// Compiled health signature shared by all sessions
    matcher: Arc<PatternMatcher>,

    /// Settings handed to each session
    session_config: SessionConfig,

    /// Cancellation token for graceful shutdown
    cancel_token: CancellationToken,

    /// Tracks session tasks so shutdown can wait for them
    tracker: TaskTracker,

    /// Connection counter, for logging
    connection_counter: AtomicU64,
}

impl HealthServer {
    /// Creates a new server around an already-bound listener.
    ///
    /// # Arguments
    ///
    /// * `listener` - Bound listening socket (see `bind_listener`)
    /// * `registry` - Handle to the client registry
    /// * `matcher` - Compiled health signature
    /// * `session_config` - Buffer size and deadlines for sessions
    /// * `cancel_token` - Token for graceful shutdown
    /// * `tracker` - Tracker that session tasks are spawned on
    pub fn new(
        listener: TcpListener,
        registry: RegistryHandle,
        matcher: Arc<PatternMatcher>,
        session_config: SessionConfig,
        cancel_token: CancellationToken,
        tracker: TaskTracker,
    ) -> Self {
        Self {
            listener,
            registry,
            matcher,
            session_config,
            cancel_token,
            tracker,
            connection_counter: AtomicU64::new(0),
        }
    }

    /// Returns the bound address.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Io` if the socket cannot report its address.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.listener
            .local_addr()
            .map_err(|e| ServerError::Io(e.to_string()))
    }

    /// Runs the accept loop.
    ///
    /// Accepts connections until the cancellation token is triggered.
    /// The listening socket is closed when the server is dropped.
    pub async fn run(&self) -> Result<(), ServerError> {
        info!(addr = ?self.listener.local_addr().ok(), "Health server listening");

        loop {
            tokio::select! {
                // Check for cancellation
                _ = self.cancel_token.cancelled() => {
                    info!("Server shutdown requested");
                    break;
                }

                // Accept new connection
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let conn_num = self.connection_counter.fetch_add(1, Ordering::Relaxed);
                            self.handle_connection(stream, addr, conn_num);
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                            if !self.backoff_after_accept_error().await {
                                info!("Server shutdown requested");
                                break;
                            }
                        }
                    }
                }
            }
        }

        info!(
            accepted = self.connection_counter.load(Ordering::Relaxed),
            "Server stopped accepting"
        );
        Ok(())
    }

    /// Waits out `ACCEPT_ERROR_BACKOFF` before the next accept.
    ///
    /// Returns false if shutdown was requested meanwhile.
    async fn backoff_after_accept_error(&self) -> bool {
        tokio::select! {
            _ = self.cancel_token.cancelled() => false,
            _ = tokio::time::sleep(ACCEPT_ERROR_BACKOFF) => true,
        }
    }

    /// Handles a new connection by spawning a task that registers the peer
    /// and then runs its session.
    ///
    /// The record is inserted before the session reads anything.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr, connection_number: u64) {
        let peer = PeerAddress::from_socket_addr(&addr);
        let registry = self.registry.clone();
        let matcher = Arc::clone(&self.matcher);
        let config = self.session_config.clone();
        let cancel_token = self.cancel_token.clone();

        debug!(connection = connection_number, peer = %addr, "Accepted connection");

        self.tracker.spawn(async move {
            let client_id = match registry.insert(peer).await {
                Ok(id) => id,
                Err(e) => {
                    warn!(peer = %addr, error = %e, "Dropping connection: could not register peer");
                    return;
                }
            };

            let handler = SessionHandler::new(
                stream,
                peer,
                client_id,
                registry,
                matcher,
                config,
                cancel_token,
            );

            handler.run().await;
        });
    }
}

/// Errors that can occur in server operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {error}")]
    Bind { addr: SocketAddr, error: String },

    #[error("I/O error: {0}")]
    Io(String),
}
