//! Service lifecycle.
//!
//! `HealthService::init` brings the whole extension up: it validates the
//! configuration, compiles the signature, binds the listener and starts the
//! registry and accept loop. Any failure is returned before a task is left
//! running. `HealthService::uninit` stops accepting, lets every session
//! finish and releases the registry and matcher.

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info};

use crate::config::{ConfigError, ServiceConfig};
use crate::items::ItemTable;
use crate::matcher::{MatcherError, PatternMatcher};
use crate::query::QueryInterface;
use crate::registry::{spawn_registry, RegistryHandle};
use crate::server::{bind_listener, HealthServer, ServerError};

/// Running instance of the peer health service.
pub struct HealthService {
    local_addr: SocketAddr,
    registry: RegistryHandle,
    matcher: Arc<PatternMatcher>,
    query: QueryInterface,
    items: Arc<ItemTable>,
    cancel_token: CancellationToken,
    tracker: TaskTracker,
}

impl HealthService {
    /// Starts the service.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `InitError` if the configuration is invalid, the signature
    /// does not compile or the listening socket cannot be bound.
    pub async fn init(config: ServiceConfig) -> Result<Self, InitError> {
        config.validate()?;

        let matcher = Arc::new(PatternMatcher::compile(&config.signature)?);
        let listener = bind_listener(config.listen_addr(), config.backlog)?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| ServerError::Io(e.to_string()))?;

        let registry = spawn_registry(config.registry_config());
        let query = QueryInterface::new(registry.clone());
        let items = Arc::new(ItemTable::new(query.clone()));

        let cancel_token = CancellationToken::new();
        let tracker = TaskTracker::new();

        let server = HealthServer::new(
            listener,
            registry.clone(),
            Arc::clone(&matcher),
            config.session_config(),
            cancel_token.clone(),
            tracker.clone(),
        );

        tracker.spawn(async move {
            if let Err(e) = server.run().await {
                error!(error = %e, "Health server error");
            }
        });

        info!(
            addr = %local_addr,
            signature = matcher.signature(),
            backlog = config.backlog,
            "Health service started"
        );

        Ok(Self {
            local_addr,
            registry,
            matcher,
            query,
            items,
            cancel_token,
            tracker,
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn registry(&self) -> &RegistryHandle {
        &self.registry
    }

    pub fn query(&self) -> &QueryInterface {
        &self.query
    }

    /// Item table for the host agent.
    pub fn items(&self) -> Arc<ItemTable> {
        Arc::clone(&self.items)
    }

    pub fn matcher(&self) -> &PatternMatcher {
        &self.matcher
    }

    /// Token cancelled when the service shuts down.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Stops the service and waits for the accept loop and all sessions.
    pub async fn uninit(self) {
        info!(addr = %self.local_addr, "Health service stopping");

        self.cancel_token.cancel();
        self.tracker.close();
        self.tracker.wait().await;

        info!(
            records = self.registry.len().await,
            "Health service stopped"
        );
    }
}

/// Errors that prevent the service from starting.
#[derive(Debug, Clone, Error)]
pub enum InitError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Cannot compile health signature: {0}")]
    Pattern(#[from] MatcherError),

    #[error("Cannot start listener: {0}")]
    Bind(#[from] ServerError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn local_config() -> ServiceConfig {
        ServiceConfig {
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 0,
            ..ServiceConfig::default()
        }
    }

    #[tokio::test]
    async fn test_init_and_uninit() {
        let service = HealthService::init(local_config()).await.unwrap();
        assert_ne!(service.local_addr().port(), 0);
        assert_eq!(service.matcher().signature(), "N2580");
        assert_eq!(service.registry().len().await, 0);

        let token = service.shutdown_token();
        service.uninit().await;
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_init_rejects_invalid_config() {
        let config = ServiceConfig {
            backlog: 0,
            ..local_config()
        };
        let result = HealthService::init(config).await;
        assert!(matches!(result, Err(InitError::Config(_))));
    }

    #[tokio::test]
    async fn test_init_rejects_bad_signature() {
        let config = ServiceConfig {
            signature: "N2580(".to_string(),
            ..local_config()
        };
        let result = HealthService::init(config).await;
        assert!(matches!(result, Err(InitError::Pattern(_))));
    }

    #[tokio::test]
    async fn test_init_rejects_port_in_use() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let config = ServiceConfig {
            port: taken.local_addr().unwrap().port(),
            ..local_config()
        };
        let result = HealthService::init(config).await;
        assert!(matches!(result, Err(InitError::Bind(_))));
    }
}
