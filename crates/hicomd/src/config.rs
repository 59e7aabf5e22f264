//! Service configuration.
//!
//! Defaults reproduce the behavior of the agent module this service
//! replaces (port 30405, backlog 20, 1 KiB buffer, signature `N2580`).
//! Settings are layered: defaults, then an optional TOML file, then
//! environment variables, then command-line flags in the binary.
//!
//! ```toml
//! port = 30405
//! signature = "N2580"
//! read_timeout_secs = 300
//! max_records = 1024
//! ```

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use hicom_protocol::DEFAULT_BUFFER_SIZE;

use crate::matcher::DEFAULT_SIGNATURE;
use crate::pidfile::PidFile;
use crate::registry::RegistryConfig;
use crate::server::SessionConfig;

/// Default TCP port peers connect to.
pub const DEFAULT_PORT: u16 = 30405;

/// Default listen backlog.
pub const DEFAULT_BACKLOG: u32 = 20;

/// Environment variable overriding `port`.
pub const PORT_ENV: &str = "HICOM_PORT";

/// Environment variable overriding `bind_address`.
pub const BIND_ENV: &str = "HICOM_BIND";

/// Largest accepted receive buffer (64 KiB).
const MAX_BUFFER_SIZE: usize = 65_536;

/// Configuration for `HealthService`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceConfig {
    /// Local address to bind (default: all IPv4 interfaces)
    pub bind_address: IpAddr,

    /// TCP port (0 picks an ephemeral port)
    pub port: u16,

    /// Listen backlog
    pub backlog: u32,

    /// Size of each session's receive buffer
    pub buffer_size: usize,

    /// Health signature (regular expression)
    pub signature: String,

    /// Idle read deadline per session; 0 disables it
    pub read_timeout_secs: u64,

    /// Deadline for echoing a chunk back
    pub write_timeout_secs: u64,

    /// Registry capacity
    pub max_records: usize,

    /// How long a disconnected peer's record is kept
    pub retention_secs: u64,

    /// Interval between stale record sweeps
    pub cleanup_interval_secs: u64,

    /// Daemon PID file (default: `<state dir>/hicom/hicomd.pid`)
    pub pid_file: Option<PathBuf>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            backlog: DEFAULT_BACKLOG,
            buffer_size: DEFAULT_BUFFER_SIZE,
            signature: DEFAULT_SIGNATURE.to_string(),
            read_timeout_secs: 300,
            write_timeout_secs: 10,
            max_records: 1024,
            retention_secs: 3600,
            cleanup_interval_secs: 30,
            pid_file: None,
        }
    }
}

impl ServiceConfig {
    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Self::parse(&content)
    }

    /// Parses configuration from a TOML string. Missing fields take defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` on malformed TOML or unknown fields.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Applies `HICOM_PORT` / `HICOM_BIND` from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if a variable is set but unparsable.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Applies overrides from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if a value is set but unparsable.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(port) = lookup(PORT_ENV) {
            self.port = port.trim().parse().map_err(|_| ConfigError::InvalidValue {
                field: "port",
                reason: format!("{PORT_ENV}={port:?} is not a port number"),
            })?;
        }

        if let Some(bind) = lookup(BIND_ENV) {
            self.bind_address = bind.trim().parse().map_err(|_| ConfigError::InvalidValue {
                field: "bind_address",
                reason: format!("{BIND_ENV}={bind:?} is not an IP address"),
            })?;
        }

        Ok(())
    }

    /// Checks that every setting is usable.
    ///
    /// # Errors
    ///
    /// Returns the first offending field as `ConfigError::InvalidValue`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backlog == 0 {
            return Err(ConfigError::InvalidValue {
                field: "backlog",
                reason: "must be at least 1".to_string(),
            });
        }

        // The termination token is four bytes long
        if self.buffer_size < 4 || self.buffer_size > MAX_BUFFER_SIZE {
            return Err(ConfigError::InvalidValue {
                field: "buffer_size",
                reason: format!("must be between 4 and {MAX_BUFFER_SIZE}"),
            });
        }

        if self.signature.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "signature",
                reason: "must not be empty".to_string(),
            });
        }

        if self.write_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "write_timeout_secs",
                reason: "must be at least 1".to_string(),
            });
        }

        if self.max_records == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_records",
                reason: "must be at least 1".to_string(),
            });
        }

        if self.cleanup_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "cleanup_interval_secs",
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(())
    }

    /// Returns the socket address to listen on.
    #[must_use]
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }

    /// Returns the per-session read deadline, if any.
    #[must_use]
    pub fn read_timeout(&self) -> Option<Duration> {
        (self.read_timeout_secs > 0).then(|| Duration::from_secs(self.read_timeout_secs))
    }

    #[must_use]
    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }

    /// Settings handed to each session handler.
    #[must_use]
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            buffer_size: self.buffer_size,
            read_timeout: self.read_timeout(),
            write_timeout: self.write_timeout(),
        }
    }

    /// PID file used by the daemon's start, stop and status commands.
    #[must_use]
    pub fn pid_file(&self) -> PidFile {
        match &self.pid_file {
            Some(path) => PidFile::new(path.clone()),
            None => PidFile::new(PidFile::default_path()),
        }
    }

    /// Settings handed to the registry actor.
    #[must_use]
    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            max_records: self.max_records,
            retention: Duration::from_secs(self.retention_secs),
            cleanup_interval: Duration::from_secs(self.cleanup_interval_secs),
        }
    }
}

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {error}")]
    Read { path: PathBuf, error: String },

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.port, 30405);
        assert_eq!(config.backlog, 20);
        assert_eq!(config.buffer_size, 1024);
        assert_eq!(config.signature, "N2580");
        assert_eq!(config.listen_addr().to_string(), "0.0.0.0:30405");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_toml() {
        let config = ServiceConfig::parse(
            r#"
            port = 4000
            signature = "OK\\d+"
            read_timeout_secs = 0
            "#,
        )
        .unwrap();

        assert_eq!(config.port, 4000);
        assert_eq!(config.signature, r"OK\d+");
        assert_eq!(config.read_timeout(), None);
        assert_eq!(config.backlog, DEFAULT_BACKLOG);
    }

    #[test]
    fn test_parse_rejects_unknown_fields() {
        let err = ServiceConfig::parse("prot = 1").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_missing_file() {
        let err = ServiceConfig::load("/nonexistent/hicom.toml").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/hicom.toml"));
    }

    #[test]
    fn test_load_file_keeps_defaults_for_missing_fields() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            bind_address = "127.0.0.1"
            port = 31000
            max_records = 16
            pid_file = "/run/hicom/test.pid"
            "#
        )
        .unwrap();

        let config = ServiceConfig::load(file.path()).unwrap();
        assert_eq!(config.listen_addr().to_string(), "127.0.0.1:31000");
        assert_eq!(config.max_records, 16);
        assert_eq!(config.pid_file().path(), Path::new("/run/hicom/test.pid"));

        let defaults = ServiceConfig::default();
        assert_eq!(config.backlog, defaults.backlog);
        assert_eq!(config.signature, defaults.signature);
        assert_eq!(config.read_timeout_secs, defaults.read_timeout_secs);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_file_with_bad_toml() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "port = \"not a number\"").unwrap();

        let err = ServiceConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_default_pid_file_location() {
        let config = ServiceConfig::default();
        assert!(config.pid_file().path().ends_with("hicom/hicomd.pid"));
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [(PORT_ENV, "5000"), (BIND_ENV, "127.0.0.1")].into();
        let mut config = ServiceConfig::default();
        config
            .apply_overrides(|name| vars.get(name).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.listen_addr().to_string(), "127.0.0.1:5000");
    }

    #[test]
    fn test_invalid_override() {
        let mut config = ServiceConfig::default();
        let err = config
            .apply_overrides(|name| (name == PORT_ENV).then(|| "70000".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { field: "port", .. }));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let bad = [
            ServiceConfig {
                backlog: 0,
                ..Default::default()
            },
            ServiceConfig {
                buffer_size: 3,
                ..Default::default()
            },
            ServiceConfig {
                signature: String::new(),
                ..Default::default()
            },
            ServiceConfig {
                max_records: 0,
                ..Default::default()
            },
            ServiceConfig {
                write_timeout_secs: 0,
                ..Default::default()
            },
        ];

        for config in bad {
            assert!(config.validate().is_err(), "{config:?} should be rejected");
        }
    }

    #[test]
    fn test_derived_configs() {
        let config = ServiceConfig::default();
        let session = config.session_config();
        assert_eq!(session.buffer_size, 1024);
        assert_eq!(session.read_timeout, Some(Duration::from_secs(300)));

        let registry = config.registry_config();
        assert_eq!(registry.max_records, 1024);
        assert_eq!(registry.retention, Duration::from_secs(3600));
    }
}
