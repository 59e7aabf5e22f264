//! hicom-mon Service - Peer listener, health registry and query probes
//!
//! This crate provides the service side of the monitoring-agent extension:
//! - `config` - Service configuration (TOML file + environment overrides)
//! - `matcher` - Compiled health signature
//! - `registry` - Client registry actor tracking per-peer health
//! - `server` - TCP listener and per-connection session handlers
//! - `query` - Health probes answered from the registry
//! - `items` - Item key table dispatching host agent requests
//! - `service` - Init/uninit lifecycle tying it all together
//! - `pidfile` - PID file used by the daemon binary
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       HealthService                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────┐ insert  ┌─────────────────────────────┐│
//! │  │  HealthServer   │────────▶│     RegistryActor           ││
//! │  │ (TCP listener)  │         │  (client record owner)      ││
//! │  └────────┬────────┘         └──────────────▲──────────────┘│
//! │           │ spawn                  update   │   find        │
//! │           ▼                                 │               │
//! │  ┌─────────────────┐                ┌───────┴─────────────┐ │
//! │  │ SessionHandler  │──┐             │  QueryInterface     │ │
//! │  │  (per peer)     │  │ classify    │  ItemTable          │ │
//! │  └─────────────────┘  ▼             └─────────────────────┘ │
//! │               ┌────────────────┐                            │
//! │               │ PatternMatcher │                            │
//! │               └────────────────┘                            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

pub mod config;
pub mod items;
pub mod matcher;
pub mod pidfile;
pub mod query;
pub mod registry;
pub mod server;
pub mod service;
