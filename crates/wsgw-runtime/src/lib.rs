//! # WSGW Runtime
//!
//! The externally visible surface of the WSGW gateway: configuration,
//! logging, the two HTTP endpoints and the server lifecycle.
//!
//! ```text
//! GET  /connect                 WebSocket upgrade (asks the backend first)
//! POST /message/{connection_id} backend push to one client
//! GET  /app-info                build identity
//! ```
//!
//! The [`GatewayServer`] composes the session engine (`wsgw-core`), the
//! backend client (`wsgw-transport`) and the optional cluster router
//! (`wsgw-cluster`) into a running instance:
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use wsgw_core::{ConnectionRegistry, random_minter};
//! use wsgw_runtime::{GatewayConfig, GatewayServer};
//! use wsgw_transport::BackendClient;
//!
//! let config = GatewayConfig::from_env()?;
//! let registry = Arc::new(ConnectionRegistry::new());
//! let backend = Arc::new(BackendClient::new(&config.app_base_url));
//! let gateway = GatewayServer::start(config, registry, backend, None, random_minter()).await?;
//! ```

mod config;
mod handlers;
mod server;

pub mod logging;

pub use config::{ConfigError, GatewayConfig};
pub use server::{DRAIN_TIMEOUT, GatewayServer, RunningGateway, ServerError};
