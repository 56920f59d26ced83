//! Gateway configuration from `WSGW_`-prefixed environment variables.

use figment::providers::{Env, Serialized};
use figment::Figment;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use wsgw_core::OUTBOUND_BUFFER;

/// Errors that can occur while loading the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The environment could not be parsed into the schema.
    #[error("failed to load configuration: {0}")]
    Extract(String),

    /// A required option is missing.
    #[error("WSGW_APP_BASE_URL must be set")]
    MissingAppBaseUrl,
}

/// Runtime configuration of one gateway instance.
///
/// Every field maps to an environment variable with the `WSGW_` prefix,
/// e.g. `server_port` ← `WSGW_SERVER_PORT`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Interface to bind the listener to.
    pub server_host: String,

    /// Port to bind the listener to; 0 picks an ephemeral port.
    pub server_port: u16,

    /// Base URL of the backend application; the gateway calls
    /// `{app_base_url}/ws/connect`, `/ws/message` and `/ws/disconnected`.
    pub app_base_url: String,

    /// Allowed `Origin` header value for WebSocket upgrades. Empty
    /// disables the origin restriction.
    pub load_balancer_address: String,

    /// When set, the first frame after a successful upgrade is a JSON
    /// acknowledgement carrying the assigned connection identifier.
    pub ack_new_conn_with_conn_id: bool,

    /// Capacity of the per-connection outbound buffer; pushes arriving on
    /// a full buffer are shed.
    pub outbound_buffer: usize,

    /// Redis host of the cluster bus. Present means cluster routing is
    /// enabled for this instance.
    pub redis_host: Option<String>,

    /// Redis port of the cluster bus.
    pub redis_port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            server_host: "0.0.0.0".to_string(),
            server_port: 8080,
            app_base_url: String::new(),
            load_balancer_address: String::new(),
            ack_new_conn_with_conn_id: false,
            outbound_buffer: OUTBOUND_BUFFER,
            redis_host: None,
            redis_port: 6379,
        }
    }
}

impl GatewayConfig {
    /// Returns the figment the configuration is extracted from: schema
    /// defaults overlaid with `WSGW_*` environment variables.
    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(Self::default())).merge(Env::prefixed("WSGW_"))
    }

    /// Loads and validates the configuration from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config: Self = Self::figment()
            .extract()
            .map_err(|e| ConfigError::Extract(e.to_string()))?;
        if config.app_base_url.is_empty() {
            return Err(ConfigError::MissingAppBaseUrl);
        }
        Ok(config)
    }

    /// Address the listener binds to.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    /// Whether this instance participates in a cluster.
    pub fn cluster_enabled(&self) -> bool {
        self.redis_host.is_some()
    }

    /// Connection URL of the cluster bus, when enabled.
    pub fn redis_url(&self) -> Option<String> {
        self.redis_host
            .as_ref()
            .map(|host| format!("redis://{}:{}", host, self.redis_port))
    }
}
