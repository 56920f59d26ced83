//! HTTP client for the three backend endpoints.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, ClientBuilder, StatusCode};
use thiserror::Error;
use tracing::{debug, error, info};

use wsgw_core::{CONNECTION_ID_HEADER, ConnectionId, HeaderSnapshot, OnClientMessage};

/// Client timeout applied to every backend call.
pub const BACKEND_TIMEOUT: Duration = Duration::from_secs(15);

/// Headers the gateway manages itself and must not replay towards the
/// backend: hop-by-hop headers and the WebSocket handshake set.
const SKIPPED_HEADERS: &[&str] = &[
    "host",
    "content-length",
    "connection",
    "upgrade",
    "sec-websocket-key",
    "sec-websocket-version",
    "sec-websocket-extensions",
    "sec-websocket-protocol",
];

/// Outcome of the connect-time authorization probe.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// The backend denied the connection with 401.
    #[error("backend denied the connection")]
    Unauthorized,

    /// The backend answered with an unexpected status.
    #[error("backend refused the connection with status {0}")]
    Refused(u16),

    /// The backend could not be reached at all.
    #[error("failed to reach backend: {0}")]
    Transport(String),
}

/// Failure while relaying a client message to the backend.
#[derive(Debug, Error)]
pub enum BackendCallError {
    /// The backend answered with a non-200 status.
    #[error("backend rejected the message with status {0}")]
    Status(u16),

    /// The backend could not be reached at all.
    #[error("failed to deliver message to backend: {0}")]
    Transport(String),
}

/// Shared, pooled HTTP client towards the backend application.
///
/// All three endpoints live under `{base_url}/ws`; the connection
/// identifier travels in the [`CONNECTION_ID_HEADER`] on every call.
pub struct BackendClient {
    http: Client,
    base_url: String,
}

impl BackendClient {
    /// Creates a client for the backend at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        let http = ClientBuilder::new()
            .timeout(BACKEND_TIMEOUT)
            .build()
            .expect("failed to create HTTP client");
        let base_url = base_url.into();
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, suffix: &str) -> String {
        format!("{}/ws{}", self.base_url, suffix)
    }

    /// Asks the backend to authorize a new connection.
    ///
    /// The client's original upgrade headers are forwarded verbatim, plus
    /// the freshly minted identifier.
    pub async fn authorize_connect(
        &self,
        origin_headers: &HeaderSnapshot,
        id: &ConnectionId,
    ) -> Result<(), ConnectError> {
        let response = self
            .http
            .get(self.url("/connect"))
            .headers(forwarded_headers(origin_headers, id))
            .send()
            .await
            .map_err(|e| {
                error!(connection_id = %id, error = %e, "failed to call backend connect");
                ConnectError::Transport(e.to_string())
            })?;

        match response.status() {
            StatusCode::OK => {
                debug!(connection_id = %id, "backend accepted the connection");
                Ok(())
            }
            StatusCode::UNAUTHORIZED => {
                info!(connection_id = %id, "backend denied the connection");
                Err(ConnectError::Unauthorized)
            }
            other => {
                info!(connection_id = %id, status = other.as_u16(), "backend refused the connection");
                Err(ConnectError::Refused(other.as_u16()))
            }
        }
    }

    /// Notifies the backend that a connection is gone.
    ///
    /// Failures are logged and swallowed: the session is already over and
    /// there is nobody left to report them to.
    pub async fn notify_disconnected(&self, origin_headers: &HeaderSnapshot, id: &ConnectionId) {
        let result = self
            .http
            .post(self.url("/disconnected"))
            .headers(forwarded_headers(origin_headers, id))
            .send()
            .await;

        match result {
            Ok(response) if response.status() == StatusCode::OK => {
                debug!(connection_id = %id, "backend notified of disconnect");
            }
            Ok(response) => {
                info!(
                    connection_id = %id,
                    status = response.status().as_u16(),
                    "unexpected status from backend disconnect endpoint"
                );
            }
            Err(e) => {
                error!(connection_id = %id, error = %e, "failed to notify backend of disconnect");
            }
        }
    }

    /// Relays one client text frame to the backend message endpoint.
    pub async fn relay_message(
        &self,
        id: &ConnectionId,
        text: String,
    ) -> Result<(), BackendCallError> {
        let response = self
            .http
            .post(self.url("/message"))
            .header(CONNECTION_ID_HEADER, id.as_str())
            .body(text)
            .send()
            .await
            .map_err(|e| {
                error!(connection_id = %id, error = %e, "failed to relay message to backend");
                BackendCallError::Transport(e.to_string())
            })?;

        if response.status() != StatusCode::OK {
            info!(
                connection_id = %id,
                status = response.status().as_u16(),
                "backend rejected relayed message"
            );
            return Err(BackendCallError::Status(response.status().as_u16()));
        }
        Ok(())
    }

    /// Builds the engine-facing relay callback for one connection.
    ///
    /// The identifier and this client are captured inside the closure, so
    /// the engine only ever supplies the frame payload.
    pub fn client_message_relay(self: Arc<Self>, id: &ConnectionId) -> OnClientMessage {
        let client = self;
        let id = id.clone();
        Arc::new(move |text| {
            let client = Arc::clone(&client);
            let id = id.clone();
            Box::pin(async move {
                client
                    .relay_message(&id, text)
                    .await
                    .map_err(|e| Box::new(e) as wsgw_core::BoxError)
            })
        })
    }
}

/// Turns the upgrade-header snapshot into the map sent to the backend.
///
/// Handshake and hop-by-hop headers are dropped, the connection identifier
/// is appended, everything else passes through untouched.
fn forwarded_headers(origin_headers: &HeaderSnapshot, id: &ConnectionId) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in origin_headers {
        if SKIPPED_HEADERS.contains(&name.to_ascii_lowercase().as_str()) {
            continue;
        }
        let Ok(name) = HeaderName::from_bytes(name.as_bytes()) else {
            continue;
        };
        let Ok(value) = HeaderValue::from_str(value) else {
            continue;
        };
        headers.append(name, value);
    }
    if let Ok(value) = HeaderValue::from_str(id.as_str()) {
        headers.insert(CONNECTION_ID_HEADER, value);
    }
    headers
}
