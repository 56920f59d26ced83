//! A minimal backend application for trying out the gateway.
//!
//! Implements the three endpoints the gateway calls, authorizes every
//! client (except the `bad-credential` demo header) and echoes every
//! received message back to its sender through the gateway's push
//! endpoint.
//!
//! ```bash
//! ECHO_GATEWAY_BASE_URL=http://127.0.0.1:8080 cargo run --package echo-backend
//! ```

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use figment::Figment;
use figment::providers::{Env, Serialized};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use wsgw_core::CONNECTION_ID_HEADER;
use wsgw_runtime::logging;

/// Demo backend configuration, from `ECHO_*` environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct EchoConfig {
    host: String,
    port: u16,
    /// Base URL of the gateway instance to push echoes through.
    gateway_base_url: String,
}

impl Default for EchoConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9200,
            gateway_base_url: "http://127.0.0.1:8080".to_string(),
        }
    }
}

struct EchoApp {
    http: reqwest::Client,
    gateway_base_url: String,
}

fn connection_id_of(headers: &HeaderMap) -> String {
    headers
        .get(CONNECTION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// `GET /ws/connect`: the gateway asks whether to accept a client.
async fn ws_connect(headers: HeaderMap) -> StatusCode {
    if headers
        .get("authorization")
        .is_some_and(|v| v == "bad-credential")
    {
        info!("denying connection with the demo bad credential");
        return StatusCode::UNAUTHORIZED;
    }
    info!(connection_id = %connection_id_of(&headers), "client connected");
    StatusCode::OK
}

/// `POST /ws/disconnected`: a client is gone.
async fn ws_disconnected(headers: HeaderMap) -> StatusCode {
    info!(connection_id = %connection_id_of(&headers), "client disconnected");
    StatusCode::OK
}

/// `POST /ws/message`: a client sent a text frame; echo it back as a push.
async fn ws_message(
    State(app): State<Arc<EchoApp>>,
    headers: HeaderMap,
    body: String,
) -> StatusCode {
    let connection_id = connection_id_of(&headers);
    info!(connection_id = %connection_id, len = body.len(), "echoing message");

    // Push asynchronously: answering 200 first keeps the gateway's relay
    // call short.
    tokio::spawn(async move {
        let url = format!("{}/message/{}", app.gateway_base_url, connection_id);
        match app.http.post(&url).body(format!("echo: {body}")).send().await {
            Ok(response) if response.status().is_success() => {}
            Ok(response) => {
                warn!(connection_id = %connection_id, status = response.status().as_u16(), "echo push rejected");
            }
            Err(e) => {
                warn!(connection_id = %connection_id, error = %e, "echo push failed");
            }
        }
    });

    StatusCode::OK
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();

    let config: EchoConfig = Figment::from(Serialized::defaults(EchoConfig::default()))
        .merge(Env::prefixed("ECHO_"))
        .extract()
        .context("invalid configuration")?;

    let app = Arc::new(EchoApp {
        http: reqwest::Client::new(),
        gateway_base_url: config.gateway_base_url.trim_end_matches('/').to_string(),
    });

    let router = Router::new()
        .route("/ws/connect", get(ws_connect))
        .route("/ws/message", post(ws_message))
        .route("/ws/disconnected", post(ws_disconnected))
        .with_state(app);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(addr = %listener.local_addr()?, "echo backend listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("server error")?;

    Ok(())
}
