//! The two gateway endpoints: WebSocket accept and backend push.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use tracing::{debug, error, info, warn};

use wsgw_core::{
    ConnectionId, HeaderSnapshot, PushError, Session, SessionError, process_messages,
};
use wsgw_transport::{ConnectError, send_ack, split_socket};

use crate::server::GatewayState;

/// `GET /connect`: authorizes against the backend, upgrades, then drives
/// the session until it ends.
pub(crate) async fn connect(
    State(state): State<Arc<GatewayState>>,
    ws: WebSocketUpgrade,
    headers: HeaderMap,
) -> Response {
    let id = (state.minter)();
    let origin_headers = header_snapshot(&headers);

    match state.backend.authorize_connect(&origin_headers, &id).await {
        Ok(()) => {}
        Err(ConnectError::Unauthorized) => return StatusCode::UNAUTHORIZED.into_response(),
        Err(ConnectError::Refused(status)) => {
            info!(connection_id = %id, status, "backend refused the connection");
            return StatusCode::BAD_GATEWAY.into_response();
        }
        Err(ConnectError::Transport(e)) => {
            error!(connection_id = %id, error = %e, "backend connect call failed");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }

    if !origin_allowed(&headers, &state.config.load_balancer_address) {
        info!(connection_id = %id, "upgrade rejected: origin not allowed");
        return StatusCode::FORBIDDEN.into_response();
    }

    ws.on_upgrade(move |socket| {
        let sessions = state.sessions.clone();
        sessions.track_future(run_session(state, id, origin_headers, socket))
    })
}

/// Everything that happens between the 101 and the socket teardown.
async fn run_session(
    state: Arc<GatewayState>,
    id: ConnectionId,
    origin_headers: HeaderSnapshot,
    socket: WebSocket,
) {
    let cancel = state.session_cancel.child_token();
    let (reader, mut writer) = split_socket(socket);

    let session =
        Session::with_outbound_buffer(id.clone(), origin_headers, state.config.outbound_buffer);
    let origin_headers = session.origin_headers().clone();

    if state.config.ack_new_conn_with_conn_id {
        if let Err(e) = send_ack(&mut writer, &id).await {
            error!(connection_id = %id, error = %e, "failed to send connect ack");
            state.backend.notify_disconnected(&origin_headers, &id).await;
            return;
        }
    }

    state.registry.add(session.handle());
    if let Some(router) = &state.cluster
        && let Err(e) = router.register(&id).await
    {
        warn!(connection_id = %id, error = %e, "failed to advertise connection ownership");
    }

    debug!(connection_id = %id, "websocket message processing starting");
    let relay = Arc::clone(&state.backend).client_message_relay(&id);
    let result = process_messages(cancel, session, reader, &mut writer, relay).await;
    match &result {
        Ok(()) => debug!(connection_id = %id, "websocket message processing finished"),
        Err(SessionError::Cancelled) => {
            debug!(connection_id = %id, "session ended by shutdown")
        }
        Err(e) => error!(connection_id = %id, error = %e, "websocket session failed"),
    }

    // Teardown order keeps relayed pushes away from a closing socket:
    // withdraw bus ownership, close the socket, tell the backend, and only
    // then drop the registry entry.
    if let Some(router) = &state.cluster
        && let Err(e) = router.deregister(&id).await
    {
        warn!(connection_id = %id, error = %e, "failed to withdraw connection ownership");
    }
    writer.close_normal().await;
    state.backend.notify_disconnected(&origin_headers, &id).await;
    state.registry.remove(&id);
}

/// `POST /message/{connection_id}`: delivers one backend push.
pub(crate) async fn push(
    State(state): State<Arc<GatewayState>>,
    Path(connection_id): Path<String>,
    body: Bytes,
) -> Response {
    if connection_id.is_empty() {
        return StatusCode::BAD_REQUEST.into_response();
    }
    let id = ConnectionId::from(connection_id);
    let payload = String::from_utf8_lossy(&body).into_owned();

    match state.registry.push(&id, payload) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(PushError::ConnectionNotFound) => match &state.cluster {
            None => {
                info!(connection_id = %id, "push target not found");
                StatusCode::NOT_FOUND.into_response()
            }
            Some(router) => match router.relay(&id, body.to_vec()).await {
                Ok(()) => StatusCode::NO_CONTENT.into_response(),
                Err(e) => {
                    error!(connection_id = %id, error = %e, "failed to relay push");
                    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
                }
            },
        },
        Err(e @ PushError::Overload { .. }) => {
            error!(connection_id = %id, error = %e, "push shed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// `POST /message` with no identifier segment.
pub(crate) async fn push_missing_id() -> StatusCode {
    StatusCode::BAD_REQUEST
}

/// `GET /app-info`: build identity of this instance.
pub(crate) async fn app_info() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Snapshots the upgrade request headers for replay towards the backend.
fn header_snapshot(headers: &HeaderMap) -> HeaderSnapshot {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}

/// Exact-match origin restriction; configured empty means unrestricted.
///
/// Requests without an `Origin` header (non-browser clients) always pass.
fn origin_allowed(headers: &HeaderMap, allowed: &str) -> bool {
    if allowed.is_empty() {
        return true;
    }
    match headers.get(header::ORIGIN) {
        None => true,
        Some(origin) => origin.to_str().is_ok_and(|o| o == allowed),
    }
}
