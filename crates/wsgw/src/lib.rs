//! # WSGW
//!
//! A WebSocket gateway that decouples long-lived client connections from a
//! stateless HTTP backend.
//!
//! ## Overview
//!
//! Clients hold persistent WebSocket sessions against the gateway; the
//! backend only ever sees short-lived HTTP requests:
//!
//! ```text
//! client ══ WS ══▶ gateway ── POST /ws/message ──▶ backend
//! client ◀══ WS ══ gateway ◀── POST /message/{id} ── backend
//! ```
//!
//! Each accepted connection gets a unique identifier, carried on every
//! backend call in the `X-WSGW-CONNECTION-ID` header. Instances scale out
//! horizontally: a push arriving on a non-owning instance is relayed over
//! a pub/sub bus to the instance holding the socket.
//!
//! ## Crates
//!
//! - [`wsgw_core`]: session engine, connection registry, identifiers
//! - [`wsgw_transport`]: backend HTTP client, WebSocket adapters
//! - [`wsgw_cluster`]: cross-instance push routing
//! - [`wsgw_runtime`]: configuration, logging, HTTP surface, lifecycle
//!
//! The `wsgw` binary wires them together from `WSGW_*` environment
//! variables; see [`GatewayConfig`] for the recognised options.

pub use wsgw_cluster::{ClusterRouter, InMemoryBus, MessageBus, RedisBus};
pub use wsgw_core::{
    CONNECTION_ID_HEADER, ConnectionId, ConnectionRegistry, PushError, Session, SessionError,
    random_minter,
};
pub use wsgw_runtime::{GatewayConfig, GatewayServer, RunningGateway, logging};
pub use wsgw_transport::BackendClient;
