//! # WSGW Transport
//!
//! Concrete I/O for the WSGW gateway: the pooled HTTP client that talks to
//! the backend application and the adapters that plug an upgraded axum
//! WebSocket into the session engine's [`SocketReader`] / [`SocketWriter`]
//! seams.
//!
//! The backend surface is three endpoints under `{base_url}/ws`:
//!
//! | Call | Endpoint | When |
//! |------|----------|------|
//! | authorize | `GET /ws/connect` | client requests an upgrade |
//! | relay | `POST /ws/message` | client sent a text frame |
//! | disconnect | `POST /ws/disconnected` | session ended, for any reason |
//!
//! [`SocketReader`]: wsgw_core::SocketReader
//! [`SocketWriter`]: wsgw_core::SocketWriter

mod backend;
mod socket;

pub use backend::{BACKEND_TIMEOUT, BackendCallError, BackendClient, ConnectError};
pub use socket::{WsReader, WsWriter, send_ack, split_socket};
