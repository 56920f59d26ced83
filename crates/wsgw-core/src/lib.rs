//! # WSGW Core
//!
//! The per-connection session engine of the WSGW WebSocket gateway.
//!
//! A gateway instance keeps one [`Session`] per accepted WebSocket and
//! tracks them in a [`ConnectionRegistry`] keyed by [`ConnectionId`]. The
//! engine ([`process_messages`]) relays frames in both directions:
//!
//! ```text
//! client WS ──reader──▶ inbound  ──▶ on_client_message ──▶ backend HTTP
//! backend  ──push────▶ outbound ──▶ writer (5 s deadline) ──▶ client WS
//! ```
//!
//! The outbound buffer is bounded; when it is full, new pushes are shed
//! with [`PushError::Overload`] instead of back-pressuring the producer.
//! Transports plug in through the [`SocketReader`] / [`SocketWriter`]
//! seams, which keeps the engine independent of any HTTP stack.

mod engine;
mod error;
mod id;
mod registry;
mod session;

pub use engine::{OnClientMessage, SocketReader, SocketWriter, WRITE_DEADLINE, process_messages};
pub use error::{BoxError, PushError, SessionError, SocketError};
pub use id::{CONNECTION_ID_HEADER, ConnectionId, IdMinter, random_minter};
pub use registry::ConnectionRegistry;
pub use session::{
    CloseCause, Frame, HeaderSnapshot, OUTBOUND_BUFFER, Session, SessionHandle,
};
