//! Error types for the session engine and the registry.

use std::time::Duration;

use thiserror::Error;

/// Outcome of a failed push towards a local connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PushError {
    /// No session with the given identifier is registered on this instance.
    #[error("connection not found")]
    ConnectionNotFound,

    /// The outbound buffer of the target session is at capacity.
    ///
    /// The push is dropped, never queued: slow consumers shed load instead
    /// of exerting back-pressure on the backend.
    #[error("connection overloaded: {reason}")]
    Overload {
        /// Which buffer rejected the payload.
        reason: String,
    },
}

/// Terminal cause of a session, as reported by the engine's main loop.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Writing a frame to the client failed.
    #[error("failed to write to client: {0}")]
    Write(String),

    /// Writing a frame to the client exceeded the write deadline.
    #[error("write to client timed out after {0:?}")]
    WriteTimeout(Duration),

    /// The client closed the socket with an unexpected close code.
    #[error("socket closed abnormally with code {code}: {reason}")]
    AbnormalClose {
        /// Close code received from the client.
        code: u16,
        /// Close reason received from the client.
        reason: String,
    },

    /// The client sent a frame type the gateway does not relay.
    #[error("received unsupported frame type")]
    Protocol,

    /// Reading from the socket failed below the WebSocket layer.
    #[error("failed to read from client: {0}")]
    Read(String),

    /// The session context was cancelled (server shutdown).
    #[error("session cancelled")]
    Cancelled,
}

/// Transport-level failure of a socket read or write.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct SocketError(pub String);

/// Boxed error returned by the client-message relay callback.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;
