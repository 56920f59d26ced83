//! Session primitives: the channel bundle behind one live WebSocket.

use tokio::sync::mpsc;

use crate::id::ConnectionId;

/// Capacity of the outbound (backend-to-client) buffer.
pub const OUTBOUND_BUFFER: usize = 1024;

/// Snapshot of the client's upgrade request headers.
///
/// Taken once at accept time and replayed on the backend connect and
/// disconnect calls.
pub type HeaderSnapshot = Vec<(String, String)>;

/// Why a session's socket stopped producing frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseCause {
    /// Close frame with the normal-closure code, or the peer simply went away.
    Normal,
    /// Close frame with the going-away code.
    GoingAway,
    /// Close frame with any other code.
    Abnormal {
        /// Close code sent by the client.
        code: u16,
        /// Close reason sent by the client.
        reason: String,
    },
    /// The client sent a frame type the gateway does not relay.
    ProtocolError,
    /// The read itself failed below the WebSocket layer.
    ReadError(String),
}

/// One frame observed by the reader task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A text frame to relay to the backend.
    Text(String),
    /// The socket stopped; carries the mapped cause.
    Close(CloseCause),
    /// Any frame type the gateway does not relay (binary).
    Unsupported,
}

/// In-memory handle for one open WebSocket.
///
/// Owns the three channels the engine selects over. The outbound channel is
/// the sole ordering point between concurrent pushes for this connection;
/// inbound and close are each fed by the session's own reader task.
pub struct Session {
    pub(crate) id: ConnectionId,
    pub(crate) origin_headers: HeaderSnapshot,
    pub(crate) inbound_tx: mpsc::Sender<String>,
    pub(crate) inbound_rx: mpsc::Receiver<String>,
    pub(crate) outbound_tx: mpsc::Sender<String>,
    pub(crate) outbound_rx: mpsc::Receiver<String>,
    pub(crate) close_tx: mpsc::Sender<CloseCause>,
    pub(crate) close_rx: mpsc::Receiver<CloseCause>,
}

impl Session {
    /// Creates a session with the default outbound capacity.
    pub fn new(id: ConnectionId, origin_headers: HeaderSnapshot) -> Self {
        Self::with_outbound_buffer(id, origin_headers, OUTBOUND_BUFFER)
    }

    /// Creates a session with an explicit outbound capacity.
    pub fn with_outbound_buffer(
        id: ConnectionId,
        origin_headers: HeaderSnapshot,
        outbound_buffer: usize,
    ) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(1);
        let (outbound_tx, outbound_rx) = mpsc::channel(outbound_buffer);
        let (close_tx, close_rx) = mpsc::channel(1);
        Self {
            id,
            origin_headers,
            inbound_tx,
            inbound_rx,
            outbound_tx,
            outbound_rx,
            close_tx,
            close_rx,
        }
    }

    /// Returns the connection identifier.
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Returns the upgrade-time header snapshot.
    pub fn origin_headers(&self) -> &HeaderSnapshot {
        &self.origin_headers
    }

    /// Pops the next queued outbound payload without waiting.
    ///
    /// The engine normally drains the outbound buffer; this is for
    /// observing a session that is not being driven (tests, diagnostics).
    pub fn try_next_outbound(&mut self) -> Option<String> {
        self.outbound_rx.try_recv().ok()
    }

    /// Returns the registry-facing handle: the identifier plus a producer
    /// end of the outbound channel.
    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            id: self.id.clone(),
            outbound: self.outbound_tx.clone(),
        }
    }
}

/// The half of a [`Session`] the registry hands to push producers.
#[derive(Clone)]
pub struct SessionHandle {
    pub(crate) id: ConnectionId,
    pub(crate) outbound: mpsc::Sender<String>,
}

impl SessionHandle {
    /// Returns the connection identifier this handle targets.
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle").field("id", &self.id).finish()
    }
}
