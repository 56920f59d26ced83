//! Connection identifiers.

use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

/// Name of the header carrying the connection identifier on every call
/// between the gateway and the backend.
pub const CONNECTION_ID_HEADER: &str = "X-WSGW-CONNECTION-ID";

/// Opaque identifier of one client connection.
///
/// Minted once when the gateway accepts a WebSocket, never reused, and
/// carried end-to-end: on the backend calls (as [`CONNECTION_ID_HEADER`]),
/// on the push path (as a path segment) and as the cluster bus topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Mints a fresh, globally unique identifier.
    ///
    /// The hyphenated uuid form is URL-safe and well under the 64-byte
    /// limit imposed on identifiers.
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ConnectionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<String> for ConnectionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for ConnectionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Type-erased identifier factory.
///
/// The accept flow asks this for every new connection; tests substitute a
/// closure returning pinned identifiers.
pub type IdMinter = Arc<dyn Fn() -> ConnectionId + Send + Sync>;

/// Returns the default minter backed by [`ConnectionId::random`].
pub fn random_minter() -> IdMinter {
    Arc::new(ConnectionId::random)
}
