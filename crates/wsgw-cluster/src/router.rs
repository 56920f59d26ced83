//! Ownership advertising and push relaying between instances.

use std::sync::Arc;

use tracing::{debug, info};

use wsgw_core::{ConnectionId, ConnectionRegistry};

use crate::bus::{BusSink, ClusterError, MessageBus};

/// Routes pushes to whichever instance owns the target connection.
///
/// Each accepted connection subscribes this instance to the bus topic named
/// after its identifier; a push arriving on a non-owning instance is
/// published on that topic and delivered by the owner's subscription.
/// Best-effort end to end: no retries, no delivery acknowledgement beyond
/// publish success.
pub struct ClusterRouter {
    bus: Arc<dyn MessageBus>,
}

impl ClusterRouter {
    /// Creates a router over an already connected bus.
    pub fn new(bus: Arc<dyn MessageBus>) -> Self {
        Self { bus }
    }

    /// Builds the bus sink delivering received payloads into `registry`.
    ///
    /// The push result is advisory only: the publishing instance has
    /// already answered its caller, so failures are logged and dropped.
    pub fn delivery_sink(registry: Arc<ConnectionRegistry>) -> BusSink {
        Arc::new(move |topic, payload| {
            let id = ConnectionId::from(topic);
            let text = String::from_utf8_lossy(&payload).into_owned();
            match registry.push(&id, text) {
                Ok(()) => debug!(connection_id = %id, "relayed push delivered"),
                Err(e) => debug!(connection_id = %id, error = %e, "relayed push discarded"),
            }
        })
    }

    /// Advertises this instance as the owner of `id`.
    pub async fn register(&self, id: &ConnectionId) -> Result<(), ClusterError> {
        debug!(connection_id = %id, "subscribing to connection topic");
        self.bus.subscribe(id.as_str()).await
    }

    /// Withdraws this instance's ownership of `id`.
    pub async fn deregister(&self, id: &ConnectionId) -> Result<(), ClusterError> {
        debug!(connection_id = %id, "unsubscribing from connection topic");
        self.bus.unsubscribe(id.as_str()).await
    }

    /// Forwards a push towards the instance owning `id`.
    pub async fn relay(&self, id: &ConnectionId, payload: Vec<u8>) -> Result<(), ClusterError> {
        info!(connection_id = %id, "connection not managed here, relaying payload");
        self.bus.publish(id.as_str(), payload).await
    }
}
