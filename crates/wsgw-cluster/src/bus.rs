//! The pub/sub seam between gateway instances.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;

/// Callback invoked for every bus message this instance is subscribed to.
///
/// Delivery into the local registry is synchronous (a lookup plus a
/// non-blocking enqueue), so the sink is a plain function.
pub type BusSink = Arc<dyn Fn(&str, Vec<u8>) + Send + Sync>;

/// Failure of a bus operation.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// Establishing the bus connection failed.
    #[error("failed to connect to cluster bus: {0}")]
    Connect(String),

    /// A subscribe or unsubscribe command failed.
    #[error("failed to update bus subscription: {0}")]
    Subscribe(String),

    /// Publishing a payload failed.
    #[error("failed to publish to cluster bus: {0}")]
    Publish(String),
}

/// A topic-addressed pub/sub transport connecting gateway instances.
///
/// Delivery is at-most-once with no retries: a topic without a current
/// subscriber silently drops the payload, and no ordering is guaranteed
/// across the bus. Messages for subscribed topics arrive through the
/// [`BusSink`] the implementation was constructed with.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Starts delivering messages published on `topic` to this instance.
    async fn subscribe(&self, topic: &str) -> Result<(), ClusterError>;

    /// Stops delivering messages published on `topic`.
    async fn unsubscribe(&self, topic: &str) -> Result<(), ClusterError>;

    /// Publishes `payload` on `topic`, reaching whichever instance is
    /// currently subscribed.
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), ClusterError>;
}

/// Process-local bus for tests and single-process clusters.
///
/// Each participating instance connects once, providing its sink, and
/// receives a [`MessageBus`] handle. Topics subscribed through a handle
/// route published payloads to that handle's sink.
#[derive(Default, Clone)]
pub struct InMemoryBus {
    inner: Arc<Mutex<HubState>>,
}

#[derive(Default)]
struct HubState {
    next_instance: usize,
    topics: HashMap<String, Vec<Subscriber>>,
}

#[derive(Clone)]
struct Subscriber {
    instance: usize,
    sink: BusSink,
}

impl InMemoryBus {
    /// Creates an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Connects one instance, returning its bus handle.
    pub fn connect(&self, sink: BusSink) -> InMemoryBusHandle {
        let instance = {
            let mut state = self.inner.lock();
            state.next_instance += 1;
            state.next_instance
        };
        InMemoryBusHandle {
            hub: self.clone(),
            instance,
            sink,
        }
    }
}

/// One instance's view of an [`InMemoryBus`].
pub struct InMemoryBusHandle {
    hub: InMemoryBus,
    instance: usize,
    sink: BusSink,
}

#[async_trait]
impl MessageBus for InMemoryBusHandle {
    async fn subscribe(&self, topic: &str) -> Result<(), ClusterError> {
        let mut state = self.hub.inner.lock();
        let subscribers = state.topics.entry(topic.to_string()).or_default();
        if !subscribers.iter().any(|s| s.instance == self.instance) {
            subscribers.push(Subscriber {
                instance: self.instance,
                sink: Arc::clone(&self.sink),
            });
        }
        Ok(())
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), ClusterError> {
        let mut state = self.hub.inner.lock();
        if let Some(subscribers) = state.topics.get_mut(topic) {
            subscribers.retain(|s| s.instance != self.instance);
            if subscribers.is_empty() {
                state.topics.remove(topic);
            }
        }
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), ClusterError> {
        let subscribers: Vec<Subscriber> = {
            let state = self.hub.inner.lock();
            state.topics.get(topic).cloned().unwrap_or_default()
        };
        // No subscriber means the connection closed in flight; the payload
        // is dropped, matching the at-most-once contract.
        for subscriber in subscribers {
            (subscriber.sink)(topic, payload.clone());
        }
        Ok(())
    }
}
