//! Redis-backed implementation of the cluster bus.

use async_trait::async_trait;
use futures::StreamExt;
use redis::AsyncCommands;
use redis::aio::{ConnectionManager, PubSubSink, PubSubStream};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

use crate::bus::{BusSink, ClusterError, MessageBus};

/// Cluster bus over redis pub/sub.
///
/// Publishing goes through a [`ConnectionManager`] (auto-reconnecting,
/// multiplexed). Subscriptions live on a dedicated pub/sub connection that
/// is owned by a driver task; subscribe and unsubscribe are forwarded to
/// that task over a command channel so the connection has a single owner.
pub struct RedisBus {
    publisher: ConnectionManager,
    commands: mpsc::Sender<SubscriptionCommand>,
}

enum SubscriptionCommand {
    Subscribe(String, oneshot::Sender<Result<(), ClusterError>>),
    Unsubscribe(String, oneshot::Sender<Result<(), ClusterError>>),
}

impl RedisBus {
    /// Connects to redis at `url` and starts the subscription driver.
    ///
    /// Messages on subscribed topics are handed to `sink`.
    pub async fn connect(url: &str, sink: BusSink) -> Result<Self, ClusterError> {
        let client = redis::Client::open(url).map_err(|e| ClusterError::Connect(e.to_string()))?;
        let publisher = client
            .get_connection_manager()
            .await
            .map_err(|e| ClusterError::Connect(e.to_string()))?;
        let pubsub = client
            .get_async_pubsub()
            .await
            .map_err(|e| ClusterError::Connect(e.to_string()))?;
        let (sub_sink, sub_stream) = pubsub.split();

        let (commands, command_rx) = mpsc::channel(64);
        tokio::spawn(drive_subscriptions(sub_sink, sub_stream, command_rx, sink));

        info!(url = %url, "connected to cluster bus");
        Ok(Self {
            publisher,
            commands,
        })
    }

    async fn send_command<F>(&self, build: F) -> Result<(), ClusterError>
    where
        F: FnOnce(oneshot::Sender<Result<(), ClusterError>>) -> SubscriptionCommand,
    {
        let (done_tx, done_rx) = oneshot::channel();
        self.commands
            .send(build(done_tx))
            .await
            .map_err(|_| ClusterError::Subscribe("subscription driver is gone".to_string()))?;
        done_rx
            .await
            .map_err(|_| ClusterError::Subscribe("subscription driver is gone".to_string()))?
    }
}

#[async_trait]
impl MessageBus for RedisBus {
    async fn subscribe(&self, topic: &str) -> Result<(), ClusterError> {
        self.send_command(|done| SubscriptionCommand::Subscribe(topic.to_string(), done))
            .await
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), ClusterError> {
        self.send_command(|done| SubscriptionCommand::Unsubscribe(topic.to_string(), done))
            .await
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), ClusterError> {
        let mut publisher = self.publisher.clone();
        let _: i64 = publisher
            .publish(topic, payload)
            .await
            .map_err(|e| ClusterError::Publish(e.to_string()))?;
        Ok(())
    }
}

/// Owns the pub/sub connection: applies subscription commands and pumps
/// incoming messages into the sink.
async fn drive_subscriptions(
    mut sub_sink: PubSubSink,
    mut sub_stream: PubSubStream,
    mut commands: mpsc::Receiver<SubscriptionCommand>,
    sink: BusSink,
) {
    loop {
        tokio::select! {
            command = commands.recv() => {
                match command {
                    None => {
                        debug!("cluster bus dropped, stopping subscription driver");
                        return;
                    }
                    Some(SubscriptionCommand::Subscribe(topic, done)) => {
                        let result = sub_sink
                            .subscribe(&topic)
                            .await
                            .map_err(|e| ClusterError::Subscribe(e.to_string()));
                        let _ = done.send(result);
                    }
                    Some(SubscriptionCommand::Unsubscribe(topic, done)) => {
                        let result = sub_sink
                            .unsubscribe(&topic)
                            .await
                            .map_err(|e| ClusterError::Subscribe(e.to_string()));
                        let _ = done.send(result);
                    }
                }
            }
            message = sub_stream.next() => {
                match message {
                    None => {
                        error!("cluster bus pub/sub stream ended");
                        return;
                    }
                    Some(message) => {
                        let topic = message.get_channel_name().to_string();
                        let payload = message.get_payload_bytes().to_vec();
                        debug!(topic = %topic, len = payload.len(), "bus message received");
                        sink(&topic, payload);
                    }
                }
            }
        }
    }
}
