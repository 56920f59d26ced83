//! # WSGW Cluster
//!
//! Cross-instance routing for the WSGW gateway.
//!
//! A connection is owned by exactly one gateway instance: the one holding
//! its WebSocket. When a push lands on any other instance, the
//! [`ClusterRouter`] publishes the payload on a bus topic named after the
//! connection identifier, and the owning instance's subscription delivers
//! it into the local registry.
//!
//! The bus itself is behind the [`MessageBus`] trait: [`RedisBus`] for
//! deployments, [`InMemoryBus`] for tests and single-process clusters.
//! Delivery is at-most-once; a topic without a subscriber drops payloads.

mod bus;
mod redis_bus;
mod router;

pub use bus::{BusSink, ClusterError, InMemoryBus, InMemoryBusHandle, MessageBus};
pub use redis_bus::RedisBus;
pub use router::ClusterRouter;
