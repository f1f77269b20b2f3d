//! Pub/sub transport boundary.
//!
//! The core only ever calls [`TickPublisher::publish`]; subscription is the
//! consumer's side of the contract. Delivery is at-most-once, best-effort:
//! no acknowledgement, no backpressure, no retention of missed ticks.
//!
//! Two implementations:
//! - [`RedisPublisher`] — production, one `PUBLISH` per envelope.
//! - [`MemoryPubSub`] — in-process broadcast channels, used by tests.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use redis::Commands;
use tb_core::error::PublishError;
use tokio::sync::broadcast;

/// Publish boundary of the pub/sub transport.
///
/// Implementations must be safe for concurrent use from every session's
/// callback task.
pub trait TickPublisher: Send + Sync {
    fn publish(&self, channel: &str, payload: &[u8]) -> Result<(), PublishError>;
}

// ---------------------------------------------------------------------------
// RedisPublisher
// ---------------------------------------------------------------------------

/// Redis-backed publisher.
pub struct RedisPublisher {
    // Keep the client alive for the lifetime of the connection.
    #[allow(dead_code)]
    client: redis::Client,
    connection: Mutex<redis::Connection>,
}

impl RedisPublisher {
    /// Open a connection to the given Redis endpoint
    /// (e.g. `redis://127.0.0.1:6379`).
    pub fn connect(addr: &str) -> Result<Self, PublishError> {
        let client = redis::Client::open(addr)
            .map_err(|e| PublishError::Transport(format!("failed to create Redis client: {e}")))?;
        let connection = client
            .get_connection()
            .map_err(|e| PublishError::Transport(format!("failed to connect to Redis: {e}")))?;

        Ok(Self { client, connection: Mutex::new(connection) })
    }
}

impl TickPublisher for RedisPublisher {
    fn publish(&self, channel: &str, payload: &[u8]) -> Result<(), PublishError> {
        let mut conn = self.connection.lock().unwrap_or_else(PoisonError::into_inner);
        let _: () = conn
            .publish(channel, payload)
            .map_err(|e| PublishError::Transport(format!("Redis PUBLISH failed: {e}")))?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryPubSub
// ---------------------------------------------------------------------------

/// Per-channel buffer size of the in-process transport.
const MEMORY_CHANNEL_CAPACITY: usize = 1024;

/// In-process pub/sub over tokio broadcast channels.
///
/// Publishing to a channel nobody subscribes to silently drops the payload,
/// matching the fire-and-forget pub/sub contract.
#[derive(Default)]
pub struct MemoryPubSub {
    channels: Mutex<HashMap<String, broadcast::Sender<Vec<u8>>>>,
}

impl MemoryPubSub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to a channel; payloads published after this call are
    /// delivered to the returned receiver.
    pub fn subscribe(&self, channel: &str) -> broadcast::Receiver<Vec<u8>> {
        self.sender(channel).subscribe()
    }

    fn sender(&self, channel: &str) -> broadcast::Sender<Vec<u8>> {
        let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(MEMORY_CHANNEL_CAPACITY).0)
            .clone()
    }
}

impl TickPublisher for MemoryPubSub {
    fn publish(&self, channel: &str, payload: &[u8]) -> Result<(), PublishError> {
        // send() errs only when no receiver exists — not a failure here.
        let _ = self.sender(channel).send(payload.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_pubsub_delivers_to_subscriber() {
        let bus = MemoryPubSub::new();
        let mut rx = bus.subscribe("CH:TICKS:U1:B1");

        bus.publish("CH:TICKS:U1:B1", b"payload").unwrap();
        assert_eq!(rx.recv().await.unwrap(), b"payload".to_vec());
    }

    #[tokio::test]
    async fn memory_pubsub_isolates_channels() {
        let bus = MemoryPubSub::new();
        let mut rx = bus.subscribe("CH:TICKS:U1:B1");

        bus.publish("CH:TICKS:U1:B2", b"other").unwrap();
        bus.publish("CH:TICKS:U1:B1", b"mine").unwrap();
        assert_eq!(rx.recv().await.unwrap(), b"mine".to_vec());
    }

    #[test]
    fn publish_without_subscriber_is_ok() {
        let bus = MemoryPubSub::new();
        assert!(bus.publish("CH:TICKS:U1:B1", b"dropped").is_ok());
    }
}
