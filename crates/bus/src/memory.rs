//! In-process transport.
//!
//! Every [`MemoryBus`] clone shares one broadcast channel, so two handles
//! behave like two instances attached to the same NATS server.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::debug;

use crate::error::BusError;
use crate::traits::{Bus, BusSubscription};

const CHANNEL_CAPACITY: usize = 1024;

#[derive(Clone)]
pub struct MemoryBus {
    tx: broadcast::Sender<(String, Bytes)>,
    closed: Arc<AtomicBool>,
}

impl MemoryBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            tx,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Bus for MemoryBus {
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<(), BusError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BusError::Closed);
        }
        // No receivers is not an error: nobody is listening yet.
        let receivers = self.tx.send((subject.to_string(), payload)).unwrap_or(0);
        debug!(subject, receivers, "published to memory bus");
        Ok(())
    }

    async fn subscribe(&self, subject: &str) -> Result<BusSubscription, BusError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BusError::Closed);
        }
        let subject = subject.to_string();
        let stream = BroadcastStream::new(self.tx.subscribe()).filter_map(move |item| {
            let wanted = match item {
                Ok((s, payload)) if s == subject => Some(payload),
                // Lagged receivers skip what they missed.
                _ => None,
            };
            futures::future::ready(wanted)
        });
        Ok(stream.boxed())
    }

    async fn close(&self) -> Result<(), BusError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_only_matching_subject() {
        let bus = MemoryBus::new();
        let mut sub = bus.subscribe("items.updates").await.unwrap();

        bus.publish("other", Bytes::from_static(b"skip")).await.unwrap();
        bus.publish("items.updates", Bytes::from_static(b"hello")).await.unwrap();

        assert_eq!(sub.next().await.unwrap(), Bytes::from_static(b"hello"));
    }

    #[tokio::test]
    async fn clones_share_the_channel() {
        let a = MemoryBus::new();
        let b = a.clone();
        let mut sub = b.subscribe("s").await.unwrap();
        a.publish("s", Bytes::from_static(b"x")).await.unwrap();
        assert_eq!(sub.next().await.unwrap(), Bytes::from_static(b"x"));
    }

    #[tokio::test]
    async fn publish_without_subscribers_succeeds() {
        let bus = MemoryBus::new();
        assert!(bus.publish("s", Bytes::new()).await.is_ok());
    }

    #[tokio::test]
    async fn closed_bus_rejects_publish() {
        let bus = MemoryBus::new();
        bus.close().await.unwrap();
        assert!(!bus.is_connected());
        assert!(matches!(
            bus.publish("s", Bytes::new()).await,
            Err(BusError::Closed)
        ));
    }
}
