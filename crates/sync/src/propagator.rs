//! Fan-out of locally-originated changes.

use std::sync::Arc;

use newswire_core::ChangeEvent;

use crate::bridge::BusBridge;
use crate::hub::{BroadcastReport, SubscriberHub};

/// Sends a local change to subscribers, then to the bus.
///
/// API writes and scheduler ticks go through here. Changes that came in from
/// the bus must not: the bridge broadcasts those itself.
pub struct Propagator {
    hub: Arc<SubscriberHub>,
    bridge: Arc<BusBridge>,
}

impl Propagator {
    pub fn new(hub: Arc<SubscriberHub>, bridge: Arc<BusBridge>) -> Self {
        Self { hub, bridge }
    }

    pub async fn propagate(&self, event: &ChangeEvent) -> BroadcastReport {
        let report = self.hub.broadcast(event).await;
        self.bridge.publish_local(event).await;
        report
    }

    /// Propagate `events` one after another, preserving order.
    pub async fn propagate_all(&self, events: &[ChangeEvent]) {
        for event in events {
            self.propagate(event).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use bytes::Bytes;
    use futures::StreamExt;
    use newswire_bus::{Bus, BusError, BusSubscription};
    use newswire_store::MemoryStore;

    use crate::hub::{SendError, Subscriber};

    #[derive(Default)]
    struct CountingBus(AtomicUsize);

    #[async_trait]
    impl Bus for CountingBus {
        async fn publish(&self, _subject: &str, _payload: Bytes) -> Result<(), BusError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn subscribe(&self, _subject: &str) -> Result<BusSubscription, BusError> {
            Ok(futures::stream::empty().boxed())
        }
        async fn close(&self) -> Result<(), BusError> {
            Ok(())
        }
        fn is_connected(&self) -> bool {
            true
        }
    }

    #[derive(Default)]
    struct CountingSubscriber(AtomicUsize);

    #[async_trait]
    impl Subscriber for CountingSubscriber {
        async fn send(&self, _text: &str) -> Result<(), SendError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_propagate_reaches_hub_and_bus_once() {
        let bus = Arc::new(CountingBus::default());
        let hub = Arc::new(SubscriberHub::new());
        let subscriber = Arc::new(CountingSubscriber::default());
        hub.register(subscriber.clone()).await;
        let bridge = Arc::new(BusBridge::new(
            Some(bus.clone() as Arc<dyn Bus>),
            newswire_bus::SUBJECT,
            Arc::new(MemoryStore::new()),
            hub.clone(),
        ));
        let propagator = Propagator::new(hub, bridge);

        let report = propagator.propagate(&ChangeEvent::Deleted { id: 1 }).await;
        assert_eq!(report.delivered, 1);
        assert_eq!(subscriber.0.load(Ordering::SeqCst), 1);
        assert_eq!(bus.0.load(Ordering::SeqCst), 1);
    }
}
