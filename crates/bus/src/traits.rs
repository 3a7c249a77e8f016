use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use crate::error::BusError;

/// Stream of raw payloads delivered on a subscribed subject.
pub type BusSubscription = BoxStream<'static, Bytes>;

/// Subject-based publish/subscribe transport.
///
/// Delivery is at-most-once: a publish that fails is not retried, and a
/// subscriber that falls behind may miss messages.
#[async_trait]
pub trait Bus: Send + Sync {
    /// Publish one payload. Returns once the transport accepted it.
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<(), BusError>;

    /// Start receiving payloads published on `subject`. Whether a handle's
    /// own publishes come back is up to the transport.
    async fn subscribe(&self, subject: &str) -> Result<BusSubscription, BusError>;

    /// Flush pending publishes and stop accepting new ones.
    async fn close(&self) -> Result<(), BusError>;

    fn is_connected(&self) -> bool;
}

/// Blanket implementation so `Arc<dyn Bus>` can be used directly.
#[async_trait]
impl<T: Bus + ?Sized> Bus for Arc<T> {
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<(), BusError> {
        (**self).publish(subject, payload).await
    }

    async fn subscribe(&self, subject: &str) -> Result<BusSubscription, BusError> {
        (**self).subscribe(subject).await
    }

    async fn close(&self) -> Result<(), BusError> {
        (**self).close().await
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }
}
