//! NATS transport.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_nats::connection::State;
use async_nats::{Client, ConnectOptions};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use tracing::{debug, info, instrument};

use crate::error::BusError;
use crate::traits::{Bus, BusSubscription};

/// [`Bus`] backed by a NATS core (non-JetStream) connection.
///
/// The connection is opened with `no_echo`, so an instance never receives
/// its own publishes.
pub struct NatsBus {
    client: Client,
    closed: AtomicBool,
}

impl NatsBus {
    /// Connect to `url`, failing fast if the server is not reachable within
    /// `timeout`.
    #[instrument(skip_all, fields(url = %url))]
    pub async fn connect(url: &str, timeout: Duration) -> Result<Self, BusError> {
        let options = ConnectOptions::new()
            .connection_timeout(timeout)
            .no_echo()
            .name("newswire");
        let client = tokio::time::timeout(timeout, options.connect(url))
            .await
            .map_err(|_| BusError::Timeout(timeout))?
            .map_err(|e| BusError::Connect(e.to_string()))?;
        info!("connected to NATS");
        Ok(Self {
            client,
            closed: AtomicBool::new(false),
        })
    }

    fn ensure_open(&self) -> Result<(), BusError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BusError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl Bus for NatsBus {
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<(), BusError> {
        self.ensure_open()?;
        let len = payload.len();
        self.client
            .publish(subject.to_string(), payload)
            .await
            .map_err(|e| BusError::Publish(e.to_string()))?;
        debug!(subject, bytes = len, "published to NATS");
        Ok(())
    }

    async fn subscribe(&self, subject: &str) -> Result<BusSubscription, BusError> {
        self.ensure_open()?;
        let subscriber = self
            .client
            .subscribe(subject.to_string())
            .await
            .map_err(|e| BusError::Subscribe(e.to_string()))?;
        info!(subject, "subscribed to NATS subject");
        Ok(subscriber.map(|message| message.payload).boxed())
    }

    async fn close(&self) -> Result<(), BusError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.client
            .flush()
            .await
            .map_err(|e| BusError::Close(e.to_string()))?;
        self.client
            .drain()
            .await
            .map_err(|e| BusError::Close(e.to_string()))?;
        info!("NATS connection drained and closed");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
            && matches!(self.client.connection_state(), State::Connected)
    }
}
