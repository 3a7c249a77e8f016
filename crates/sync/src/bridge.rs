//! Bus bridge: replication between instances.
//!
//! Outbound, [`BusBridge::publish_local`] forwards locally-originated events
//! to the bus. Inbound, [`BusBridge::on_bus_message`] applies a peer's change
//! to the local store and broadcasts it to local subscribers only.
//!
//! An applied remote change is never published again. Together with the
//! "skip if already exists" rule for creates this keeps two instances from
//! bouncing the same change back and forth.
//!
//! A missing bus is a supported mode: publishing becomes a no-op and the
//! consumer loop is never started.

use std::sync::Arc;

use bytes::Bytes;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use newswire_bus::{Bus, BusSubscription};
use newswire_core::{Candidate, ChangeEvent, NewRecord, RecordId, RecordPatch, RemoteChange};
use newswire_store::{RecordStore, StoreError};

use crate::hub::SubscriberHub;

pub struct BusBridge {
    bus: Option<Arc<dyn Bus>>,
    subject: String,
    store: Arc<dyn RecordStore>,
    hub: Arc<SubscriberHub>,
}

impl BusBridge {
    pub fn new(
        bus: Option<Arc<dyn Bus>>,
        subject: impl Into<String>,
        store: Arc<dyn RecordStore>,
        hub: Arc<SubscriberHub>,
    ) -> Self {
        Self {
            bus,
            subject: subject.into(),
            store,
            hub,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.bus.as_ref().is_some_and(|bus| bus.is_connected())
    }

    // ── Outbound ──────────────────────────────────────────────

    /// Publish a locally-originated event. Failures are logged and dropped.
    pub async fn publish_local(&self, event: &ChangeEvent) {
        let Some(bus) = &self.bus else {
            debug!(kind = event.kind(), "bus unavailable, skipping publish");
            return;
        };
        let payload = match event.to_json() {
            Ok(json) => Bytes::from(json),
            Err(e) => {
                warn!(error = %e, kind = event.kind(), "failed to encode event for bus");
                return;
            }
        };
        if let Err(e) = bus.publish(&self.subject, payload).await {
            warn!(error = %e, kind = event.kind(), subject = %self.subject, "bus publish failed");
        }
    }

    // ── Inbound ───────────────────────────────────────────────

    /// Open the bus subscription, if there is a bus.
    pub async fn subscribe(&self) -> Option<BusSubscription> {
        let bus = self.bus.as_ref()?;
        match bus.subscribe(&self.subject).await {
            Ok(subscription) => Some(subscription),
            Err(e) => {
                warn!(error = %e, subject = %self.subject, "bus subscribe failed, running without replication");
                None
            }
        }
    }

    /// Apply one inbound payload.
    ///
    /// Returns the local event that was broadcast, or `None` when the payload
    /// was malformed, ignored, redundant or failed to apply.
    pub async fn on_bus_message(&self, payload: &[u8]) -> Option<ChangeEvent> {
        let change = match RemoteChange::decode(payload) {
            Ok(change) => change,
            Err(e) => {
                warn!(error = %e, bytes = payload.len(), "discarding malformed bus message");
                return None;
            }
        };

        let applied = match change {
            RemoteChange::Created(fields) => self.apply_created(&fields).await,
            RemoteChange::Updated { id, fields } => self.apply_updated(id, &fields).await,
            RemoteChange::Deleted { id } => self.apply_deleted(id).await,
            RemoteChange::Ignored(kind) => {
                debug!(kind = %kind, "ignoring bus event");
                return None;
            }
        };

        let event = match applied {
            Ok(Some(event)) => event,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "failed to apply bus message");
                return None;
            }
        };
        self.hub.broadcast(&event).await;
        Some(event)
    }

    async fn apply_created(&self, fields: &Candidate) -> Result<Option<ChangeEvent>, StoreError> {
        let Some(new) = NewRecord::from_candidate(fields) else {
            return Ok(None);
        };
        if self.store.find_by_url(&new.url).await?.is_some() {
            debug!(url = %new.url, "remote create already known, skipping");
            return Ok(None);
        }
        match self.store.insert(new).await {
            Ok(record) => Ok(Some(ChangeEvent::Created(record))),
            Err(StoreError::Conflict(url)) => {
                debug!(url = %url, "remote create raced a local insert, skipping");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn apply_updated(
        &self,
        id: RecordId,
        fields: &Candidate,
    ) -> Result<Option<ChangeEvent>, StoreError> {
        if self.store.find_by_id(id).await?.is_none() {
            debug!(id, "remote update for unknown record, skipping");
            return Ok(None);
        }
        let patch = RecordPatch::prefer_present(fields);
        match self.store.update_fields(id, patch).await {
            Ok(record) => Ok(Some(ChangeEvent::Updated(record))),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn apply_deleted(&self, id: RecordId) -> Result<Option<ChangeEvent>, StoreError> {
        if self.store.find_by_id(id).await?.is_none() {
            debug!(id, "remote delete for unknown record, skipping");
            return Ok(None);
        }
        match self.store.delete(id).await {
            Ok(()) => Ok(Some(ChangeEvent::Deleted { id })),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Consume `subscription` until `token` is cancelled or the stream ends.
    pub async fn run(&self, mut subscription: BusSubscription, token: CancellationToken) {
        info!(subject = %self.subject, "bus consumer started");
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                message = subscription.next() => match message {
                    Some(payload) => {
                        self.on_bus_message(&payload).await;
                    }
                    None => {
                        warn!(subject = %self.subject, "bus subscription ended");
                        break;
                    }
                },
            }
        }
        info!("bus consumer stopped");
    }

    /// Flush and close the bus connection.
    pub async fn close(&self) {
        if let Some(bus) = &self.bus {
            if let Err(e) = bus.close().await {
                warn!(error = %e, "bus close failed");
            }
        }
    }
}
