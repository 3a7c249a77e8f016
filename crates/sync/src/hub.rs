//! Subscriber hub: fan-out of change events to live push connections.
//!
//! The hub owns the set of subscribers. A subscriber whose send fails (or
//! stalls past [`SEND_TIMEOUT`]) during a broadcast is dropped once that
//! broadcast has finished with everyone else.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use newswire_core::ChangeEvent;

/// How long one subscriber may take to accept a frame.
pub const SEND_TIMEOUT: Duration = Duration::from_secs(5);

pub type SubscriberId = Uuid;

#[derive(Debug, Error)]
#[error("subscriber send failed: {0}")]
pub struct SendError(pub String);

/// A live push connection.
#[async_trait]
pub trait Subscriber: Send + Sync {
    /// Deliver one serialized event.
    async fn send(&self, text: &str) -> Result<(), SendError>;
}

/// Outcome of one broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub dropped: usize,
}

#[derive(Default)]
pub struct SubscriberHub {
    subscribers: RwLock<HashMap<SubscriberId, Arc<dyn Subscriber>>>,
    /// Serializes broadcasts so every subscriber sees events in call order.
    sweep: Mutex<()>,
}

impl SubscriberHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, subscriber: Arc<dyn Subscriber>) -> SubscriberId {
        let id = Uuid::new_v4();
        let mut subscribers = self.subscribers.write().await;
        subscribers.insert(id, subscriber);
        info!(subscriber = %id, total = subscribers.len(), "subscriber connected");
        id
    }

    /// Remove a subscriber. Unknown ids are ignored.
    pub async fn unregister(&self, id: SubscriberId) {
        let mut subscribers = self.subscribers.write().await;
        if subscribers.remove(&id).is_some() {
            info!(subscriber = %id, total = subscribers.len(), "subscriber disconnected");
        }
    }

    pub async fn len(&self) -> usize {
        self.subscribers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.subscribers.read().await.is_empty()
    }

    /// Send `event` to every current subscriber. Never fails.
    pub async fn broadcast(&self, event: &ChangeEvent) -> BroadcastReport {
        let _sweep = self.sweep.lock().await;

        let snapshot: Vec<(SubscriberId, Arc<dyn Subscriber>)> = {
            let subscribers = self.subscribers.read().await;
            subscribers.iter().map(|(id, s)| (*id, Arc::clone(s))).collect()
        };
        if snapshot.is_empty() {
            return BroadcastReport::default();
        }

        let text = match event.to_json() {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, kind = event.kind(), "failed to serialize event");
                return BroadcastReport::default();
            }
        };

        let sends = snapshot.iter().map(|(id, subscriber)| {
            let text = text.as_str();
            async move {
                let outcome = match tokio::time::timeout(SEND_TIMEOUT, subscriber.send(text)).await {
                    Ok(result) => result,
                    Err(_) => Err(SendError(format!("timed out after {SEND_TIMEOUT:?}"))),
                };
                (*id, outcome)
            }
        });
        let results = join_all(sends).await;

        let mut report = BroadcastReport::default();
        let mut stale = Vec::new();
        for (id, outcome) in results {
            match outcome {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    debug!(subscriber = %id, error = %e, "dropping dead subscriber");
                    stale.push(id);
                }
            }
        }

        if !stale.is_empty() {
            let mut subscribers = self.subscribers.write().await;
            for id in &stale {
                subscribers.remove(id);
            }
            report.dropped = stale.len();
            warn!(
                dropped = report.dropped,
                remaining = subscribers.len(),
                kind = event.kind(),
                "removed dead subscribers after broadcast"
            );
        }

        report
    }
}
