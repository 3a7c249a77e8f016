//! Change events and their JSON wire envelope.
//!
//! Every event travels as `{"event": <kind>, "data": <object>}`, both to
//! WebSocket subscribers and over the bus. Outbound events are the typed
//! [`ChangeEvent`]; inbound bus payloads decode leniently into
//! [`RemoteChange`] because other publishers may send partial records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::record::{Candidate, Record, RecordId};

pub const KIND_CREATED: &str = "item.created";
pub const KIND_UPDATED: &str = "item.updated";
pub const KIND_DELETED: &str = "item.deleted";
pub const KIND_TASK_COMPLETED: &str = "task.completed";

/// Summary of one fetch/reconcile pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSummary {
    pub timestamp: DateTime<Utc>,
    /// Records created or updated by the pass.
    pub count: u64,
}

/// A local state change, fanned out to subscribers and the bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ChangeEvent {
    #[serde(rename = "item.created")]
    Created(Record),
    #[serde(rename = "item.updated")]
    Updated(Record),
    #[serde(rename = "item.deleted")]
    Deleted { id: RecordId },
    #[serde(rename = "task.completed")]
    TaskCompleted(TaskSummary),
}

impl ChangeEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            ChangeEvent::Created(_) => KIND_CREATED,
            ChangeEvent::Updated(_) => KIND_UPDATED,
            ChangeEvent::Deleted { .. } => KIND_DELETED,
            ChangeEvent::TaskCompleted(_) => KIND_TASK_COMPLETED,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Errors decoding an inbound bus payload.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("payload is not a valid event envelope: {0}")]
    Json(#[from] serde_json::Error),

    #[error("'{event}' payload is missing required field '{field}'")]
    MissingField {
        event: &'static str,
        field: &'static str,
    },
}

/// A change announced by another instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteChange {
    Created(Candidate),
    Updated { id: RecordId, fields: Candidate },
    Deleted { id: RecordId },
    /// Kinds that are never replayed as local writes (e.g. `task.completed`).
    Ignored(String),
}

#[derive(Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    data: serde_json::Value,
}

#[derive(Deserialize)]
struct DeletedPayload {
    id: Option<RecordId>,
}

impl RemoteChange {
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let envelope: Envelope = serde_json::from_slice(bytes)?;
        match envelope.event.as_str() {
            KIND_CREATED => {
                let fields: Candidate = serde_json::from_value(envelope.data)?;
                if fields.natural_key().is_none() {
                    return Err(DecodeError::MissingField {
                        event: KIND_CREATED,
                        field: "url",
                    });
                }
                Ok(RemoteChange::Created(fields))
            }
            KIND_UPDATED => {
                let fields: Candidate = serde_json::from_value(envelope.data)?;
                let id = fields.id.ok_or(DecodeError::MissingField {
                    event: KIND_UPDATED,
                    field: "id",
                })?;
                Ok(RemoteChange::Updated { id, fields })
            }
            KIND_DELETED => {
                let payload: DeletedPayload = serde_json::from_value(envelope.data)?;
                let id = payload.id.ok_or(DecodeError::MissingField {
                    event: KIND_DELETED,
                    field: "id",
                })?;
                Ok(RemoteChange::Deleted { id })
            }
            _ => Ok(RemoteChange::Ignored(envelope.event)),
        }
    }
}
