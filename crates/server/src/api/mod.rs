//! REST endpoint modules.
//!
//! Each sub-module owns a single responsibility area.
//! Shared error mapping lives here in mod.rs.

mod health;
mod items;
mod tasks;

use axum::http::StatusCode;
use tracing::warn;

use newswire_store::StoreError;

// ── Error mapping ────────────────────────────────────────────────

/// Translate a store failure into an HTTP status and message.
pub(crate) fn store_error(e: StoreError) -> (StatusCode, String) {
    let status = StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        warn!(error = %e, "store request failed");
    }
    let message = match e {
        StoreError::NotFound(_) => "Item not found".to_string(),
        StoreError::Conflict(_) => "Item with this URL already exists".to_string(),
        other => other.to_string(),
    };
    (status, message)
}

// ── Re-exports ───────────────────────────────────────────────────
// Preserves flat `api::foo` import paths used by route registration.

pub use health::health;
pub use items::{create_item, delete_item, get_item, list_items, update_item};
pub use tasks::run_task;
