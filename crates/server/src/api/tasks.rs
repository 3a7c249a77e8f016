//! Manual trigger for the fetch/reconcile tick.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct TaskRunResponse {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub count: u64,
}

/// Run one tick now and report its summary. The tick's own
/// `task.completed` event is propagated like a scheduled one.
pub async fn run_task(State(state): State<Arc<AppState>>) -> Json<TaskRunResponse> {
    let summary = state.scheduler.run_now().await;
    Json(TaskRunResponse {
        status: "completed",
        timestamp: summary.timestamp,
        count: summary.count,
    })
}
