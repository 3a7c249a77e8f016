//! Liveness and operational status.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub store: &'static str,
    pub bus_connected: bool,
    pub subscribers: usize,
    pub scheduler: &'static str,
    pub interval_secs: u64,
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        store: state.store.backend(),
        bus_connected: state.bridge.is_connected(),
        subscribers: state.hub.len().await,
        scheduler: state.scheduler.state().as_str(),
        interval_secs: state.scheduler.interval().as_secs(),
    })
}
