//! Record CRUD. Every successful write is propagated exactly once.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use newswire_core::{ChangeEvent, NewRecord, Record, RecordId, RecordPatch};

use crate::state::AppState;

use super::store_error;

const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 500;

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// List records, newest first.
pub async fn list_items(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Record>>, (StatusCode, String)> {
    let limit = params.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(0, MAX_PAGE_SIZE);
    let offset = params.offset.unwrap_or(0).max(0);
    let records = state.store.list(limit, offset).await.map_err(store_error)?;
    Ok(Json(records))
}

pub async fn get_item(
    State(state): State<Arc<AppState>>,
    Path(id): Path<RecordId>,
) -> Result<Json<Record>, (StatusCode, String)> {
    state
        .store
        .find_by_id(id)
        .await
        .map_err(store_error)?
        .map(Json)
        .ok_or_else(|| (StatusCode::NOT_FOUND, "Item not found".to_string()))
}

/// Create a record. Returns 201, 400 on a blank title/url, 409 if the url
/// already exists.
pub async fn create_item(
    State(state): State<Arc<AppState>>,
    Json(new): Json<NewRecord>,
) -> Result<(StatusCode, Json<Record>), (StatusCode, String)> {
    let record = state.store.insert(new).await.map_err(store_error)?;
    state
        .propagator
        .propagate(&ChangeEvent::Created(record.clone()))
        .await;
    Ok((StatusCode::CREATED, Json(record)))
}

/// Apply the provided fields; omitted fields keep their value.
pub async fn update_item(
    State(state): State<Arc<AppState>>,
    Path(id): Path<RecordId>,
    Json(patch): Json<RecordPatch>,
) -> Result<Json<Record>, (StatusCode, String)> {
    let record = state
        .store
        .update_fields(id, patch)
        .await
        .map_err(store_error)?;
    state
        .propagator
        .propagate(&ChangeEvent::Updated(record.clone()))
        .await;
    Ok(Json(record))
}

pub async fn delete_item(
    State(state): State<Arc<AppState>>,
    Path(id): Path<RecordId>,
) -> Result<StatusCode, (StatusCode, String)> {
    state.store.delete(id).await.map_err(store_error)?;
    state
        .propagator
        .propagate(&ChangeEvent::Deleted { id })
        .await;
    Ok(StatusCode::NO_CONTENT)
}
