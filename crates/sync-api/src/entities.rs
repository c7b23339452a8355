//! Handlers shared by the five metadata tables.
//!
//! Every handler is generic over the store and the entity type; the router
//! instantiates them once per table.

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::{HeaderMap, StatusCode},
    Json,
};
use metasync_core::Entity;
use metasync_storage::{EnvListing, EnvRecord, MetadataStore, PresenceRow, UpsertOutcome};
use serde::Serialize;

use crate::errors::{json_rejection, path_rejection, sync_error, ApiError, ApiResult};
use crate::{AppState, CHANGED_BY_HEADER};

/// Body returned by delete
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
}

/// Body returned by sync
#[derive(Debug, Serialize)]
pub struct SyncResponse<T> {
    pub status: &'static str,
    pub outcome: UpsertOutcome,
    pub record: T,
}

/// Value of the `X-Changed-By` header, if present and non-blank.
pub fn changed_by(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(CHANGED_BY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

pub async fn list<S: MetadataStore, T: Entity>(
    State(state): State<AppState<S>>,
) -> ApiResult<EnvListing<T>> {
    state.sync.list::<T>().await.map(Json).map_err(sync_error)
}

pub async fn list_by_system<S: MetadataStore, T: Entity>(
    State(state): State<AppState<S>>,
    system_id: Result<Path<i32>, PathRejection>,
) -> ApiResult<EnvListing<T>> {
    let Path(system_id) = system_id.map_err(path_rejection)?;
    state
        .sync
        .list_by_system::<T>(system_id)
        .await
        .map(Json)
        .map_err(sync_error)
}

pub async fn status<S: MetadataStore, T: Entity>(
    State(state): State<AppState<S>>,
) -> ApiResult<Vec<PresenceRow>> {
    state.sync.status::<T>().await.map(Json).map_err(sync_error)
}

pub async fn get_one<S: MetadataStore, T: Entity>(
    State(state): State<AppState<S>>,
    id: Result<Path<i32>, PathRejection>,
) -> ApiResult<EnvRecord<T>> {
    let Path(id) = id.map_err(path_rejection)?;
    state.sync.get::<T>(id).await.map(Json).map_err(sync_error)
}

pub async fn create<S: MetadataStore, T: Entity>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    body: Result<Json<T::Draft>, JsonRejection>,
) -> Result<(StatusCode, Json<T>), ApiError> {
    let Json(draft) = body.map_err(json_rejection)?;
    let created = state
        .sync
        .create::<T>(draft, changed_by(&headers))
        .await
        .map_err(sync_error)?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn update<S: MetadataStore, T: Entity>(
    State(state): State<AppState<S>>,
    id: Result<Path<i32>, PathRejection>,
    headers: HeaderMap,
    body: Result<Json<T::Draft>, JsonRejection>,
) -> ApiResult<T> {
    let Path(id) = id.map_err(path_rejection)?;
    let Json(draft) = body.map_err(json_rejection)?;
    state
        .sync
        .update::<T>(id, draft, changed_by(&headers))
        .await
        .map(Json)
        .map_err(sync_error)
}

pub async fn delete<S: MetadataStore, T: Entity>(
    State(state): State<AppState<S>>,
    id: Result<Path<i32>, PathRejection>,
    headers: HeaderMap,
) -> ApiResult<StatusResponse> {
    let Path(id) = id.map_err(path_rejection)?;
    state
        .sync
        .delete::<T>(id, changed_by(&headers))
        .await
        .map_err(sync_error)?;
    Ok(Json(StatusResponse { status: "success" }))
}

/// Copy one dev record over prod.
pub async fn sync<S: MetadataStore, T: Entity>(
    State(state): State<AppState<S>>,
    id: Result<Path<i32>, PathRejection>,
    headers: HeaderMap,
) -> ApiResult<SyncResponse<T>> {
    let Path(id) = id.map_err(path_rejection)?;
    let result = state.sync.sync::<T>(id, changed_by(&headers)).await;

    #[cfg(feature = "metrics")]
    crate::metrics::record_sync_operation(
        T::KIND.route_segment(),
        if result.is_ok() { "success" } else { "error" },
    );

    let synced = result.map_err(sync_error)?;
    Ok(Json(SyncResponse {
        status: "success",
        outcome: synced.outcome,
        record: synced.record,
    }))
}
