//! Audit history endpoints.

use axum::{
    extract::{
        rejection::{PathRejection, QueryRejection},
        Path, Query, State,
    },
    Json,
};
use metasync_core::{EntityKind, Environment, TableAudit};
use metasync_storage::MetadataStore;
use serde::Deserialize;

use crate::errors::{bad_request, path_rejection, query_rejection, sync_error, ApiResult};
use crate::AppState;

/// `?env=&limit=` query parameters
#[derive(Debug, Default, Deserialize)]
pub struct AuditQuery {
    pub env: Option<String>,
    pub limit: Option<i64>,
}

impl AuditQuery {
    /// Requested environment, dev when absent.
    fn environment(&self) -> Result<Environment, crate::errors::ApiError> {
        match self.env.as_deref() {
            None | Some("") => Ok(Environment::Dev),
            Some(raw) => raw.parse::<Environment>().map_err(sync_error),
        }
    }
}

/// Latest audit rows in one environment.
pub async fn recent<S: MetadataStore>(
    State(state): State<AppState<S>>,
    query: Result<Query<AuditQuery>, QueryRejection>,
) -> ApiResult<Vec<TableAudit>> {
    let Query(query) = query.map_err(query_rejection)?;
    let environment = query.environment()?;
    state
        .sync
        .recent(environment, query.limit)
        .await
        .map(Json)
        .map_err(sync_error)
}

/// History of one record, newest first.
///
/// `table` accepts a table name (`systems`), a route segment (`categories`)
/// or a label (`Category`).
pub async fn history<S: MetadataStore>(
    State(state): State<AppState<S>>,
    path: Result<Path<(String, i32)>, PathRejection>,
    query: Result<Query<AuditQuery>, QueryRejection>,
) -> ApiResult<Vec<TableAudit>> {
    let Path((table, record_id)) = path.map_err(path_rejection)?;
    let Query(query) = query.map_err(query_rejection)?;
    let kind = table
        .parse::<EntityKind>()
        .map_err(|_| bad_request(format!("Unknown table: {}", table)))?;
    let environment = query.environment()?;

    state
        .sync
        .history(environment, kind, record_id)
        .await
        .map(Json)
        .map_err(sync_error)
}
