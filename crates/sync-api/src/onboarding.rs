//! Onboarding: browse a category's source database and request generated
//! metadata for one of its tables.
//!
//! Credentials always come from the dev copy of the category; request bodies
//! only carry the category id.

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use metasync_core::validation::validate_pg_identifier;
use metasync_core::{Category, Environment, SourceCredentials, SourceDbType, SyncError};
use metasync_storage::MetadataStore;
use serde::Deserialize;
use tracing::info;

use crate::errors::{
    json_rejection, metadata_service_error, not_found, sync_error, ApiError, ApiResult,
};
use crate::metadata_service::{GenerateMetadataRequest, MetadataServiceError};
use crate::AppState;

/// Body of `/db/list_schemas/`
#[derive(Debug, Deserialize)]
pub struct ListSchemasRequest {
    pub categoryid: i32,
}

/// Body of `/db/list_tables/`
#[derive(Debug, Deserialize)]
pub struct ListTablesRequest {
    pub categoryid: i32,
    pub schema: String,
}

/// Body of `/db/generate_metadata/`
#[derive(Debug, Deserialize)]
pub struct GenerateMetadataBody {
    pub categoryid: i32,
    pub schema: String,
    pub table: String,
}

async fn load_category<S: MetadataStore>(
    state: &AppState<S>,
    categoryid: i32,
) -> Result<Category, ApiError> {
    state
        .sync
        .find::<Category>(Environment::Dev, categoryid)
        .await
        .map_err(sync_error)?
        .ok_or_else(|| not_found("Category not found in dev"))
}

pub async fn list_schemas<S: MetadataStore>(
    State(state): State<AppState<S>>,
    body: Result<Json<ListSchemasRequest>, JsonRejection>,
) -> ApiResult<Vec<String>> {
    let Json(request) = body.map_err(json_rejection)?;
    let category = load_category(&state, request.categoryid).await?;
    let creds = SourceCredentials::from_category(&category).map_err(sync_error)?;

    let schemas = state
        .introspector
        .list_schemas(&creds)
        .await
        .map_err(sync_error)?;
    info!(
        categoryid = request.categoryid,
        count = schemas.len(),
        "Listed source schemas"
    );
    Ok(Json(schemas))
}

pub async fn list_tables<S: MetadataStore>(
    State(state): State<AppState<S>>,
    body: Result<Json<ListTablesRequest>, JsonRejection>,
) -> ApiResult<Vec<String>> {
    let Json(request) = body.map_err(json_rejection)?;
    validate_pg_identifier(&request.schema, "schema").map_err(sync_error)?;
    let category = load_category(&state, request.categoryid).await?;
    let creds = SourceCredentials::from_category(&category).map_err(sync_error)?;

    let tables = state
        .introspector
        .list_tables(&creds, &request.schema)
        .await
        .map_err(sync_error)?;
    info!(
        categoryid = request.categoryid,
        schema = %request.schema,
        count = tables.len(),
        "Listed source tables"
    );
    Ok(Json(tables))
}

/// Forward a generation request to the metadata service.
///
/// Any known source type may be forwarded, since the service connects to the
/// source itself. The upstream JSON is returned unchanged.
pub async fn generate_metadata<S: MetadataStore>(
    State(state): State<AppState<S>>,
    body: Result<Json<GenerateMetadataBody>, JsonRejection>,
) -> ApiResult<serde_json::Value> {
    let Json(request) = body.map_err(json_rejection)?;
    validate_pg_identifier(&request.schema, "schema").map_err(sync_error)?;
    validate_pg_identifier(&request.table, "table").map_err(sync_error)?;

    let client = state
        .metadata_service
        .clone()
        .ok_or_else(|| metadata_service_error(MetadataServiceError::NotConfigured))?;

    let category = load_category(&state, request.categoryid).await?;
    let db_type = SourceDbType::for_category(&category).map_err(sync_error)?;
    let db_creds = match category.db_creds.as_ref() {
        Some(value) if !value.is_null() => value,
        _ => {
            return Err(sync_error(SyncError::ValidationError(format!(
                "Category {} has no database credentials",
                category.categoryid
            ))))
        }
    };

    let generated = client
        .generate(&GenerateMetadataRequest {
            categoryid: category.categoryid,
            db_type: db_type.as_str(),
            db_creds,
            schema: &request.schema,
            table: &request.table,
        })
        .await
        .map_err(metadata_service_error)?;
    Ok(Json(generated))
}
