//! Error responses.
//!
//! Every failure is returned as `{"detail": "..."}` with a status code
//! derived from the underlying error.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::Json;
use metasync_core::SyncError;
use serde::{Deserialize, Serialize};

use crate::metadata_service::MetadataServiceError;

/// Error body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: String,
}

/// Handler error type
pub type ApiError = (StatusCode, Json<ErrorResponse>);

/// Handler result type
pub type ApiResult<T> = Result<Json<T>, ApiError>;

fn error(status: StatusCode, detail: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            detail: detail.into(),
        }),
    )
}

/// Helper function to create bad request error response
pub fn bad_request(message: impl Into<String>) -> ApiError {
    error(StatusCode::BAD_REQUEST, message)
}

/// Helper function to create not found error response
pub fn not_found(message: impl Into<String>) -> ApiError {
    error(StatusCode::NOT_FOUND, message)
}

pub fn conflict(message: impl Into<String>) -> ApiError {
    error(StatusCode::CONFLICT, message)
}

pub fn bad_gateway(message: impl Into<String>) -> ApiError {
    error(StatusCode::BAD_GATEWAY, message)
}

pub fn service_unavailable(message: impl Into<String>) -> ApiError {
    error(StatusCode::SERVICE_UNAVAILABLE, message)
}

/// Helper function to create internal error response
pub fn internal_error(message: impl Into<String>) -> ApiError {
    error(StatusCode::INTERNAL_SERVER_ERROR, message)
}

/// Map a storage or validation error to its response.
pub fn sync_error(err: SyncError) -> ApiError {
    match err {
        SyncError::ValidationError(msg) => bad_request(msg),
        SyncError::RecordNotFound(msg) => not_found(msg),
        SyncError::ConflictError(msg) => conflict(msg),
        SyncError::SourceError(msg) => {
            tracing::warn!(error = %msg, "Source database request failed");
            bad_gateway(msg)
        }
        other => {
            tracing::error!(error = %other, "Request failed");
            internal_error(other.to_string())
        }
    }
}

/// Map a metadata-service failure to its response.
pub fn metadata_service_error(err: MetadataServiceError) -> ApiError {
    tracing::warn!(error = %err, "Metadata service request failed");
    match err {
        MetadataServiceError::NotConfigured => service_unavailable(err.to_string()),
        _ => bad_gateway(err.to_string()),
    }
}

/// Malformed or missing JSON body.
pub fn json_rejection(rejection: JsonRejection) -> ApiError {
    error(rejection.status(), rejection.body_text())
}

/// Path segment that does not parse (e.g. a non-numeric id).
pub fn path_rejection(rejection: PathRejection) -> ApiError {
    bad_request(rejection.body_text())
}

pub fn query_rejection(rejection: QueryRejection) -> ApiError {
    bad_request(rejection.body_text())
}
